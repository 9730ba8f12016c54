// src/relevance.rs
//! Relevance gate: keyword matching, false-positive denylist, topic and
//! country checks, advisory scoring, and the three admission modes
//! (strict, flexible, multi-country).

use crate::country::CountryProfile;
use crate::entry::{dedup_by_url, ScholarshipEntry};
use crate::extract::sanitize_text;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Keywords this short (in chars) must match on word boundaries; longer ones
/// match as substrings.
pub const SHORT_KEYWORD_MAX_CHARS: usize = 3;

pub const MAX_COUNTRY_POINTS: u32 = 45;
pub const MAX_TOPIC_POINTS: u32 = 45;
pub const COUNTRY_POINTS_PER_HIT: u32 = 15;
pub const TOPIC_POINTS_PER_HIT: u32 = 10;

const TOPIC_KEYWORDS: &[&str] = &[
    // computer science
    "computer science",
    "computer engineering",
    "computing",
    "informatics",
    "computational",
    "software engineering",
    "software development",
    // IT general
    "information technology",
    "information systems",
    "it",
    "ict",
    "tech",
    "technology",
    "digital",
    // cloud / infrastructure
    "cloud",
    "cloud computing",
    "aws",
    "azure",
    "gcp",
    "devops",
    "infrastructure",
    "kubernetes",
    "docker",
    // data / AI
    "data science",
    "data engineering",
    "machine learning",
    "artificial intelligence",
    "ai",
    "ml",
    "deep learning",
    "big data",
    "analytics",
    // security
    "cybersecurity",
    "cyber security",
    "information security",
    "network security",
    // engineering
    "engineering",
    "electrical engineering",
    "electronics",
    // programming
    "programming",
    "developer",
    "coding",
    "python",
    "java",
    "javascript",
    // networks
    "networking",
    "telecommunications",
    // STEM
    "stem",
    "science",
    "mathematics",
    "physics",
];

const FALSE_POSITIVE_KEYWORDS: &[&str] = &[
    "login",
    "sign in",
    "sign up",
    "register",
    "subscribe",
    "newsletter",
    "cookie",
    "privacy policy",
    "terms of service",
    "contact us",
    "about us",
    "faq",
    "help center",
    "support",
    "advertisement",
    "sponsored",
    "cart",
    "checkout",
    "add to cart",
];

/* ---- Keyword matching ---- */

#[derive(Debug, Clone)]
struct Keyword {
    text: String,
    boundary: Option<Regex>,
}

impl Keyword {
    fn new(raw: &str) -> Option<Self> {
        let text = raw.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        let boundary = if text.chars().count() <= SHORT_KEYWORD_MAX_CHARS {
            Regex::new(&format!(r"\b{}\b", regex::escape(&text))).ok()
        } else {
            None
        };
        Some(Self { text, boundary })
    }

    fn is_in(&self, haystack: &str) -> bool {
        match &self.boundary {
            Some(re) => re.is_match(haystack),
            None => haystack.contains(&self.text),
        }
    }
}

/// A compiled keyword list. Expects lowercased haystacks.
#[derive(Debug, Clone, Default)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
}

impl KeywordSet {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut keywords: Vec<Keyword> = Vec::new();
        for item in items {
            if let Some(k) = Keyword::new(item.as_ref()) {
                if !keywords.iter().any(|x| x.text == k.text) {
                    keywords.push(k);
                }
            }
        }
        Self { keywords }
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn matches_any(&self, haystack: &str) -> bool {
        self.keywords.iter().any(|k| k.is_in(haystack))
    }

    /// Distinct keywords present in `haystack`.
    pub fn matched<'a>(&'a self, haystack: &str) -> Vec<&'a str> {
        self.keywords
            .iter()
            .filter(|k| k.is_in(haystack))
            .map(|k| k.text.as_str())
            .collect()
    }

    pub fn count_matches(&self, haystack: &str) -> usize {
        self.keywords.iter().filter(|k| k.is_in(haystack)).count()
    }
}

/// Topic allowlist + false-positive denylist, passed explicitly to every
/// filter so callers can swap in their own vocabulary.
#[derive(Debug, Clone)]
pub struct KeywordCatalog {
    pub topic: KeywordSet,
    pub false_positive: KeywordSet,
}

impl KeywordCatalog {
    pub fn new<T, F>(topic: T, false_positive: F) -> Self
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            topic: KeywordSet::new(topic),
            false_positive: KeywordSet::new(false_positive),
        }
    }
}

impl Default for KeywordCatalog {
    fn default() -> Self {
        Self::new(TOPIC_KEYWORDS, FALSE_POSITIVE_KEYWORDS)
    }
}

/// Compiled view of one country profile.
#[derive(Debug, Clone)]
pub struct CountryMatcher<'a> {
    pub profile: &'a CountryProfile,
    keywords: KeywordSet,
}

impl<'a> CountryMatcher<'a> {
    pub fn new(profile: &'a CountryProfile) -> Self {
        Self {
            profile,
            keywords: KeywordSet::new(&profile.keywords),
        }
    }

    /// Keyword hit in title/url/description, or a domain pattern inside the
    /// lowercased URL.
    pub fn matches(&self, entry: &ScholarshipEntry) -> bool {
        if self.keywords.matches_any(&haystack(entry)) {
            return true;
        }
        let url = entry.url.to_lowercase();
        self.profile
            .domain_patterns
            .iter()
            .any(|p| url.contains(p.as_str()))
    }

    fn keyword_hits(&self, haystack: &str) -> usize {
        self.keywords.count_matches(haystack)
    }
}

/// One matcher per profile, in input order. Build once per run, not per entry.
pub fn compile_matchers(profiles: &[CountryProfile]) -> Vec<CountryMatcher<'_>> {
    profiles.iter().map(CountryMatcher::new).collect()
}

/// Lowercased, whitespace-collapsed `title url [description]`.
pub fn haystack(entry: &ScholarshipEntry) -> String {
    let raw = match &entry.description {
        Some(d) => format!("{} {} {}", entry.title, entry.url, d),
        None => format!("{} {}", entry.title, entry.url),
    };
    sanitize_text(&raw.to_lowercase())
}

/* ---- Individual checks ---- */

pub fn is_false_positive(entry: &ScholarshipEntry, catalog: &KeywordCatalog) -> bool {
    catalog.false_positive.matches_any(&haystack(entry))
}

pub fn is_topic_relevant(entry: &ScholarshipEntry, catalog: &KeywordCatalog) -> bool {
    catalog.topic.matches_any(&haystack(entry))
}

pub fn is_country_relevant(entry: &ScholarshipEntry, country: &CountryMatcher<'_>) -> bool {
    country.matches(entry)
}

/// Profiles (in matcher order) the entry matches.
pub fn matching_countries<'a>(
    entry: &ScholarshipEntry,
    matchers: &[CountryMatcher<'a>],
) -> Vec<&'a CountryProfile> {
    matchers
        .iter()
        .filter(|m| m.matches(entry))
        .map(|m| m.profile)
        .collect()
}

/// Advisory 0..=100 score for single-country mode.
pub fn relevance_score(entry: &ScholarshipEntry, country: &CountryMatcher<'_>, catalog: &KeywordCatalog) -> u32 {
    let text = haystack(entry);
    let country_hits = country.keyword_hits(&text) as u32;
    let topic_hits = catalog.topic.count_matches(&text) as u32;

    let mut score = (country_hits * COUNTRY_POINTS_PER_HIT).min(MAX_COUNTRY_POINTS)
        + (topic_hits * TOPIC_POINTS_PER_HIT).min(MAX_TOPIC_POINTS);

    let title = entry.title.to_lowercase();
    if title.contains("scholarship") {
        score += 5;
    }
    if title.contains("phd") || title.contains("master") {
        score += 5;
    }
    score.min(100)
}

/* ---- Modes ---- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrictOptions {
    pub require_country: bool,
    pub require_topic: bool,
    pub min_score: u32,
    pub exclude_false_positives: bool,
}

impl Default for StrictOptions {
    fn default() -> Self {
        Self {
            require_country: true,
            require_topic: true,
            min_score: 0,
            exclude_false_positives: true,
        }
    }
}

#[derive(Debug, Default)]
struct RejectStats {
    false_positive: usize,
    no_country: usize,
    no_topic: usize,
    low_score: usize,
}

/// Admit only entries that pass every enabled criterion.
pub fn filter_strict(
    entries: &[ScholarshipEntry],
    profile: &CountryProfile,
    catalog: &KeywordCatalog,
    opts: StrictOptions,
) -> Vec<ScholarshipEntry> {
    let country = CountryMatcher::new(profile);
    let mut stats = RejectStats::default();
    let mut out = Vec::new();

    for e in entries {
        if opts.exclude_false_positives && is_false_positive(e, catalog) {
            stats.false_positive += 1;
            continue;
        }
        if opts.require_country && !country.matches(e) {
            stats.no_country += 1;
            continue;
        }
        if opts.require_topic && !is_topic_relevant(e, catalog) {
            stats.no_topic += 1;
            continue;
        }
        if opts.min_score > 0 && relevance_score(e, &country, catalog) < opts.min_score {
            stats.low_score += 1;
            continue;
        }
        out.push(e.clone());
    }

    info!(
        target: "relevance",
        country = %profile.code,
        input = entries.len(),
        kept = out.len(),
        false_positive = stats.false_positive,
        no_country = stats.no_country,
        no_topic = stats.no_topic,
        low_score = stats.low_score,
        "strict filter"
    );
    out
}

/// Fallback mode: false positives always excluded, then country OR topic
/// (country AND topic when `require_both`).
pub fn filter_flexible(
    entries: &[ScholarshipEntry],
    profile: &CountryProfile,
    catalog: &KeywordCatalog,
    require_both: bool,
) -> Vec<ScholarshipEntry> {
    let country = CountryMatcher::new(profile);
    let out: Vec<ScholarshipEntry> = entries
        .iter()
        .filter(|e| !is_false_positive(e, catalog))
        .filter(|e| {
            let c = country.matches(e);
            let t = is_topic_relevant(e, catalog);
            if require_both {
                c && t
            } else {
                c || t
            }
        })
        .cloned()
        .collect();
    info!(
        target: "relevance",
        country = %profile.code,
        input = entries.len(),
        kept = out.len(),
        require_both,
        "flexible filter"
    );
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiCountryOptions {
    pub require_topic: bool,
    pub exclude_false_positives: bool,
}

impl Default for MultiCountryOptions {
    fn default() -> Self {
        Self {
            require_topic: true,
            exclude_false_positives: true,
        }
    }
}

/// One country's slice of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryBucket {
    pub code: String,
    pub name: String,
    pub entries: Vec<ScholarshipEntry>,
}

/// Entries grouped by country, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryBuckets {
    buckets: Vec<CountryBucket>,
}

impl CountryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// One empty bucket per profile.
    pub fn for_profiles(profiles: &[CountryProfile]) -> Self {
        let mut out = Self::new();
        for p in profiles {
            out.ensure(&p.code, &p.name);
        }
        out
    }

    /// Returns the bucket for `code`, appending an empty one if absent.
    pub fn ensure(&mut self, code: &str, name: &str) -> &mut CountryBucket {
        let idx = match self.buckets.iter().position(|b| b.code == code) {
            Some(i) => i,
            None => {
                self.buckets.push(CountryBucket {
                    code: code.to_string(),
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.buckets.len() - 1
            }
        };
        &mut self.buckets[idx]
    }

    pub fn push(&mut self, code: &str, name: &str, entry: ScholarshipEntry) {
        self.ensure(code, name).entries.push(entry);
    }

    pub fn get(&self, code: &str) -> Option<&CountryBucket> {
        self.buckets.iter().find(|b| b.code == code)
    }

    pub fn entries(&self, code: &str) -> &[ScholarshipEntry] {
        self.get(code).map(|b| b.entries.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CountryBucket> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    /// Buckets that actually hold entries.
    pub fn non_empty(&self) -> impl Iterator<Item = &CountryBucket> {
        self.buckets.iter().filter(|b| !b.entries.is_empty())
    }

    /// code -> bucket length.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.buckets
            .iter()
            .map(|b| (b.code.clone(), b.entries.len()))
            .collect()
    }

    /// code -> display name.
    pub fn names(&self) -> BTreeMap<String, String> {
        self.buckets
            .iter()
            .map(|b| (b.code.clone(), b.name.clone()))
            .collect()
    }

    /// Union across buckets in bucket order, deduped by URL (first wins).
    pub fn flatten(&self) -> Vec<ScholarshipEntry> {
        dedup_by_url(self.buckets.iter().flat_map(|b| b.entries.iter().cloned()))
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<ScholarshipEntry>> {
        self.buckets.into_iter().map(|b| (b.code, b.entries)).collect()
    }
}

impl FromIterator<CountryBucket> for CountryBuckets {
    fn from_iter<T: IntoIterator<Item = CountryBucket>>(iter: T) -> Self {
        Self {
            buckets: iter.into_iter().collect(),
        }
    }
}

/// Group entries under every country they match. An entry matching several
/// countries appears once per bucket, annotated with that bucket's code and
/// name. Entries matching none are dropped.
pub fn filter_multi_country(
    entries: &[ScholarshipEntry],
    profiles: &[CountryProfile],
    catalog: &KeywordCatalog,
    opts: MultiCountryOptions,
) -> CountryBuckets {
    let matchers = compile_matchers(profiles);
    let mut buckets = CountryBuckets::for_profiles(profiles);
    let mut dropped_fp = 0usize;
    let mut dropped_topic = 0usize;
    let mut dropped_country = 0usize;

    for e in entries {
        if opts.exclude_false_positives && is_false_positive(e, catalog) {
            dropped_fp += 1;
            continue;
        }
        if opts.require_topic && !is_topic_relevant(e, catalog) {
            dropped_topic += 1;
            continue;
        }
        let mut matched_any = false;
        for m in matchers.iter().filter(|m| m.matches(e)) {
            matched_any = true;
            buckets.push(&m.profile.code, &m.profile.name, e.annotated(&m.profile.code, &m.profile.name));
        }
        if !matched_any {
            dropped_country += 1;
        }
    }

    for b in buckets.iter() {
        debug!(target: "relevance", country = %b.code, kept = b.entries.len(), "country bucket");
    }
    info!(
        target: "relevance",
        input = entries.len(),
        countries = buckets.len(),
        placements = buckets.total(),
        false_positive = dropped_fp,
        no_topic = dropped_topic,
        no_country = dropped_country,
        "multi-country filter"
    );
    buckets
}

/// Convenience: multi-country grouping followed by URL-deduped flattening.
pub fn filter_all_countries(
    entries: &[ScholarshipEntry],
    profiles: &[CountryProfile],
    catalog: &KeywordCatalog,
    opts: MultiCountryOptions,
) -> Vec<ScholarshipEntry> {
    filter_multi_country(entries, profiles, catalog, opts).flatten()
}
