// src/country.rs
//! Country profiles: the keyword and domain signals that tie a listing to a
//! country, plus the loader that reads them from env, JSON or TOML.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// --- env names & defaults ---
pub const ENV_COUNTRIES_CONFIG: &str = "COUNTRIES_CONFIG";
pub const ENV_COUNTRIES_CONFIG_PATH: &str = "COUNTRIES_CONFIG_PATH";
pub const DEFAULT_COUNTRIES_JSON: &str = "config/countries.json";
pub const DEFAULT_COUNTRIES_TOML: &str = "config/countries.toml";

/// Country code legacy snapshots are attributed to.
pub const DEFAULT_COUNTRY_CODE: &str = "NO";

const NORWAY_KEYWORDS: &[&str] = &[
    "norway",
    "norwegian",
    "norge",
    "norsk",
    "oslo",
    "bergen",
    "trondheim",
    "stavanger",
    "tromsø",
    "tromso",
    "ntnu",
    "uio",
    "uib",
    "nordic",
    "scandinavia",
    "scandinavian",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryProfile {
    pub code: String,
    pub name: String,
    pub keywords: BTreeSet<String>,
    pub domain_patterns: BTreeSet<String>,
    pub enabled: bool,
}

impl CountryProfile {
    /// Normalizes on construction: code uppercased, keywords and domain
    /// patterns trimmed + lowercased, blanks dropped.
    pub fn new<K, D>(code: &str, name: &str, keywords: K, domain_patterns: D) -> Self
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            code: code.trim().to_ascii_uppercase(),
            name: name.trim().to_string(),
            keywords: clean_set(keywords),
            domain_patterns: clean_set(domain_patterns),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Built-in profile used when nothing is configured.
    pub fn norway() -> Self {
        Self::new("NO", "Norway", NORWAY_KEYWORDS, [".no"])
    }
}

fn clean_set<I>(items: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/* ---- Loading ---- */

#[derive(Debug, Deserialize)]
struct RawCountry {
    #[serde(default)]
    code: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    domain_patterns: Vec<String>,
    #[serde(default)]
    enabled: Option<EnabledFlag>,
}

/// `enabled` shows up as a bool, a number or a string depending on who
/// wrote the file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnabledFlag {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl EnabledFlag {
    fn truthy(&self) -> bool {
        match self {
            EnabledFlag::Bool(b) => *b,
            EnabledFlag::Number(n) => *n != 0,
            EnabledFlag::Text(s) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
            }
        }
    }
}

/// Parse a countries document (JSON or TOML). Invalid country entries are
/// skipped; a document that is not an object is an error.
pub fn parse_countries(s: &str, hint_ext: &str, enabled_only: bool) -> Result<Vec<CountryProfile>> {
    let doc = parse_document(s, hint_ext)?;
    let obj = doc
        .as_object()
        .ok_or_else(|| anyhow!("countries config must be an object"))?;

    let global: Vec<String> = obj
        .get("global_keywords")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut out = Vec::new();
    let entries = obj
        .get("countries")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    for raw in entries {
        let parsed: RawCountry = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "country", "skipping invalid country entry: {e}");
                continue;
            }
        };
        if parsed.code.trim().is_empty() || parsed.name.trim().is_empty() {
            warn!(target: "country", "skipping country entry without code or name");
            continue;
        }
        let enabled = parsed.enabled.as_ref().map_or(true, EnabledFlag::truthy);
        if enabled_only && !enabled {
            continue;
        }
        let mut profile = CountryProfile::new(
            &parsed.code,
            &parsed.name,
            parsed.keywords.iter().chain(global.iter()),
            &parsed.domain_patterns,
        );
        profile.enabled = enabled;
        debug!(target: "country", code = %profile.code, keywords = profile.keywords.len(), "loaded country");
        out.push(profile);
    }
    Ok(out)
}

fn parse_document(s: &str, hint_ext: &str) -> Result<Value> {
    let try_toml_first = hint_ext == "toml";
    if try_toml_first {
        if let Ok(v) = toml::from_str::<Value>(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str::<Value>(s) {
        return Ok(v);
    }
    if !try_toml_first {
        if let Ok(v) = toml::from_str::<Value>(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported countries config format"))
}

pub fn load_countries_from(path: &Path, enabled_only: bool) -> Result<Vec<CountryProfile>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading countries config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_countries(&content, &ext, enabled_only)
        .with_context(|| format!("parsing countries config {}", path.display()))
}

/// Load profiles using env + fallbacks:
/// 1) $COUNTRIES_CONFIG (inline JSON)
/// 2) $COUNTRIES_CONFIG_PATH
/// 3) config/countries.json
/// 4) config/countries.toml
///
/// Never returns an empty list: falls back to the built-in Norway profile.
pub fn load_country_profiles(enabled_only: bool) -> Vec<CountryProfile> {
    let loaded = match load_configured(enabled_only) {
        Ok(Some(list)) => list,
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(target: "country", "countries config unusable: {e:#}");
            Vec::new()
        }
    };

    if loaded.is_empty() {
        warn!(target: "country", "no countries configured, using default Norway profile");
        return vec![CountryProfile::norway()];
    }

    let codes: Vec<&str> = loaded.iter().map(|c| c.code.as_str()).collect();
    info!(target: "country", count = loaded.len(), ?codes, "country profiles loaded");
    loaded
}

fn load_configured(enabled_only: bool) -> Result<Option<Vec<CountryProfile>>> {
    if let Ok(inline) = std::env::var(ENV_COUNTRIES_CONFIG) {
        let inline = inline.trim();
        if !inline.is_empty() {
            match parse_countries(inline, "json", enabled_only) {
                Ok(list) => {
                    info!(target: "country", "loaded countries from {ENV_COUNTRIES_CONFIG}");
                    return Ok(Some(list));
                }
                Err(e) => warn!(target: "country", "invalid {ENV_COUNTRIES_CONFIG}: {e:#}"),
            }
        }
    }

    if let Ok(p) = std::env::var(ENV_COUNTRIES_CONFIG_PATH) {
        let p = p.trim();
        if !p.is_empty() {
            return load_countries_from(&PathBuf::from(p), enabled_only).map(Some);
        }
    }

    for candidate in [DEFAULT_COUNTRIES_JSON, DEFAULT_COUNTRIES_TOML] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_countries_from(&pb, enabled_only).map(Some);
        }
    }
    Ok(None)
}

/// Advisory checks; returns human-readable warnings and logs each one.
pub fn validate_profiles(profiles: &[CountryProfile]) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();
    for p in profiles {
        if !seen.insert(p.code.as_str()) {
            warnings.push(format!("duplicate country code: {}", p.code));
        }
        if p.keywords.is_empty() {
            warnings.push(format!("country {} has no keywords", p.code));
        }
        if p.code.len() != 2 || !p.code.chars().all(|c| c.is_ascii_alphabetic()) {
            warnings.push(format!(
                "country code {} is not a 2-letter ISO code",
                p.code
            ));
        }
    }
    for w in &warnings {
        warn!(target: "country", "{w}");
    }
    warnings
}
