// tests/relevance_modes.rs
//
// Relevance gate across its three admission modes.
//
// Covered:
// - "login" (and other denylisted text) is excluded in strict, flexible and multi-country mode
// - an entry naming two countries lands in both buckets, annotated per bucket
// - a privacy-policy link next to a real listing: only the listing survives extract + filter
// - short keywords only match as whole words

use scholarship_watcher::country::CountryProfile;
use scholarship_watcher::entry::ScholarshipEntry;
use scholarship_watcher::extract::parse_html;
use scholarship_watcher::relevance::{
    filter_flexible, filter_multi_country, filter_strict, is_topic_relevant, KeywordCatalog,
    MultiCountryOptions, StrictOptions,
};

fn sweden() -> CountryProfile {
    CountryProfile::new("SE", "Sweden", ["sweden", "swedish", "stockholm", "kth"], [".se"])
}

fn nordic_pair() -> Vec<CountryProfile> {
    vec![CountryProfile::norway(), sweden()]
}

#[test]
fn login_text_is_excluded_in_every_mode() {
    let catalog = KeywordCatalog::default();
    let norway = CountryProfile::norway();
    let entries = vec![
        ScholarshipEntry::new(
            "Login to apply for the Oslo Computer Science Scholarship",
            "https://portal.example.org/oslo-cs",
        ),
        ScholarshipEntry::new("Oslo Computer Science Scholarship", "https://portal.example.org/oslo-cs-2"),
    ];

    let strict = filter_strict(&entries, &norway, &catalog, StrictOptions::default());
    assert_eq!(strict.len(), 1, "strict keeps only the clean entry");

    for require_both in [false, true] {
        let flexible = filter_flexible(&entries, &norway, &catalog, require_both);
        assert!(
            flexible.iter().all(|e| !e.title.to_lowercase().contains("login")),
            "flexible(require_both={require_both}) must drop the login entry"
        );
    }

    let opts = MultiCountryOptions {
        require_topic: false,
        ..MultiCountryOptions::default()
    };
    let buckets = filter_multi_country(&entries, &nordic_pair(), &catalog, opts);
    assert_eq!(buckets.entries("NO").len(), 1, "multi-country drops the login entry too");
    assert_eq!(buckets.entries("NO")[0].url, "https://portal.example.org/oslo-cs-2");
}

#[test]
fn entry_naming_two_countries_is_copied_into_both_buckets() {
    let catalog = KeywordCatalog::default();
    let entries = vec![ScholarshipEntry::new(
        "Nordic Grant for Norway and Sweden",
        "https://grants.example.org/nordic",
    )];
    let opts = MultiCountryOptions {
        require_topic: false,
        ..MultiCountryOptions::default()
    };

    let buckets = filter_multi_country(&entries, &nordic_pair(), &catalog, opts);
    let no = buckets.entries("NO");
    let se = buckets.entries("SE");
    assert_eq!(no.len(), 1, "NO bucket: {no:?}");
    assert_eq!(se.len(), 1, "SE bucket: {se:?}");
    assert_eq!(no[0].country_code.as_deref(), Some("NO"));
    assert_eq!(no[0].country_name.as_deref(), Some("Norway"));
    assert_eq!(se[0].country_code.as_deref(), Some("SE"));
    assert_eq!(se[0].country_name.as_deref(), Some("Sweden"));
    assert_eq!(no[0].url, se[0].url, "same identity in both buckets");
    assert!(
        entries[0].country_code.is_none(),
        "input entries are not mutated by annotation"
    );
}

#[test]
fn topic_requirement_applies_to_multi_country_mode_by_default() {
    let catalog = KeywordCatalog::default();
    let entries = vec![
        ScholarshipEntry::new("Nordic Grant for Norway and Sweden", "https://grants.example.org/nordic"),
        ScholarshipEntry::new(
            "Stockholm Machine Learning Scholarship",
            "https://grants.example.org/kth-ml",
        ),
    ];
    let buckets = filter_multi_country(&entries, &nordic_pair(), &catalog, MultiCountryOptions::default());
    assert!(buckets.entries("NO").is_empty(), "no topic keyword, so nothing for NO");
    assert_eq!(buckets.entries("SE").len(), 1);
    assert_eq!(buckets.total(), 1);
}

#[test]
fn privacy_policy_link_is_filtered_out_and_listing_kept() {
    let html = r#"
        <html><body>
          <a href="/privacy">Privacy Policy for scholarship applicants</a>
          <a href="/scholarships/oslo-ai">Oslo Artificial Intelligence Scholarship 2026</a>
        </body></html>
    "#;
    let extracted = parse_html(html, "https://www.example.no/");
    assert_eq!(extracted.len(), 2, "both anchors look like scholarship links: {extracted:?}");

    let kept = filter_strict(
        &extracted,
        &CountryProfile::norway(),
        &KeywordCatalog::default(),
        StrictOptions::default(),
    );
    assert_eq!(kept.len(), 1, "privacy policy entry must be excluded: {kept:?}");
    assert_eq!(kept[0].url, "https://www.example.no/scholarships/oslo-ai");
}

#[test]
fn short_keywords_need_word_boundaries() {
    let catalog = KeywordCatalog::default();
    let hit = ScholarshipEntry::new("Master in AI at Oslo", "https://x.example.org/a");
    let miss = ScholarshipEntry::new("Maintaining heritage gardens", "https://x.example.org/b");
    assert!(is_topic_relevant(&hit, &catalog), "standalone 'AI' is a topic hit");
    assert!(
        !is_topic_relevant(&miss, &catalog),
        "'ai' inside 'maintaining' and 'it' inside 'heritage' are not hits"
    );
}
