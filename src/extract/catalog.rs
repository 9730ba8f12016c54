// src/extract/catalog.rs
//! Selector catalogs for the structural pass and keyword tables for link
//! heuristics. Order matters everywhere: the first match wins.

use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::error;

/// Elements that typically wrap one scholarship listing.
pub const CONTAINER_SELECTORS: &[&str] = &[
    "article",
    ".scholarship",
    ".scholarship-item",
    ".scholarship-listing",
    ".post",
    ".entry",
    ".listing-item",
    ".result-item",
    ".scholarship-card",
    ".program-card",
    ".opportunity",
    ".funding-item",
    "table.scholarships tr",
    ".scholarship-table tr",
    "ul.scholarships li",
    "ol.scholarships li",
    ".scholarship-list li",
];

pub const HEADING_SELECTORS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

pub const TITLE_CLASS_SELECTORS: &[&str] = &[
    ".title",
    ".scholarship-title",
    ".entry-title",
    ".post-title",
];

/// Links that most likely point at the listing itself.
pub const LINK_SELECTORS: &[&str] = &[
    "h1 a",
    "h2 a",
    "h3 a",
    "h4 a",
    ".title a",
    ".scholarship-title a",
    ".entry-title a",
    ".post-title a",
    "a.scholarship-link",
    "a.title-link",
    "a[href*='scholarship']",
];

/// Scholarship-adjacent words checked against a link's href and text.
pub const LINK_KEYWORDS: &[&str] = &["scholarship", "program", "grant", "funding", "apply"];

/// Words that qualify a bare anchor in the page-wide fallback pass.
pub const FALLBACK_KEYWORDS: &[&str] = &[
    "scholarship",
    "scholarships",
    "grant",
    "grants",
    "fellowship",
    "fellowships",
    "funding",
    "bursary",
    "bursaries",
    "award",
    "awards",
    "stipend",
    "stipends",
    "financial aid",
];

/// Titles must be longer than this (chars) when taken from headings or
/// title-classed elements.
pub const MIN_TITLE_CHARS: usize = 5;
/// Link text must be longer than this to stand in as a title.
pub const MIN_LINK_TITLE_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleStrategy {
    Heading,
    TitleClass,
    FirstLinkText,
}

pub const TITLE_STRATEGIES: &[TitleStrategy] = &[
    TitleStrategy::Heading,
    TitleStrategy::TitleClass,
    TitleStrategy::FirstLinkText,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStrategy {
    KnownSelector,
    KeywordLink,
    FirstUsable,
}

pub const LINK_STRATEGIES: &[LinkStrategy] = &[
    LinkStrategy::KnownSelector,
    LinkStrategy::KeywordLink,
    LinkStrategy::FirstUsable,
];

/// Catalog compiled into selectors once per process.
pub struct CompiledCatalog {
    pub containers: Vec<Selector>,
    pub headings: Vec<Selector>,
    pub title_classes: Vec<Selector>,
    pub links: Vec<Selector>,
    pub anchors: Vec<Selector>,
}

fn compile(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(sel) => Some(sel),
            Err(e) => {
                error!(target: "extract", selector = s, "invalid selector: {e:?}");
                None
            }
        })
        .collect()
}

pub static CATALOG: Lazy<CompiledCatalog> = Lazy::new(|| CompiledCatalog {
    containers: compile(CONTAINER_SELECTORS),
    headings: compile(HEADING_SELECTORS),
    title_classes: compile(TITLE_CLASS_SELECTORS),
    links: compile(LINK_SELECTORS),
    anchors: compile(&["a[href]"]),
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_selector_compiles() {
        assert_eq!(CATALOG.containers.len(), CONTAINER_SELECTORS.len());
        assert_eq!(CATALOG.headings.len(), HEADING_SELECTORS.len());
        assert_eq!(CATALOG.title_classes.len(), TITLE_CLASS_SELECTORS.len());
        assert_eq!(CATALOG.links.len(), LINK_SELECTORS.len());
        assert_eq!(CATALOG.anchors.len(), 1);
    }
}
