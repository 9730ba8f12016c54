// src/extract/mod.rs
//! Heuristic HTML extraction: turn a fetched listing page into
//! `(title, absolute url)` entries.
//!
//! Two tiers. The structural pass walks known listing containers and pulls a
//! title and a link out of each one. Only when that finds nothing does the
//! page-wide keyword pass run over every anchor.

pub mod catalog;

use crate::entry::{dedup_by_url, ScholarshipEntry};
use crate::fetch::FetchResult;
use catalog::{
    LinkStrategy, TitleStrategy, CATALOG, FALLBACK_KEYWORDS, LINK_KEYWORDS, LINK_STRATEGIES,
    MIN_LINK_TITLE_CHARS, MIN_TITLE_CHARS, TITLE_STRATEGIES,
};
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

/// Collapse runs of whitespace to one space and trim.
pub fn sanitize_text(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(s, " ").trim().to_string()
}

fn element_text(el: ElementRef<'_>) -> String {
    sanitize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn is_web(u: &Url) -> bool {
    matches!(u.scheme(), "http" | "https") && u.has_host()
}

/// Resolve an href against the page URL.
///
/// Empty, fragment-only and `javascript:` hrefs are rejected. Absolute
/// http(s) URLs are returned exactly as written; relative ones are joined to
/// `base`, and dropped when there is no usable base.
pub fn resolve_href(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.to_ascii_lowercase().starts_with("javascript:")
    {
        return None;
    }
    if let Ok(abs) = Url::parse(href) {
        return is_web(&abs).then(|| href.to_string());
    }
    let joined = base?.join(href).ok()?;
    is_web(&joined).then(|| joined.to_string())
}

fn anchors<'a>(scope: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    CATALOG.anchors.iter().flat_map(move |sel| scope.select(sel))
}

fn first_text_longer_than(scope: ElementRef<'_>, selectors: &[Selector], min: usize) -> Option<String> {
    selectors.iter().find_map(|sel| {
        let el = scope.select(sel).next()?;
        let text = element_text(el);
        (text.chars().count() > min).then_some(text)
    })
}

fn extract_title(container: ElementRef<'_>) -> Option<String> {
    TITLE_STRATEGIES.iter().find_map(|strategy| match strategy {
        TitleStrategy::Heading => {
            first_text_longer_than(container, &CATALOG.headings, MIN_TITLE_CHARS)
        }
        TitleStrategy::TitleClass => {
            first_text_longer_than(container, &CATALOG.title_classes, MIN_TITLE_CHARS)
        }
        TitleStrategy::FirstLinkText => anchors(container).next().and_then(|a| {
            let text = element_text(a);
            (text.chars().count() > MIN_LINK_TITLE_CHARS).then_some(text)
        }),
    })
}

fn extract_url(container: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    LINK_STRATEGIES.iter().find_map(|strategy| match strategy {
        LinkStrategy::KnownSelector => CATALOG.links.iter().find_map(|sel| {
            let link = container.select(sel).next()?;
            resolve_href(link.value().attr("href")?, base)
        }),
        LinkStrategy::KeywordLink => anchors(container).find_map(|a| {
            let href = a.value().attr("href")?;
            let hay = format!("{} {}", href, element_text(a)).to_lowercase();
            if LINK_KEYWORDS.iter().any(|k| hay.contains(k)) {
                resolve_href(href, base)
            } else {
                None
            }
        }),
        LinkStrategy::FirstUsable => {
            anchors(container).find_map(|a| resolve_href(a.value().attr("href")?, base))
        }
    })
}

fn structural_pass(doc: &Html, base: Option<&Url>) -> Vec<ScholarshipEntry> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for sel in &CATALOG.containers {
        for container in doc.select(sel) {
            let Some(title) = extract_title(container) else {
                continue;
            };
            let Some(url) = extract_url(container, base) else {
                continue;
            };
            if seen.insert(url.clone()) {
                out.push(ScholarshipEntry::new(title, url));
            }
        }
    }
    out
}

fn keyword_link_pass(doc: &Html, base: Option<&Url>) -> Vec<ScholarshipEntry> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for a in anchors(doc.root_element()) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let text = element_text(a);
        if text.chars().count() <= MIN_LINK_TITLE_CHARS {
            continue;
        }
        let hay = format!("{text} {href}").to_lowercase();
        if !FALLBACK_KEYWORDS.iter().any(|k| hay.contains(k)) {
            continue;
        }
        let Some(url) = resolve_href(href, base) else {
            continue;
        };
        if seen.insert(url.clone()) {
            out.push(ScholarshipEntry::new(text, url));
        }
    }
    out
}

/// Extract entries from one page. Never fails: malformed or empty HTML
/// yields an empty list.
pub fn parse_html(html: &str, source_url: &str) -> Vec<ScholarshipEntry> {
    if html.trim().is_empty() {
        debug!(target: "extract", url = source_url, "empty html, nothing to parse");
        return Vec::new();
    }
    let base = Url::parse(source_url).ok();
    if base.is_none() {
        warn!(target: "extract", url = source_url, "source url not parseable, relative links will be skipped");
    }

    let doc = Html::parse_document(html);

    let structural = structural_pass(&doc, base.as_ref());
    if !structural.is_empty() {
        debug!(target: "extract", url = source_url, count = structural.len(), "structural pass");
        return structural;
    }

    let fallback = keyword_link_pass(&doc, base.as_ref());
    if fallback.is_empty() {
        info!(target: "extract", url = source_url, "no scholarships found on page");
    } else {
        debug!(target: "extract", url = source_url, count = fallback.len(), "keyword fallback pass");
    }
    fallback
}

/// Parse every successful fetch in request order, dedup by URL across pages
/// (first seen wins).
pub fn parse_fetch_results(results: &[FetchResult]) -> Vec<ScholarshipEntry> {
    let mut all = Vec::new();
    for r in results {
        let html = match r.html_content.as_deref() {
            Some(h) if r.success && !h.is_empty() => h,
            _ => {
                debug!(target: "extract", url = %r.source_url, "skipping failed or empty fetch");
                continue;
            }
        };
        all.extend(parse_html(html, &r.source_url));
    }
    let total = all.len();
    let out = dedup_by_url(all);
    info!(
        target: "extract",
        parsed = total,
        unique = out.len(),
        "parsed fetch results"
    );
    out
}
