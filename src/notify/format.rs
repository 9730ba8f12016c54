// src/notify/format.rs
//! Rendering of issue titles/bodies and email subjects/bodies.
//! Everything takes `now` explicitly so output is reproducible in tests.

use super::NotificationBatch;
use crate::entry::ScholarshipEntry;
use crate::relevance::CountryBucket;
use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write as _;

const FALLBACK_FLAG: &str = "🌍";

/// Regional-indicator flag for a 2-letter code, globe otherwise.
pub fn country_flag(code: &str) -> String {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_uppercase()) || code == "XX" {
        return FALLBACK_FLAG.to_string();
    }
    code.chars()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
        .collect()
}

pub fn escape_markdown(title: &str) -> String {
    title.replace('[', "\\[").replace(']', "\\]")
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        one.to_string()
    } else {
        many.to_string()
    }
}

fn display_title(e: &ScholarshipEntry) -> &str {
    if e.title.trim().is_empty() {
        "Unknown Title"
    } else {
        &e.title
    }
}

fn sections(batch: &NotificationBatch) -> Vec<&CountryBucket> {
    match batch {
        NotificationBatch::Flat(_) => Vec::new(),
        NotificationBatch::ByCountry(b) => b.non_empty().collect(),
    }
}

/* ---- GitHub issue ---- */

pub fn issue_title(batch: &NotificationBatch, now: DateTime<Utc>) -> String {
    let n = batch.total();
    let date = now.format("%Y-%m-%d");
    let noun = plural(n, "Scholarship", "Scholarships");
    match batch {
        NotificationBatch::Flat(_) => format!("🎓 {n} New {noun} Found - {date}"),
        NotificationBatch::ByCountry(_) => {
            let c = batch.country_count();
            let cn = plural(c, "Country", "Countries");
            format!("🎓 {n} New {noun} Found in {c} {cn} - {date}")
        }
    }
}

fn push_md_list(out: &mut String, entries: &[ScholarshipEntry]) {
    for (i, e) in entries.iter().enumerate() {
        let _ = writeln!(out, "{}. [{}]({})", i + 1, escape_markdown(display_title(e)), e.url);
    }
}

pub fn issue_body(batch: &NotificationBatch, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## 🎓 New Scholarships Detected!");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Detection Time:** {}", now.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out, "**Number of New Scholarships:** {}", batch.total());

    match batch {
        NotificationBatch::Flat(entries) => {
            let _ = writeln!(out, "\n---\n\n### Scholarships Found:\n");
            push_md_list(&mut out, entries);
        }
        NotificationBatch::ByCountry(_) => {
            let _ = writeln!(out, "**Countries:** {}", batch.country_count());
            for b in sections(batch) {
                let _ = writeln!(
                    out,
                    "\n---\n\n### {} {} ({})\n",
                    country_flag(&b.code),
                    b.name,
                    b.entries.len()
                );
                push_md_list(&mut out, &b.entries);
            }
        }
    }

    let _ = writeln!(out, "\n---\n");
    let _ = writeln!(out, "*This issue was automatically created by the Scholarship Watcher.*");
    let _ = write!(out, "*Please review each scholarship for eligibility and deadlines.*");
    out
}

/* ---- Email ---- */

pub fn email_subject(batch: &NotificationBatch, now: DateTime<Utc>) -> String {
    issue_title(batch, now)
}

fn summary_line(n: usize) -> String {
    if n == 1 {
        "1 new scholarship found".to_string()
    } else {
        format!("{n} new scholarships found")
    }
}

pub fn email_text(batch: &NotificationBatch, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "NEW SCHOLARSHIPS DETECTED");
    let _ = writeln!(out, "=========================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Detection Time: {}", now.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out, "Number of New Scholarships: {}", batch.total());

    let push_list = |out: &mut String, entries: &[ScholarshipEntry]| {
        for (i, e) in entries.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, display_title(e));
            let _ = writeln!(out, "   {}", e.url);
        }
    };

    match batch {
        NotificationBatch::Flat(entries) => {
            let _ = writeln!(out);
            push_list(&mut out, entries);
        }
        NotificationBatch::ByCountry(_) => {
            for b in sections(batch) {
                let _ = writeln!(out);
                let _ = writeln!(out, "{} ({})", b.name.to_uppercase(), b.entries.len());
                let _ = writeln!(out, "{}", "-".repeat(b.name.chars().count() + 4));
                push_list(&mut out, &b.entries);
            }
        }
    }

    let _ = writeln!(out);
    let _ = write!(out, "Sent by Scholarship Watcher. Review each listing for eligibility and deadlines.");
    out
}

fn push_html_list(out: &mut String, entries: &[ScholarshipEntry]) {
    let _ = writeln!(out, "<ol>");
    for e in entries {
        let _ = writeln!(
            out,
            "<li><a href=\"{}\">{}</a></li>",
            encode_double_quoted_attribute(&e.url),
            encode_text(display_title(e))
        );
    }
    let _ = writeln!(out, "</ol>");
}

pub fn email_html(batch: &NotificationBatch, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html>");
    let _ = writeln!(out, "<head><meta charset=\"utf-8\"><title>New Scholarships Detected</title></head>");
    let _ = writeln!(out, "<body style=\"font-family: sans-serif;\">");
    let _ = writeln!(out, "<h1>🎓 New Scholarships Detected</h1>");
    let _ = writeln!(
        out,
        "<p><strong>{}</strong> &middot; {}</p>",
        summary_line(batch.total()),
        now.format("%Y-%m-%d %H:%M UTC")
    );

    match batch {
        NotificationBatch::Flat(entries) => push_html_list(&mut out, entries),
        NotificationBatch::ByCountry(_) => {
            for b in sections(batch) {
                let _ = writeln!(
                    out,
                    "<h2>{} {} ({})</h2>",
                    country_flag(&b.code),
                    encode_text(&b.name),
                    b.entries.len()
                );
                push_html_list(&mut out, &b.entries);
            }
        }
    }

    let _ = writeln!(out, "<p style=\"color:#666\">Sent by Scholarship Watcher.</p>");
    let _ = writeln!(out, "</body>");
    let _ = write!(out, "</html>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relevance::CountryBuckets;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
    }

    fn grouped() -> NotificationBatch {
        let mut b = CountryBuckets::new();
        b.push("NO", "Norway", ScholarshipEntry::new("Norwegian Grant", "https://example.no"));
        b.push("SE", "Sweden", ScholarshipEntry::new("Swedish Grant", "https://example.se"));
        b.ensure("DE", "Germany");
        NotificationBatch::ByCountry(b)
    }

    #[test]
    fn flags() {
        assert_eq!(country_flag("NO"), "🇳🇴");
        assert_eq!(country_flag("se"), "🇸🇪");
        assert_eq!(country_flag("De"), "🇩🇪");
        assert_eq!(country_flag("XX"), "🌍");
        assert_eq!(country_flag("NOR"), "🌍");
        assert_eq!(country_flag(""), "🌍");
    }

    #[test]
    fn titles_pluralize_and_carry_date() {
        let one = NotificationBatch::Flat(vec![ScholarshipEntry::new("A", "https://x/a")]);
        assert_eq!(issue_title(&one, now()), "🎓 1 New Scholarship Found - 2025-03-14");

        let two = NotificationBatch::Flat(vec![
            ScholarshipEntry::new("A", "https://x/a"),
            ScholarshipEntry::new("B", "https://x/b"),
        ]);
        assert_eq!(issue_title(&two, now()), "🎓 2 New Scholarships Found - 2025-03-14");

        assert_eq!(
            issue_title(&grouped(), now()),
            "🎓 2 New Scholarships Found in 2 Countries - 2025-03-14"
        );
    }

    #[test]
    fn issue_body_escapes_brackets_and_numbers_entries() {
        let batch = NotificationBatch::Flat(vec![
            ScholarshipEntry::new("[2025] Oslo Grant", "https://x/a"),
            ScholarshipEntry::new("", "https://x/b"),
        ]);
        let body = issue_body(&batch, now());
        assert!(body.contains("1. [\\[2025\\] Oslo Grant](https://x/a)"));
        assert!(body.contains("2. [Unknown Title](https://x/b)"));
        assert!(body.contains("**Number of New Scholarships:** 2"));
        assert!(body.contains("2025-03-14 09:30 UTC"));
    }

    #[test]
    fn grouped_bodies_have_country_sections_only_for_non_empty_buckets() {
        let body = issue_body(&grouped(), now());
        assert!(body.contains("### 🇳🇴 Norway (1)"));
        assert!(body.contains("### 🇸🇪 Sweden (1)"));
        assert!(!body.contains("Germany"));

        let text = email_text(&grouped(), now());
        assert!(text.contains("NORWAY (1)"));
        assert!(text.contains("Norwegian Grant"));

        let html = email_html(&grouped(), now());
        assert!(html.contains("Sweden (1)</h2>"));
        assert!(html.contains("Swedish Grant"));
    }

    #[test]
    fn email_bodies() {
        let batch = NotificationBatch::Flat(vec![ScholarshipEntry::new(
            "Cloud <Computing> & AI",
            "https://x/a?b=1&c=2",
        )]);
        let html = email_html(&batch, now());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("New Scholarships Detected"));
        assert!(html.contains("1 new scholarship found"));
        assert!(html.contains("Cloud &lt;Computing&gt; &amp; AI"));
        assert!(html.contains("href=\"https://x/a?b=1&amp;c=2\""));

        let text = email_text(&batch, now());
        assert!(text.contains("NEW SCHOLARSHIPS DETECTED"));
        assert!(text.contains("Number of New Scholarships: 1"));
        assert!(text.contains("Cloud <Computing> & AI"));
    }
}
