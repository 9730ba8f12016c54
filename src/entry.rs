// src/entry.rs
//! The scholarship record that flows through every stage of a run.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// One discovered scholarship listing. Identity is the `url`, compared as an
/// exact string; `title` is descriptive only.
///
/// Only `url` is read strictly. Descriptive fields holding `null` or a
/// non-string value load as empty so a stored entry keeps its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarshipEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub country_code: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub country_name: Option<String>,
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_opt_string(deserializer).map(Option::unwrap_or_default)
}

impl ScholarshipEntry {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            description: None,
            country_code: None,
            country_name: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Copy of this entry tagged with the country it was grouped under.
    pub fn annotated(&self, code: &str, name: &str) -> Self {
        let mut out = self.clone();
        out.country_code = Some(code.to_string());
        out.country_name = Some(name.to_string());
        out
    }

    /// Entries without a URL cannot take part in diffing or persistence.
    pub fn is_identifiable(&self) -> bool {
        !self.url.is_empty()
    }
}

/// Set of identities for a list of entries (unidentifiable ones skipped).
pub fn url_set(entries: &[ScholarshipEntry]) -> HashSet<&str> {
    entries
        .iter()
        .filter(|e| e.is_identifiable())
        .map(|e| e.url.as_str())
        .collect()
}

/// Order-preserving dedup by URL, first occurrence wins. Unidentifiable
/// entries are dropped.
pub fn dedup_by_url<I>(entries: I) -> Vec<ScholarshipEntry>
where
    I: IntoIterator<Item = ScholarshipEntry>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for e in entries {
        if !e.is_identifiable() {
            continue;
        }
        if seen.insert(e.url.clone()) {
            out.push(e);
        }
    }
    out
}
