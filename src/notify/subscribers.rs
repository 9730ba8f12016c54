// src/notify/subscribers.rs
//! Read-only subscriber list used to route per-country email digests.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

pub const ENV_SUBSCRIBERS_PATH: &str = "SUBSCRIBERS_PATH";
pub const DEFAULT_SUBSCRIBERS_PATH: &str = "data/subscribers.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    /// Lowercased.
    pub email: String,
    /// Uppercased country codes.
    pub countries: BTreeSet<String>,
    pub created_at: Option<String>,
    pub active: bool,
}

impl Subscriber {
    pub fn new<I>(email: &str, countries: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            email: email.trim().to_lowercase(),
            countries: countries
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .collect(),
            created_at: None,
            active: true,
        }
    }

    pub fn wants_any<'a, I>(&self, codes: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        codes
            .into_iter()
            .any(|c| self.countries.contains(&c.to_ascii_uppercase()))
    }
}

/// Countries may be a list, a JSON-encoded list, or a comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CountriesField {
    List(Vec<String>),
    Text(String),
}

impl CountriesField {
    fn into_codes(self) -> Vec<String> {
        match self {
            CountriesField::List(v) => v,
            CountriesField::Text(s) => serde_json::from_str::<Vec<String>>(&s).unwrap_or_else(|_| {
                s.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSubscriber {
    #[serde(default)]
    email: String,
    #[serde(default)]
    countries: Option<CountriesField>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// `local@domain.tld`-ish; exactly one `@`, non-empty parts, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        _ => false,
    }
}

pub fn parse_subscribers(s: &str, active_only: bool) -> Vec<Subscriber> {
    let doc: Value = match serde_json::from_str(s) {
        Ok(v) => v,
        Err(e) => {
            error!(target: "subscribers", "invalid subscribers JSON: {e}");
            return Vec::new();
        }
    };
    let Some(list) = doc.get("subscribers").and_then(Value::as_array) else {
        error!(target: "subscribers", "subscribers file has no `subscribers` list");
        return Vec::new();
    };

    let mut out = Vec::new();
    for raw in list {
        let parsed: RawSubscriber = match serde_json::from_value(raw.clone()) {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "subscribers", "skipping subscriber entry: {e}");
                continue;
            }
        };
        let email = parsed.email.trim();
        if !is_valid_email(email) {
            warn!(target: "subscribers", "skipping subscriber with invalid email");
            continue;
        }
        let codes = parsed.countries.map(CountriesField::into_codes).unwrap_or_default();
        let mut sub = Subscriber::new(email, codes);
        if sub.countries.is_empty() {
            warn!(target: "subscribers", email = %sub.email, "subscriber has no countries, skipping");
            continue;
        }
        sub.created_at = parsed.created_at;
        sub.active = parsed.active;
        if active_only && !sub.active {
            continue;
        }
        out.push(sub);
    }
    out
}

/// Missing or broken files yield an empty list.
pub fn load_subscribers(path: &Path, active_only: bool) -> Vec<Subscriber> {
    if !path.exists() {
        info!(target: "subscribers", path = %path.display(), "no subscribers file");
        return Vec::new();
    }
    match fs::read_to_string(path) {
        Ok(s) => {
            let subs = parse_subscribers(&s, active_only);
            info!(target: "subscribers", count = subs.len(), "subscribers loaded");
            subs
        }
        Err(e) => {
            error!(target: "subscribers", path = %path.display(), "read failed: {e}");
            Vec::new()
        }
    }
}

pub fn load_subscribers_from_env() -> Vec<Subscriber> {
    let path = std::env::var(ENV_SUBSCRIBERS_PATH).unwrap_or_else(|_| DEFAULT_SUBSCRIBERS_PATH.to_string());
    load_subscribers(Path::new(&path), true)
}

pub fn group_by_country(subscribers: &[Subscriber]) -> BTreeMap<String, Vec<&Subscriber>> {
    let mut out: BTreeMap<String, Vec<&Subscriber>> = BTreeMap::new();
    for s in subscribers {
        for c in &s.countries {
            out.entry(c.clone()).or_default().push(s);
        }
    }
    out
}

pub fn subscribers_for_countries<'a>(subscribers: &'a [Subscriber], codes: &[&str]) -> Vec<&'a Subscriber> {
    subscribers
        .iter()
        .filter(|s| s.wants_any(codes.iter().copied()))
        .collect()
}
