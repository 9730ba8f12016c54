// src/config.rs
//! Run settings read from the environment (after `.env` is loaded by the
//! binary). Unparseable values fall back to defaults with a warning.

use crate::diff::{MergePolicy, ENV_MERGE_POLICY};
use crate::fetch::{
    default_urls, parse_url_list, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_DELAY_MS, DEFAULT_TIMEOUT_SECS,
};
use crate::snapshot::{DEFAULT_RESULTS_PATH, ENV_DATA_PATH};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

// --- env names ---
pub const ENV_SCHOLARSHIP_URLS: &str = "SCHOLARSHIP_URLS";
pub const ENV_DRY_RUN: &str = "DRY_RUN";
pub const ENV_MULTI_COUNTRY_MODE: &str = "MULTI_COUNTRY_MODE";
pub const ENV_REQUEST_DELAY_MS: &str = "REQUEST_DELAY_MS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
pub const ENV_FETCH_MAX_RETRIES: &str = "FETCH_MAX_RETRIES";
pub const ENV_MIN_RELEVANCE_SCORE: &str = "MIN_RELEVANCE_SCORE";
pub const ENV_FLEXIBLE_FALLBACK: &str = "FLEXIBLE_FALLBACK";
pub const ENV_REQUIRE_TOPIC: &str = "REQUIRE_TOPIC";
pub const ENV_METRICS_TEXTFILE: &str = "METRICS_TEXTFILE";

#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    pub urls: Vec<String>,
    pub data_path: PathBuf,
    pub dry_run: bool,
    /// `None` = decide from the number of enabled countries.
    pub multi_country: Option<bool>,
    pub merge_policy: MergePolicy,
    pub request_delay: Duration,
    pub request_timeout: Duration,
    pub max_retries: u8,
    pub min_score: u32,
    /// Retry with the OR filter when the strict filter keeps nothing.
    pub flexible_fallback: bool,
    pub require_topic: bool,
    pub metrics_textfile: Option<PathBuf>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            urls: default_urls(),
            data_path: PathBuf::from(DEFAULT_RESULTS_PATH),
            dry_run: false,
            multi_country: None,
            merge_policy: MergePolicy::default(),
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            min_score: 0,
            flexible_fallback: true,
            require_topic: true,
            metrics_textfile: None,
        }
    }
}

/// `true/1/yes/on` and `false/0/no/off`, case-insensitive; anything else is `None`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl WatcherConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(raw) = get(ENV_SCHOLARSHIP_URLS) {
            let urls = parse_url_list(&raw);
            if urls.is_empty() {
                warn!(target: "config", "{ENV_SCHOLARSHIP_URLS} is set but empty, using defaults");
            } else {
                cfg.urls = urls;
            }
        }
        if let Some(p) = get(ENV_DATA_PATH) {
            cfg.data_path = PathBuf::from(p);
        }
        if let Some(raw) = get(ENV_DRY_RUN) {
            cfg.dry_run = parse_bool(&raw).unwrap_or(false);
        }
        if let Some(raw) = get(ENV_MULTI_COUNTRY_MODE) {
            cfg.multi_country = parse_bool(&raw);
            if cfg.multi_country.is_none() {
                warn!(target: "config", value = %raw, "{ENV_MULTI_COUNTRY_MODE} not a boolean, auto-detecting");
            }
        }
        if let Some(raw) = get(ENV_MERGE_POLICY) {
            match raw.parse::<MergePolicy>() {
                Ok(p) => cfg.merge_policy = p,
                Err(e) => warn!(target: "config", "{e}, keeping {:?}", cfg.merge_policy),
            }
        }
        if let Some(ms) = get(ENV_REQUEST_DELAY_MS).and_then(|v| parse_num::<u64>(ENV_REQUEST_DELAY_MS, &v)) {
            cfg.request_delay = Duration::from_millis(ms);
        }
        if let Some(s) = get(ENV_REQUEST_TIMEOUT_SECS).and_then(|v| parse_num::<u64>(ENV_REQUEST_TIMEOUT_SECS, &v)) {
            cfg.request_timeout = Duration::from_secs(s.max(1));
        }
        if let Some(n) = get(ENV_FETCH_MAX_RETRIES).and_then(|v| parse_num::<u8>(ENV_FETCH_MAX_RETRIES, &v)) {
            cfg.max_retries = n;
        }
        if let Some(n) = get(ENV_MIN_RELEVANCE_SCORE).and_then(|v| parse_num::<u32>(ENV_MIN_RELEVANCE_SCORE, &v)) {
            cfg.min_score = n.min(100);
        }
        if let Some(b) = get(ENV_FLEXIBLE_FALLBACK).and_then(|v| parse_bool(&v)) {
            cfg.flexible_fallback = b;
        }
        if let Some(b) = get(ENV_REQUIRE_TOPIC).and_then(|v| parse_bool(&v)) {
            cfg.require_topic = b;
        }
        if let Some(p) = get(ENV_METRICS_TEXTFILE) {
            cfg.metrics_textfile = Some(PathBuf::from(p));
        }
        cfg
    }

    /// Explicit setting wins; otherwise multi-country when more than one
    /// country is enabled.
    pub fn is_multi_country(&self, enabled_countries: usize) -> bool {
        self.multi_country.unwrap_or(enabled_countries > 1)
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target: "config", key, value = raw, "not a number, using default");
            None
        }
    }
}
