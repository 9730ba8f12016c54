// src/pipeline.rs
//! One complete run: fetch -> extract -> filter -> compare -> notify.
//!
//! Degraded stages (no pages fetched, nothing parsed) carry on with empty
//! input. Only missing required configuration stops a run, and that is
//! checked before any network traffic.

use crate::config::WatcherConfig;
use crate::country::{load_country_profiles, validate_profiles, CountryProfile};
use crate::diff::{compare_and_update, compare_and_update_multi_country};
use crate::entry::ScholarshipEntry;
use crate::extract::parse_fetch_results;
use crate::fetch::{fetch_all, HttpFetcher, PageFetcher};
use crate::metrics::{self as m, ensure_metrics_described};
use crate::notify::email::{EmailNotifier, EmailSettings};
use crate::notify::github::{GitHubNotifier, ENV_GITHUB_REPOSITORY, ENV_GITHUB_TOKEN};
use crate::notify::subscribers::load_subscribers_from_env;
use crate::notify::{ChannelReport, NotificationBatch, NotifierMux};
use crate::relevance::{
    filter_flexible, filter_multi_country, filter_strict, CountryBuckets, KeywordCatalog,
    MultiCountryOptions, StrictOptions,
};
use crate::snapshot::SnapshotStore;
use anyhow::Result;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const TOTAL_STAGES: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Fetching,
    Parsing,
    Filtering,
    Comparing,
    Notifying,
    Done,
}

impl Stage {
    fn number(self) -> u8 {
        match self {
            Stage::Init => 1,
            Stage::Fetching => 2,
            Stage::Parsing => 3,
            Stage::Filtering => 4,
            Stage::Comparing => 5,
            Stage::Notifying | Stage::Done => 6,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "validating configuration",
            Stage::Fetching => "fetching pages",
            Stage::Parsing => "parsing entries",
            Stage::Filtering => "filtering entries",
            Stage::Comparing => "comparing with previous results",
            Stage::Notifying => "sending notifications",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Required settings absent; the run never started.
    #[error("missing required configuration: {}", .0.join(", "))]
    MissingConfig(Vec<&'static str>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub multi_country: bool,
    pub pages_total: usize,
    pub pages_ok: usize,
    pub parsed: usize,
    pub filtered: usize,
    pub new: NotificationBatch,
    /// `None` when nothing needed persisting.
    pub saved: Option<bool>,
    pub channels: Vec<ChannelReport>,
}

impl RunReport {
    pub fn new_count(&self) -> usize {
        self.new.total()
    }
}

enum Filtered {
    Flat(Vec<ScholarshipEntry>),
    ByCountry(CountryBuckets),
}

pub struct Pipeline {
    config: WatcherConfig,
    profiles: Vec<CountryProfile>,
    catalog: KeywordCatalog,
    fetcher: Box<dyn PageFetcher>,
    notifiers: NotifierMux,
    store: SnapshotStore,
}

impl Pipeline {
    /// `profiles` should be the enabled ones; an empty list falls back to the
    /// built-in default.
    pub fn new(
        config: WatcherConfig,
        profiles: Vec<CountryProfile>,
        fetcher: Box<dyn PageFetcher>,
        notifiers: NotifierMux,
    ) -> Self {
        let profiles = if profiles.is_empty() {
            vec![CountryProfile::norway()]
        } else {
            profiles
        };
        let store = SnapshotStore::new(config.data_path.clone());
        Self {
            config,
            profiles,
            catalog: KeywordCatalog::default(),
            fetcher,
            notifiers,
            store,
        }
    }

    pub fn with_catalog(mut self, catalog: KeywordCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn is_multi_country(&self) -> bool {
        self.config.is_multi_country(self.profiles.len())
    }

    fn enter(&self, stage: Stage) {
        info!(target: "pipeline", %stage, "[Stage {}/{}] {}", stage.number(), TOTAL_STAGES, stage);
    }

    pub async fn run(&self) -> RunReport {
        ensure_metrics_described();
        let multi = self.is_multi_country();
        self.enter(Stage::Init);
        let codes: Vec<&str> = self.profiles.iter().map(|p| p.code.as_str()).collect();
        info!(
            target: "pipeline",
            multi_country = multi,
            countries = ?codes,
            dry_run = self.config.dry_run,
            "run starting"
        );

        self.enter(Stage::Fetching);
        let results = fetch_all(&*self.fetcher, &self.config.urls, self.config.request_delay).await;
        let pages_ok = results.iter().filter(|r| r.success).count();
        m::incr(m::PAGES_FETCHED, pages_ok as u64);
        m::incr(m::PAGES_FAILED, (results.len() - pages_ok) as u64);
        if pages_ok == 0 {
            warn!(target: "pipeline", "no pages fetched, continuing with empty input");
        }

        self.enter(Stage::Parsing);
        let parsed = parse_fetch_results(&results);
        m::incr(m::ENTRIES_PARSED, parsed.len() as u64);
        if parsed.is_empty() {
            warn!(target: "pipeline", "no entries parsed");
        }

        self.enter(Stage::Filtering);
        let filtered = if multi {
            let opts = MultiCountryOptions {
                require_topic: self.config.require_topic,
                exclude_false_positives: true,
            };
            Filtered::ByCountry(filter_multi_country(&parsed, &self.profiles, &self.catalog, opts))
        } else {
            let profile = &self.profiles[0];
            let opts = StrictOptions {
                require_topic: self.config.require_topic,
                min_score: self.config.min_score,
                ..StrictOptions::default()
            };
            let mut kept = filter_strict(&parsed, profile, &self.catalog, opts);
            if kept.is_empty() && !parsed.is_empty() && self.config.flexible_fallback {
                info!(target: "pipeline", "strict filter kept nothing, trying flexible filter");
                kept = filter_flexible(&parsed, profile, &self.catalog, false);
            }
            Filtered::Flat(kept)
        };

        self.enter(Stage::Comparing);
        let (filtered, new, saved) = match filtered {
            Filtered::ByCountry(buckets) => {
                let outcome =
                    compare_and_update_multi_country(&buckets, &self.store, self.config.merge_policy, true);
                (buckets.total(), NotificationBatch::ByCountry(outcome.new), outcome.saved)
            }
            Filtered::Flat(kept) => {
                let code = &self.profiles[0].code;
                let outcome = compare_and_update(&kept, &self.store, code, self.config.merge_policy, true);
                (kept.len(), NotificationBatch::Flat(outcome.new), outcome.saved)
            }
        };
        m::incr(m::ENTRIES_FILTERED, filtered as u64);
        m::incr(m::ENTRIES_NEW, new.total() as u64);
        if saved == Some(false) {
            m::incr(m::SNAPSHOT_SAVE_FAILURES, 1);
        }
        info!(target: "pipeline", filtered, new = new.total(), "comparison done");

        self.enter(Stage::Notifying);
        let channels = if new.is_empty() {
            info!(target: "pipeline", "no new scholarships to notify about");
            Vec::new()
        } else if self.notifiers.is_empty() {
            warn!(target: "pipeline", "new scholarships found but no notification channel configured");
            Vec::new()
        } else {
            self.notifiers.notify(&new).await
        };
        m::incr(m::NOTIFY_FAILURES, channels.iter().filter(|c| !c.is_ok()).count() as u64);

        self.enter(Stage::Done);
        m::mark_run_complete();
        let report = RunReport {
            multi_country: multi,
            pages_total: results.len(),
            pages_ok,
            parsed: parsed.len(),
            filtered,
            new,
            saved,
            channels,
        };
        info!(
            target: "pipeline",
            pages = report.pages_total,
            pages_ok = report.pages_ok,
            parsed = report.parsed,
            filtered = report.filtered,
            new = report.new_count(),
            "run complete"
        );
        report
    }
}

/// Required keys that are unset (blank counts as unset). GitHub
/// credentials are only required outside dry-run.
pub fn missing_required<F>(dry_run: bool, lookup: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    if dry_run {
        return Vec::new();
    }
    [ENV_GITHUB_TOKEN, ENV_GITHUB_REPOSITORY]
        .into_iter()
        .filter(|k| lookup(k).map_or(true, |v| v.trim().is_empty()))
        .collect()
}

/// Assemble a pipeline from the process environment: settings, country
/// profiles, HTTP fetcher and every configured notification channel.
pub async fn pipeline_from_env(config: WatcherConfig) -> Result<Pipeline> {
    let missing = missing_required(config.dry_run, |k| std::env::var(k).ok());
    if !missing.is_empty() {
        return Err(PipelineError::MissingConfig(missing).into());
    }

    let profiles = load_country_profiles(true);
    let warnings = validate_profiles(&profiles);
    if !warnings.is_empty() {
        warn!(target: "pipeline", count = warnings.len(), "country configuration has warnings");
    }

    let fetcher = HttpFetcher::new()?
        .with_timeout(config.request_timeout)
        .with_retries(config.max_retries);

    let mut notifiers = NotifierMux::new();
    match GitHubNotifier::from_env()? {
        Some(gh) => {
            let gh = gh.with_dry_run(config.dry_run);
            if !config.dry_run && !gh.check_connection().await {
                warn!(target: "pipeline", "GitHub connection check failed, issue creation may fail");
            }
            notifiers.push(Box::new(gh));
        }
        None => info!(target: "pipeline", "GitHub not configured (dry run), issue channel disabled"),
    }
    match EmailSettings::from_env() {
        Some(settings) => {
            let email = EmailNotifier::new(settings)
                .with_subscribers(load_subscribers_from_env())
                .with_dry_run(config.dry_run);
            if !config.dry_run && !email.check_connection().await {
                warn!(target: "pipeline", "SMTP connection check failed, email may fail");
            }
            notifiers.push(Box::new(email));
        }
        None => debug!(target: "pipeline", "email not configured, skipping channel"),
    }

    Ok(Pipeline::new(config, profiles, Box::new(fetcher), notifiers))
}
