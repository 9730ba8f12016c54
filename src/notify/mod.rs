// src/notify/mod.rs
//! Notification channels for newly detected entries. Every channel is
//! best-effort: a failure is reported back to the caller, never raised.

pub mod email;
pub mod format;
pub mod github;
pub mod subscribers;

use crate::entry::ScholarshipEntry;
use crate::relevance::CountryBuckets;
use anyhow::Result;
use tracing::{info, warn};

/// The new entries of one run, either flat (single-country mode) or grouped
/// by country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationBatch {
    Flat(Vec<ScholarshipEntry>),
    ByCountry(CountryBuckets),
}

impl NotificationBatch {
    pub fn total(&self) -> usize {
        match self {
            NotificationBatch::Flat(v) => v.len(),
            NotificationBatch::ByCountry(b) => b.total(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Countries that actually have entries (0 for a flat batch).
    pub fn country_count(&self) -> usize {
        match self {
            NotificationBatch::Flat(_) => 0,
            NotificationBatch::ByCountry(b) => b.non_empty().count(),
        }
    }

    /// Restrict a grouped batch to `codes`. Flat batches carry no country
    /// and come back empty.
    pub fn for_countries(&self, codes: &[&str]) -> NotificationBatch {
        match self {
            NotificationBatch::Flat(_) => NotificationBatch::Flat(Vec::new()),
            NotificationBatch::ByCountry(b) => NotificationBatch::ByCountry(
                b.iter()
                    .filter(|bucket| codes.iter().any(|c| c.eq_ignore_ascii_case(&bucket.code)))
                    .cloned()
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Delivered; `reference` is e.g. the created issue URL.
    Sent { reference: Option<String> },
    DryRun,
    Skipped(String),
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, batch: &NotificationBatch) -> Result<NotifyOutcome>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: &'static str,
    /// Error chain rendered as text on failure.
    pub result: std::result::Result<NotifyOutcome, String>,
}

impl ChannelReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fans one batch out to every configured channel, in order.
#[derive(Default)]
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Box<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn push(&mut self, channel: Box<dyn Notifier>) {
        self.channels.push(channel);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub async fn notify(&self, batch: &NotificationBatch) -> Vec<ChannelReport> {
        let mut out = Vec::with_capacity(self.channels.len());
        for ch in &self.channels {
            let result = match ch.notify(batch).await {
                Ok(outcome) => {
                    info!(target: "notify", channel = ch.name(), ?outcome, "channel done");
                    Ok(outcome)
                }
                Err(e) => {
                    warn!(target: "notify", channel = ch.name(), "channel failed: {e:#}");
                    Err(format!("{e:#}"))
                }
            };
            out.push(ChannelReport {
                channel: ch.name(),
                result,
            });
        }
        out
    }
}
