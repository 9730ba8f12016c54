// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod country;
pub mod diff;
pub mod entry;
pub mod extract;
pub mod fetch;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod relevance;
pub mod snapshot;

// ---- Re-exports for stable public API ----
pub use crate::config::WatcherConfig;
pub use crate::country::CountryProfile;
pub use crate::entry::ScholarshipEntry;
pub use crate::notify::{NotificationBatch, Notifier, NotifierMux};
pub use crate::pipeline::{Pipeline, PipelineError, RunReport};
pub use crate::relevance::{CountryBucket, CountryBuckets};
