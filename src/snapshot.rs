// src/snapshot.rs
//! Durable record of previously seen entries.
//!
//! Reads accept the current per-country layout and both legacy layouts (a
//! bare array, or `{ "scholarships": [...] }`), which are attributed to the
//! default country in memory. Writes always use the per-country layout and
//! go through a temp file in the target directory plus an atomic rename.

use crate::country::DEFAULT_COUNTRY_CODE;
use crate::entry::{dedup_by_url, ScholarshipEntry};
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

pub const ENV_DATA_PATH: &str = "DATA_PATH";
pub const DEFAULT_RESULTS_PATH: &str = "data/last_results.json";

/* ---- On-disk shapes ---- */

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LenientEntry {
    Entry(ScholarshipEntry),
    Junk(IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredSnapshot {
    ByCountry {
        scholarships_by_country: BTreeMap<String, Vec<LenientEntry>>,
    },
    LegacyWrapped {
        scholarships: Vec<LenientEntry>,
    },
    LegacyFlat(Vec<LenientEntry>),
}

#[derive(Debug, Serialize)]
struct SnapshotFile<'a> {
    last_updated: String,
    total_count: usize,
    country_counts: BTreeMap<&'a str, usize>,
    scholarships_by_country: &'a BTreeMap<String, Vec<ScholarshipEntry>>,
}

/// Entries with a URL, each URL once (first occurrence wins).
fn keep_valid(list: Vec<LenientEntry>) -> Vec<ScholarshipEntry> {
    dedup_by_url(list.into_iter().filter_map(|e| match e {
        LenientEntry::Entry(s) => Some(s),
        LenientEntry::Junk(_) => None,
    }))
}

/* ---- In-memory view ---- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotFormat {
    /// No file yet (first run).
    #[default]
    Missing,
    /// File present but unreadable or not a known shape.
    Unreadable,
    Legacy,
    ByCountry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub by_country: BTreeMap<String, Vec<ScholarshipEntry>>,
    pub format: SnapshotFormat,
}

impl Snapshot {
    pub fn bucket(&self, code: &str) -> &[ScholarshipEntry] {
        self.by_country.get(code).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.by_country.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// All buckets concatenated in code order, deduped by URL.
    pub fn flat(&self) -> Vec<ScholarshipEntry> {
        dedup_by_url(self.by_country.values().flatten().cloned())
    }

    fn from_stored(stored: StoredSnapshot) -> Self {
        match stored {
            StoredSnapshot::ByCountry {
                scholarships_by_country,
            } => Self {
                by_country: scholarships_by_country
                    .into_iter()
                    .map(|(code, list)| (code, keep_valid(list)))
                    .collect(),
                format: SnapshotFormat::ByCountry,
            },
            StoredSnapshot::LegacyWrapped { scholarships } | StoredSnapshot::LegacyFlat(scholarships) => {
                let mut by_country = BTreeMap::new();
                by_country.insert(DEFAULT_COUNTRY_CODE.to_string(), keep_valid(scholarships));
                Self {
                    by_country,
                    format: SnapshotFormat::Legacy,
                }
            }
        }
    }
}

/* ---- Store ---- */

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$DATA_PATH` or `data/last_results.json`.
    pub fn from_env() -> Self {
        let path = std::env::var(ENV_DATA_PATH)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RESULTS_PATH.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: missing, unreadable or malformed files load as empty.
    pub fn load(&self) -> Snapshot {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(target: "snapshot", path = %self.path.display(), "no previous snapshot (first run)");
                return Snapshot::default();
            }
            Err(e) => {
                warn!(target: "snapshot", path = %self.path.display(), "read failed: {e}");
                return Snapshot {
                    format: SnapshotFormat::Unreadable,
                    ..Snapshot::default()
                };
            }
        };

        match serde_json::from_str::<StoredSnapshot>(&raw) {
            Ok(stored) => {
                let snap = Snapshot::from_stored(stored);
                info!(
                    target: "snapshot",
                    path = %self.path.display(),
                    format = ?snap.format,
                    countries = snap.by_country.len(),
                    total = snap.total(),
                    "loaded previous snapshot"
                );
                snap
            }
            Err(e) => {
                warn!(target: "snapshot", path = %self.path.display(), "unrecognised snapshot, treating as empty: {e}");
                Snapshot {
                    format: SnapshotFormat::Unreadable,
                    ..Snapshot::default()
                }
            }
        }
    }

    /// Single-country view of the stored state.
    pub fn load_flat(&self) -> Vec<ScholarshipEntry> {
        self.load().flat()
    }

    /// Persist per-country state. Returns `false` (and logs) on failure; the
    /// previous file is left as it was.
    pub fn save_by_country(&self, by_country: &BTreeMap<String, Vec<ScholarshipEntry>>) -> bool {
        match self.try_save(by_country) {
            Ok(()) => {
                info!(
                    target: "snapshot",
                    path = %self.path.display(),
                    total = by_country.values().map(Vec::len).sum::<usize>(),
                    "snapshot saved"
                );
                true
            }
            Err(e) => {
                error!(target: "snapshot", path = %self.path.display(), "snapshot save failed: {e:#}");
                false
            }
        }
    }

    /// Persist a flat list under one country code.
    pub fn save_flat(&self, code: &str, entries: &[ScholarshipEntry]) -> bool {
        let mut by_country = BTreeMap::new();
        by_country.insert(code.to_string(), entries.to_vec());
        self.save_by_country(&by_country)
    }

    fn try_save(&self, by_country: &BTreeMap<String, Vec<ScholarshipEntry>>) -> Result<()> {
        let file = SnapshotFile {
            last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            total_count: by_country.values().map(Vec::len).sum(),
            country_counts: by_country
                .iter()
                .map(|(code, list)| (code.as_str(), list.len()))
                .collect(),
            scholarships_by_country: by_country,
        };
        let json = serde_json::to_string_pretty(&file).context("serialize snapshot")?;
        write_atomic(&self.path, json.as_bytes())
    }
}

/// Write to a temp file beside `path`, fsync, then rename over `path`. The
/// temp file is removed on any failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(bytes).context("write temp file")?;
    tmp.as_file().sync_all().context("sync temp file")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("rename temp file over {}", path.display()))?;
    Ok(())
}
