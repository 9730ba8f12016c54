// src/diff.rs
//! Identity-based change detection against the stored snapshot, plus the
//! merge that decides what gets written back.

use crate::entry::{dedup_by_url, url_set, ScholarshipEntry};
use crate::relevance::CountryBuckets;
use crate::snapshot::SnapshotStore;
use anyhow::anyhow;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, warn};

pub const ENV_MERGE_POLICY: &str = "MERGE_POLICY";

/// What happens to previously stored entries that were not seen this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Keep them after the current entries; an empty fetch never erases history.
    ///
    /// Nothing is ever evicted under this policy, so the snapshot grows by
    /// every URL ever seen. Run once with `Replace` to prune it back to the
    /// listings currently online.
    #[default]
    Retain,
    /// Persist only what was observed this run.
    Replace,
}

impl FromStr for MergePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" | "keep" | "merge" => Ok(MergePolicy::Retain),
            "replace" | "overwrite" => Ok(MergePolicy::Replace),
            other => Err(anyhow!("unknown merge policy: {other}")),
        }
    }
}

/// Entries of `current` whose URL is not in `previous`. Unidentifiable
/// entries are never new.
pub fn find_new(current: &[ScholarshipEntry], previous: &[ScholarshipEntry]) -> Vec<ScholarshipEntry> {
    let prev = url_set(previous);
    dedup_by_url(
        current
            .iter()
            .filter(|e| e.is_identifiable() && !prev.contains(e.url.as_str()))
            .cloned(),
    )
}

/// Entries of `previous` whose URL is not in `current`.
pub fn find_removed(current: &[ScholarshipEntry], previous: &[ScholarshipEntry]) -> Vec<ScholarshipEntry> {
    let cur = url_set(current);
    dedup_by_url(
        previous
            .iter()
            .filter(|e| e.is_identifiable() && !cur.contains(e.url.as_str()))
            .cloned(),
    )
}

pub fn unchanged_count(current: &[ScholarshipEntry], previous: &[ScholarshipEntry]) -> usize {
    let prev = url_set(previous);
    url_set(current).iter().filter(|u| prev.contains(*u)).count()
}

/// The list to persist: deduped current entries first, then (under
/// `Retain`) previous entries that did not reappear, in their old order.
pub fn merge_entries(
    current: &[ScholarshipEntry],
    previous: &[ScholarshipEntry],
    policy: MergePolicy,
) -> Vec<ScholarshipEntry> {
    match policy {
        MergePolicy::Replace => dedup_by_url(current.iter().cloned()),
        MergePolicy::Retain => dedup_by_url(current.iter().chain(previous.iter()).cloned()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComparisonSummary {
    pub current: usize,
    pub previous: usize,
    pub new: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl ComparisonSummary {
    pub fn between(current: &[ScholarshipEntry], previous: &[ScholarshipEntry]) -> Self {
        Self {
            current: url_set(current).len(),
            previous: url_set(previous).len(),
            new: find_new(current, previous).len(),
            removed: find_removed(current, previous).len(),
            unchanged: unchanged_count(current, previous),
        }
    }

    fn add(&mut self, other: &ComparisonSummary) {
        self.current += other.current;
        self.previous += other.previous;
        self.new += other.new;
        self.removed += other.removed;
        self.unchanged += other.unchanged;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiCountrySummary {
    pub per_country: BTreeMap<String, ComparisonSummary>,
    pub totals: ComparisonSummary,
}

/// Single-country result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonOutcome {
    pub new: Vec<ScholarshipEntry>,
    pub persisted: Vec<ScholarshipEntry>,
    pub summary: ComparisonSummary,
    /// `None` when no write was attempted.
    pub saved: Option<bool>,
}

/// Multi-country result. `new` holds one bucket per country in the
/// comparison universe, in current order then previously-stored order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiComparisonOutcome {
    pub new: CountryBuckets,
    pub persisted: BTreeMap<String, Vec<ScholarshipEntry>>,
    pub summary: MultiCountrySummary,
    pub saved: Option<bool>,
}

/// Single-country comparison. Newness is judged against every stored
/// bucket; the merged list is written to `code`'s bucket and the other
/// buckets are kept as they were.
pub fn compare_and_update(
    current: &[ScholarshipEntry],
    store: &SnapshotStore,
    code: &str,
    policy: MergePolicy,
    save: bool,
) -> ComparisonOutcome {
    let snapshot = store.load();
    let previous_all = snapshot.flat();

    let new = find_new(current, &previous_all);
    let summary = ComparisonSummary::between(current, &previous_all);
    let persisted = merge_entries(current, snapshot.bucket(code), policy);

    info!(
        target: "diff",
        country = code,
        current = summary.current,
        previous = summary.previous,
        new = summary.new,
        removed = summary.removed,
        unchanged = summary.unchanged,
        "comparison"
    );

    let saved = if save && !persisted.is_empty() {
        let mut by_country = snapshot.by_country.clone();
        by_country.insert(code.to_string(), persisted.clone());
        Some(store.save_by_country(&by_country))
    } else {
        None
    };
    if saved == Some(false) {
        warn!(target: "diff", "state not persisted; the same entries may be reported again next run");
    }

    ComparisonOutcome {
        new,
        persisted,
        summary,
        saved,
    }
}

/// Multi-country comparison over the union of current and stored codes. A
/// country that vanished from the current run still shows up with its
/// removals. Empty merged buckets are not persisted.
pub fn compare_and_update_multi_country(
    current: &CountryBuckets,
    store: &SnapshotStore,
    policy: MergePolicy,
    save: bool,
) -> MultiComparisonOutcome {
    let snapshot = store.load();

    // universe: current order first, then stored-only codes
    let mut universe: Vec<(String, String)> = current
        .iter()
        .map(|b| (b.code.clone(), b.name.clone()))
        .collect();
    for (code, list) in &snapshot.by_country {
        if current.get(code).is_none() {
            let name = list
                .iter()
                .find_map(|e| e.country_name.clone())
                .unwrap_or_else(|| code.clone());
            universe.push((code.clone(), name));
        }
    }

    let mut new = CountryBuckets::new();
    let mut persisted = BTreeMap::new();
    let mut summary = MultiCountrySummary::default();

    for (code, name) in &universe {
        let cur = current.entries(code);
        let prev = snapshot.bucket(code);

        let bucket_new = find_new(cur, prev);
        let bucket_summary = ComparisonSummary::between(cur, prev);
        info!(
            target: "diff",
            country = %code,
            current = bucket_summary.current,
            previous = bucket_summary.previous,
            new = bucket_summary.new,
            removed = bucket_summary.removed,
            "country comparison"
        );

        let bucket = new.ensure(code, name);
        bucket.entries = bucket_new;

        let merged = merge_entries(cur, prev, policy);
        if !merged.is_empty() {
            persisted.insert(code.clone(), merged);
        }

        summary.totals.add(&bucket_summary);
        summary.per_country.insert(code.clone(), bucket_summary);
    }

    info!(
        target: "diff",
        countries = universe.len(),
        new = summary.totals.new,
        removed = summary.totals.removed,
        "multi-country comparison"
    );

    let total_persisted: usize = persisted.values().map(Vec::len).sum();
    let saved = if save && total_persisted > 0 {
        Some(store.save_by_country(&persisted))
    } else {
        None
    };
    if saved == Some(false) {
        warn!(target: "diff", "state not persisted; the same entries may be reported again next run");
    }

    MultiComparisonOutcome {
        new,
        persisted,
        summary,
        saved,
    }
}
