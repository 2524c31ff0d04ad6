//! Per-run synchronization counters
//!
//! Each (peer, action) task fills its own `SyncReport`; the scheduler merges
//! completed reports into the pass aggregate. Counters are never shared
//! mutably across tasks.

use pod_common::DocRef;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Counters for one destination collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub invalid_signatures: u64,
    pub invalid_times: u64,
    pub invalid_formats: u64,
    pub access_denied: u64,
}

impl Counters {
    /// Applied document count. Invalid counts are reported separately.
    pub fn total(&self) -> u64 {
        self.inserts + self.updates + self.deletes
    }
}

/// Aggregated result of a sync run, keyed by (index, type).
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    per_collection: HashMap<DocRef, Counters>,
}

impl SyncReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, coll: &DocRef) -> &mut Counters {
        self.per_collection.entry(coll.clone()).or_default()
    }

    pub fn record_insert(&mut self, coll: &DocRef) {
        self.entry(coll).inserts += 1;
    }

    pub fn record_update(&mut self, coll: &DocRef) {
        self.entry(coll).updates += 1;
    }

    pub fn record_delete(&mut self, coll: &DocRef) {
        self.entry(coll).deletes += 1;
    }

    pub fn record_invalid_signature(&mut self, coll: &DocRef) {
        self.entry(coll).invalid_signatures += 1;
    }

    pub fn record_invalid_time(&mut self, coll: &DocRef) {
        self.entry(coll).invalid_times += 1;
    }

    pub fn record_invalid_format(&mut self, coll: &DocRef) {
        self.entry(coll).invalid_formats += 1;
    }

    pub fn record_access_denied(&mut self, coll: &DocRef) {
        self.entry(coll).access_denied += 1;
    }

    pub fn counters(&self, coll: &DocRef) -> Counters {
        self.per_collection.get(coll).copied().unwrap_or_default()
    }

    /// Applied documents across all collections.
    pub fn total(&self) -> u64 {
        self.per_collection.values().map(Counters::total).sum()
    }

    pub fn invalid_total(&self) -> u64 {
        self.per_collection
            .values()
            .map(|c| c.invalid_signatures + c.invalid_times + c.invalid_formats + c.access_denied)
            .sum()
    }

    /// Fold another task's report into this one.
    pub fn merge(&mut self, other: SyncReport) {
        for (coll, counters) in other.per_collection {
            let entry = self.per_collection.entry(coll).or_default();
            entry.inserts += counters.inserts;
            entry.updates += counters.updates;
            entry.deletes += counters.deletes;
            entry.invalid_signatures += counters.invalid_signatures;
            entry.invalid_times += counters.invalid_times;
            entry.invalid_formats += counters.invalid_formats;
            entry.access_denied += counters.access_denied;
        }
    }

    /// One-line-per-collection human summary for logging.
    pub fn summary(&self) -> String {
        if self.per_collection.is_empty() {
            return "nothing to sync".to_string();
        }

        let mut collections: Vec<_> = self.per_collection.iter().collect();
        collections.sort_by_key(|(coll, _)| (coll.index.clone(), coll.doc_type.clone()));

        let mut out = String::new();
        for (coll, c) in collections {
            let _ = writeln!(
                out,
                "{}: {} applied ({} inserts, {} updates, {} deletes), {} invalid",
                coll,
                c.total(),
                c.inserts,
                c.updates,
                c.deletes,
                c.invalid_signatures + c.invalid_times + c.invalid_formats + c.access_denied,
            );
        }
        out
    }
}
