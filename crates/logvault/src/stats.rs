//! Pipeline statistics.
//!
//! A single `PipelineStats` aggregate is constructed with the pipeline and
//! handed to each component that records into it. All counters are atomics,
//! so recording never takes a lock and never blocks the ingest path.
//! Integrity failures and sink failures are counted here so they stay
//! observable without a registered callback.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::entry::{Category, Level, CATEGORY_COUNT, LEVEL_COUNT};

/// Atomic counter aggregate shared across the pipeline.
#[derive(Debug, Default)]
pub struct PipelineStats {
    total_entries: AtomicU64,
    by_level: [AtomicU64; LEVEL_COUNT],
    by_category: [AtomicU64; CATEGORY_COUNT],
    dropped_below_level: AtomicU64,
    queue_evictions: AtomicU64,
    batches_committed: AtomicU64,
    entries_committed: AtomicU64,
    sink_failures: AtomicU64,
    integrity_failures: AtomicU64,
    raw_bytes: AtomicU64,
    compressed_bytes: AtomicU64,
}

impl PipelineStats {
    #[must_use]
    pub fn new() -> PipelineStats {
        PipelineStats::default()
    }

    pub fn record_entry(&self, level: Level, category: Category) {
        self.total_entries.fetch_add(1, Ordering::Relaxed);
        self.by_level[level.index()].fetch_add(1, Ordering::Relaxed);
        self.by_category[category.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_below_level.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_eviction(&self) {
        self.queue_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self, entries: usize) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
        self.entries_committed
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stored_bytes(&self, raw: u64, compressed: u64) {
        self.raw_bytes.fetch_add(raw, Ordering::Relaxed);
        self.compressed_bytes
            .fetch_add(compressed, Ordering::Relaxed);
    }

    #[must_use]
    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn integrity_failures(&self) -> u64 {
        self.integrity_failures.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let by_level = Level::all()
            .iter()
            .map(|l| {
                (
                    l.as_ref().to_string(),
                    self.by_level[l.index()].load(Ordering::Relaxed),
                )
            })
            .collect();
        let by_category = Category::all()
            .iter()
            .map(|c| {
                (
                    c.as_ref().to_string(),
                    self.by_category[c.index()].load(Ordering::Relaxed),
                )
            })
            .collect();

        StatsSnapshot {
            total_entries: self.total_entries.load(Ordering::Relaxed),
            by_level,
            by_category,
            dropped_below_level: self.dropped_below_level.load(Ordering::Relaxed),
            queue_evictions: self.queue_evictions.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            entries_committed: self.entries_committed.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            raw_bytes: self.raw_bytes.load(Ordering::Relaxed),
            compressed_bytes: self.compressed_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Serializable point-in-time view of [`PipelineStats`].
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_entries: u64,
    pub by_level: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub dropped_below_level: u64,
    pub queue_evictions: u64,
    pub batches_committed: u64,
    pub entries_committed: u64,
    pub sink_failures: u64,
    pub integrity_failures: u64,
    pub raw_bytes: u64,
    pub compressed_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_entry_counts_level_and_category() {
        let stats = PipelineStats::new();
        stats.record_entry(Level::Fatal, Category::Security);
        stats.record_entry(Level::Fatal, Category::Security);
        stats.record_entry(Level::Info, Category::General);

        let snap = stats.snapshot();
        assert_eq!(snap.total_entries, 3);
        assert_eq!(snap.by_level["FATAL"], 2);
        assert_eq!(snap.by_level["INFO"], 1);
        assert_eq!(snap.by_category["security"], 2);
        assert_eq!(snap.by_category["general"], 1);
    }

    #[test]
    fn test_failure_counters_readable_directly() {
        let stats = PipelineStats::new();
        stats.record_sink_failure();
        stats.record_integrity_failure();
        stats.record_integrity_failure();

        assert_eq!(stats.sink_failures(), 1);
        assert_eq!(stats.integrity_failures(), 2);
    }

    #[test]
    fn test_byte_counters_accumulate() {
        let stats = PipelineStats::new();
        stats.record_stored_bytes(100, 40);
        stats.record_stored_bytes(50, 50);

        let snap = stats.snapshot();
        assert_eq!(snap.raw_bytes, 150);
        assert_eq!(snap.compressed_bytes, 90);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = PipelineStats::new();
        stats.record_entry(Level::Debug, Category::System);
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"total_entries\":1"));
    }
}
