//! Entry store and admission queue.
//!
//! The store is the owner of every ingested entry for the lifetime of the
//! process: a thread-safe map keyed by entry id, plus a FIFO admission
//! queue of entries awaiting batching. Batches hold `Arc` references into
//! the same allocations, so draining the queue never copies entry data and
//! never removes anything from the map.
//!
//! # Backpressure
//!
//! The admission queue is bounded. When it reaches capacity the oldest
//! queued entry is evicted with a warning, keeping memory bounded under
//! sustained backlog. Eviction only drops the entry from the batching
//! queue; the map still holds it, so lookups, queries and integrity checks
//! keep working.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use hashbrown::HashMap;
use tracing::warn;

use crate::entry::LogEntry;
use crate::stats::PipelineStats;

/// Thread-safe entry map plus FIFO admission queue.
#[derive(Debug)]
pub struct EntryStore {
    entries: RwLock<HashMap<String, Arc<LogEntry>>>,
    queue: Mutex<VecDeque<Arc<LogEntry>>>,
    max_queue_entries: usize,
    stats: Arc<PipelineStats>,
}

impl EntryStore {
    #[must_use]
    pub fn new(max_queue_entries: usize, stats: Arc<PipelineStats>) -> EntryStore {
        EntryStore {
            entries: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            max_queue_entries,
            stats,
        }
    }

    /// Insert an entry into the map and append it to the admission queue.
    ///
    /// Map insert, queue append and counter updates all happen inside this
    /// one call, so concurrent ingestions cannot observe an entry that is
    /// stored but not queued. Returns the queue depth after the append,
    /// which the caller uses for threshold-triggered flushes.
    #[allow(clippy::expect_used)]
    pub fn insert(&self, entry: Arc<LogEntry>) -> usize {
        self.stats.record_entry(entry.level, entry.category);

        {
            let mut entries = self.entries.write().expect("lock poisoned");
            entries.insert(entry.id.clone(), Arc::clone(&entry));
        }

        let mut queue = self.queue.lock().expect("lock poisoned");
        if queue.len() >= self.max_queue_entries {
            // Evict oldest from the batching queue only; the map keeps it.
            queue.pop_front();
            self.stats.record_queue_eviction();
            warn!(
                "Admission queue full ({} entries), dropping oldest from batching",
                self.max_queue_entries
            );
        }
        queue.push_back(entry);
        queue.len()
    }

    /// Look up an entry by id.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<LogEntry>> {
        let entries = self.entries.read().expect("lock poisoned");
        entries.get(id).cloned()
    }

    /// Remove up to `max` entries from the front of the admission queue,
    /// preserving admission order.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn drain(&self, max: usize) -> Vec<Arc<LogEntry>> {
        let mut queue = self.queue.lock().expect("lock poisoned");
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Current depth of the admission queue.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.lock().expect("lock poisoned").len()
    }

    /// Total number of stored entries.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all stored entry references, for query evaluation.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        let entries = self.entries.read().expect("lock poisoned");
        entries.values().cloned().collect()
    }
}
