//! Pipeline façade: construction, ingestion, queries, verification and
//! teardown.
//!
//! # Lifecycle
//!
//! [`PipelineBuilder::start`] validates the configuration, builds the file
//! sink, spawns the batcher service task and the periodic flush scheduler,
//! and returns an [`AuditPipeline`] handle. Teardown is explicit and
//! blocking: [`AuditPipeline::shutdown`] stops the scheduler, sends the
//! batcher its final forced flush, and waits for both tasks to finish.
//!
//! # Ingestion path
//!
//! `ingest` stamps id, timestamp and digest, inserts into the entry store
//! and appends to the admission queue. Three conditions enqueue a flush
//! request before `ingest` returns: fatal severity, the queue depth
//! crossing the configured threshold, and audit mode (which additionally
//! waits for the flush to finish). Sink I/O always happens on the batcher
//! task, never on the ingesting caller.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::batch::{BatchReceipt, LogBatch};
use crate::batcher::{
    BatchTable, BatcherHandle, BatcherService, FlushOutcome, ReceiptTable, SinkErrorCallback,
};
use crate::config::Config;
use crate::entry::{Level, LogEntry, Metadata, NewEntry};
use crate::error::VaultError;
use crate::query::LogQuery;
use crate::sink::{BatchSink, SinkError};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::storage::{FileSink, SweepOutcome};
use crate::store::EntryStore;

/// Builder for [`AuditPipeline`].
pub struct PipelineBuilder {
    config: Config,
    remote_sink: Option<Arc<dyn BatchSink>>,
    on_sink_error: Option<SinkErrorCallback>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(config: Config) -> PipelineBuilder {
        PipelineBuilder {
            config,
            remote_sink: None,
            on_sink_error: None,
        }
    }

    /// Attach an opaque remote receiver. When present and available it is
    /// preferred over local storage; the file sink remains the fallback.
    #[must_use]
    pub fn remote_sink(mut self, sink: Arc<dyn BatchSink>) -> Self {
        self.remote_sink = Some(sink);
        self
    }

    /// Register a callback fired on every failed commit attempt.
    #[must_use]
    pub fn on_sink_error(mut self, callback: impl Fn(&SinkError) + Send + Sync + 'static) -> Self {
        self.on_sink_error = Some(Arc::new(callback));
        self
    }

    /// Validate, wire and start the pipeline.
    ///
    /// Must be called from within a tokio runtime. Configuration problems
    /// surface synchronously here; nothing is spawned on failure.
    pub fn start(self) -> Result<AuditPipeline, VaultError> {
        self.config.validate()?;

        let stats = Arc::new(PipelineStats::new());
        let store = Arc::new(EntryStore::new(
            self.config.max_queue_entries,
            Arc::clone(&stats),
        ));
        let file_sink = Arc::new(FileSink::new(
            self.config.storage_root.clone(),
            self.config.compress,
            self.config.compression_level,
            self.config.retention,
            self.config.max_local_size_bytes,
            Arc::clone(&stats),
        )?);

        let (service, handle) = BatcherService::new(
            Arc::clone(&store),
            Arc::clone(&file_sink) as Arc<dyn BatchSink>,
            self.remote_sink,
            self.config.max_batch_size,
            Arc::clone(&stats),
            self.on_sink_error,
        );
        let batches = service.batch_table();
        let receipts = service.receipt_table();

        let batcher_task = tokio::spawn(service.run());

        let cancel = CancellationToken::new();
        let scheduler_task = tokio::spawn(Self::run_scheduler(
            self.config.flush_interval,
            Arc::clone(&store),
            handle.clone(),
            cancel.clone(),
        ));

        debug!(
            storage_root = %self.config.storage_root.display(),
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            max_batch_size = self.config.max_batch_size,
            "pipeline started"
        );

        Ok(AuditPipeline {
            config: self.config,
            store,
            stats,
            handle,
            batches,
            receipts,
            file_sink,
            cancel,
            tasks: Mutex::new(Some((batcher_task, scheduler_task))),
        })
    }

    /// Periodic flush driver. Ticks are skipped while the queue is empty;
    /// a stop request never waits for an in-flight tick.
    async fn run_scheduler(
        period: std::time::Duration,
        store: Arc<EntryStore>,
        handle: BatcherHandle,
        cancel: CancellationToken,
    ) {
        let mut ticker = interval(period);
        // Discard the first tick, which fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if store.queue_depth() > 0 && handle.request_flush().is_err() {
                        break;
                    }
                }
                () = cancel.cancelled() => {
                    debug!("scheduler received shutdown signal");
                    break;
                }
            }
        }
    }
}

/// Running pipeline handle.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct AuditPipeline {
    config: Config,
    store: Arc<EntryStore>,
    stats: Arc<PipelineStats>,
    handle: BatcherHandle,
    batches: BatchTable,
    receipts: ReceiptTable,
    file_sink: Arc<FileSink>,
    cancel: CancellationToken,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl AuditPipeline {
    /// Start a pipeline with the given configuration and no remote sink.
    pub fn start(config: Config) -> Result<AuditPipeline, VaultError> {
        PipelineBuilder::new(config).start()
    }

    #[must_use]
    pub fn builder(config: Config) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Ingest a draft entry.
    ///
    /// Returns the assigned entry id, or `None` when the entry was dropped
    /// by the minimum-level filter. Fatal entries enqueue an immediate
    /// flush request before this returns; audit mode waits for a full
    /// flush so every ingestion is durable before the call completes.
    pub async fn ingest(&self, draft: NewEntry) -> Result<Option<String>, VaultError> {
        if draft.level < self.config.min_level && !self.config.audit_mode {
            self.stats.record_dropped();
            return Ok(None);
        }

        let fatal = draft.level == Level::Fatal;
        let entry = Arc::new(draft.materialize(&self.config.node_name));
        let id = entry.id.clone();
        let depth = self.store.insert(entry);

        if fatal {
            // Durability for the worst news first: the request must be
            // queued before the caller observes success.
            self.handle.request_flush()?;
        } else if depth == self.config.flush_threshold {
            let _ = self.handle.request_flush();
        }

        if self.config.audit_mode {
            let _ = self.handle.flush().await?;
        }

        Ok(Some(id))
    }

    /// Convenience ingestion with just a level, message and metadata.
    pub async fn log(
        &self,
        level: Level,
        message: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Option<String>, VaultError> {
        let mut draft = NewEntry::new(level, message);
        draft.metadata = metadata;
        self.ingest(draft).await
    }

    /// Look up an entry by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<LogEntry>> {
        self.store.get(id)
    }

    /// Evaluate a query against the current store snapshot.
    #[must_use]
    pub fn query(&self, query: &LogQuery) -> Vec<Arc<LogEntry>> {
        query.execute(self.store.snapshot())
    }

    /// All entries sharing a trace correlation id, in time order.
    #[must_use]
    pub fn entries_for_trace(&self, trace_id: &str) -> Vec<Arc<LogEntry>> {
        self.query(&LogQuery::new().trace_id(trace_id))
    }

    /// Recompute an entry's digest and compare with the stamped value.
    ///
    /// `None` when the id is unknown; `Some(false)` means corruption,
    /// which is counted and logged but never repaired.
    #[must_use]
    pub fn verify_entry(&self, id: &str) -> Option<bool> {
        let entry = self.store.get(id)?;
        let intact = entry.verify();
        if !intact {
            self.stats.record_integrity_failure();
            error!(entry_id = %id, "entry digest mismatch, corruption detected");
        }
        Some(intact)
    }

    /// Recompute a committed batch's Merkle root from its entries.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn verify_batch(&self, batch_id: &str) -> Option<bool> {
        let batch = {
            let batches = self.batches.read().expect("lock poisoned");
            batches.get(batch_id).cloned()
        }?;
        let intact = batch.verify();
        if !intact {
            self.stats.record_integrity_failure();
            error!(batch_id = %batch_id, "merkle root mismatch, corruption detected");
        }
        Some(intact)
    }

    /// Hex digest of a stored entry.
    #[must_use]
    pub fn entry_digest_hex(&self, id: &str) -> Option<String> {
        self.store.get(id).map(|e| e.digest.to_hex())
    }

    /// Receipt recorded for a committed batch.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn receipt_for(&self, batch_id: &str) -> Option<BatchReceipt> {
        let receipts = self.receipts.read().expect("lock poisoned");
        receipts.get(batch_id).cloned()
    }

    /// A committed batch by id.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn batch(&self, batch_id: &str) -> Option<LogBatch> {
        let batches = self.batches.read().expect("lock poisoned");
        batches.get(batch_id).cloned()
    }

    /// All committed batches, oldest first.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn committed_batches(&self) -> Vec<LogBatch> {
        let batches = self.batches.read().expect("lock poisoned");
        let mut all: Vec<LogBatch> = batches.values().cloned().collect();
        all.sort_by_key(|b| b.created_at);
        all
    }

    /// Flush now: retry pending batches, drain the queue, commit.
    pub async fn flush(&self) -> Result<FlushOutcome, VaultError> {
        self.handle.flush().await
    }

    /// Alias for [`flush`](Self::flush) kept for call sites that want to
    /// express intent explicitly, e.g. before process exit.
    pub async fn force_flush(&self) -> Result<FlushOutcome, VaultError> {
        self.handle.flush().await
    }

    /// Current statistics snapshot, including integrity and sink failure
    /// counts.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current depth of the admission queue.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.store.queue_depth()
    }

    /// Export query results to a JSON file. Returns the number of entries
    /// written.
    pub async fn export(&self, path: impl Into<PathBuf>, query: &LogQuery) -> Result<usize, VaultError> {
        let entries = self.query(query);
        let json = serde_json::to_vec(&entries)?;
        tokio::fs::write(path.into(), json).await?;
        Ok(entries.len())
    }

    /// Dump every stored entry to a timestamped file, ignoring all
    /// filters. For last-resort diagnostics.
    ///
    /// Dumps land in a `dumps/` directory beside the batch records so the
    /// sweep and the offline verifier never mistake them for batches.
    pub async fn emergency_dump(&self, reason: &str) -> Result<PathBuf, VaultError> {
        #[derive(serde::Serialize)]
        struct Dump<'a> {
            reason: &'a str,
            dumped_at: chrono::DateTime<chrono::Utc>,
            entries: Vec<Arc<LogEntry>>,
        }

        let mut entries = self.store.snapshot();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        let dump = Dump {
            reason,
            dumped_at: chrono::Utc::now(),
            entries,
        };

        let dir = self.file_sink.root().join("dumps");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!(
            "emergency-{}.json",
            chrono::Utc::now().timestamp_millis()
        ));
        tokio::fs::write(&path, serde_json::to_vec(&dump)?).await?;
        Ok(path)
    }

    /// Run a retention/size sweep over the storage root.
    pub async fn sweep_storage(&self) -> Result<SweepOutcome, VaultError> {
        self.file_sink
            .sweep()
            .await
            .map_err(|e| VaultError::SinkUnavailable(e.to_string()))
    }

    /// Stop the pipeline: cancel the scheduler, run one final forced
    /// flush, and wait for both background tasks to finish.
    ///
    /// Safe to call more than once; later calls return an empty outcome.
    pub async fn shutdown(&self) -> FlushOutcome {
        self.cancel.cancel();
        let outcome = match self.handle.shutdown().await {
            Ok(outcome) => outcome,
            Err(_) => FlushOutcome::default(),
        };

        let tasks = {
            #[allow(clippy::expect_used)]
            let mut guard = self.tasks.lock().expect("lock poisoned");
            guard.take()
        };
        if let Some((batcher_task, scheduler_task)) = tasks {
            let _ = batcher_task.await;
            let _ = scheduler_task.await;
        }

        debug!(
            batches_committed = outcome.batches_committed,
            batches_pending = outcome.batches_pending,
            "pipeline stopped"
        );
        outcome
    }
}
