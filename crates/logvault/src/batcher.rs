//! Actor-based batcher service.
//!
//! The batcher owns batch formation and commit state. Producers never touch
//! that state directly; they send commands through a cloneable
//! [`BatcherHandle`] and the single service task processes them in order:
//!
//! ```text
//!    ┌──────────────┐
//!    │   Handles    │ (ingest path, scheduler, shutdown)
//!    └──────┬───────┘
//!           │ commands via channel
//!           v
//!    ┌──────────────┐
//!    │   Service    │ (single consumer)
//!    └──────┬───────┘
//!           │ drains the admission queue, commits to one sink
//!           v
//!    ┌──────────────┐
//!    │    Sinks     │ (remote receiver, else local file store)
//!    └──────────────┘
//! ```
//!
//! # Failure semantics
//!
//! A failed commit keeps the whole batch in the pending list; the entries
//! are never pushed back onto the admission queue, so ordering and batch
//! membership stay fixed across retries. Every subsequent flush cycle
//! retries pending batches before draining new work. Sink failures are
//! counted, reported through the error callback, and never propagate to
//! ingestion callers.

use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::batch::{BatchReceipt, LogBatch};
use crate::sink::{BatchSink, SinkError};
use crate::stats::PipelineStats;
use crate::store::EntryStore;

/// Callback invoked on every failed commit attempt.
pub type SinkErrorCallback = Arc<dyn Fn(&SinkError) + Send + Sync>;

/// Commands accepted by the batcher service.
pub enum BatcherCommand {
    /// Flush now and report the outcome.
    Flush(oneshot::Sender<FlushOutcome>),
    /// Flush soon; nobody waits for the result. Used by the timer tick,
    /// the queue-depth trigger and fatal-severity ingestion.
    FlushRequest,
    /// Final forced flush, then stop.
    Shutdown(oneshot::Sender<FlushOutcome>),
}

impl std::fmt::Debug for BatcherCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatcherCommand::Flush(_) => f.write_str("Flush"),
            BatcherCommand::FlushRequest => f.write_str("FlushRequest"),
            BatcherCommand::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

/// Result of one flush cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushOutcome {
    /// Batches committed during this cycle.
    pub batches_committed: usize,
    /// Entries inside those batches.
    pub entries_committed: usize,
    /// Batches still awaiting a successful sink call.
    pub batches_pending: usize,
}

/// Cloneable sender half of the batcher service.
#[derive(Clone)]
pub struct BatcherHandle {
    tx: mpsc::UnboundedSender<BatcherCommand>,
}

impl BatcherHandle {
    /// Enqueue a flush request without waiting for it to run.
    ///
    /// Returns `Err` only when the service has stopped.
    pub fn request_flush(&self) -> Result<(), crate::error::VaultError> {
        self.tx
            .send(BatcherCommand::FlushRequest)
            .map_err(|_| crate::error::VaultError::ShuttingDown)
    }

    /// Flush and wait for the outcome.
    pub async fn flush(&self) -> Result<FlushOutcome, crate::error::VaultError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(BatcherCommand::Flush(response_tx))
            .map_err(|_| crate::error::VaultError::ShuttingDown)?;
        response_rx
            .await
            .map_err(|_| crate::error::VaultError::ShuttingDown)
    }

    /// Request the final flush and stop the service.
    pub async fn shutdown(&self) -> Result<FlushOutcome, crate::error::VaultError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(BatcherCommand::Shutdown(response_tx))
            .map_err(|_| crate::error::VaultError::ShuttingDown)?;
        response_rx
            .await
            .map_err(|_| crate::error::VaultError::ShuttingDown)
    }
}

/// Shared, independently guarded table of committed batches.
pub type BatchTable = Arc<RwLock<HashMap<String, LogBatch>>>;
/// Shared, independently guarded table of receipts, keyed by batch id.
pub type ReceiptTable = Arc<RwLock<HashMap<String, BatchReceipt>>>;

/// The service task. Owns pending batches and writes the shared tables.
pub struct BatcherService {
    store: Arc<EntryStore>,
    local_sink: Arc<dyn BatchSink>,
    remote_sink: Option<Arc<dyn BatchSink>>,
    max_batch_size: usize,
    pending: Vec<LogBatch>,
    batches: BatchTable,
    receipts: ReceiptTable,
    stats: Arc<PipelineStats>,
    on_sink_error: Option<SinkErrorCallback>,
    rx: mpsc::UnboundedReceiver<BatcherCommand>,
}

impl BatcherService {
    /// Create the service plus its handle.
    #[must_use]
    pub fn new(
        store: Arc<EntryStore>,
        local_sink: Arc<dyn BatchSink>,
        remote_sink: Option<Arc<dyn BatchSink>>,
        max_batch_size: usize,
        stats: Arc<PipelineStats>,
        on_sink_error: Option<SinkErrorCallback>,
    ) -> (Self, BatcherHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = BatcherService {
            store,
            local_sink,
            remote_sink,
            max_batch_size,
            pending: Vec::new(),
            batches: Arc::new(RwLock::new(HashMap::new())),
            receipts: Arc::new(RwLock::new(HashMap::new())),
            stats,
            on_sink_error,
            rx,
        };
        let handle = BatcherHandle { tx };
        (service, handle)
    }

    /// Shared committed-batch table, for lookups outside the actor.
    #[must_use]
    pub fn batch_table(&self) -> BatchTable {
        Arc::clone(&self.batches)
    }

    /// Shared receipt table, for lookups outside the actor.
    #[must_use]
    pub fn receipt_table(&self) -> ReceiptTable {
        Arc::clone(&self.receipts)
    }

    /// Process commands until shutdown. Run this in a spawned task.
    pub async fn run(mut self) {
        debug!("batcher service started");

        while let Some(command) = self.rx.recv().await {
            match command {
                BatcherCommand::FlushRequest => {
                    let _ = self.flush_cycle().await;
                }
                BatcherCommand::Flush(response_tx) => {
                    let outcome = self.flush_cycle().await;
                    if response_tx.send(outcome).is_err() {
                        error!("failed to send flush response, receiver dropped");
                    }
                }
                BatcherCommand::Shutdown(response_tx) => {
                    debug!("batcher service shutting down");
                    let outcome = self.flush_cycle().await;
                    if outcome.batches_pending > 0 {
                        warn!(
                            pending = outcome.batches_pending,
                            "shutting down with uncommitted batches"
                        );
                    }
                    let _ = response_tx.send(outcome);
                    break;
                }
            }
        }

        debug!("batcher service stopped");
    }

    /// One full cycle: retry pending batches, then drain the queue into
    /// new batches and commit each one.
    async fn flush_cycle(&mut self) -> FlushOutcome {
        let mut outcome = FlushOutcome::default();

        let pending = std::mem::take(&mut self.pending);
        for batch in pending {
            self.commit(batch, &mut outcome).await;
        }

        loop {
            let drained = self.store.drain(self.max_batch_size);
            if drained.is_empty() {
                break;
            }
            let batch = LogBatch::from_entries(drained);
            self.commit(batch, &mut outcome).await;
        }

        outcome.batches_pending = self.pending.len();
        outcome
    }

    /// Commit one batch to exactly one sink.
    ///
    /// Re-committing an already committed batch is a no-op; the existing
    /// receipt stands and no second sink call is made.
    #[allow(clippy::expect_used)]
    async fn commit(&mut self, mut batch: LogBatch, outcome: &mut FlushOutcome) {
        let already_committed = {
            let receipts = self.receipts.read().expect("lock poisoned");
            receipts.contains_key(&batch.batch_id)
        };
        if batch.committed || already_committed {
            return;
        }

        let sink = match &self.remote_sink {
            Some(remote) if remote.is_available() => Arc::clone(remote),
            _ => Arc::clone(&self.local_sink),
        };

        match sink.store(&batch).await {
            Ok(receipt) => {
                batch.committed = true;
                outcome.batches_committed += 1;
                outcome.entries_committed += batch.len();
                self.stats.record_commit(batch.len());
                debug!(
                    batch_id = %batch.batch_id,
                    entries = batch.len(),
                    sink = sink.name(),
                    "batch committed"
                );
                {
                    let mut receipts = self.receipts.write().expect("lock poisoned");
                    receipts.insert(batch.batch_id.clone(), receipt);
                }
                let mut batches = self.batches.write().expect("lock poisoned");
                batches.insert(batch.batch_id.clone(), batch);
            }
            Err(e) => {
                self.stats.record_sink_failure();
                error!(
                    batch_id = %batch.batch_id,
                    sink = sink.name(),
                    "batch commit failed, will retry on next flush: {e}"
                );
                if let Some(callback) = &self.on_sink_error {
                    callback(&e);
                }
                self.pending.push(batch);
            }
        }
    }
}
