//! Sink abstraction.
//!
//! A sink is any downstream target that can durably accept a batch: the
//! local file store, or an opaque remote receiver supplied by the caller.
//! The batcher commits each batch to exactly one sink per attempt and
//! treats every failure as retryable.

use async_trait::async_trait;

use crate::batch::{BatchReceipt, LogBatch};

/// Errors a sink can surface. All of them leave the batch uncommitted and
/// eligible for retry on the next flush cycle.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// A downstream target that durably accepts batches.
///
/// Success must yield a receipt whose `batch_id` matches the stored batch;
/// failure must leave the sink in a state where the same batch can be
/// retried without duplicating prior work.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Short identifier used in receipts and logs.
    fn name(&self) -> &str;

    /// Whether the sink is currently reachable. The batcher skips an
    /// unavailable remote and falls back to local storage.
    fn is_available(&self) -> bool {
        true
    }

    /// Durably accept a batch and acknowledge it.
    async fn store(&self, batch: &LogBatch) -> Result<BatchReceipt, SinkError>;
}
