//! Embeddable audit-trail pipeline.
//!
//! Entries are stamped with a SHA-256 content digest at admission, queued,
//! drained into bounded batches on a timer or size threshold, summarized by
//! a Merkle root per batch, and committed to a local compressed file store
//! or an opaque remote receiver. Every committed batch gets a receipt, and
//! both entries and batches can be re-verified at any time by recomputing
//! their hashes.
//!
//! # Pipeline
//!
//! ```text
//!    callers ──> EntryStore ──> admission queue
//!                    │                │
//!                    │                v
//!                    │          BatcherService ──> Merkle root
//!                    │                │
//!                    │                v
//!                    │          BatchSink (remote, else file store)
//!                    │                │
//!                    v                v
//!               LogQuery          receipts
//! ```
//!
//! # Example
//!
//! ```no_run
//! use logvault::{AuditPipeline, Config, Level, LogQuery, NewEntry};
//!
//! # async fn run() -> Result<(), logvault::VaultError> {
//! let pipeline = AuditPipeline::start(Config::default())?;
//!
//! pipeline
//!     .ingest(NewEntry::new(Level::Warning, "disk pressure rising"))
//!     .await?;
//!
//! let warnings = pipeline.query(&LogQuery::new().min_level(Level::Warning));
//! assert_eq!(warnings.len(), 1);
//!
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod batcher;
pub mod config;
pub mod entry;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod pipeline;
pub mod query;
pub mod sink;
pub mod stats;
pub mod storage;
pub mod store;

pub use batch::{BatchReceipt, LogBatch};
pub use batcher::{BatcherHandle, FlushOutcome};
pub use config::Config;
pub use entry::{Category, Level, LogEntry, Metadata, MetadataValue, NewEntry};
pub use error::VaultError;
pub use hash::Digest;
pub use merkle::{merkle_proof, merkle_root, verify_proof, ProofStep};
pub use pipeline::{AuditPipeline, PipelineBuilder};
pub use query::LogQuery;
pub use sink::{BatchSink, SinkError};
pub use stats::StatsSnapshot;
pub use storage::{list_batch_files, read_batch, FileSink, PersistedBatch, VerifyReport};
