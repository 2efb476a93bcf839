//! Local file sink.
//!
//! Each committed batch becomes one versioned JSON record under the
//! configured storage root, zstd-compressed when compression is enabled.
//! Compression failure falls back to writing the plain bytes; losing the
//! size win is acceptable, losing the batch is not.
//!
//! The record carries everything needed to re-derive the Merkle root
//! offline: entry identity fields, the stamped per-entry digests, and the
//! root itself. `read_batch` plus [`PersistedBatch::verify`] is the
//! independent verification path used by tests and the `logvault-verify`
//! binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zstd::stream::write::Encoder;

use crate::batch::{BatchReceipt, LogBatch};
use crate::entry::{Category, Level, LogEntry, Metadata};
use crate::hash::{entry_digest, Digest};
use crate::merkle::merkle_root;
use crate::sink::{BatchSink, SinkError};
use crate::stats::PipelineStats;

/// Current on-disk record version.
pub const PERSISTED_BATCH_VERSION: u32 = 1;

const PLAIN_EXTENSION: &str = "json";
const COMPRESSED_EXTENSION: &str = "json.zst";

/// One entry as persisted inside a batch record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub id: String,
    pub level: Level,
    pub category: Category,
    pub message: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub source: String,
    pub digest: Digest,
}

impl PersistedEntry {
    fn from_entry(entry: &LogEntry) -> PersistedEntry {
        PersistedEntry {
            id: entry.id.clone(),
            level: entry.level,
            category: entry.category,
            message: entry.message.clone(),
            metadata: entry.metadata.clone(),
            timestamp: entry.timestamp,
            trace_id: entry.trace_id.clone(),
            parent_id: entry.parent_id.clone(),
            source: entry.source.clone(),
            digest: entry.digest,
        }
    }

    /// Recompute the content digest from the persisted identity fields.
    #[must_use]
    pub fn compute_digest(&self) -> Digest {
        entry_digest(
            &self.id,
            &self.message,
            self.trace_id.as_deref(),
            self.timestamp.timestamp_nanos_opt().unwrap_or_default(),
            self.level,
            self.category,
        )
    }
}

/// Versioned on-disk batch record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedBatch {
    pub version: u32,
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub merkle_root: Digest,
    pub entries: Vec<PersistedEntry>,
}

/// Outcome of verifying one persisted record.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub batch_id: String,
    pub entries_checked: usize,
    /// Ids whose recomputed digest disagrees with the stamped one.
    pub corrupt_entries: Vec<String>,
    /// Whether the recomputed root matches the stored root.
    pub root_ok: bool,
}

impl VerifyReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.root_ok && self.corrupt_entries.is_empty()
    }
}

impl PersistedBatch {
    fn from_batch(batch: &LogBatch) -> PersistedBatch {
        PersistedBatch {
            version: PERSISTED_BATCH_VERSION,
            batch_id: batch.batch_id.clone(),
            created_at: batch.created_at,
            merkle_root: batch.merkle_root,
            entries: batch.entries.iter().map(|e| PersistedEntry::from_entry(e)).collect(),
        }
    }

    /// Recompute the Merkle root from the persisted entries' content.
    #[must_use]
    pub fn recompute_root(&self) -> Digest {
        let digests: Vec<Digest> = self.entries.iter().map(PersistedEntry::compute_digest).collect();
        merkle_root(&digests)
    }

    /// Full integrity check: every entry digest plus the batch root.
    #[must_use]
    pub fn verify(&self) -> VerifyReport {
        let corrupt_entries: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.compute_digest() != e.digest)
            .map(|e| e.id.clone())
            .collect();

        VerifyReport {
            batch_id: self.batch_id.clone(),
            entries_checked: self.entries.len(),
            corrupt_entries,
            root_ok: self.recompute_root() == self.merkle_root,
        }
    }
}

/// Read a persisted batch record back from disk, decompressing when the
/// file carries the compressed extension.
pub fn read_batch(path: &Path) -> Result<PersistedBatch, SinkError> {
    let raw = std::fs::read(path)?;
    let bytes = if path
        .to_string_lossy()
        .ends_with(COMPRESSED_EXTENSION)
    {
        zstd::stream::decode_all(raw.as_slice())?
    } else {
        raw
    };
    Ok(serde_json::from_slice(&bytes)?)
}

/// List every batch record under a storage root, oldest first by file
/// modification time.
pub fn list_batch_files(root: &Path) -> Result<Vec<PathBuf>, SinkError> {
    let mut files = Vec::new();
    for dir_entry in std::fs::read_dir(root)? {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();
        let name = path.file_name().map(|n| n.to_string_lossy().to_string());
        let Some(name) = name else { continue };
        if name.ends_with(PLAIN_EXTENSION) || name.ends_with(COMPRESSED_EXTENSION) {
            files.push(path);
        }
    }
    files.sort_by_key(|p| {
        std::fs::metadata(p)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    });
    Ok(files)
}

/// Result of a retention/size sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOutcome {
    pub removed: usize,
    pub bytes_freed: u64,
}

/// File-based batch sink: one record per batch under a root directory.
pub struct FileSink {
    root: PathBuf,
    compress: bool,
    compression_level: i32,
    retention: Duration,
    max_total_size_bytes: u64,
    stats: Arc<PipelineStats>,
    raw_bytes: AtomicU64,
    compressed_bytes: AtomicU64,
}

impl FileSink {
    /// Create the sink, creating the root directory if absent.
    ///
    /// A root that cannot be created is a configuration error and fails
    /// construction synchronously.
    pub fn new(
        root: impl Into<PathBuf>,
        compress: bool,
        compression_level: i32,
        retention: Duration,
        max_total_size_bytes: u64,
        stats: Arc<PipelineStats>,
    ) -> Result<FileSink, crate::error::VaultError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            crate::error::VaultError::InvalidConfig(format!(
                "cannot create storage root {}: {e}",
                root.display()
            ))
        })?;

        Ok(FileSink {
            root,
            compress,
            compression_level,
            retention,
            max_total_size_bytes,
            stats,
            raw_bytes: AtomicU64::new(0),
            compressed_bytes: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cumulative (raw, written) byte counts for this process.
    #[must_use]
    pub fn byte_totals(&self) -> (u64, u64) {
        (
            self.raw_bytes.load(Ordering::Relaxed),
            self.compressed_bytes.load(Ordering::Relaxed),
        )
    }

    fn encode(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = Encoder::new(Vec::new(), self.compression_level)?;
        encoder.write_all(data)?;
        encoder.finish()
    }

    /// Delete records older than the retention period, then oldest-first
    /// until the total size fits under the configured cap.
    pub async fn sweep(&self) -> Result<SweepOutcome, SinkError> {
        let mut outcome = SweepOutcome::default();
        let now = SystemTime::now();
        let mut kept: Vec<(PathBuf, u64)> = Vec::new();

        for path in list_batch_files(&self.root)? {
            let meta = std::fs::metadata(&path)?;
            let expired = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .is_some_and(|age| age > self.retention);
            if expired {
                outcome.removed += 1;
                outcome.bytes_freed += meta.len();
                tokio::fs::remove_file(&path).await?;
            } else {
                kept.push((path, meta.len()));
            }
        }

        let mut total: u64 = kept.iter().map(|(_, len)| len).sum();
        // kept is oldest-first already.
        for (path, len) in kept {
            if total <= self.max_total_size_bytes {
                break;
            }
            outcome.removed += 1;
            outcome.bytes_freed += len;
            total -= len;
            tokio::fs::remove_file(&path).await?;
        }

        if outcome.removed > 0 {
            debug!(
                removed = outcome.removed,
                bytes_freed = outcome.bytes_freed,
                "storage sweep complete"
            );
        }
        Ok(outcome)
    }
}

#[async_trait]
impl BatchSink for FileSink {
    fn name(&self) -> &str {
        "local-file-store"
    }

    async fn store(&self, batch: &LogBatch) -> Result<BatchReceipt, SinkError> {
        let record = PersistedBatch::from_batch(batch);
        let raw = serde_json::to_vec(&record)?;

        let (bytes, extension) = if self.compress {
            match self.encode(&raw) {
                Ok(compressed) => (compressed, COMPRESSED_EXTENSION),
                Err(e) => {
                    // Keep the batch even when the encoder misbehaves.
                    warn!("compression failed, storing uncompressed: {e}");
                    (raw.clone(), PLAIN_EXTENSION)
                }
            }
        } else {
            (raw.clone(), PLAIN_EXTENSION)
        };

        let path = self.root.join(format!("{}.{extension}", batch.batch_id));
        tokio::fs::write(&path, &bytes).await?;

        self.raw_bytes.fetch_add(raw.len() as u64, Ordering::Relaxed);
        self.compressed_bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.stats
            .record_stored_bytes(raw.len() as u64, bytes.len() as u64);

        debug!(
            batch_id = %batch.batch_id,
            entries = batch.len(),
            bytes = bytes.len(),
            "batch persisted"
        );

        // The acknowledgment bytes are the checksum of exactly what was
        // written, so the receipt pins the stored representation.
        Ok(BatchReceipt {
            receipt_id: uuid::Uuid::new_v4().to_string(),
            batch_id: batch.batch_id.clone(),
            received_at: Utc::now(),
            target: self.name().to_string(),
            signature: Digest::hash(&bytes).as_bytes().to_vec(),
            external_ref: Some(path.display().to_string()),
            verified: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Level, NewEntry};
    use std::sync::Arc;

    fn test_batch(count: usize) -> LogBatch {
        let entries = (0..count)
            .map(|i| {
                Arc::new(
                    NewEntry::new(Level::Info, format!("message {i}"))
                        .trace_id(format!("trace-{i}"))
                        .materialize("test"),
                )
            })
            .collect();
        LogBatch::from_entries(entries)
    }

    fn test_sink(root: &Path, compress: bool) -> FileSink {
        FileSink::new(
            root,
            compress,
            3,
            Duration::from_secs(3600),
            u64::MAX,
            Arc::new(PipelineStats::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_store_writes_one_file_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sink = test_sink(dir.path(), false);

        let receipt = sink.store(&test_batch(3)).await.unwrap();
        assert!(receipt.verified);
        assert!(!receipt.signature.is_empty());

        let files = list_batch_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_round_trip_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let sink = test_sink(dir.path(), false);
        let batch = test_batch(4);

        sink.store(&batch).await.unwrap();

        let files = list_batch_files(dir.path()).unwrap();
        let record = read_batch(&files[0]).unwrap();
        assert_eq!(record.version, PERSISTED_BATCH_VERSION);
        assert_eq!(record.batch_id, batch.batch_id);
        assert_eq!(record.entries.len(), 4);
        for (persisted, original) in record.entries.iter().zip(batch.entries.iter()) {
            assert_eq!(persisted.id, original.id);
            assert_eq!(persisted.level, original.level);
            assert_eq!(persisted.message, original.message);
            assert_eq!(persisted.trace_id, original.trace_id);
        }
        assert_eq!(record.merkle_root, batch.merkle_root);
    }

    #[tokio::test]
    async fn test_round_trip_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let sink = test_sink(dir.path(), true);
        let batch = test_batch(10);

        sink.store(&batch).await.unwrap();

        let files = list_batch_files(dir.path()).unwrap();
        assert!(files[0].to_string_lossy().ends_with(".json.zst"));

        let record = read_batch(&files[0]).unwrap();
        assert_eq!(record.batch_id, batch.batch_id);
        assert_eq!(record.recompute_root(), batch.merkle_root);
    }

    #[tokio::test]
    async fn test_verify_detects_tampered_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = test_sink(dir.path(), false);
        let batch = test_batch(3);
        sink.store(&batch).await.unwrap();

        let files = list_batch_files(dir.path()).unwrap();
        let mut record = read_batch(&files[0]).unwrap();
        assert!(record.verify().is_clean());

        record.entries[1].message = "rewritten".to_string();
        let report = record.verify();
        assert!(!report.is_clean());
        assert_eq!(report.corrupt_entries, vec![record.entries[1].id.clone()]);
        assert!(!report.root_ok);
    }

    #[tokio::test]
    async fn test_byte_totals_track_compression_win() {
        let dir = tempfile::tempdir().unwrap();
        let sink = test_sink(dir.path(), true);

        sink.store(&test_batch(50)).await.unwrap();

        let (raw, written) = sink.byte_totals();
        assert!(raw > 0);
        assert!(written > 0);
        assert!(written < raw, "zstd should shrink repetitive JSON");
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_records() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(
            dir.path(),
            false,
            3,
            Duration::from_secs(0),
            u64::MAX,
            Arc::new(PipelineStats::new()),
        )
        .unwrap();

        sink.store(&test_batch(1)).await.unwrap();
        // Zero retention makes everything already written expired.
        std::thread::sleep(Duration::from_millis(20));
        let outcome = sink.sweep().await.unwrap();
        assert_eq!(outcome.removed, 1);
        assert!(list_batch_files(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_enforces_size_cap_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(
            dir.path(),
            false,
            3,
            Duration::from_secs(3600),
            1, // effectively "keep nothing beyond the newest removals"
            Arc::new(PipelineStats::new()),
        )
        .unwrap();

        let first = test_batch(2);
        sink.store(&first).await.unwrap();
        std::thread::sleep(Duration::from_millis(20));
        sink.store(&test_batch(2)).await.unwrap();

        let outcome = sink.sweep().await.unwrap();
        assert!(outcome.removed >= 1);
        let remaining = list_batch_files(dir.path()).unwrap();
        // The oldest record goes first.
        assert!(remaining
            .iter()
            .all(|p| !p.to_string_lossy().contains(&first.batch_id)));
    }

    #[test]
    fn test_new_rejects_unusable_root() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("occupied");
        std::fs::write(&file_path, b"not a directory").unwrap();

        let result = FileSink::new(
            &file_path,
            false,
            3,
            Duration::from_secs(3600),
            u64::MAX,
            Arc::new(PipelineStats::new()),
        );
        assert!(result.is_err());
    }
}
