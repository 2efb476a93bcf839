//! Batch and receipt types.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::LogEntry;
use crate::hash::Digest;
use crate::merkle::merkle_root;

/// A bounded group of entries committed together.
///
/// Entry order is admission order and is fixed at creation; the Merkle
/// root is computed over the ordered digest sequence exactly once, when
/// the batch is formed.
#[derive(Debug, Clone)]
pub struct LogBatch {
    pub batch_id: String,
    /// Ordered entry references, shared with the entry store.
    pub entries: Vec<Arc<LogEntry>>,
    pub created_at: DateTime<Utc>,
    /// Rough uncompressed payload estimate.
    pub total_size_bytes: usize,
    pub merkle_root: Digest,
    /// Set once the batch has been handed to a sink successfully.
    pub committed: bool,
}

impl LogBatch {
    /// Form a batch from drained entries, stamping id, timestamp, size
    /// estimate and Merkle root.
    #[must_use]
    pub fn from_entries(entries: Vec<Arc<LogEntry>>) -> LogBatch {
        let digests: Vec<Digest> = entries.iter().map(|e| e.digest).collect();
        let total_size_bytes = entries.iter().map(|e| e.approx_size_bytes()).sum();

        LogBatch {
            batch_id: uuid::Uuid::new_v4().to_string(),
            entries,
            created_at: Utc::now(),
            total_size_bytes,
            merkle_root: merkle_root(&digests),
            committed: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute the root from the entries' current content.
    ///
    /// Digests are recomputed from entry fields rather than read from the
    /// stamped values, so tampering with either an entry or the stored
    /// root is detected. Equality with `merkle_root` means intact.
    #[must_use]
    pub fn verify(&self) -> bool {
        let digests: Vec<Digest> = self.entries.iter().map(|e| e.compute_digest()).collect();
        merkle_root(&digests) == self.merkle_root
    }
}

/// Acknowledgment that a batch reached a sink.
///
/// Exactly one receipt exists per committed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub receipt_id: String,
    pub batch_id: String,
    pub received_at: DateTime<Utc>,
    /// Identifier of the acknowledging sink or node.
    pub target: String,
    /// Opaque acknowledgment bytes supplied by the sink.
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    /// Sink-specific reference, e.g. the path of the stored record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    pub verified: bool,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Level, NewEntry};

    fn entries(count: usize) -> Vec<Arc<LogEntry>> {
        (0..count)
            .map(|i| Arc::new(NewEntry::new(Level::Info, format!("m{i}")).materialize("test")))
            .collect()
    }

    #[test]
    fn test_from_entries_stamps_root() {
        let batch = LogBatch::from_entries(entries(3));
        assert_eq!(batch.len(), 3);
        assert!(!batch.merkle_root.is_zero());
        assert!(!batch.committed);
        assert!(batch.total_size_bytes > 0);
    }

    #[test]
    fn test_empty_batch_has_zero_root() {
        let batch = LogBatch::from_entries(Vec::new());
        assert!(batch.is_empty());
        assert!(batch.merkle_root.is_zero());
    }

    #[test]
    fn test_verify_roundtrip() {
        let batch = LogBatch::from_entries(entries(5));
        assert!(batch.verify());
    }

    #[test]
    fn test_verify_detects_reorder() {
        let mut batch = LogBatch::from_entries(entries(2));
        batch.entries.swap(0, 1);
        assert!(!batch.verify());
    }

    #[test]
    fn test_receipt_signature_serializes_as_hex() {
        let receipt = BatchReceipt {
            receipt_id: "r1".to_string(),
            batch_id: "b1".to_string(),
            received_at: Utc::now(),
            target: "local".to_string(),
            signature: vec![0xde, 0xad],
            external_ref: None,
            verified: true,
        };
        let json = serde_json::to_string(&receipt).unwrap();
        assert!(json.contains("\"dead\""));
        let back: BatchReceipt = serde_json::from_str(&json).unwrap();
        assert_eq!(back.signature, receipt.signature);
    }
}
