//! Content digests.
//!
//! Every entry is stamped with a SHA-256 digest of its identity fields at
//! admission time. The digest input uses length-delimited framing so that
//! no combination of field values can collide by concatenation, and all
//! integers are encoded little-endian so the result is identical across
//! platforms and processes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as Sha2Digest, Sha256};

use crate::entry::{Category, Level};

/// A 32-byte SHA-256 digest, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// The all-zero digest. Used as the Merkle root of an empty batch.
    #[must_use]
    pub fn zero() -> Digest {
        Digest([0u8; 32])
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Digest {
        Digest(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string. Returns `None` on any malformed
    /// input rather than guessing.
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Digest> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Digest(arr))
    }

    /// SHA-256 of raw bytes.
    #[must_use]
    pub fn hash(data: &[u8]) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Digest(hasher.finalize().into())
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid digest hex: {s}")))
    }
}

/// Compute the content digest of an entry's identity fields.
///
/// Pure and deterministic: identical inputs produce identical digests in
/// any process on any platform. Fields not listed here (metadata, parent
/// id, source) are deliberately outside the integrity envelope.
#[must_use]
pub fn entry_digest(
    id: &str,
    message: &str,
    trace_id: Option<&str>,
    timestamp_nanos: i64,
    level: Level,
    category: Category,
) -> Digest {
    let mut hasher = Sha256::new();
    update_framed(&mut hasher, id.as_bytes());
    update_framed(&mut hasher, message.as_bytes());
    update_framed(&mut hasher, trace_id.unwrap_or("").as_bytes());
    update_framed(&mut hasher, &timestamp_nanos.to_le_bytes());
    update_framed(&mut hasher, &[level.index() as u8]);
    update_framed(&mut hasher, category.as_ref().as_bytes());
    Digest(hasher.finalize().into())
}

fn update_framed(hasher: &mut Sha256, field: &[u8]) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field);
}
