//! Entry model: severity levels, categories, metadata values, and the
//! hash-stamped [`LogEntry`] itself.
//!
//! Entries are immutable once ingested. The `id` and `digest` fields are
//! assigned at admission time and never change afterwards; recomputing the
//! digest and comparing it to the stored value is the integrity check.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::error;

use crate::hash::{entry_digest, Digest};

/// Severity of a log entry, ordered from least to most severe.
///
/// `Fatal` is reserved for events that must reach durable storage as fast
/// as possible; ingesting a `Fatal` entry triggers an immediate flush
/// request on the batching pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

/// Number of severity levels, used to size per-level counters.
pub const LEVEL_COUNT: usize = 6;

impl Level {
    /// Stable index into per-level counter arrays.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// All levels in ascending severity order.
    #[must_use]
    pub fn all() -> [Level; LEVEL_COUNT] {
        [
            Level::Debug,
            Level::Info,
            Level::Warning,
            Level::Error,
            Level::Critical,
            Level::Fatal,
        ]
    }
}

impl AsRef<str> for Level {
    fn as_ref(&self) -> &str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Fatal => "FATAL",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "critical" => Ok(Level::Critical),
            "fatal" => Ok(Level::Fatal),
            _ => Err(format!(
                "Invalid level: '{s}'. Valid levels are: debug, info, warning, error, critical, fatal",
            )),
        }
    }
}

impl Serialize for Level {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_ref())
    }
}

/// Lenient deserialization: unrecognized input logs an error and falls back
/// to `Info` rather than failing the whole record.
impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match Level::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{}", e);
                    Ok(Level::Info)
                }
            }
        } else {
            error!("Expected a string for level, got {:?}", value);
            Ok(Level::Info)
        }
    }
}

/// Classification of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    General,
    IntegrityViolation,
    Environmental,
    Compliance,
    DataGovernance,
    Stakeholder,
    Security,
    Performance,
    Audit,
    System,
}

/// Number of categories, used to size per-category counters.
pub const CATEGORY_COUNT: usize = 10;

impl Category {
    /// Stable index into per-category counter arrays.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// All categories in declaration order.
    #[must_use]
    pub fn all() -> [Category; CATEGORY_COUNT] {
        [
            Category::General,
            Category::IntegrityViolation,
            Category::Environmental,
            Category::Compliance,
            Category::DataGovernance,
            Category::Stakeholder,
            Category::Security,
            Category::Performance,
            Category::Audit,
            Category::System,
        ]
    }
}

impl AsRef<str> for Category {
    fn as_ref(&self) -> &str {
        match self {
            Category::General => "general",
            Category::IntegrityViolation => "integrity_violation",
            Category::Environmental => "environmental",
            Category::Compliance => "compliance",
            Category::DataGovernance => "data_governance",
            Category::Stakeholder => "stakeholder",
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Audit => "audit",
            Category::System => "system",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general" => Ok(Category::General),
            "integrity_violation" | "integrity-violation" => Ok(Category::IntegrityViolation),
            "environmental" => Ok(Category::Environmental),
            "compliance" => Ok(Category::Compliance),
            "data_governance" | "data-governance" => Ok(Category::DataGovernance),
            "stakeholder" => Ok(Category::Stakeholder),
            "security" => Ok(Category::Security),
            "performance" => Ok(Category::Performance),
            "audit" => Ok(Category::Audit),
            "system" => Ok(Category::System),
            _ => Err(format!("Invalid category: '{s}'")),
        }
    }
}

/// One value in the open metadata map attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Int(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Open metadata map carried on every entry.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single immutable log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique entry identifier, assigned at ingestion if absent.
    pub id: String,
    /// Severity.
    pub level: Level,
    /// Classification.
    pub category: Category,
    /// Free-text message.
    pub message: String,
    /// Open key/value metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    /// Creation timestamp, nanosecond resolution.
    pub timestamp: DateTime<Utc>,
    /// Optional trace correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Optional causal parent entry id. Lookup only, never ownership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Emitting component name.
    pub source: String,
    /// Content digest stamped at ingestion. Immutable afterwards.
    pub digest: Digest,
}

impl LogEntry {
    /// Recompute the digest from the identity fields.
    ///
    /// A pure function of (id, message, trace id, timestamp, level,
    /// category); equality with the stored digest means the entry is
    /// intact.
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

    /// Integrity check: recompute and compare. `false` means corruption.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.compute_digest() == self.digest
    }

    /// Rough in-memory size estimate, used for batch size accounting.
    #[must_use]
    pub fn approx_size_bytes(&self) -> usize {
        let metadata_bytes: usize = self
            .metadata
            .iter()
            .map(|(k, v)| k.len() + v.to_string().len())
            .sum();
        self.id.len()
            + self.message.len()
            + self.source.len()
            + self.trace_id.as_deref().map_or(0, str::len)
            + metadata_bytes
            + 64
    }
}

/// Draft of an entry before admission. Everything is optional except the
/// message; missing fields are filled in at ingestion time.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub id: Option<String>,
    pub level: Level,
    pub category: Category,
    pub message: String,
    pub metadata: Metadata,
    pub trace_id: Option<String>,
    pub parent_id: Option<String>,
    pub source: Option<String>,
}

impl NewEntry {
    #[must_use]
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        NewEntry {
            level,
            message: message.into(),
            ..NewEntry::default()
        }
    }

    #[must_use]
    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    #[must_use]
    pub fn parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Finalize the draft into an immutable entry, assigning id, timestamp
    /// and digest where missing.
    #[must_use]
    pub fn materialize(self, default_source: &str) -> LogEntry {
        let id = self
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let timestamp = Utc::now();
        let digest = entry_digest(
            &id,
            &self.message,
            self.trace_id.as_deref(),
            timestamp.timestamp_nanos_opt().unwrap_or_default(),
            self.level,
            self.category,
        );

        LogEntry {
            id,
            level: self.level,
            category: self.category,
            message: self.message,
            metadata: self.metadata,
            timestamp,
            trace_id: self.trace_id,
            parent_id: self.parent_id,
            source: self
                .source
                .unwrap_or_else(|| default_source.to_string()),
            digest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn materialized(level: Level, message: &str) -> LogEntry {
        NewEntry::new(level, message).materialize("test")
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
        assert!(Level::Error < Level::Critical);
        assert!(Level::Critical < Level::Fatal);
    }

    #[test]
    fn test_level_from_str_case_insensitive() {
        assert_eq!(Level::from_str("fatal").unwrap(), Level::Fatal);
        assert_eq!(Level::from_str("FATAL").unwrap(), Level::Fatal);
        assert_eq!(Level::from_str("WaRnInG").unwrap(), Level::Warning);
        assert_eq!(Level::from_str("warn").unwrap(), Level::Warning);
        assert!(Level::from_str("nope").is_err());
    }

    #[test]
    fn test_level_lenient_deserialize() {
        let level: Level = serde_json::from_value(serde_json::json!("critical")).unwrap();
        assert_eq!(level, Level::Critical);

        let level: Level = serde_json::from_value(serde_json::json!("bogus")).unwrap();
        assert_eq!(level, Level::Info);

        let level: Level = serde_json::from_value(serde_json::json!(3)).unwrap();
        assert_eq!(level, Level::Info);
    }

    #[test]
    fn test_level_serialize_uppercase() {
        let s = serde_json::to_string(&Level::Warning).unwrap();
        assert_eq!(s, "\"WARNING\"");
    }

    #[test]
    fn test_level_indexes_are_dense() {
        for (i, level) in Level::all().iter().enumerate() {
            assert_eq!(level.index(), i);
        }
    }

    #[test]
    fn test_category_round_trip() {
        for category in Category::all() {
            let s = serde_json::to_string(&category).unwrap();
            let back: Category = serde_json::from_str(&s).unwrap();
            assert_eq!(back, category);
        }
    }

    #[test]
    fn test_category_from_str_accepts_dashes() {
        assert_eq!(
            Category::from_str("integrity-violation").unwrap(),
            Category::IntegrityViolation
        );
        assert_eq!(
            Category::from_str("data_governance").unwrap(),
            Category::DataGovernance
        );
    }

    #[test]
    fn test_metadata_value_untagged_serde() {
        let m: Metadata = serde_json::from_str(
            r#"{"flag":true,"count":3,"ratio":0.5,"name":"batcher"}"#,
        )
        .unwrap();
        assert_eq!(m["flag"], MetadataValue::Bool(true));
        assert_eq!(m["count"], MetadataValue::Int(3));
        assert_eq!(m["ratio"], MetadataValue::Float(0.5));
        assert_eq!(m["name"], MetadataValue::Str("batcher".to_string()));
    }

    #[test]
    fn test_materialize_assigns_id_and_digest() {
        let entry = materialized(Level::Info, "hello");
        assert!(!entry.id.is_empty());
        assert!(!entry.digest.is_zero());
        assert_eq!(entry.source, "test");
        assert!(entry.verify());
    }

    #[test]
    fn test_materialize_keeps_explicit_id() {
        let mut draft = NewEntry::new(Level::Info, "hello");
        draft.id = Some("fixed-id".to_string());
        let entry = draft.materialize("test");
        assert_eq!(entry.id, "fixed-id");
        assert!(entry.verify());
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut entry = materialized(Level::Info, "original");
        assert!(entry.verify());

        entry.message = "tampered".to_string();
        assert!(!entry.verify());
    }

    #[test]
    fn test_digest_stable_across_calls() {
        let entry = materialized(Level::Error, "same fields");
        assert_eq!(entry.compute_digest(), entry.compute_digest());
    }

    #[test]
    fn test_entry_json_round_trip() {
        let entry = NewEntry::new(Level::Warning, "round trip")
            .category(Category::Security)
            .trace_id("trace-9")
            .metadata("attempts", 2i64)
            .materialize("test");

        let json = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, entry.id);
        assert_eq!(back.level, entry.level);
        assert_eq!(back.category, entry.category);
        assert_eq!(back.trace_id, entry.trace_id);
        assert_eq!(back.digest, entry.digest);
        assert!(back.verify());
    }
}
