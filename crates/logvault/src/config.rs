//! Pipeline configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::entry::Level;
use crate::error::VaultError;

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BATCH_SIZE: usize = 1000;
const DEFAULT_FLUSH_THRESHOLD: usize = 100;
const DEFAULT_MAX_QUEUE_ENTRIES: usize = 50_000;
const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const DEFAULT_MAX_LOCAL_SIZE_BYTES: u64 = 1024 * 1024 * 1024;
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Configuration for the audit pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for persisted batch records. Created if absent.
    pub storage_root: PathBuf,
    /// Identifier stamped on entries with no explicit source.
    pub node_name: String,
    /// Periodic flush interval.
    pub flush_interval: Duration,
    /// Maximum entries per batch.
    pub max_batch_size: usize,
    /// Queue depth that triggers an early flush.
    pub flush_threshold: usize,
    /// Admission queue capacity before oldest-entry eviction.
    pub max_queue_entries: usize,
    /// Entries below this severity are dropped at ingestion unless audit
    /// mode is on.
    pub min_level: Level,
    /// Ingest everything regardless of level and flush synchronously after
    /// every ingestion. Maximum durability, minimum throughput.
    pub audit_mode: bool,
    /// Compress persisted batch records with zstd.
    pub compress: bool,
    /// zstd compression level.
    pub compression_level: i32,
    /// At-rest encryption. Recognized but not supported by this build;
    /// validation rejects it rather than pretending.
    pub encrypt_at_rest: bool,
    /// Age after which persisted records become sweep-eligible.
    pub retention: Duration,
    /// Total persisted size the sweep keeps the storage root under.
    pub max_local_size_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_root: PathBuf::from("logvault-data"),
            node_name: "logvault".to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            max_queue_entries: DEFAULT_MAX_QUEUE_ENTRIES,
            min_level: Level::Debug,
            audit_mode: false,
            compress: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            encrypt_at_rest: false,
            retention: DEFAULT_RETENTION,
            max_local_size_bytes: DEFAULT_MAX_LOCAL_SIZE_BYTES,
        }
    }
}

impl Config {
    /// Build a configuration from `LOGVAULT_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Config, VaultError> {
        let defaults = Config::default();

        let storage_root = env::var("LOGVAULT_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_root);
        let node_name = env::var("LOGVAULT_NODE_NAME").unwrap_or(defaults.node_name);
        let flush_interval = env::var("LOGVAULT_FLUSH_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.flush_interval);
        let max_batch_size = env::var("LOGVAULT_MAX_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_batch_size);
        let flush_threshold = env::var("LOGVAULT_FLUSH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.flush_threshold);
        let max_queue_entries = env::var("LOGVAULT_MAX_QUEUE_ENTRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_queue_entries);
        let min_level = env::var("LOGVAULT_MIN_LEVEL")
            .ok()
            .and_then(|v| Level::from_str(&v).ok())
            .unwrap_or(defaults.min_level);
        let audit_mode = env::var("LOGVAULT_AUDIT_MODE")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(defaults.audit_mode);
        let compress = env::var("LOGVAULT_COMPRESS")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(defaults.compress);
        let compression_level = env::var("LOGVAULT_COMPRESSION_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.compression_level);
        let encrypt_at_rest = env::var("LOGVAULT_ENCRYPT_AT_REST")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(defaults.encrypt_at_rest);
        let retention = env::var("LOGVAULT_RETENTION_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.retention);
        let max_local_size_bytes = env::var("LOGVAULT_MAX_LOCAL_SIZE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_local_size_bytes);

        let config = Config {
            storage_root,
            node_name,
            flush_interval,
            max_batch_size,
            flush_threshold,
            max_queue_entries,
            min_level,
            audit_mode,
            compress,
            compression_level,
            encrypt_at_rest,
            retention,
            max_local_size_bytes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(VaultError::InvalidConfig(
                "storage root must not be empty".to_string(),
            ));
        }
        if self.node_name.trim().is_empty() {
            return Err(VaultError::InvalidConfig(
                "node name must not be empty".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(VaultError::InvalidConfig(
                "max batch size must be greater than 0".to_string(),
            ));
        }
        if self.flush_threshold == 0 {
            return Err(VaultError::InvalidConfig(
                "flush threshold must be greater than 0".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(VaultError::InvalidConfig(
                "flush interval must be greater than 0".to_string(),
            ));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(VaultError::InvalidConfig(format!(
                "compression level {} outside the valid range 1..=22",
                self.compression_level
            )));
        }
        if self.encrypt_at_rest {
            return Err(VaultError::InvalidConfig(
                "at-rest encryption is not supported by this build".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let config = Config {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_threshold() {
        let config = Config {
            flush_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_interval() {
        let config = Config {
            flush_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_storage_root() {
        let config = Config {
            storage_root: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_node_name() {
        let config = Config {
            node_name: "   ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_compression_level_range() {
        for level in [1, 3, 22] {
            let config = Config {
                compression_level: level,
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "level {level} should be valid");
        }
        for level in [0, 23, -1] {
            let config = Config {
                compression_level: level,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "level {level} should be invalid");
        }
    }

    #[test]
    fn test_validate_rejects_encrypt_at_rest() {
        let config = Config {
            encrypt_at_rest: true,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }
}
