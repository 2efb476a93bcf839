/// Errors surfaced by the pipeline.
///
/// Only ingestion-path failures reach callers of `log`/`ingest`. Sink and
/// batching failures are retried on subsequent flush cycles and surfaced
/// through the error callback and statistics instead.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("corruption detected in {kind} {id}")]
    Corruption { kind: &'static str, id: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = VaultError::InvalidConfig("missing storage root".to_string());
        assert_eq!(
            error.to_string(),
            "invalid configuration: missing storage root"
        );
    }

    #[test]
    fn test_corruption_display() {
        let error = VaultError::Corruption {
            kind: "entry",
            id: "abc".to_string(),
        };
        assert_eq!(error.to_string(), "corruption detected in entry abc");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: VaultError = io.into();
        assert!(matches!(error, VaultError::Io(_)));
    }
}
