//! Error types for detector adapters, storage sinks, and configuration.
//!
//! The emission controller itself never fails; every error here belongs to a
//! collaborator on either side of it.

use thiserror::Error;

/// Failure reading a count from a detector adapter.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The detector could not be started (missing binary, spawn failure).
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    /// The detector is running but has not produced a count yet.
    #[error("no count available yet")]
    NotReady,

    /// The detector produced something that is not a non-negative integer.
    #[error("malformed detector output: {0:?}")]
    Malformed(String),

    /// The replay input has no more samples.
    #[error("sample stream exhausted")]
    Exhausted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure handing a batch to a storage sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The store answered, but refused the write.
    #[error("store rejected write (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The request never got a response (DNS, connect, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The sink was already closed.
    #[error("sink is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Invalid configuration, reported before the sampling loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration {0:?} (expected e.g. \"500ms\", \"5s\", \"10m\", \"1h\")")]
    Duration(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {field}: {value:?}")]
    Invalid { field: &'static str, value: String },

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_includes_status_and_body() {
        let e = SinkError::Rejected {
            status: 401,
            body: "unauthorized access".to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("unauthorized access"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::other("disk full");
        let e: SinkError = io.into();
        assert!(matches!(e, SinkError::Io(_)));
        assert_eq!(e.to_string(), "disk full");
    }

    #[test]
    fn duration_error_quotes_input() {
        let e = ConfigError::Duration("5 parsecs".to_string());
        assert!(e.to_string().contains("\"5 parsecs\""));
    }
}
