//! Unified error types for the hostlink workspace.
//!
//! Every crate reports failures through [`HostlinkError`]. The first three
//! variants form the reporting taxonomy surfaced by `report_event`; the rest
//! cover configuration, event files, and stream decoding.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HostlinkError {
    /// A connection to the analysis host could not be opened.
    #[error("endpoint unreachable: {endpoint}: {source}")]
    TransportUnavailable {
        /// `host:port` of the endpoint that refused or failed.
        endpoint: String,
        /// Underlying connect error.
        source: std::io::Error,
    },

    /// A value or document cannot be represented in the wire format.
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of the value that failed to encode.
        message: String,
    },

    /// A send on an established connection failed.
    #[error("write failure on connection for pid {pid}: {source}")]
    WriteFailure {
        /// Process whose connection broke.
        pid: u32,
        /// Underlying write error.
        source: std::io::Error,
    },

    /// The byte stream read from a peer does not follow the protocol.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation on a local file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl HostlinkError {
    /// Builds an [`HostlinkError::Encoding`] from any displayable message.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Builds a [`HostlinkError::Protocol`] from any displayable message.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` when the error means the connection can no longer be used.
    #[must_use]
    pub const fn is_write_failure(&self) -> bool {
        matches!(self, Self::WriteFailure { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HostlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_unavailable_names_the_endpoint() {
        let err = HostlinkError::TransportUnavailable {
            endpoint: "10.0.0.1:2042".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("endpoint unreachable: 10.0.0.1:2042"));
    }

    #[test]
    fn only_write_failures_invalidate() {
        let write = HostlinkError::WriteFailure {
            pid: 7,
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        };
        assert!(write.is_write_failure());
        assert!(!HostlinkError::encoding("bad").is_write_failure());
    }
}
