//! Error types for the request runner.
//!
//! # Design
//! Every failure is terminal for the call. Transport failures keep the
//! underlying hyper or I/O error as their source, and a failing path source
//! keeps its `io::ErrorKind` so callers can tell "not found" apart from other
//! filesystem problems. `Timeout` is synthesized locally and reports status
//! 408.

use std::io;

use thiserror::Error;

/// Errors delivered by `RequestRunner`.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening the TCP connection failed (refused, unreachable, DNS).
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// The HTTP exchange failed after the connection was established.
    #[error("transport error: {0}")]
    Transport(#[source] hyper::Error),

    /// No bytes moved on the connection for the configured idle timeout.
    #[error("Request Timeout")]
    Timeout,

    /// A path source could not be stat'ed or opened.
    #[error("source unavailable: {0}")]
    Source(#[source] io::Error),

    /// The destination sink could not be opened or failed while writing.
    #[error("destination write failed: {0}")]
    Destination(#[source] io::Error),

    /// The request could not be assembled from the given options.
    #[error("invalid request: {0}")]
    InvalidRequest(#[source] http::Error),

    /// A structured body could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl Error {
    /// HTTP status attached to locally synthesized errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Timeout => Some(408),
            _ => None,
        }
    }

    /// Kind of the underlying I/O error, if there is one.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Connect(e) | Error::Source(e) | Error::Destination(e) => Some(e.kind()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::NotFound)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_reads_like_a_408() {
        let err = Error::Timeout;
        assert_eq!(err.to_string(), "Request Timeout");
        assert_eq!(err.status(), Some(408));
        assert!(err.is_timeout());
    }

    #[test]
    fn source_error_keeps_its_kind() {
        let err = Error::Source(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(err.is_not_found());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn destination_error_is_not_a_missing_source() {
        let err = Error::Destination(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(!err.is_not_found());
        assert_eq!(err.io_kind(), Some(io::ErrorKind::PermissionDenied));
    }
}
