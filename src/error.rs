// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Error types for Wayline
//!
//! A single error enum shared by every layer. Proxy failures keep their
//! machine-readable code, JSON body failures keep the byte counts needed to
//! tell a truncated response from a malformed one.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use thiserror::Error;

use crate::proxy::{ProxyErrorCode, ProxySocketError};

/// Result type alias for Wayline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Wayline
#[derive(Error, Debug)]
pub enum Error {
    /// Operation cancelled by its caller
    #[error("Request was aborted")]
    Abort,

    /// Deadline exceeded
    #[error("Operation timed out after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        url: Option<String>,
    },

    /// reqwest engine failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// hyper engine failure
    #[error("HTTP engine error: {0}")]
    Hyper(#[from] hyper::Error),

    /// Transport failure without a richer source
    #[error("Network error: {0}")]
    Network(String),

    /// Proxy tunnel failure
    #[error(transparent)]
    Proxy(#[from] ProxySocketError),

    /// Response body was not valid JSON
    #[error(transparent)]
    JsonParse(#[from] JsonParseError),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TLS setup or handshake failure
    #[error("TLS error: {0}")]
    Tls(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials could not be obtained
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// How a JSON body failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonErrorKind {
    /// Body ended in the middle of a value
    Truncated,
    /// Body is complete but not valid JSON
    Invalid,
}

impl fmt::Display for JsonErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonErrorKind::Truncated => write!(f, "Truncated"),
            JsonErrorKind::Invalid => write!(f, "Invalid"),
        }
    }
}

/// JSON body parse failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonParseError {
    pub kind: JsonErrorKind,
    pub message: String,
    /// Bytes actually received
    pub byte_length: usize,
    /// Content-Length announced by the server, if any
    pub content_length: Option<usize>,
}

impl fmt::Display for JsonParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} JSON response: {} (received {} bytes",
            self.kind, self.message, self.byte_length
        )?;
        if let Some(expected) = self.content_length {
            write!(f, ", content-length {}", expected)?;
        }
        write!(f, ")")
    }
}

impl StdError for JsonParseError {}

/// Connection failures that indicate a problem with the request in flight
/// rather than a stale pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    Http2GoAway,
    ConnectionReset,
    TimedOut,
    Http2InvalidSession,
}

impl Error {
    /// Create a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Error::Network(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Error::Timeout {
            operation: operation.into(),
            duration_ms,
            url: None,
        }
    }

    /// Create a timeout error with URL
    pub fn timeout_with_url(
        operation: impl Into<String>,
        duration_ms: u64,
        url: impl Into<String>,
    ) -> Self {
        Error::Timeout {
            operation: operation.into(),
            duration_ms,
            url: Some(url.into()),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Check if the caller cancelled the operation
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Abort)
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Http(e) => e.is_timeout(),
            Error::Proxy(e) => e.code() == ProxyErrorCode::Timeout,
            _ => false,
        }
    }

    /// Check if this is a proxy tunnel failure with the given code
    pub fn is_proxy_code(&self, code: ProxyErrorCode) -> bool {
        matches!(self, Error::Proxy(e) if e.code() == code)
    }

    /// Classify the failure as one of the in-flight connection failures.
    ///
    /// Walks the whole source chain: engines wrap I/O and HTTP/2 errors
    /// several layers deep.
    pub fn connection_failure(&self) -> Option<ConnectionFailure> {
        match self {
            Error::Timeout { .. } => return Some(ConnectionFailure::TimedOut),
            Error::Proxy(e) => {
                return match e.code() {
                    ProxyErrorCode::Timeout => Some(ConnectionFailure::TimedOut),
                    ProxyErrorCode::ConnectionReset => Some(ConnectionFailure::ConnectionReset),
                    _ => None,
                }
            }
            Error::Http(e) if e.is_timeout() => return Some(ConnectionFailure::TimedOut),
            _ => {}
        }

        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                match io_err.kind() {
                    io::ErrorKind::ConnectionReset => return Some(ConnectionFailure::ConnectionReset),
                    io::ErrorKind::TimedOut => return Some(ConnectionFailure::TimedOut),
                    _ => {}
                }
            }
            if let Some(kind) = classify_connection_message(err) {
                return Some(kind);
            }
            current = err.source();
        }
        None
    }
}

fn classify_connection_message(err: &(dyn StdError + 'static)) -> Option<ConnectionFailure> {
    let display = err.to_string().to_lowercase();
    // h2 only exposes GOAWAY frames through its Debug output
    let debug = format!("{:?}", err);

    if display.contains("goaway") || display.contains("go away") || debug.contains("GoAway") {
        Some(ConnectionFailure::Http2GoAway)
    } else if display.contains("invalid session") || display.contains("session is closed") {
        Some(ConnectionFailure::Http2InvalidSession)
    } else if display.contains("connection reset") {
        Some(ConnectionFailure::ConnectionReset)
    } else if display.contains("timed out") {
        Some(ConnectionFailure::TimedOut)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error() {
        let err = Error::timeout_with_url("fetch", 5000, "https://example.com");

        assert!(err.is_timeout());
        assert!(!err.is_abort());
        assert_eq!(err.connection_failure(), Some(ConnectionFailure::TimedOut));
    }

    #[test]
    fn test_io_reset_is_connection_failure() {
        let err = Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "peer hung up"));
        assert_eq!(err.connection_failure(), Some(ConnectionFailure::ConnectionReset));
    }

    #[test]
    fn test_goaway_message_is_connection_failure() {
        let err = Error::network("connection error received: GOAWAY frame");
        assert_eq!(err.connection_failure(), Some(ConnectionFailure::Http2GoAway));

        let err = Error::network("http2 invalid session");
        assert_eq!(err.connection_failure(), Some(ConnectionFailure::Http2InvalidSession));
    }

    #[test]
    fn test_other_failures_are_not_connection_failures() {
        assert_eq!(Error::Abort.connection_failure(), None);
        assert_eq!(Error::network("socket closed").connection_failure(), None);

        let proxy = ProxySocketError::new(ProxyErrorCode::StatusCode(407), "auth required");
        assert_eq!(Error::Proxy(proxy).connection_failure(), None);
    }

    #[test]
    fn test_json_error_display() {
        let err = JsonParseError {
            kind: JsonErrorKind::Truncated,
            message: "EOF while parsing an object".to_string(),
            byte_length: 12,
            content_length: Some(40),
        };
        let text = err.to_string();
        assert!(text.starts_with("Truncated"));
        assert!(text.contains("12 bytes"));
        assert!(text.contains("content-length 40"));
    }
}
