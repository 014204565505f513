// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Proxy socket errors and their stable codes

use std::fmt;
use std::io;

use lazy_static::lazy_static;
use regex::Regex;

/// Machine-readable proxy failure code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyErrorCode {
    /// Proxy answered CONNECT with a non-200 status
    StatusCode(u16),
    Timeout,
    NonEmptyResponseBody,
    FailedToEstablishSocketConnection,
    InitializeSecurityContext,
    KerberosServerNotFound,
    GssFailureNoKerberosCredentialsAvailable,
    ConnectionRefused,
    ConnectionReset,
    HostNotFound,
    MalformedResponse,
    Unknown,
}

impl fmt::Display for ProxyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyErrorCode::StatusCode(code) => write!(f, "ProxyStatusCode{}", code),
            ProxyErrorCode::Timeout => write!(f, "ProxyTimeout"),
            ProxyErrorCode::NonEmptyResponseBody => write!(f, "ProxyNonEmptyResponseBody"),
            ProxyErrorCode::FailedToEstablishSocketConnection => {
                write!(f, "ProxyFailedToEstablishSocketConnection")
            }
            ProxyErrorCode::InitializeSecurityContext => write!(f, "ProxyInitializeSecurityContext"),
            ProxyErrorCode::KerberosServerNotFound => write!(f, "ProxyKerberosServerNotFound"),
            ProxyErrorCode::GssFailureNoKerberosCredentialsAvailable => {
                write!(f, "ProxyGSSFailureNoKerberosCredentialsAvailable")
            }
            ProxyErrorCode::ConnectionRefused => write!(f, "ProxyConnectionRefused"),
            ProxyErrorCode::ConnectionReset => write!(f, "ProxyConnectionReset"),
            ProxyErrorCode::HostNotFound => write!(f, "ProxyHostNotFound"),
            ProxyErrorCode::MalformedResponse => write!(f, "ProxyMalformedResponse"),
            ProxyErrorCode::Unknown => write!(f, "Unknown"),
        }
    }
}

lazy_static! {
    /// Known upstream failure messages, checked in order
    static ref MESSAGE_CODES: Vec<(Regex, ProxyErrorCode)> = vec![
        (
            Regex::new(r"(?i)failed to establish a socket connection to prox").unwrap(),
            ProxyErrorCode::FailedToEstablishSocketConnection,
        ),
        (
            Regex::new(r"InitializeSecurityContext").unwrap(),
            ProxyErrorCode::InitializeSecurityContext,
        ),
        (
            Regex::new(r"(?i)server not found in kerberos database").unwrap(),
            ProxyErrorCode::KerberosServerNotFound,
        ),
        (
            Regex::new(r"(?i)no kerberos credentials available|no credentials were supplied|credentials cache( file)? '?[^']*'? not found").unwrap(),
            ProxyErrorCode::GssFailureNoKerberosCredentialsAvailable,
        ),
        (
            Regex::new(r"(?i)connection refused|ECONNREFUSED").unwrap(),
            ProxyErrorCode::ConnectionRefused,
        ),
        (
            Regex::new(r"(?i)connection reset|ECONNRESET").unwrap(),
            ProxyErrorCode::ConnectionReset,
        ),
        (
            Regex::new(r"(?i)failed to lookup address|name or service not known|nodename nor servname|no such host|ENOTFOUND").unwrap(),
            ProxyErrorCode::HostNotFound,
        ),
    ];
}

/// Map an upstream failure message to a proxy code.
///
/// Messages that match nothing in the table are `Unknown`.
pub fn classify_message(message: &str) -> ProxyErrorCode {
    MESSAGE_CODES
        .iter()
        .find(|(pattern, _)| pattern.is_match(message))
        .map(|(_, code)| *code)
        .unwrap_or(ProxyErrorCode::Unknown)
}

/// Failure to obtain a socket through a proxy. The code never changes
/// after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySocketError {
    code: ProxyErrorCode,
    message: String,
}

impl ProxySocketError {
    /// Create an error with an explicit code
    pub fn new(code: ProxyErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create an error whose code is derived from the message
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: classify_message(&message),
            message,
        }
    }

    /// Create an error from a socket failure, preferring the I/O kind
    pub fn from_io(err: &io::Error, context: &str) -> Self {
        let code = match err.kind() {
            io::ErrorKind::ConnectionRefused => ProxyErrorCode::ConnectionRefused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                ProxyErrorCode::ConnectionReset
            }
            io::ErrorKind::TimedOut => ProxyErrorCode::Timeout,
            _ => classify_message(&err.to_string()),
        };
        Self::new(code, format!("{}: {}", context, err))
    }

    pub fn code(&self) -> ProxyErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check for a CONNECT status failure with the given status
    pub fn is_status(&self, status: u16) -> bool {
        self.code == ProxyErrorCode::StatusCode(status)
    }
}

impl fmt::Display for ProxySocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProxySocketError {}
