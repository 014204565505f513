// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Proxy socket layer
//!
//! Socket factories hand the HTTP engine a connected TCP stream for a
//! target host. Factories compose by wrapping: the Kerberos factory wraps
//! the tunneling factory and retries it once with Negotiate credentials.

mod error;
mod kerberos;
mod tunnel;

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::ProxySetting;

pub use error::{classify_message, ProxyErrorCode, ProxySocketError};
pub use kerberos::{
    service_principal_name, AuthorizationCache, KerberosClient, KerberosError, KerberosProvider,
    KerberosSocketFactory,
};
pub use tunnel::TunnelingSocketFactory;

/// Per-attempt connection request from the HTTP engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Target host
    pub host: String,
    /// Target port
    pub port: u16,
    /// Extra `Proxy-Authorization` value sent after any Basic credential
    pub proxy_authorization: Option<String>,
    /// Connect timeout
    pub timeout: Option<Duration>,
    /// Local address to bind before connecting
    pub local_address: Option<IpAddr>,
    /// Trusted root certificates (PEM) installed for this attempt
    pub ca: Option<Vec<String>>,
}

impl RequestOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn proxy_authorization(mut self, value: impl Into<String>) -> Self {
        self.proxy_authorization = Some(value.into());
        self
    }

    /// `host:port` of the target; IPv6 literals are bracketed
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Options for one CONNECT exchange with a proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub proxy_host: String,
    pub proxy_port: u16,
    /// CONNECT request target, `host:port`
    pub path: String,
    /// `Proxy-Authorization` values in send order
    pub proxy_authorization: Vec<String>,
    pub timeout: Option<Duration>,
    pub local_address: Option<IpAddr>,
}

impl ConnectOptions {
    /// Derive the CONNECT options for one attempt.
    ///
    /// Basic credentials come first; a caller-supplied value (Negotiate)
    /// is appended rather than replacing them.
    pub fn new(request: &RequestOptions, proxy: &ProxySetting) -> Self {
        let mut proxy_authorization = Vec::new();
        if let Some(ref auth) = proxy.proxy_auth {
            proxy_authorization.push(format!("Basic {}", auth));
        }
        if let Some(ref value) = request.proxy_authorization {
            proxy_authorization.push(value.clone());
        }

        Self {
            proxy_host: proxy.host.clone(),
            proxy_port: proxy.port,
            path: request.authority(),
            proxy_authorization,
            timeout: request.timeout.or_else(|| proxy.timeout()),
            local_address: request.local_address,
        }
    }

    /// Serialized CONNECT request head
    pub fn request_head(&self) -> String {
        let mut head = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", self.path, self.path);
        for value in &self.proxy_authorization {
            head.push_str("Proxy-Authorization: ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head
    }
}

/// Source of connected sockets for a target host reached through a proxy
#[async_trait]
pub trait SocketFactory: Send + Sync {
    /// Open a socket to `request.host:request.port` through `proxy`.
    ///
    /// The returned stream is ready for the caller's TLS handshake.
    async fn create_socket(
        &self,
        request: &RequestOptions,
        proxy: &ProxySetting,
    ) -> Result<TcpStream, ProxySocketError>;
}
