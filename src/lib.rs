// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! # Wayline - Resilient HTTP Transport
//!
//! Network transport for agents that must reach their backends through
//! hostile corporate networks: authenticating proxies, TLS interception
//! appliances, flaky links and backends that go away for a while.
//!
//! ## Features
//!
//! - Pluggable fetchers: one `Fetcher` trait, composed by construction
//! - Manual HTTP CONNECT tunneling with Basic proxy credentials
//! - Kerberos (Negotiate) proxy authentication with an authorization cache
//! - Trust-store injection re-evaluated on every connection attempt
//! - Primary/secondary fallback fetcher with an exempt backend
//! - Availability state machine with a squaring backoff probe
//! - Request helpers: disconnect-and-retry POST, classified RPC calls
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wayline::{EngineFetcher, Fetcher, NetworkConfig, Request, StaticTrustStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetworkConfig::from_env()?;
//!     let fetcher = EngineFetcher::new(&config, Arc::new(StaticTrustStore::empty()))?;
//!
//!     let response = fetcher.fetch("https://example.com", Request::get()).await?;
//!     println!("{} {}", response.status(), response.status_text());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod availability;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod proxy;
pub mod telemetry;
pub mod tls;

// Re-exports for convenience

// Configuration
pub use config::{BackoffConfig, EditorInfo, NetworkConfig, ProxySetting};

// Errors
pub use error::{ConnectionFailure, Error, JsonErrorKind, JsonParseError, Result};

// HTTP values
pub use http::{AbortController, AbortReason, AbortSignal, Method, Request, RequestBody, Response};

// Fetchers
pub use fetcher::{EngineFetcher, FallbackEvent, FallbackFetcher, Fetcher, ReqwestFetcher};

// Proxy sockets
pub use proxy::{
    AuthorizationCache, ConnectOptions, KerberosClient, KerberosProvider, KerberosSocketFactory,
    ProxyErrorCode, ProxySocketError, RequestOptions, SocketFactory, TunnelingSocketFactory,
};

// Trust material
pub use tls::{CertificateInjector, StaticTrustStore, TrustStore};

// Availability
pub use availability::{
    BackoffSchedule, ConnectionState, ConnectionStatus, FetcherProbe, ReachabilityProbe,
    Subscription,
};

// Request helpers
pub use api::{CallFailure, CallOptions, CallOutcome, ErrorReason, PostClient, PostOptions, RpcClient};

// Credentials
pub use auth::{StaticTokenProvider, Token, TokenProvider};

// Telemetry
pub use telemetry::{MetricsReport, NetworkMetrics, NoopTelemetry, Telemetry, TracingTelemetry};

/// Wayline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
