// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Transport telemetry
//!
//! Named events are fire-and-forget callbacks: the transport never reads
//! anything back from them. `NetworkMetrics` turns the same events plus
//! per-request outcomes into counters for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Event names emitted by the transport
pub mod events {
    /// The secondary fetcher answered after the primary failed
    pub const FALLBACK_USED: &str = "networking.fallbackUsed";
    /// Pooled connections were dropped before a retry
    pub const DISCONNECT_ALL: &str = "networking.disconnectAll";
    /// A caller cancelled a request in flight
    pub const CANCEL_REQUEST: &str = "networking.cancelRequest";
    /// A proxy accepted Kerberos credentials
    pub const PROXY_AUTHORIZED: &str = "proxy.authorized";
}

/// Sink for named telemetry events
pub trait Telemetry: Send + Sync {
    fn event(&self, name: &str, properties: &[(&str, String)]);
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn event(&self, _name: &str, _properties: &[(&str, String)]) {}
}

/// Logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn event(&self, name: &str, properties: &[(&str, String)]) {
        let properties = properties
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(" ");
        info!(event = name, properties = %properties, "Telemetry event");
    }
}

/// Counters for transport activity
#[derive(Debug)]
pub struct NetworkMetrics {
    requests: AtomicU64,
    failures: AtomicU64,
    fallbacks: AtomicU64,
    disconnect_retries: AtomicU64,
    cancellations: AtomicU64,
    proxy_authorizations: AtomicU64,
    start_time: RwLock<Instant>,
    /// Request latencies for percentile calculation
    request_latencies: RwLock<Vec<u64>>,
}

/// Snapshot of `NetworkMetrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub uptime_secs: u64,
    pub requests: u64,
    pub failures: u64,
    pub fallbacks: u64,
    pub disconnect_retries: u64,
    pub cancellations: u64,
    pub proxy_authorizations: u64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,
}

impl Default for NetworkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            disconnect_retries: AtomicU64::new(0),
            cancellations: AtomicU64::new(0),
            proxy_authorizations: AtomicU64::new(0),
            start_time: RwLock::new(Instant::now()),
            request_latencies: RwLock::new(Vec::new()),
        }
    }

    /// Record one completed fetch
    pub fn record_request(&self, latency_ms: u64, success: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        let mut latencies = self.request_latencies.write();
        latencies.push(latency_ms);

        // Keep only last 10000 latencies
        if latencies.len() > 10000 {
            latencies.drain(0..5000);
        }
    }

    pub fn report(&self) -> MetricsReport {
        let (p50, p95, p99) = calculate_percentiles(&self.request_latencies.read());

        MetricsReport {
            uptime_secs: self.start_time.read().elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            disconnect_retries: self.disconnect_retries.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            proxy_authorizations: self.proxy_authorizations.load(Ordering::Relaxed),
            latency_p50_ms: p50,
            latency_p95_ms: p95,
            latency_p99_ms: p99,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.requests,
            &self.failures,
            &self.fallbacks,
            &self.disconnect_retries,
            &self.cancellations,
            &self.proxy_authorizations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.start_time.write() = Instant::now();
        self.request_latencies.write().clear();
    }
}

impl Telemetry for NetworkMetrics {
    fn event(&self, name: &str, _properties: &[(&str, String)]) {
        let counter = match name {
            events::FALLBACK_USED => &self.fallbacks,
            events::DISCONNECT_ALL => &self.disconnect_retries,
            events::CANCEL_REQUEST => &self.cancellations,
            events::PROXY_AUTHORIZED => &self.proxy_authorizations,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Nearest-rank percentiles
fn calculate_percentiles(latencies: &[u64]) -> (u64, u64, u64) {
    if latencies.is_empty() {
        return (0, 0, 0);
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let rank = |p: f64| {
        let index = (p * sorted.len() as f64).ceil() as usize;
        sorted[index.saturating_sub(1).min(sorted.len() - 1)]
    };

    (rank(0.50), rank(0.95), rank(0.99))
}
