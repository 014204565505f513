// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Availability of a dependent remote service
//!
//! A four-state machine shared by every call site of one service. While
//! `Retrying`, a single background task probes the service on a squaring
//! backoff schedule (2, 4, 16, 256 seconds with the defaults) and moves the
//! state to `Connected` on the first healthy answer or to `Disabled` once
//! the schedule is exhausted.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wayline::{BackoffConfig, ConnectionState, Fetcher, FetcherProbe};
//!
//! fn watch(fetcher: Arc<dyn Fetcher>) -> Arc<ConnectionState> {
//!     let probe = Arc::new(FetcherProbe::new(fetcher, "https://api.example.com/_ping"));
//!     let state = ConnectionState::new(probe, &BackoffConfig::default());
//!
//!     let subscription = state.listen(|status| println!("service is now {:?}", status));
//!     state.enable_retry(Duration::from_secs(3));
//!     subscription.dispose();
//!     state
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::BackoffConfig;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::http::Request;

/// Timeout for a single reachability probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Availability of the dependent service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disabled,
    Connected,
    Disconnected,
    Retrying,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disabled => write!(f, "disabled"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Retrying => write!(f, "retrying"),
        }
    }
}

/// Health check against the dependent service
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// HTTP status of one probe; only 200 counts as healthy
    async fn probe(&self) -> Result<u16>;
}

/// Probe issuing a GET through a fetcher
pub struct FetcherProbe {
    fetcher: Arc<dyn Fetcher>,
    url: String,
}

impl FetcherProbe {
    pub fn new(fetcher: Arc<dyn Fetcher>, url: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReachabilityProbe for FetcherProbe {
    async fn probe(&self) -> Result<u16> {
        let response = self
            .fetcher
            .fetch(&self.url, Request::get().timeout(PROBE_TIMEOUT))
            .await?;
        Ok(response.status())
    }
}

/// Probe delays: `base`, then each delay squared while it stays within
/// `max_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    base_secs: u64,
    max_delay_secs: u64,
}

impl BackoffSchedule {
    pub fn new(base_secs: u64, max_delay_secs: u64) -> Self {
        Self {
            base_secs,
            max_delay_secs,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.base_secs, config.max_delay_secs)
    }

    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        // A base of 0 or 1 never grows
        if self.base_secs < 2 {
            return delays;
        }

        let mut delay = self.base_secs;
        while delay <= self.max_delay_secs {
            delays.push(Duration::from_secs(delay));
            delay = match delay.checked_mul(delay) {
                Some(next) => next,
                None => break,
            };
        }
        delays
    }

    /// Cap on the attempt counter: `ln(max_delay) / ln(base) / base`
    pub fn max_attempts(&self) -> u32 {
        if self.base_secs < 2 || self.max_delay_secs < 2 {
            return 0;
        }
        let base = self.base_secs as f64;
        ((self.max_delay_secs as f64).ln() / base.ln() / base).floor() as u32
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

type Listener = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

struct Inner {
    status: ConnectionStatus,
    initial_wait: bool,
    attempts: u32,
    /// Identifies the current probe loop; older loops stop on mismatch
    generation: u64,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

/// Shared availability state of one dependent service
pub struct ConnectionState {
    inner: Mutex<Inner>,
    schedule: BackoffSchedule,
    initial_delay: Duration,
    rate_limit_delay: Duration,
    probe: Arc<dyn ReachabilityProbe>,
}

impl ConnectionState {
    /// New state machine, starting `Disabled`
    pub fn new(probe: Arc<dyn ReachabilityProbe>, backoff: &BackoffConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                status: ConnectionStatus::Disabled,
                initial_wait: false,
                attempts: 0,
                generation: 0,
                listeners: Vec::new(),
                next_listener_id: 0,
            }),
            schedule: BackoffSchedule::from_config(backoff),
            initial_delay: backoff.initial_delay(),
            rate_limit_delay: backoff.rate_limit_delay(),
            probe,
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn is_disconnected(&self) -> bool {
        self.status() == ConnectionStatus::Disconnected
    }

    pub fn is_retrying(&self) -> bool {
        self.status() == ConnectionStatus::Retrying
    }

    pub fn is_disabled(&self) -> bool {
        self.status() == ConnectionStatus::Disabled
    }

    /// True between `enable_retry` and the end of its initial delay
    pub fn is_initial_wait(&self) -> bool {
        self.inner.lock().initial_wait
    }

    pub fn retry_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    pub fn schedule(&self) -> BackoffSchedule {
        self.schedule
    }

    /// Initial delay for ordinary failures
    pub fn default_initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Initial delay after a rate limit
    pub fn rate_limit_delay(&self) -> Duration {
        self.rate_limit_delay
    }

    pub fn set_connected(&self) {
        self.transition(ConnectionStatus::Connected, |inner| {
            inner.initial_wait = false;
            inner.attempts = 0;
        });
    }

    pub fn set_disconnected(&self) {
        self.transition(ConnectionStatus::Disconnected, |_| {});
    }

    pub fn set_disabled(&self) {
        self.transition(ConnectionStatus::Disabled, |_| {});
    }

    /// Enter `Retrying` and start the probe loop after `initial_delay`.
    ///
    /// No-op while already retrying. Returns whether a loop was started.
    pub fn enable_retry(self: &Arc<Self>, initial_delay: Duration) -> bool {
        let mut generation = 0;
        let started = self.transition(ConnectionStatus::Retrying, |inner| {
            inner.initial_wait = true;
            inner.attempts = 0;
            inner.generation += 1;
            generation = inner.generation;
        });
        if !started {
            debug!("Retry already in progress");
            return false;
        }

        info!(initial_delay_ms = initial_delay.as_millis() as u64, "Scheduling reconnection probes");
        tokio::spawn(Arc::clone(self).probe_loop(generation, initial_delay));
        true
    }

    /// Register a listener fired on every status change
    pub fn listen<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.push((id, Arc::new(listener)));

        Subscription {
            state: Arc::downgrade(self),
            id,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Change status and notify listeners in subscription order. Listeners
    /// run after the lock is released and only if the status changed.
    fn transition<F>(&self, status: ConnectionStatus, update: F) -> bool
    where
        F: FnOnce(&mut Inner),
    {
        let listeners: Vec<Listener> = {
            let mut inner = self.inner.lock();
            if inner.status == status {
                return false;
            }
            debug!(from = %inner.status, to = %status, "Connection status changed");
            inner.status = status;
            update(&mut inner);
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in listeners {
            listener(status);
        }
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        let inner = self.inner.lock();
        inner.generation == generation && inner.status == ConnectionStatus::Retrying
    }

    async fn probe_loop(self: Arc<Self>, generation: u64, initial_delay: Duration) {
        tokio::time::sleep(initial_delay).await;
        {
            let mut inner = self.inner.lock();
            if inner.generation == generation {
                inner.initial_wait = false;
            }
        }

        let max_attempts = self.schedule.max_attempts();
        for delay in self.schedule.delays() {
            tokio::time::sleep(delay).await;
            if !self.is_current(generation) {
                debug!("Status changed, stopping reconnection probes");
                return;
            }

            let attempt = {
                let mut inner = self.inner.lock();
                inner.attempts = (inner.attempts + 1).min(max_attempts);
                inner.attempts
            };

            match self.probe.probe().await {
                Ok(200) => {
                    if self.is_current(generation) {
                        info!(attempt, "Service reachable again");
                        self.set_connected();
                    }
                    return;
                }
                Ok(status) => debug!(attempt, status, "Service still unreachable"),
                Err(e) => debug!(attempt, error = %e, "Reachability probe failed"),
            }
        }

        if self.is_current(generation) {
            warn!("Reconnection probes exhausted, disabling");
            self.set_disabled();
        }
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ConnectionState")
            .field("status", &inner.status)
            .field("initial_wait", &inner.initial_wait)
            .field("attempts", &inner.attempts)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

/// Handle removing one listener
#[derive(Debug)]
pub struct Subscription {
    state: Weak<ConnectionState>,
    id: u64,
    disposed: AtomicBool,
}

impl Subscription {
    /// Remove the listener; later calls do nothing
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            state.inner.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
