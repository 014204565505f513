// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Abort handles for in-flight operations
//!
//! One controller cancels one operation. Each fetch attempt races the
//! caller's signal against the request deadline; whichever fires first
//! decides how the failure is reported. A deadline is scoped to its
//! attempt, so the same request can be sent again after a timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Error, Result};

/// Why an operation was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Cancelled by the caller
    Caller,
    /// Deadline exceeded
    Timeout(Duration),
}

impl AbortReason {
    fn into_error(self, url: &str) -> Error {
        match self {
            AbortReason::Caller => Error::Abort,
            AbortReason::Timeout(after) => {
                Error::timeout_with_url("fetch", after.as_millis() as u64, url)
            }
        }
    }
}

#[derive(Debug, Default)]
struct AbortState {
    reason: Mutex<Option<AbortReason>>,
    notify: Notify,
}

/// Handle that cancels exactly one operation
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    state: Arc<AbortState>,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal to attach to the request this controller cancels
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            state: Arc::clone(&self.state),
        }
    }

    /// Cancel the operation. Returns false if it was already aborted.
    pub fn abort(&self) -> bool {
        self.abort_with(AbortReason::Caller)
    }

    /// Abort with an explicit reason. The first reason wins.
    pub fn abort_with(&self, reason: AbortReason) -> bool {
        {
            let mut current = self.state.reason.lock();
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
        }
        self.state.notify.notify_waiters();
        true
    }

    pub fn is_aborted(&self) -> bool {
        self.state.reason.lock().is_some()
    }
}

/// Observer side of an [`AbortController`]
#[derive(Debug, Clone)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl AbortSignal {
    /// Reason of the abort, if it happened
    pub fn reason(&self) -> Option<AbortReason> {
        *self.state.reason.lock()
    }

    pub fn is_aborted(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolve once the operation is aborted
    pub async fn aborted(&self) -> AbortReason {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an abort between the check and
            // the await is not lost.
            notified.as_mut().enable();
            if let Some(reason) = self.reason() {
                return reason;
            }
            notified.await;
        }
    }
}

/// Run one fetch attempt under its abort signal and deadline.
///
/// A caller abort and the deadline race; the first one decides the error.
/// The deadline never aborts the caller's controller.
pub(crate) async fn guard<F, T>(
    operation: F,
    signal: Option<&AbortSignal>,
    timeout: Option<Duration>,
    url: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if let Some(reason) = signal.and_then(AbortSignal::reason) {
        return Err(reason.into_error(url));
    }

    let caller = async {
        match signal {
            Some(signal) => signal.aborted().await,
            None => futures::future::pending().await,
        }
    };
    let deadline = async {
        match timeout {
            Some(after) => {
                tokio::time::sleep(after).await;
                after
            }
            None => futures::future::pending().await,
        }
    };

    let reason = tokio::select! {
        biased;
        reason = caller => reason,
        result = operation => return result,
        after = deadline => AbortReason::Timeout(after),
    };
    Err(reason.into_error(url))
}
