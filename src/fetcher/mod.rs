// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Fetchers
//!
//! A fetcher issues one request and hands back an immutable response.
//! Engines implement the trait directly; decorators such as
//! [`FallbackFetcher`] wrap other fetchers and are built by composition.

mod client;
mod engine;
mod fallback;

use async_trait::async_trait;

use crate::config::ProxySetting;
use crate::error::Result;
use crate::http::{AbortController, Request, Response};

pub use client::ReqwestFetcher;
pub use engine::EngineFetcher;
pub use fallback::{FallbackEvent, FallbackFetcher};

/// HTTP client capability
///
/// # Example
///
/// ```rust,no_run
/// use wayline::{Fetcher, Request};
///
/// async fn cancel_slow(fetcher: &dyn Fetcher) -> wayline::Result<()> {
///     let controller = fetcher.make_abort_controller();
///     let request = Request::get().signal(controller.signal());
///
///     let pending = fetcher.fetch("https://api.example.com/slow", request);
///     controller.abort();
///     assert!(pending.await.unwrap_err().is_abort());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Issue a request.
    ///
    /// Fails with `Error::Abort` when the request's signal fires and with
    /// `Error::Timeout` when its deadline passes first.
    async fn fetch(&self, url: &str, request: Request) -> Result<Response>;

    /// Handle whose `abort()` cancels the one request carrying its signal
    fn make_abort_controller(&self) -> AbortController {
        AbortController::new()
    }

    /// Drop every pooled connection.
    ///
    /// Requests already in flight keep the connections they hold and
    /// settle on their own.
    async fn disconnect_all(&self) -> Result<()>;

    fn proxy_settings(&self) -> Option<ProxySetting>;

    /// Replace the proxy for subsequent requests
    fn set_proxy_settings(&self, proxy: Option<ProxySetting>) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use super::*;
    use crate::error::Error;

    pub(crate) enum Step {
        Reply(Result<Response>),
        /// Block until the request's signal fires
        WaitForAbort,
    }

    /// Fetcher replaying a script of outcomes; answers 200 `{}` once the
    /// script runs out
    pub(crate) struct ScriptedFetcher {
        name: &'static str,
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<(String, Request)>>,
        disconnects: AtomicUsize,
        proxy: Mutex<Option<ProxySetting>>,
    }

    impl ScriptedFetcher {
        pub(crate) fn new(name: &'static str) -> Self {
            Self {
                name,
                steps: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
                disconnects: AtomicUsize::new(0),
                proxy: Mutex::new(None),
            }
        }

        pub(crate) fn reply(self, status: u16, body: Value) -> Self {
            self.push(Step::Reply(Ok(Response::synthetic(status, &body))))
        }

        pub(crate) fn fail(self, error: Error) -> Self {
            self.push(Step::Reply(Err(error)))
        }

        pub(crate) fn wait_for_abort(self) -> Self {
            self.push(Step::WaitForAbort)
        }

        fn push(self, step: Step) -> Self {
            self.steps.lock().push_back(step);
            self
        }

        pub(crate) fn calls(&self) -> Vec<(String, Request)> {
            self.calls.lock().clone()
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        pub(crate) fn disconnects(&self) -> usize {
            self.disconnects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, url: &str, request: Request) -> Result<Response> {
            self.calls.lock().push((url.to_string(), request.clone()));
            let step = self.steps.lock().pop_front();
            match step {
                Some(Step::Reply(result)) => result,
                Some(Step::WaitForAbort) => match request.signal {
                    Some(signal) => {
                        signal.aborted().await;
                        Err(Error::Abort)
                    }
                    None => futures::future::pending().await,
                },
                None => Ok(Response::synthetic(200, &json!({}))),
            }
        }

        async fn disconnect_all(&self) -> Result<()> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn proxy_settings(&self) -> Option<ProxySetting> {
            self.proxy.lock().clone()
        }

        fn set_proxy_settings(&self, proxy: Option<ProxySetting>) -> Result<()> {
            *self.proxy.lock() = proxy;
            Ok(())
        }
    }
}
