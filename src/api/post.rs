// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Authenticated POST with one disconnect-and-retry

use std::sync::Arc;
use std::time::Duration;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use super::{identify, new_request_id};
use crate::config::EditorInfo;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::http::{headers, AbortSignal, Request, RequestBody, Response};
use crate::telemetry::{events, NoopTelemetry, Telemetry};

/// Options for one POST
#[derive(Debug, Clone)]
pub struct PostOptions {
    /// Bearer token
    pub token: String,
    pub body: RequestBody,
    /// Value of `X-Request-Intent`
    pub intent: Option<String>,
    /// Generated when absent; shared by the retry
    pub request_id: Option<String>,
    /// External cancellation
    pub cancel: Option<AbortSignal>,
    pub timeout: Option<Duration>,
    pub extra_headers: HeaderMap,
}

impl PostOptions {
    pub fn new(token: impl Into<String>, body: Value) -> Self {
        Self {
            token: token.into(),
            body: RequestBody::Json(body),
            intent: None,
            request_id: None,
            cancel: None,
            timeout: None,
            extra_headers: HeaderMap::new(),
        }
    }

    pub fn intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn cancel(mut self, signal: AbortSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add a header; invalid names or values are ignored
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.extra_headers.insert(name, value);
        }
        self
    }
}

/// POST helper adding session headers and recovering from stale
/// connections
pub struct PostClient {
    fetcher: Arc<dyn Fetcher>,
    editor: EditorInfo,
    telemetry: Arc<dyn Telemetry>,
}

impl PostClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, editor: EditorInfo) -> Self {
        Self {
            fetcher,
            editor,
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// POST `options.body` to `url`.
    ///
    /// A first failure that is neither a cancellation nor one of the
    /// in-flight connection failures (HTTP/2 GOAWAY, reset, timeout,
    /// invalid HTTP/2 session) drops all pooled connections and retries
    /// once.
    pub async fn post_request(&self, url: &str, options: PostOptions) -> Result<Response> {
        let request_id = options.request_id.clone().unwrap_or_else(new_request_id);

        let err = match self.attempt(url, &options, &request_id).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        if err.is_abort() {
            return Err(err);
        }
        if let Some(failure) = err.connection_failure() {
            debug!(url = %url, failure = ?failure, "Request failed in flight, not retrying");
            return Err(err);
        }

        warn!(url = %url, request_id = %request_id, error = %err, "Request failed, reconnecting and retrying");
        self.telemetry.event(
            events::DISCONNECT_ALL,
            &[("url", url.to_string()), ("error", err.to_string())],
        );
        self.fetcher.disconnect_all().await?;
        self.attempt(url, &options, &request_id).await
    }

    async fn attempt(&self, url: &str, options: &PostOptions, request_id: &str) -> Result<Response> {
        let controller = self.fetcher.make_abort_controller();

        let mut request = identify(Request::post(), &options.token, &self.editor, request_id)
            .with_body(Some(options.body.clone()))
            .signal(controller.signal());
        if let Some(ref intent) = options.intent {
            request = request.header(headers::REQUEST_INTENT, intent);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        let request = request.extend_headers(&options.extra_headers);

        // Forward external cancellation to this attempt's controller
        let forward = options.cancel.clone().map(|cancel| {
            let controller = controller.clone();
            let telemetry = self.telemetry.clone();
            let url = url.to_string();
            tokio::spawn(async move {
                cancel.aborted().await;
                if controller.abort() {
                    debug!(url = %url, "Request cancelled");
                    telemetry.event(events::CANCEL_REQUEST, &[("url", url)]);
                }
            })
        });
        if options.cancel.as_ref().is_some_and(AbortSignal::is_aborted) {
            controller.abort();
        }

        let result = self.fetcher.fetch(url, request).await;
        if let Some(task) = forward {
            task.abort();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fetcher::testing::ScriptedFetcher;
    use crate::http::AbortController;
    use crate::telemetry::NetworkMetrics;
    use serde_json::json;
    use std::io;

    fn editor() -> EditorInfo {
        EditorInfo {
            editor_version: "editor/1.2".to_string(),
            plugin_version: "plugin/3.4".to_string(),
            session_id: "session-1".to_string(),
            machine_id: "machine-1".to_string(),
        }
    }

    fn client(fetcher: Arc<ScriptedFetcher>, metrics: Arc<NetworkMetrics>) -> PostClient {
        PostClient::new(fetcher, editor()).with_telemetry(metrics)
    }

    #[tokio::test]
    async fn test_headers_and_body() {
        let fetcher = Arc::new(ScriptedFetcher::new("scripted"));
        let options = PostOptions::new("tok", json!({"prompt": "fn main"}))
            .intent("completion")
            .request_id("req-1")
            .header("X-Custom", "yes");

        let response = client(fetcher.clone(), Arc::new(NetworkMetrics::new()))
            .post_request("https://api.example.com/v1/complete", options)
            .await
            .unwrap();
        assert!(response.ok());

        let calls = fetcher.calls();
        let request = &calls[0].1;
        assert_eq!(request.header_value("authorization"), Some("Bearer tok"));
        assert_eq!(request.header_value("editor-version"), Some("editor/1.2"));
        assert_eq!(request.header_value("editor-plugin-version"), Some("plugin/3.4"));
        assert_eq!(request.header_value("x-session-id"), Some("session-1"));
        assert_eq!(request.header_value("x-machine-id"), Some("machine-1"));
        assert_eq!(request.header_value("x-request-id"), Some("req-1"));
        assert_eq!(request.header_value("x-request-intent"), Some("completion"));
        assert_eq!(request.header_value("x-custom"), Some("yes"));
        assert_eq!(request.body, Some(RequestBody::Json(json!({"prompt": "fn main"}))));
    }

    #[tokio::test]
    async fn test_stale_connection_is_retried_once() {
        let fetcher = Arc::new(
            ScriptedFetcher::new("scripted")
                .fail(Error::network("connection closed before message completed"))
                .reply(200, json!({"ok": true})),
        );
        let metrics = Arc::new(NetworkMetrics::new());

        let response = client(fetcher.clone(), metrics.clone())
            .post_request("https://api.example.com/", PostOptions::new("tok", json!({})))
            .await
            .unwrap();

        assert!(response.ok());
        assert_eq!(fetcher.call_count(), 2);
        assert_eq!(fetcher.disconnects(), 1);
        assert_eq!(metrics.report().disconnect_retries, 1);

        let calls = fetcher.calls();
        assert_eq!(
            calls[0].1.header_value("x-request-id"),
            calls[1].1.header_value("x-request-id")
        );
    }

    #[tokio::test]
    async fn test_second_failure_propagates() {
        let fetcher = Arc::new(
            ScriptedFetcher::new("scripted")
                .fail(Error::network("stale"))
                .fail(Error::network("still broken")),
        );

        let err = client(fetcher.clone(), Arc::new(NetworkMetrics::new()))
            .post_request("https://api.example.com/", PostOptions::new("tok", json!({})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("still broken"));
        assert_eq!(fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn test_in_flight_failures_are_not_retried() {
        let failures = vec![
            Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
            Error::network("http2 error: connection error received: GOAWAY"),
            Error::network("invalid session state"),
            Error::timeout("fetch", 30_000),
        ];

        for failure in failures {
            let label = failure.to_string();
            let fetcher = Arc::new(ScriptedFetcher::new("scripted").fail(failure));
            let result = client(fetcher.clone(), Arc::new(NetworkMetrics::new()))
                .post_request("https://api.example.com/", PostOptions::new("tok", json!({})))
                .await;

            assert!(result.is_err(), "{}", label);
            assert_eq!(fetcher.call_count(), 1, "{}", label);
            assert_eq!(fetcher.disconnects(), 0, "{}", label);
        }
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let fetcher = Arc::new(ScriptedFetcher::new("scripted").wait_for_abort());
        let metrics = Arc::new(NetworkMetrics::new());
        let cancel = AbortController::new();
        let options = PostOptions::new("tok", json!({})).cancel(cancel.signal());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.abort();
        });
        let err = client(fetcher.clone(), metrics.clone())
            .post_request("https://api.example.com/", options)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(err.is_abort());
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(fetcher.disconnects(), 0);
        assert_eq!(metrics.report().cancellations, 1);
    }
}
