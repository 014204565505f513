// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Calls to the code matching service
//!
//! Every call is gated on the shared availability state. Failures come
//! back as a [`CallFailure`] with a classified reason and a message fit
//! for end users; raw transport errors never reach the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{identify, new_request_id};
use crate::auth::TokenProvider;
use crate::availability::ConnectionState;
use crate::config::{EditorInfo, NetworkConfig};
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::http::{AbortSignal, Method, Request, Response};

/// Synthetic code: availability probes are running
pub const CODE_RETRYING: u16 = 600;
/// Synthetic code: the service is marked offline
pub const CODE_OFFLINE: u16 = 601;
/// Synthetic code: the request failed in transport
pub const CODE_NETWORK: u16 = 602;

const RETRYING_MESSAGE: &str = "Attempting to reconnect to the public code matching service.";
const OFFLINE_MESSAGE: &str = "The public code matching service is offline.";
const NETWORK_MESSAGE: &str = "Network error detected. Check your internet connection.";
const UNAUTHENTICATED_MESSAGE: &str = "Unable to authenticate.";

/// Classified reason of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    #[serde(rename = "BadArgumentsError")]
    BadArguments,
    NotAuthorized,
    #[serde(rename = "NotFoundError")]
    NotFound,
    #[serde(rename = "RateLimitError")]
    RateLimit,
    #[serde(rename = "InternalError")]
    Internal,
    #[serde(rename = "ConnectionError")]
    Connection,
    #[serde(rename = "UnknownError")]
    Unknown,
}

impl ErrorReason {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorReason::BadArguments,
            401 => ErrorReason::NotAuthorized,
            404 => ErrorReason::NotFound,
            429 => ErrorReason::RateLimit,
            500..=599 => ErrorReason::Internal,
            600.. => ErrorReason::Connection,
            _ => ErrorReason::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::BadArguments => "BadArgumentsError",
            ErrorReason::NotAuthorized => "NotAuthorized",
            ErrorReason::NotFound => "NotFoundError",
            ErrorReason::RateLimit => "RateLimitError",
            ErrorReason::Internal => "InternalError",
            ErrorReason::Connection => "ConnectionError",
            ErrorReason::Unknown => "UnknownError",
        }
    }

    /// Message shown to end users
    pub fn message(&self) -> &'static str {
        match self {
            ErrorReason::BadArguments => {
                "The public code matching service rejected the request."
            }
            ErrorReason::NotAuthorized => {
                "You are not authorized to use the public code matching service."
            }
            ErrorReason::NotFound => "The public code matching service could not be found.",
            ErrorReason::RateLimit => {
                "You've reached your quota and limit, code matching will be unavailable until the limit resets"
            }
            ErrorReason::Internal => {
                "The public code matching service is having problems. Please try again later."
            }
            ErrorReason::Connection => "The public code matching service is unreachable.",
            ErrorReason::Unknown => "An unknown error occurred in the public code matching service.",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFailure {
    pub reason: ErrorReason,
    pub code: u16,
    pub msg: String,
    /// Response body, when there was one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Result of a call
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(Value),
    Failure(CallFailure),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn failure(&self) -> Option<&CallFailure> {
        match self {
            CallOutcome::Failure(failure) => Some(failure),
            CallOutcome::Success(_) => None,
        }
    }
}

/// Options for one call
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub signal: Option<AbortSignal>,
}

impl CallOptions {
    /// POST with a JSON body
    pub fn post(body: Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Client for the code matching service
pub struct RpcClient {
    fetcher: Arc<dyn Fetcher>,
    state: Arc<ConnectionState>,
    tokens: Arc<dyn TokenProvider>,
    base_url: String,
    editor: EditorInfo,
}

impl RpcClient {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        state: Arc<ConnectionState>,
        tokens: Arc<dyn TokenProvider>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            state,
            tokens,
            base_url: base_url.into(),
            editor: EditorInfo::default(),
        }
    }

    /// Client for `config.rpc_base_url` sending `config.editor` headers
    pub fn from_config(
        config: &NetworkConfig,
        fetcher: Arc<dyn Fetcher>,
        state: Arc<ConnectionState>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let base_url = config
            .rpc_base_url
            .clone()
            .ok_or_else(|| Error::Config("rpc_base_url is not set".to_string()))?;
        Ok(Self::new(fetcher, state, tokens, base_url).editor(config.editor.clone()))
    }

    pub fn editor(mut self, editor: EditorInfo) -> Self {
        self.editor = editor;
        self
    }

    pub fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Call `endpoint`.
    ///
    /// Fails only when the caller cancels; every other failure is a
    /// `CallOutcome::Failure`.
    pub async fn call(&self, endpoint: &str, options: CallOptions) -> Result<CallOutcome> {
        let response = if self.state.is_retrying() {
            synthetic(CODE_RETRYING, RETRYING_MESSAGE)
        } else if self.state.is_disconnected() {
            synthetic(CODE_OFFLINE, OFFLINE_MESSAGE)
        } else {
            match self.send(endpoint, options).await {
                Ok(response) => response,
                Err(e) if e.is_abort() => return Err(e),
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Call failed in transport");
                    self.state.enable_retry(self.state.default_initial_delay());
                    synthetic(CODE_NETWORK, NETWORK_MESSAGE)
                }
            }
        };

        Ok(self.classify(endpoint, response))
    }

    async fn send(&self, endpoint: &str, options: CallOptions) -> Result<Response> {
        let token = match self.tokens.get_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not obtain a token");
                return Ok(synthetic(401, UNAUTHENTICATED_MESSAGE));
            }
        };

        let url = self.endpoint_url(endpoint);
        let base = match options.method {
            Method::Get => Request::get(),
            Method::Post => Request::post(),
        };
        let mut request = identify(base, &token.value, &self.editor, &new_request_id());
        if let Some(ref body) = options.body {
            request = request.json(body)?;
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        if let Some(signal) = options.signal {
            request = request.signal(signal);
        }

        debug!(url = %url, "Calling code matching service");
        self.fetcher.fetch(&url, request).await
    }

    fn classify(&self, endpoint: &str, response: Response) -> CallOutcome {
        let status = response.status();
        let body: Option<Value> = response.json().ok();

        if response.ok() {
            return match body {
                Some(value) => CallOutcome::Success(value),
                None => CallOutcome::Failure(CallFailure {
                    reason: ErrorReason::Unknown,
                    code: status,
                    msg: "The public code matching service sent an unreadable response.".to_string(),
                    meta: None,
                }),
            };
        }

        let reason = ErrorReason::from_status(status);
        let msg = match reason {
            ErrorReason::Connection => body
                .as_ref()
                .and_then(|b| b.get("msg"))
                .and_then(Value::as_str)
                .unwrap_or(reason.message())
                .to_string(),
            _ => reason.message().to_string(),
        };

        match reason {
            ErrorReason::RateLimit => {
                info!(endpoint = %endpoint, "Rate limited, pausing calls");
                self.state.enable_retry(self.state.rate_limit_delay());
            }
            ErrorReason::Internal => {
                info!(endpoint = %endpoint, status, "Service error, pausing calls");
                self.state.enable_retry(self.state.default_initial_delay());
            }
            _ => {}
        }

        CallOutcome::Failure(CallFailure {
            reason,
            code: status,
            msg,
            meta: body,
        })
    }
}

fn synthetic(code: u16, msg: &str) -> Response {
    Response::synthetic(code, &json!({ "code": code, "msg": msg }))
}
