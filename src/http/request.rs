// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! HTTP request types

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use super::abort::AbortSignal;
use crate::error::Result;

/// Request method. Only the two verbs the transport issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl From<Method> for hyper::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => hyper::Method::GET,
            Method::Post => hyper::Method::POST,
        }
    }
}

/// Request body: raw bytes or a structured value serialized on send
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Raw(Bytes),
    Json(Value),
}

impl RequestBody {
    /// Serialize the body for the wire
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            RequestBody::Raw(bytes) => Ok(bytes.clone()),
            RequestBody::Json(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
        }
    }

    /// Content type implied by the body kind
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Raw(_) => None,
            RequestBody::Json(_) => Some("application/json"),
        }
    }
}

/// HTTP request representation. The target URL travels separately.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Request method
    pub method: Method,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Option<RequestBody>,
    /// Deadline for the whole exchange
    pub timeout: Option<Duration>,
    /// Cancellation signal
    pub signal: Option<AbortSignal>,
}

impl Request {
    /// Create a new GET request
    pub fn get() -> Self {
        Self::default()
    }

    /// Create a new POST request
    pub fn post() -> Self {
        Self {
            method: Method::Post,
            ..Self::default()
        }
    }

    /// Set a header
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set multiple headers
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        for (name, value) in headers {
            self = self.header(name, value);
        }
        self
    }

    /// Merge a header map, replacing existing values
    pub fn extend_headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set a raw body, replacing any structured body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Raw(body.into()));
        self
    }

    /// Set a structured JSON body, replacing any raw body
    pub fn json<T: Serialize>(mut self, data: &T) -> Result<Self> {
        self.body = Some(RequestBody::Json(serde_json::to_value(data)?));
        Ok(self)
    }

    /// Set a body of either kind
    pub fn with_body(mut self, body: Option<RequestBody>) -> Self {
        self.body = body;
        self
    }

    /// Set timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable timeout
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Attach a cancellation signal
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Get a header value
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
