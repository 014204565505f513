// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! HTTP response types

use bytes::Bytes;
use futures::stream::{self, Stream};
use hyper::header::HeaderMap;
use hyper::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{Error, JsonErrorKind, JsonParseError, Result};

/// HTTP response representation. Immutable once built.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    body: Bytes,
    url: String,
}

impl Response {
    /// Create a new response
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes, url: impl Into<String>) -> Self {
        Self {
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            status,
            headers,
            body,
            url: url.into(),
        }
    }

    /// Response that never touched the network, carrying a JSON payload.
    ///
    /// Used for the 6xx codes that report local connectivity decisions.
    pub fn synthetic(status: u16, payload: &serde_json::Value) -> Self {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Bytes::from(payload.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        Self::new(status, headers, body, "")
    }

    /// Status code as u16
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Status reason phrase
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Check if status is success (2xx)
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status())
    }

    /// Check if status is client error (4xx)
    pub fn client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get all values for a header
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Get content length announced by the server
    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// URL the response was fetched from
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get body as text
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| Error::Other(e.to_string()))
    }

    /// Get body as text, lossy conversion
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Get raw body bytes
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as a byte stream
    pub fn body_stream(&self) -> impl Stream<Item = Result<Bytes>> {
        stream::iter(vec![Ok(self.body.clone())])
    }

    /// Parse body as JSON. A body cut short is reported as `Truncated`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            let kind = if e.is_eof() {
                JsonErrorKind::Truncated
            } else {
                JsonErrorKind::Invalid
            };
            Error::JsonParse(JsonParseError {
                kind,
                message: e.to_string(),
                byte_length: self.body.len(),
                content_length: self.content_length(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use hyper::header::HeaderValue;

    fn response(status: u16, body: &'static str) -> Response {
        Response::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Bytes::from(body),
            "https://example.com",
        )
    }

    #[test]
    fn test_response_status_flags() {
        for status in [200, 204, 299] {
            let resp = response(status, "");
            assert!(resp.ok());
            assert!(!resp.client_error());
        }
        for status in [400, 404, 429, 499] {
            let resp = response(status, "");
            assert!(resp.client_error());
            assert!(!resp.ok());
        }
        let resp = response(500, "");
        assert!(!resp.ok() && !resp.client_error());
        assert_eq!(resp.status_text(), "Internal Server Error");
    }

    #[test]
    fn test_response_text() {
        let resp = response(200, "Hello, World!");
        assert_eq!(resp.text().unwrap(), "Hello, World!");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", HeaderValue::from_static("abc"));
        let resp = Response::new(StatusCode::OK, headers, Bytes::new(), "");
        assert_eq!(resp.header("X-Trace"), Some("abc"));
    }

    #[test]
    fn test_truncated_json_reports_lengths() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", HeaderValue::from_static("42"));
        let resp = Response::new(
            StatusCode::OK,
            headers,
            Bytes::from(r#"{"matches": [1, 2"#),
            "https://example.com",
        );

        match resp.json::<serde_json::Value>() {
            Err(Error::JsonParse(err)) => {
                assert_eq!(err.kind, JsonErrorKind::Truncated);
                assert_eq!(err.byte_length, 17);
                assert_eq!(err.content_length, Some(42));
            }
            other => panic!("Expected JsonParse, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_not_truncated() {
        let resp = response(200, "{not json}");
        match resp.json::<serde_json::Value>() {
            Err(Error::JsonParse(err)) => {
                assert_eq!(err.kind, JsonErrorKind::Invalid);
                assert_eq!(err.content_length, None);
            }
            other => panic!("Expected JsonParse, got {:?}", other),
        }
    }

    #[test]
    fn test_synthetic_response() {
        let resp = Response::synthetic(600, &serde_json::json!({"msg": "offline"}));
        assert_eq!(resp.status(), 600);
        assert!(!resp.ok());
        let payload: serde_json::Value = resp.json().unwrap();
        assert_eq!(payload["msg"], "offline");
    }

    #[tokio::test]
    async fn test_body_stream() {
        let resp = response(200, "chunk");
        let chunks: Vec<_> = resp.body_stream().collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap(), &Bytes::from("chunk"));
    }
}
