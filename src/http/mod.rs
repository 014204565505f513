// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! HTTP value types shared by every fetcher
//!
//! Requests, immutable responses and the abort handles that cancel a
//! single in-flight operation.

mod abort;
mod request;
mod response;

pub use abort::{AbortController, AbortReason, AbortSignal};
pub(crate) use abort::guard;
pub use request::{Method, Request, RequestBody};
pub use response::Response;

/// Default user agent string
pub const DEFAULT_USER_AGENT: &str = concat!("wayline/", env!("CARGO_PKG_VERSION"));

/// Common HTTP headers
pub mod headers {
    pub const CONTENT_TYPE: &str = "content-type";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const USER_AGENT: &str = "user-agent";
    pub const AUTHORIZATION: &str = "authorization";
    pub const PROXY_AUTHORIZATION: &str = "proxy-authorization";
    pub const EDITOR_VERSION: &str = "editor-version";
    pub const EDITOR_PLUGIN_VERSION: &str = "editor-plugin-version";
    pub const SESSION_ID: &str = "x-session-id";
    pub const MACHINE_ID: &str = "x-machine-id";
    pub const REQUEST_ID: &str = "x-request-id";
    pub const REQUEST_INTENT: &str = "x-request-intent";
}
