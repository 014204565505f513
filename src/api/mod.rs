// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Request helpers on top of a fetcher
//!
//! [`PostClient`] retries once after dropping stale pooled connections.
//! [`RpcClient`] consults the availability state before calling, classifies
//! failures into reasons and starts the backoff probe when the service
//! needs a cooldown.

mod post;
mod rpc;

use crate::config::EditorInfo;
use crate::http::{headers, Request};

pub use post::{PostClient, PostOptions};
pub use rpc::{CallFailure, CallOptions, CallOutcome, ErrorReason, RpcClient};

/// Attach bearer, editor and request-id headers
fn identify(request: Request, token: &str, editor: &EditorInfo, request_id: &str) -> Request {
    request
        .header(headers::AUTHORIZATION, format!("Bearer {}", token))
        .header(headers::EDITOR_VERSION, &editor.editor_version)
        .header(headers::EDITOR_PLUGIN_VERSION, &editor.plugin_version)
        .header(headers::SESSION_ID, &editor.session_id)
        .header(headers::MACHINE_ID, &editor.machine_id)
        .header(headers::REQUEST_ID, request_id)
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

