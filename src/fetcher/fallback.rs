// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Primary/secondary fallback

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::Fetcher;
use crate::config::{NetworkConfig, ProxySetting};
use crate::error::Result;
use crate::http::{AbortController, Request, Response};
use crate::telemetry::{events, NoopTelemetry, Telemetry};

/// Details of a request the secondary fetcher answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackEvent {
    pub url: String,
    pub primary: &'static str,
    pub secondary: &'static str,
    /// Primary failure that triggered the fallback
    pub error: String,
}

type FallbackCallback = Arc<dyn Fn(&FallbackEvent) + Send + Sync>;

/// Fetcher that retries failed requests on a secondary fetcher.
///
/// Cancelled requests and requests under the exempt base URL never fall
/// back.
pub struct FallbackFetcher {
    primary: Arc<dyn Fetcher>,
    secondary: Arc<dyn Fetcher>,
    exempt_base_url: Option<String>,
    on_fallback: Option<FallbackCallback>,
    telemetry: Arc<dyn Telemetry>,
}

impl FallbackFetcher {
    pub fn new(primary: Arc<dyn Fetcher>, secondary: Arc<dyn Fetcher>) -> Self {
        Self {
            primary,
            secondary,
            exempt_base_url: None,
            on_fallback: None,
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    /// Fallback exempting `config.fallback_exempt_url`, when set
    pub fn from_config(
        config: &NetworkConfig,
        primary: Arc<dyn Fetcher>,
        secondary: Arc<dyn Fetcher>,
    ) -> Self {
        let fetcher = Self::new(primary, secondary);
        match config.fallback_exempt_url {
            Some(ref base_url) => fetcher.exempt(base_url.clone()),
            None => fetcher,
        }
    }

    /// Never fall back for URLs under `base_url`
    pub fn exempt(mut self, base_url: impl Into<String>) -> Self {
        self.exempt_base_url = Some(base_url.into());
        self
    }

    /// Callback fired after the secondary answers
    pub fn on_fallback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FallbackEvent) + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(callback));
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    fn is_exempt(&self, url: &str) -> bool {
        match self.exempt_base_url {
            Some(ref base) => with_trailing_slash(url).starts_with(&with_trailing_slash(base)),
            None => false,
        }
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

#[async_trait]
impl Fetcher for FallbackFetcher {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn fetch(&self, url: &str, request: Request) -> Result<Response> {
        let retry = request.clone();

        let error = match self.primary.fetch(url, request).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_abort() || self.is_exempt(url) => return Err(e),
            Err(e) => e,
        };

        warn!(
            url = %url,
            primary = self.primary.name(),
            secondary = self.secondary.name(),
            error = %error,
            "Primary fetcher failed, trying secondary"
        );
        let response = self.secondary.fetch(url, retry).await?;

        let event = FallbackEvent {
            url: url.to_string(),
            primary: self.primary.name(),
            secondary: self.secondary.name(),
            error: error.to_string(),
        };
        info!(url = %url, secondary = event.secondary, "Secondary fetcher succeeded");
        self.telemetry.event(
            events::FALLBACK_USED,
            &[
                ("primary", event.primary.to_string()),
                ("secondary", event.secondary.to_string()),
            ],
        );
        if let Some(ref callback) = self.on_fallback {
            callback(&event);
        }
        Ok(response)
    }

    fn make_abort_controller(&self) -> AbortController {
        self.primary.make_abort_controller()
    }

    async fn disconnect_all(&self) -> Result<()> {
        let (primary, secondary) =
            futures::join!(self.primary.disconnect_all(), self.secondary.disconnect_all());
        primary.and(secondary)
    }

    fn proxy_settings(&self) -> Option<ProxySetting> {
        self.primary.proxy_settings()
    }

    fn set_proxy_settings(&self, proxy: Option<ProxySetting>) -> Result<()> {
        self.primary.set_proxy_settings(proxy.clone())?;
        self.secondary.set_proxy_settings(proxy)
    }
}
