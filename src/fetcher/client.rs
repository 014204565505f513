// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! reqwest-backed fetcher
//!
//! Uses reqwest's own proxy support (plain CONNECT with Basic credentials)
//! and so cannot negotiate Kerberos. Serves as the secondary behind the
//! engine in a [`FallbackFetcher`](super::FallbackFetcher).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::HeaderValue;
use reqwest::redirect::Policy;
use reqwest::{Certificate, Client};
use tracing::{debug, info};

use super::Fetcher;
use crate::config::{NetworkConfig, ProxySetting};
use crate::error::{Error, Result};
use crate::http::{guard, Method, Request, Response};
use crate::tls::{CertificateInjector, TrustStore};

/// Maximum redirects to follow
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
struct ClientSettings {
    user_agent: String,
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
}

/// Pooled client and the roots it was built with
struct Pool {
    client: Client,
    roots: Option<Vec<String>>,
}

/// Fetcher backed by a pooled reqwest client
pub struct ReqwestFetcher {
    pool: RwLock<Pool>,
    proxy: RwLock<Option<ProxySetting>>,
    settings: ClientSettings,
    default_timeout: Option<Duration>,
    injector: CertificateInjector,
}

impl ReqwestFetcher {
    /// Create a fetcher using `config.proxy` when set
    pub fn new(config: &NetworkConfig, trust_store: Arc<dyn TrustStore>) -> Result<Self> {
        let settings = ClientSettings {
            user_agent: config.user_agent.clone(),
            connect_timeout: config.connect_timeout(),
            pool_idle_timeout: config.pool_idle_timeout(),
        };
        let injector = CertificateInjector::new(trust_store);
        let roots = injector.get_certificates();
        let client = build_client(&settings, config.proxy.as_ref(), roots.as_deref())?;

        Ok(Self {
            pool: RwLock::new(Pool { client, roots }),
            proxy: RwLock::new(config.proxy.clone()),
            settings,
            default_timeout: config.request_timeout_duration(),
            injector,
        })
    }

    /// Pooled client, rebuilt when the trust store's roots changed
    fn current_client(&self) -> Result<Client> {
        let roots = self.injector.get_certificates();
        if self.pool.read().roots == roots {
            return Ok(self.pool.read().client.clone());
        }

        let client = build_client(&self.settings, self.proxy.read().as_ref(), roots.as_deref())?;
        debug!(roots = roots.as_ref().map_or(0, Vec::len), "Trust roots changed, rebuilding client");
        *self.pool.write() = Pool {
            client: client.clone(),
            roots,
        };
        Ok(client)
    }

    /// Replace the pool for `proxy` with the store's current roots
    fn rebuild(&self, proxy: Option<&ProxySetting>) -> Result<()> {
        let roots = self.injector.get_certificates();
        let client = build_client(&self.settings, proxy, roots.as_deref())?;
        *self.pool.write() = Pool { client, roots };
        Ok(())
    }

    async fn send(&self, client: Client, url: &str, request: Request) -> Result<Response> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = client.request(method, url).headers(request.headers);

        if let Some(body) = request.body {
            if let Some(content_type) = body.content_type() {
                builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
            }
            builder = builder.body(body.to_bytes()?);
        }

        let response = builder.send().await?;
        let final_url = response.url().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(url = %final_url, status = status.as_u16(), bytes = body.len(), "Received response");
        Ok(Response::new(status, headers, body, final_url))
    }
}

/// Build a client for the proxy trusting `roots`, or the built-in roots
/// when none are given
fn build_client(
    settings: &ClientSettings,
    proxy: Option<&ProxySetting>,
    roots: Option<&[String]>,
) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(&settings.user_agent)
        .connect_timeout(settings.connect_timeout)
        .pool_idle_timeout(settings.pool_idle_timeout)
        .redirect(Policy::limited(MAX_REDIRECTS));

    builder = match proxy {
        Some(setting) => {
            let mut proxy = reqwest::Proxy::all(format!("http://{}", setting.authority()))
                .map_err(|e| Error::Config(format!("Invalid proxy: {}", e)))?;
            if let Some(ref auth) = setting.proxy_auth {
                let value = HeaderValue::from_str(&format!("Basic {}", auth))
                    .map_err(|e| Error::Config(format!("Invalid proxy credentials: {}", e)))?;
                proxy = proxy.custom_http_auth(value);
            }
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    if let Some(certificates) = roots {
        builder = builder.tls_built_in_root_certs(false);
        for pem in certificates {
            builder = builder.add_root_certificate(Certificate::from_pem(pem.as_bytes())?);
        }
    }

    Ok(builder.build()?)
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    fn name(&self) -> &'static str {
        "reqwest"
    }

    async fn fetch(&self, url: &str, request: Request) -> Result<Response> {
        let start = Instant::now();
        let client = self.current_client()?;
        let timeout = request.timeout.or(self.default_timeout);
        let signal = request.signal.clone();

        let result = guard(self.send(client, url, request), signal.as_ref(), timeout, url).await;
        debug!(
            url = %url,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Fetch finished"
        );
        result
    }

    async fn disconnect_all(&self) -> Result<()> {
        let proxy = self.proxy.read().clone();
        self.rebuild(proxy.as_ref())?;
        info!("Dropped pooled connections");
        Ok(())
    }

    fn proxy_settings(&self) -> Option<ProxySetting> {
        self.proxy.read().clone()
    }

    fn set_proxy_settings(&self, proxy: Option<ProxySetting>) -> Result<()> {
        self.rebuild(proxy.as_ref())?;
        *self.proxy.write() = proxy;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::StaticTrustStore;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(config: &NetworkConfig) -> ReqwestFetcher {
        ReqwestFetcher::new(config, Arc::new(StaticTrustStore::empty())).unwrap()
    }

    #[test]
    fn test_fetcher_creation() {
        let fetcher = fetcher(&NetworkConfig::default());
        assert_eq!(fetcher.name(), "reqwest");
        assert!(fetcher.proxy_settings().is_none());
    }

    #[tokio::test]
    async fn test_post_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(body_string("payload"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .mount(&server)
            .await;

        let response = fetcher(&NetworkConfig::default())
            .fetch(&format!("{}/echo", server.uri()), Request::post().body("payload"))
            .await
            .unwrap();

        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_client_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let response = fetcher(&NetworkConfig::default())
            .fetch(&server.uri(), Request::get())
            .await
            .unwrap();
        assert!(response.client_error());
        assert!(!response.ok());
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = fetcher(&NetworkConfig::default())
            .fetch(&server.uri(), Request::get().timeout(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_trust_store_changes_reach_later_fetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let store = Arc::new(StaticTrustStore::empty());
        let fetcher = ReqwestFetcher::new(&NetworkConfig::default(), store.clone()).unwrap();
        assert_eq!(fetcher.fetch(&server.uri(), Request::get()).await.unwrap().status(), 204);

        // Unusable roots fail the rebuild on the next fetch
        store.replace(vec![
            "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----".to_string(),
        ]);
        assert!(fetcher.fetch(&server.uri(), Request::get()).await.is_err());

        store.replace(Vec::new());
        assert_eq!(fetcher.fetch(&server.uri(), Request::get()).await.unwrap().status(), 204);
        assert!(fetcher.pool.read().roots.is_none());
    }

    #[tokio::test]
    async fn test_proxy_settings_roundtrip() {
        let fetcher = fetcher(&NetworkConfig::default());
        let proxy = ProxySetting::new("proxy.corp", 3128).basic_auth("u", "p");

        fetcher.set_proxy_settings(Some(proxy.clone())).unwrap();
        assert_eq!(fetcher.proxy_settings(), Some(proxy));

        fetcher.disconnect_all().await.unwrap();
        fetcher.set_proxy_settings(None).unwrap();
        assert!(fetcher.proxy_settings().is_none());
    }
}
