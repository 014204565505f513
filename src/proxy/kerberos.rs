// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Kerberos (Negotiate) proxy authentication
//!
//! Wraps another socket factory. When the proxy answers CONNECT with 407
//! the factory obtains a Negotiate token from the Kerberos capability and
//! retries the tunnel once. Proxies that accepted a token before get one
//! up front, skipping the 407 round-trip.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{ProxySocketError, RequestOptions, SocketFactory};
use crate::config::ProxySetting;
use crate::telemetry::{events, NoopTelemetry, Telemetry};

/// Error raised by a Kerberos implementation
pub type KerberosError = Box<dyn std::error::Error + Send + Sync>;

/// One Kerberos security context
#[async_trait]
pub trait KerberosClient: Send {
    /// Run one negotiation step; returns the base64 response token
    async fn step(&mut self, input_token: &str) -> Result<String, KerberosError>;
}

/// Kerberos capability supplied by the host platform
#[async_trait]
pub trait KerberosProvider: Send + Sync {
    /// Initialize a client context for the service principal `spn`
    async fn initialize_client(&self, spn: &str) -> Result<Box<dyn KerberosClient>, KerberosError>;
}

const CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(20) {
    Some(capacity) => capacity,
    None => panic!("cache capacity must be non-zero"),
};

/// Proxies (`host:port`) known to accept Negotiate credentials
#[derive(Debug)]
pub struct AuthorizationCache {
    entries: Mutex<LruCache<String, bool>>,
}

impl Default for AuthorizationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Check whether the proxy accepted Negotiate before
    pub fn is_authorized(&self, proxy: &str) -> bool {
        self.entries.lock().get(proxy).copied().unwrap_or(false)
    }

    /// Record that the proxy accepted Negotiate
    pub fn mark_authorized(&self, proxy: &str) {
        self.entries.lock().put(proxy.to_string(), true);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Service principal for the proxy: the configured override, otherwise
/// `HTTP/host` on Windows and `HTTP@host` elsewhere
pub fn service_principal_name(proxy: &ProxySetting) -> String {
    spn_for(proxy, cfg!(windows))
}

fn spn_for(proxy: &ProxySetting, windows: bool) -> String {
    if let Some(ref spn) = proxy.kerberos_service_principal {
        return spn.clone();
    }
    if windows {
        format!("HTTP/{}", proxy.host)
    } else {
        format!("HTTP@{}", proxy.host)
    }
}

/// Socket factory adding Negotiate authentication to a delegate
pub struct KerberosSocketFactory {
    delegate: Arc<dyn SocketFactory>,
    kerberos: Arc<dyn KerberosProvider>,
    cache: Arc<AuthorizationCache>,
    telemetry: Arc<dyn Telemetry>,
}

impl KerberosSocketFactory {
    pub fn new(delegate: Arc<dyn SocketFactory>, kerberos: Arc<dyn KerberosProvider>) -> Self {
        Self {
            delegate,
            kerberos,
            cache: Arc::new(AuthorizationCache::new()),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    /// Share an authorization cache between factories
    pub fn with_cache(mut self, cache: Arc<AuthorizationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn cache(&self) -> &Arc<AuthorizationCache> {
        &self.cache
    }

    async fn negotiate(&self, proxy: &ProxySetting) -> Result<String, ProxySocketError> {
        let spn = service_principal_name(proxy);
        debug!(spn = %spn, "Negotiating Kerberos proxy credentials");

        let mut client = self
            .kerberos
            .initialize_client(&spn)
            .await
            .map_err(|e| ProxySocketError::from_message(e.to_string()))?;
        client
            .step("")
            .await
            .map_err(|e| ProxySocketError::from_message(e.to_string()))
    }
}

#[async_trait]
impl SocketFactory for KerberosSocketFactory {
    async fn create_socket(
        &self,
        request: &RequestOptions,
        proxy: &ProxySetting,
    ) -> Result<TcpStream, ProxySocketError> {
        let key = proxy.authority();
        let mut request = request.clone();

        if self.cache.is_authorized(&key) {
            match self.negotiate(proxy).await {
                Ok(token) => request.proxy_authorization = Some(format!("Negotiate {}", token)),
                Err(e) => warn!(proxy = %key, error = %e, "Pre-emptive Kerberos negotiation failed"),
            }
        }

        let err = match self.delegate.create_socket(&request, proxy).await {
            Ok(socket) => return Ok(socket),
            Err(err) if err.is_status(407) => err,
            Err(err) => return Err(err),
        };

        debug!(proxy = %key, error = %err, "Proxy requires authentication");
        let token = self.negotiate(proxy).await?;
        request.proxy_authorization = Some(format!("Negotiate {}", token));

        let socket = self.delegate.create_socket(&request, proxy).await?;
        // A later 407 leaves this entry in place
        self.cache.mark_authorized(&key);
        info!(proxy = %key, "Proxy accepted Kerberos credentials");
        self.telemetry
            .event(events::PROXY_AUTHORIZED, &[("proxy", key)]);
        Ok(socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyErrorCode;
    use std::collections::VecDeque;
    use tokio::net::TcpListener;

    /// Delegate replaying scripted outcomes and recording the
    /// Proxy-Authorization value of every call
    struct ScriptedFactory {
        outcomes: Mutex<VecDeque<Option<ProxySocketError>>>,
        seen: Mutex<Vec<Option<String>>>,
        listener: TcpListener,
    }

    impl ScriptedFactory {
        async fn new(outcomes: Vec<Option<ProxySocketError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                seen: Mutex::new(Vec::new()),
                listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            })
        }

        fn seen(&self) -> Vec<Option<String>> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl SocketFactory for ScriptedFactory {
        async fn create_socket(
            &self,
            request: &RequestOptions,
            _proxy: &ProxySetting,
        ) -> Result<TcpStream, ProxySocketError> {
            self.seen.lock().push(request.proxy_authorization.clone());
            let outcome = self.outcomes.lock().pop_front().flatten();
            match outcome {
                Some(err) => Err(err),
                None => Ok(TcpStream::connect(self.listener.local_addr().unwrap())
                    .await
                    .unwrap()),
            }
        }
    }

    struct FakeKerberos {
        spns: Mutex<Vec<String>>,
        fail_with: Option<&'static str>,
    }

    struct FakeClient;

    #[async_trait]
    impl KerberosClient for FakeClient {
        async fn step(&mut self, input_token: &str) -> Result<String, KerberosError> {
            assert!(input_token.is_empty());
            Ok("dG9rZW4=".to_string())
        }
    }

    #[async_trait]
    impl KerberosProvider for FakeKerberos {
        async fn initialize_client(
            &self,
            spn: &str,
        ) -> Result<Box<dyn KerberosClient>, KerberosError> {
            self.spns.lock().push(spn.to_string());
            match self.fail_with {
                Some(message) => Err(message.into()),
                None => Ok(Box::new(FakeClient)),
            }
        }
    }

    fn kerberos() -> Arc<FakeKerberos> {
        Arc::new(FakeKerberos {
            spns: Mutex::new(Vec::new()),
            fail_with: None,
        })
    }

    fn status(code: u16) -> Option<ProxySocketError> {
        Some(ProxySocketError::new(ProxyErrorCode::StatusCode(code), "refused"))
    }

    fn proxy() -> ProxySetting {
        ProxySetting::new("proxy.corp", 3128).service_principal("HTTP/proxy.corp@CORP")
    }

    #[tokio::test]
    async fn test_407_negotiates_and_caches() {
        let delegate = ScriptedFactory::new(vec![status(407), None]).await;
        let factory = KerberosSocketFactory::new(delegate.clone(), kerberos());

        let request = RequestOptions::new("api.example.com", 443);
        factory.create_socket(&request, &proxy()).await.unwrap();

        assert_eq!(
            delegate.seen(),
            vec![None, Some("Negotiate dG9rZW4=".to_string())]
        );
        assert!(factory.cache().is_authorized("proxy.corp:3128"));
    }

    #[tokio::test]
    async fn test_cached_proxy_gets_token_up_front() {
        let delegate = ScriptedFactory::new(vec![None]).await;
        let cache = Arc::new(AuthorizationCache::new());
        cache.mark_authorized("proxy.corp:3128");
        let factory = KerberosSocketFactory::new(delegate.clone(), kerberos()).with_cache(cache);

        factory
            .create_socket(&RequestOptions::new("api.example.com", 443), &proxy())
            .await
            .unwrap();

        assert_eq!(delegate.seen(), vec![Some("Negotiate dG9rZW4=".to_string())]);
    }

    #[tokio::test]
    async fn test_407_after_cache_hit_retries_once_and_keeps_entry() {
        let delegate = ScriptedFactory::new(vec![status(407), status(407)]).await;
        let cache = Arc::new(AuthorizationCache::new());
        cache.mark_authorized("proxy.corp:3128");
        let factory = KerberosSocketFactory::new(delegate.clone(), kerberos()).with_cache(cache);

        let err = factory
            .create_socket(&RequestOptions::new("api.example.com", 443), &proxy())
            .await
            .unwrap_err();

        assert!(err.is_status(407));
        assert_eq!(delegate.seen().len(), 2);
        assert!(factory.cache().is_authorized("proxy.corp:3128"));
    }

    #[tokio::test]
    async fn test_other_failures_propagate_unchanged() {
        let refused = ProxySocketError::new(ProxyErrorCode::ConnectionRefused, "no route");
        let delegate = ScriptedFactory::new(vec![Some(refused.clone())]).await;
        let kerberos = kerberos();
        let factory = KerberosSocketFactory::new(delegate.clone(), kerberos.clone());

        let err = factory
            .create_socket(&RequestOptions::new("api.example.com", 443), &proxy())
            .await
            .unwrap_err();

        assert_eq!(err, refused);
        assert_eq!(delegate.seen().len(), 1);
        assert!(kerberos.spns.lock().is_empty());
        assert!(factory.cache().is_empty());
    }

    #[tokio::test]
    async fn test_negotiation_failure_is_classified() {
        let delegate = ScriptedFactory::new(vec![status(407)]).await;
        let kerberos = Arc::new(FakeKerberos {
            spns: Mutex::new(Vec::new()),
            fail_with: Some("Miscellaneous failure (see text): Server not found in Kerberos database"),
        });
        let factory = KerberosSocketFactory::new(delegate.clone(), kerberos);

        let err = factory
            .create_socket(&RequestOptions::new("api.example.com", 443), &proxy())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProxyErrorCode::KerberosServerNotFound);
        assert_eq!(delegate.seen().len(), 1);
        assert!(factory.cache().is_empty());
    }

    #[test]
    fn test_service_principal_name() {
        let plain = ProxySetting::new("gw.corp", 8080);
        assert_eq!(spn_for(&plain, true), "HTTP/gw.corp");
        assert_eq!(spn_for(&plain, false), "HTTP@gw.corp");

        let custom = plain.service_principal("HTTP/other.corp");
        assert_eq!(spn_for(&custom, true), "HTTP/other.corp");
        assert_eq!(spn_for(&custom, false), "HTTP/other.corp");
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = AuthorizationCache::new();
        for i in 0..20 {
            cache.mark_authorized(&format!("proxy{}:3128", i));
        }
        // Touch the oldest entry so proxy1 becomes the eviction candidate
        assert!(cache.is_authorized("proxy0:3128"));
        cache.mark_authorized("proxy20:3128");

        assert_eq!(cache.len(), 20);
        assert!(cache.is_authorized("proxy0:3128"));
        assert!(!cache.is_authorized("proxy1:3128"));
        assert!(cache.is_authorized("proxy20:3128"));
    }
}
