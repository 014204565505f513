// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Resilient HTTP engine
//!
//! hyper client with its own connector. Every connection attempt re-reads
//! the trust store, and when a proxy is configured the TCP stream comes
//! from the socket factory chain (Kerberos, then CONNECT tunneling) before
//! TLS is negotiated end-to-end with the target.

use std::error::Error as StdError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hyper::client::connect::{Connected, Connection};
use hyper::header::{HeaderValue, CONTENT_TYPE, USER_AGENT};
use hyper::service::Service;
use hyper::{Body, Client, Uri};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};
use url::Url;

use super::Fetcher;
use crate::config::{NetworkConfig, ProxySetting};
use crate::error::{Error, Result};
use crate::http::{guard, Request, Response};
use crate::proxy::{
    AuthorizationCache, KerberosProvider, KerberosSocketFactory, RequestOptions, SocketFactory,
    TunnelingSocketFactory,
};
use crate::telemetry::{NetworkMetrics, NoopTelemetry, Telemetry};
use crate::tls::{self, CertificateInjector, TrustStore};

type EngineClient = Client<Connector, Body>;

/// Kerberos capability and the cache shared by every rebuilt pool
struct KerberosAuth {
    provider: Arc<dyn KerberosProvider>,
    cache: Arc<AuthorizationCache>,
}

/// Fetcher backed by hyper with proxy tunneling and per-connection trust
pub struct EngineFetcher {
    client: RwLock<EngineClient>,
    proxy: RwLock<Option<ProxySetting>>,
    socket_factory: Arc<dyn SocketFactory>,
    kerberos: Option<KerberosAuth>,
    injector: CertificateInjector,
    user_agent: HeaderValue,
    default_timeout: Option<Duration>,
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    telemetry: Arc<dyn Telemetry>,
    metrics: Option<Arc<NetworkMetrics>>,
}

impl EngineFetcher {
    /// Create an engine tunneling through `config.proxy` when set
    pub fn new(config: &NetworkConfig, trust_store: Arc<dyn TrustStore>) -> Result<Self> {
        if let Some(ref proxy) = config.proxy {
            validate_proxy(proxy)?;
        }
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| Error::Config(format!("Invalid user agent: {}", e)))?;

        let socket_factory: Arc<dyn SocketFactory> = Arc::new(TunnelingSocketFactory::new());
        let injector = CertificateInjector::new(trust_store);
        let connector = Connector {
            proxy: config.proxy.clone().map(Arc::new),
            factory: socket_factory.clone(),
            injector: injector.clone(),
            connect_timeout: config.connect_timeout(),
        };

        Ok(Self {
            client: RwLock::new(pooled_client(connector, config.pool_idle_timeout())),
            proxy: RwLock::new(config.proxy.clone()),
            socket_factory,
            kerberos: None,
            injector,
            user_agent,
            default_timeout: config.request_timeout_duration(),
            connect_timeout: config.connect_timeout(),
            pool_idle_timeout: config.pool_idle_timeout(),
            telemetry: Arc::new(NoopTelemetry),
            metrics: None,
        })
    }

    /// Replace the socket factory used for proxied connections
    pub fn with_socket_factory(mut self, factory: Arc<dyn SocketFactory>) -> Self {
        self.socket_factory = factory;
        self.rebuild_client();
        self
    }

    /// Negotiate Kerberos credentials when the proxy demands them
    pub fn with_kerberos(mut self, kerberos: Arc<dyn KerberosProvider>) -> Self {
        self.kerberos = Some(KerberosAuth {
            provider: kerberos,
            cache: Arc::new(AuthorizationCache::new()),
        });
        self.rebuild_client();
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self.rebuild_client();
        self
    }

    /// Proxies known to accept Negotiate, when Kerberos is enabled
    pub fn authorization_cache(&self) -> Option<&Arc<AuthorizationCache>> {
        self.kerberos.as_ref().map(|kerberos| &kerberos.cache)
    }

    /// Record request outcomes and latencies
    pub fn with_metrics(mut self, metrics: Arc<NetworkMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn rebuild_client(&mut self) {
        let client = self.build_client(self.proxy.read().clone());
        *self.client.get_mut() = client;
    }

    /// Socket factory chain for proxied connections
    fn proxied_factory(&self) -> Arc<dyn SocketFactory> {
        match self.kerberos {
            Some(ref kerberos) => Arc::new(
                KerberosSocketFactory::new(self.socket_factory.clone(), kerberos.provider.clone())
                    .with_cache(kerberos.cache.clone())
                    .with_telemetry(self.telemetry.clone()),
            ),
            None => self.socket_factory.clone(),
        }
    }

    fn build_client(&self, proxy: Option<ProxySetting>) -> EngineClient {
        let connector = Connector {
            proxy: proxy.map(Arc::new),
            factory: self.proxied_factory(),
            injector: self.injector.clone(),
            connect_timeout: self.connect_timeout,
        };
        pooled_client(connector, self.pool_idle_timeout)
    }

    async fn send(&self, client: EngineClient, url: &str, request: Request) -> Result<Response> {
        let parsed = Url::parse(url)?;
        let uri: Uri = parsed
            .as_str()
            .parse()
            .map_err(|e| Error::other(format!("Invalid request URI {}: {}", url, e)))?;

        let body = match request.body {
            Some(ref body) => body.to_bytes()?,
            None => Default::default(),
        };

        let mut http_request = hyper::Request::new(Body::from(body));
        *http_request.method_mut() = request.method.into();
        *http_request.uri_mut() = uri;
        *http_request.headers_mut() = request.headers;

        let headers = http_request.headers_mut();
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, self.user_agent.clone());
        }
        if let Some(content_type) = request.body.as_ref().and_then(|b| b.content_type()) {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        debug!(method = request.method.as_str(), url = %url, "Sending request");
        let response = client.request(http_request).await.map_err(engine_error)?;
        let (parts, body) = response.into_parts();
        let bytes = hyper::body::to_bytes(body).await.map_err(engine_error)?;

        debug!(url = %url, status = parts.status.as_u16(), bytes = bytes.len(), "Received response");
        Ok(Response::new(parts.status, parts.headers, bytes, url))
    }
}

#[async_trait]
impl Fetcher for EngineFetcher {
    fn name(&self) -> &'static str {
        "engine"
    }

    async fn fetch(&self, url: &str, request: Request) -> Result<Response> {
        let start = Instant::now();
        // In-flight requests keep this clone when the pool is replaced
        let client = self.client.read().clone();
        let timeout = request.timeout.or(self.default_timeout);
        let signal = request.signal.clone();

        let result = guard(self.send(client, url, request), signal.as_ref(), timeout, url).await;

        if let Some(ref metrics) = self.metrics {
            metrics.record_request(start.elapsed().as_millis() as u64, result.is_ok());
        }
        result
    }

    async fn disconnect_all(&self) -> Result<()> {
        let client = self.build_client(self.proxy.read().clone());
        *self.client.write() = client;
        info!("Dropped pooled connections");
        Ok(())
    }

    fn proxy_settings(&self) -> Option<ProxySetting> {
        self.proxy.read().clone()
    }

    fn set_proxy_settings(&self, proxy: Option<ProxySetting>) -> Result<()> {
        if let Some(ref proxy) = proxy {
            validate_proxy(proxy)?;
        }
        let client = self.build_client(proxy.clone());
        *self.proxy.write() = proxy;
        *self.client.write() = client;
        Ok(())
    }
}

fn pooled_client(connector: Connector, pool_idle_timeout: Duration) -> EngineClient {
    Client::builder()
        .pool_idle_timeout(pool_idle_timeout)
        .build(connector)
}

fn validate_proxy(proxy: &ProxySetting) -> Result<()> {
    if proxy.host.trim().is_empty() {
        return Err(Error::Config("Proxy host is empty".to_string()));
    }
    Ok(())
}

/// Recover the connector's own error from hyper's wrapper so proxy codes
/// and timeouts survive
fn engine_error(err: hyper::Error) -> Error {
    let mut source = StdError::source(&err);
    while let Some(cause) = source {
        if let Some(inner) = cause.downcast_ref::<Error>() {
            match inner {
                Error::Proxy(e) => return Error::Proxy(e.clone()),
                Error::Tls(message) => return Error::Tls(message.clone()),
                Error::Timeout {
                    operation,
                    duration_ms,
                    url,
                } => {
                    return Error::Timeout {
                        operation: operation.clone(),
                        duration_ms: *duration_ms,
                        url: url.clone(),
                    }
                }
                _ => break,
            }
        }
        source = cause.source();
    }
    Error::Hyper(err)
}

/// Connection setup for one target: direct or through the socket
/// factory, then TLS for `https`
#[derive(Clone)]
struct Connector {
    proxy: Option<Arc<ProxySetting>>,
    factory: Arc<dyn SocketFactory>,
    injector: CertificateInjector,
    connect_timeout: Duration,
}

impl Connector {
    async fn connect(self, uri: Uri) -> Result<EngineStream> {
        let https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") => false,
            other => {
                return Err(Error::Config(format!("Unsupported URL scheme: {:?}", other)));
            }
        };
        let host = uri
            .host()
            .ok_or_else(|| Error::network(format!("URL has no host: {}", uri)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });

        let mut options = RequestOptions::new(host.clone(), port);
        self.injector.apply_to_request_options(&mut options);

        let (tcp, ca) = match self.proxy.as_deref() {
            Some(proxy) => {
                let mut proxy = proxy.clone();
                self.injector.apply_to_proxy_settings(&mut proxy);
                options.timeout = Some(proxy.timeout().unwrap_or(self.connect_timeout));
                debug!(target = %options.authority(), proxy = %proxy.authority(), "Opening tunnel");
                let tcp = self.factory.create_socket(&options, &proxy).await?;
                (tcp, options.ca.or(proxy.ca))
            }
            None => {
                let tcp = tokio::time::timeout(
                    self.connect_timeout,
                    TcpStream::connect((host.as_str(), port)),
                )
                .await
                .map_err(|_| {
                    Error::timeout_with_url(
                        "connect",
                        self.connect_timeout.as_millis() as u64,
                        options.authority(),
                    )
                })??;
                (tcp, options.ca)
            }
        };
        let _ = tcp.set_nodelay(true);

        if !https {
            return Ok(EngineStream::Plain(tcp));
        }

        let config = tls::build_client_config(ca.as_deref())?;
        let server_name = rustls::ServerName::try_from(host.as_str())
            .map_err(|e| Error::Tls(format!("Invalid server name {}: {}", host, e)))?;
        let stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => {
                    Error::Tls(format!("TLS handshake with {} failed: {}", host, e))
                }
                _ => Error::Io(e),
            })?;
        Ok(EngineStream::Tls(Box::new(stream)))
    }
}

impl Service<Uri> for Connector {
    type Response = EngineStream;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<EngineStream>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        Box::pin(self.clone().connect(uri))
    }
}

/// Connected transport handed to hyper
enum EngineStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Connection for EngineStream {
    fn connected(&self) -> Connected {
        match self {
            EngineStream::Plain(_) => Connected::new(),
            EngineStream::Tls(stream) => {
                let (_, session) = stream.get_ref();
                if session.alpn_protocol() == Some(b"h2".as_slice()) {
                    Connected::new().negotiated_h2()
                } else {
                    Connected::new()
                }
            }
        }
    }
}

impl AsyncRead for EngineStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            EngineStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            EngineStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for EngineStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            EngineStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            EngineStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            EngineStream::Plain(s) => Pin::new(s).poll_flush(cx),
            EngineStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            EngineStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            EngineStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
