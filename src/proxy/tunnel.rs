// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! HTTP CONNECT tunneling
//!
//! Speaks raw CONNECT to the proxy and hands back the TCP stream once the
//! proxy has answered 200 with nothing after the response head.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::debug;

use super::{ConnectOptions, ProxyErrorCode, ProxySocketError, RequestOptions, SocketFactory};
use crate::config::ProxySetting;

/// Largest CONNECT response head accepted from a proxy
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

/// Socket factory that opens CONNECT tunnels
#[derive(Debug, Clone, Default)]
pub struct TunnelingSocketFactory;

impl TunnelingSocketFactory {
    pub fn new() -> Self {
        Self
    }

    async fn open(&self, options: &ConnectOptions) -> Result<TcpStream, ProxySocketError> {
        let mut stream = connect_to_proxy(options).await?;

        debug!(
            proxy = %format!("{}:{}", options.proxy_host, options.proxy_port),
            target = %options.path,
            auth_values = options.proxy_authorization.len(),
            "Sending CONNECT"
        );
        stream
            .write_all(options.request_head().as_bytes())
            .await
            .map_err(|e| ProxySocketError::from_io(&e, "writing CONNECT request"))?;

        let (status, trailing) = read_response_head(&mut stream).await?;
        match status {
            200 if trailing == 0 => Ok(stream),
            200 => Err(ProxySocketError::new(
                ProxyErrorCode::NonEmptyResponseBody,
                format!(
                    "proxy sent {} bytes after accepting CONNECT to {}",
                    trailing, options.path
                ),
            )),
            code => Err(ProxySocketError::new(
                ProxyErrorCode::StatusCode(code),
                format!("proxy refused CONNECT to {} with status {}", options.path, code),
            )),
        }
    }
}

#[async_trait]
impl SocketFactory for TunnelingSocketFactory {
    async fn create_socket(
        &self,
        request: &RequestOptions,
        proxy: &ProxySetting,
    ) -> Result<TcpStream, ProxySocketError> {
        let options = ConnectOptions::new(request, proxy);

        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, self.open(&options))
                .await
                .map_err(|_| {
                    ProxySocketError::new(
                        ProxyErrorCode::Timeout,
                        format!(
                            "timed out after {}ms tunneling to {} through {}:{}",
                            limit.as_millis(),
                            options.path,
                            options.proxy_host,
                            options.proxy_port
                        ),
                    )
                })?,
            None => self.open(&options).await,
        }
    }
}

async fn connect_to_proxy(options: &ConnectOptions) -> Result<TcpStream, ProxySocketError> {
    let proxy = format!("{}:{}", options.proxy_host, options.proxy_port);
    let context = format!("connecting to proxy {}", proxy);

    let Some(local) = options.local_address else {
        return TcpStream::connect((options.proxy_host.as_str(), options.proxy_port))
            .await
            .map_err(|e| ProxySocketError::from_io(&e, &context));
    };

    let addr = lookup_host((options.proxy_host.as_str(), options.proxy_port))
        .await
        .map_err(|e| ProxySocketError::from_io(&e, &context))?
        .find(|addr| addr.is_ipv4() == local.is_ipv4())
        .ok_or_else(|| {
            ProxySocketError::new(
                ProxyErrorCode::HostNotFound,
                format!("{}: no address matching local address {}", context, local),
            )
        })?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| ProxySocketError::from_io(&e, &context))?;
    socket
        .bind(SocketAddr::new(local, 0))
        .map_err(|e| ProxySocketError::from_io(&e, &context))?;
    socket
        .connect(addr)
        .await
        .map_err(|e| ProxySocketError::from_io(&e, &context))
}

/// Read the CONNECT response head. Returns the status and the number of
/// bytes received past the head.
async fn read_response_head(stream: &mut TcpStream) -> Result<(u16, usize), ProxySocketError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ProxySocketError::from_io(&e, "reading CONNECT response"))?;
        if n == 0 {
            return Err(ProxySocketError::new(
                ProxyErrorCode::MalformedResponse,
                "proxy closed the connection before answering CONNECT",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > MAX_RESPONSE_HEAD {
            return Err(ProxySocketError::new(
                ProxyErrorCode::MalformedResponse,
                "CONNECT response head too large",
            ));
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]);
    let status = parse_status_line(head.lines().next().unwrap_or_default()).ok_or_else(|| {
        ProxySocketError::new(
            ProxyErrorCode::MalformedResponse,
            format!("invalid CONNECT status line: {:?}", head.lines().next()),
        )
    })?;

    Ok((status, buf.len() - head_end))
}

fn parse_status_line(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// One-shot fake proxy: captures the CONNECT head and answers with
    /// `reply`. Returns the proxy port and the captured head.
    async fn fake_proxy(reply: &'static [u8]) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 512];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            socket.write_all(reply).await.unwrap();
            // Keep the socket open until the client is done with it
            let _ = socket.read(&mut chunk).await;
            String::from_utf8(buf).unwrap()
        });
        (port, handle)
    }

    #[tokio::test]
    async fn test_tunnel_established() {
        let (port, proxy) = fake_proxy(b"HTTP/1.1 200 Connection established\r\n\r\n").await;
        let setting = ProxySetting::new("127.0.0.1", port).basic_auth("user", "pass");
        let request = RequestOptions::new("api.example.com", 443).proxy_authorization("Negotiate tok");

        let socket = TunnelingSocketFactory::new()
            .create_socket(&request, &setting)
            .await
            .unwrap();
        drop(socket);

        let head = proxy.await.unwrap();
        assert!(head.starts_with("CONNECT api.example.com:443 HTTP/1.1\r\n"));
        let basic = head.find("Proxy-Authorization: Basic dXNlcjpwYXNz").unwrap();
        let negotiate = head.find("Proxy-Authorization: Negotiate tok").unwrap();
        assert!(basic < negotiate);
    }

    #[tokio::test]
    async fn test_non_empty_body_is_rejected() {
        let (port, _proxy) = fake_proxy(b"HTTP/1.1 200 OK\r\n\r\nunexpected").await;
        let setting = ProxySetting::new("127.0.0.1", port);

        let err = TunnelingSocketFactory::new()
            .create_socket(&RequestOptions::new("api.example.com", 443), &setting)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProxyErrorCode::NonEmptyResponseBody);
    }

    #[tokio::test]
    async fn test_status_code_error() {
        let (port, _proxy) = fake_proxy(
            b"HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Negotiate\r\n\r\n",
        )
        .await;
        let setting = ProxySetting::new("127.0.0.1", port);

        let err = TunnelingSocketFactory::new()
            .create_socket(&RequestOptions::new("api.example.com", 443), &setting)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProxyErrorCode::StatusCode(407));
        assert_eq!(err.code().to_string(), "ProxyStatusCode407");
    }

    #[tokio::test]
    async fn test_timeout_names_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept but never answer
        let _silent = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let setting = ProxySetting::new("127.0.0.1", port);
        let request = RequestOptions::new("api.example.com", 443).timeout(Duration::from_millis(100));
        let err = TunnelingSocketFactory::new()
            .create_socket(&request, &setting)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProxyErrorCode::Timeout);
        assert!(err.message().contains("api.example.com:443"));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let setting = ProxySetting::new("127.0.0.1", port);
        let err = TunnelingSocketFactory::new()
            .create_socket(&RequestOptions::new("api.example.com", 443), &setting)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProxyErrorCode::ConnectionRefused);
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(parse_status_line("HTTP/1.1 200 Connection established"), Some(200));
        assert_eq!(parse_status_line("HTTP/1.0 407"), Some(407));
        assert_eq!(parse_status_line("SSH-2.0-OpenSSH"), None);
        assert_eq!(parse_status_line(""), None);
    }
}
