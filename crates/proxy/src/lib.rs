use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};

mod error;
mod socks5;

pub use error::{Result, TunnelError};
pub use socks5::{socks5_connect, socks5_handshake};

/// Client-side view of a proxy server: where it listens and, optionally,
/// the credentials it expects.
#[derive(Clone, Debug)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyEndpoint {
    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    pub connect_timeout: Option<Duration>,
}

/// Establish a tunnel to `target_host:target_port` through an HTTP proxy
/// using CONNECT. Returns the stream plus any bytes the proxy sent past the
/// end of its response headers.
pub async fn connect_http_tunnel(
    proxy: &ProxyEndpoint,
    target_host: &str,
    target_port: u16,
    options: &ConnectOptions,
) -> Result<(TcpStream, Option<Vec<u8>>)> {
    let mut stream = connect_proxy_stream(proxy, options).await?;

    let mut connect_req = format!(
        "CONNECT {target_host}:{target_port} HTTP/1.1\r\nHost: {target_host}:{target_port}\r\n"
    );
    if let Some(auth) = basic_auth(proxy) {
        connect_req.push_str(&format!("Proxy-Authorization: Basic {auth}\r\n"));
    }
    connect_req.push_str("\r\n");
    stream
        .write_all(connect_req.as_bytes())
        .await
        .map_err(|e| TunnelError::connect(format!("failed to send CONNECT: {e}")))?;

    let mut buf = Vec::with_capacity(1024);
    let mut tmp = [0u8; 512];
    loop {
        let n = stream
            .read(&mut tmp)
            .await
            .map_err(|e| TunnelError::connect(format!("failed to read CONNECT response: {e}")))?;
        if n == 0 {
            return Err(TunnelError::connect("proxy closed during CONNECT"));
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() > 16 * 1024 {
            return Err(TunnelError::protocol("proxy CONNECT response too large"));
        }
    }

    let mut headers = [httparse::EMPTY_HEADER; 16];
    let mut res = httparse::Response::new(&mut headers);
    match res
        .parse(&buf)
        .map_err(|e| TunnelError::protocol(format!("malformed CONNECT response: {e}")))?
    {
        httparse::Status::Complete(n) => {
            let code = res.code.unwrap_or(0);
            if code == 407 {
                return Err(TunnelError::auth("proxy rejected credentials (HTTP 407)"));
            }
            if code != 200 {
                return Err(TunnelError::connect(format!(
                    "proxy CONNECT failed: HTTP {code}"
                )));
            }
            let leftover = if n < buf.len() {
                Some(buf[n..].to_vec())
            } else {
                None
            };
            Ok((stream, leftover))
        }
        httparse::Status::Partial => Err(TunnelError::protocol("proxy CONNECT response incomplete")),
    }
}

/// Establish a tunnel to `target_host:target_port` through a SOCKS5 proxy:
/// method negotiation, optional username/password subnegotiation, CONNECT.
pub async fn connect_socks5_tunnel(
    proxy: &ProxyEndpoint,
    target_host: &str,
    target_port: u16,
    options: &ConnectOptions,
) -> Result<TcpStream> {
    let mut stream = connect_proxy_stream(proxy, options).await?;
    socks5_handshake(&mut stream, proxy).await?;
    socks5_connect(&mut stream, target_host, target_port).await?;
    Ok(stream)
}

/// Open the TCP connection to the proxy itself, bounded by the configured
/// connect timeout.
pub async fn connect_proxy_stream(
    proxy: &ProxyEndpoint,
    options: &ConnectOptions,
) -> Result<TcpStream> {
    let addr = resolve_proxy_addr(proxy).await?;
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(|e| TunnelError::connect(format!("failed to create socket: {e}")))?;

    let connect_fut = socket.connect(addr);
    let stream = if let Some(timeout) = options.connect_timeout {
        match tokio::time::timeout(timeout, connect_fut).await {
            Ok(res) => res.map_err(|e| {
                TunnelError::connect(format!(
                    "failed to connect to proxy {}:{}: {e}",
                    proxy.host, proxy.port
                ))
            })?,
            Err(_) => return Err(TunnelError::timeout("proxy connect timeout")),
        }
    } else {
        connect_fut.await.map_err(|e| {
            TunnelError::connect(format!(
                "failed to connect to proxy {}:{}: {e}",
                proxy.host, proxy.port
            ))
        })?
    };
    Ok(stream)
}

async fn resolve_proxy_addr(proxy: &ProxyEndpoint) -> Result<SocketAddr> {
    let addrs = tokio::net::lookup_host((proxy.host.as_str(), proxy.port))
        .await
        .map_err(|e| TunnelError::connect(format!("failed to resolve proxy host {}: {e}", proxy.host)))?;
    let mut first = None;
    let mut first_v4 = None;
    for addr in addrs {
        if first.is_none() {
            first = Some(addr);
        }
        if matches!(addr, SocketAddr::V4(_)) {
            first_v4 = Some(addr);
            break;
        }
    }
    first_v4
        .or(first)
        .ok_or_else(|| TunnelError::connect("proxy host did not resolve to any IPs"))
}

fn basic_auth(proxy: &ProxyEndpoint) -> Option<String> {
    use base64::Engine;
    let username = proxy.username.as_deref()?;
    let password = proxy.password.as_deref().unwrap_or("");
    Some(base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn endpoint(port: u16, auth: bool) -> ProxyEndpoint {
        ProxyEndpoint {
            host: "127.0.0.1".to_string(),
            port,
            username: auth.then(|| "user".to_string()),
            password: auth.then(|| "pass".to_string()),
        }
    }

    #[tokio::test]
    async fn http_tunnel_success_with_leftover() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let proxy = endpoint(addr.port(), true);

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let n = socket.read(&mut buf).await.unwrap();
            let req = String::from_utf8_lossy(&buf[..n]);
            assert!(req.contains("CONNECT example.com:80"));
            assert!(req.contains("Proxy-Authorization: Basic"));
            let response = b"HTTP/1.1 200 Connection Established\r\n\r\nleftover";
            socket.write_all(response).await.unwrap();
        });

        let (_stream, leftover) =
            connect_http_tunnel(&proxy, "example.com", 80, &ConnectOptions::default())
                .await
                .unwrap();
        assert_eq!(leftover, Some(b"leftover".to_vec()));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn http_tunnel_without_credentials_omits_auth_header() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let proxy = endpoint(addr.port(), false);

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let n = socket.read(&mut buf).await.unwrap();
            let req = String::from_utf8_lossy(&buf[..n]);
            assert!(!req.contains("Proxy-Authorization"));
            socket
                .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
                .await
                .unwrap();
        });

        let (_stream, leftover) =
            connect_http_tunnel(&proxy, "example.com", 443, &ConnectOptions::default())
                .await
                .unwrap();
        assert_eq!(leftover, None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn http_tunnel_maps_407_to_auth_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let proxy = endpoint(addr.port(), true);

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await
                .unwrap();
        });

        let err = connect_http_tunnel(&proxy, "example.com", 80, &ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Auth(_)));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn http_tunnel_rejects_non_200() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let proxy = endpoint(addr.port(), false);

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                .await
                .unwrap();
        });

        let err = connect_http_tunnel(&proxy, "example.com", 80, &ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Connect(_)));
        assert!(err.to_string().contains("HTTP 502"));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn connect_times_out_against_silent_drop() {
        // A listener with no accept loop still completes the TCP handshake,
        // so point at a port nothing listens on instead.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let proxy = endpoint(port, false);
        let options = ConnectOptions {
            connect_timeout: Some(Duration::from_millis(500)),
        };
        let err = connect_proxy_stream(&proxy, &options).await.unwrap_err();
        assert!(matches!(
            err,
            TunnelError::Connect(_) | TunnelError::Timeout(_)
        ));
    }
}
