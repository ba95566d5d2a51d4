use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use proxydesk_proxy::{
    ConnectOptions, ProxyEndpoint, connect_http_tunnel, connect_proxy_stream,
    connect_socks5_tunnel, socks5_handshake,
};

use crate::config::{ProxyConfig, ProxyTestResult, ProxyType};
use crate::error::{ProxyError, Result};

/// Where and how the tester talks to the outside world. The probe target is
/// a plain-HTTP IP echo service so the request can run through a raw tunnel;
/// tests point it at a local mock.
#[derive(Clone, Debug)]
pub struct TesterOptions {
    pub probe_host: String,
    pub probe_port: u16,
    /// Ceiling for a full connection test.
    pub test_timeout: Duration,
    /// Ceiling for a liveness probe.
    pub probe_timeout: Duration,
    /// Per-attempt TCP connect ceiling.
    pub connect_timeout: Duration,
}

impl Default for TesterOptions {
    fn default() -> Self {
        Self {
            probe_host: "api.ipify.org".to_string(),
            probe_port: 80,
            test_timeout: Duration::from_secs(8),
            probe_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// One-shot connection attempts through a candidate configuration. Failures
/// never escape as errors from `test`; they are folded into the result.
#[derive(Clone, Debug)]
pub struct ProxyTester {
    options: TesterOptions,
}

impl ProxyTester {
    pub fn new(options: TesterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TesterOptions {
        &self.options
    }

    /// Full connection test: handshake through the proxy, then a minimal
    /// HTTP exchange with the IP echo target. Latency covers the request
    /// round trip through the established tunnel.
    pub async fn test(&self, config: &ProxyConfig) -> ProxyTestResult {
        if let Err(e) = config.validate() {
            return ProxyTestResult::failure(format!("invalid configuration: {e}"));
        }

        match tokio::time::timeout(self.options.test_timeout, self.run_test(config)).await {
            Ok(Ok((latency_ms, external_ip))) => ProxyTestResult::success(latency_ms, external_ip),
            Ok(Err(e)) => ProxyTestResult::failure(e.to_string()),
            Err(_) => ProxyTestResult::failure("connection test timed out".to_string()),
        }
    }

    async fn run_test(&self, config: &ProxyConfig) -> Result<(u64, Option<String>)> {
        let mut stream = self
            .open_tunnel(config, &self.options.probe_host, self.options.probe_port)
            .await?;
        let start = Instant::now();
        let external_ip = fetch_external_ip(&mut stream, &self.options.probe_host).await?;
        let latency_ms = start.elapsed().as_millis() as u64;
        Ok((latency_ms, external_ip))
    }

    /// Lightweight liveness probe: connect and complete the protocol
    /// handshake, nothing more. Returns the handshake latency.
    pub async fn probe(&self, config: &ProxyConfig) -> Result<u64> {
        config.validate().map_err(ProxyError::Validation)?;
        let endpoint = endpoint_of(config);
        let connect_options = self.connect_options();
        let start = Instant::now();

        let handshake = async {
            match config.proxy_type {
                ProxyType::Socks5 => {
                    let mut stream = connect_proxy_stream(&endpoint, &connect_options).await?;
                    socks5_handshake(&mut stream, &endpoint).await?;
                    Ok::<_, proxydesk_proxy::TunnelError>(())
                }
                ProxyType::Http | ProxyType::Https => {
                    let (stream, _) = connect_http_tunnel(
                        &endpoint,
                        &self.options.probe_host,
                        self.options.probe_port,
                        &connect_options,
                    )
                    .await?;
                    drop(stream);
                    Ok(())
                }
            }
        };

        match tokio::time::timeout(self.options.probe_timeout, handshake).await {
            Ok(Ok(())) => Ok(start.elapsed().as_millis() as u64),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProxyError::connect("probe timed out")),
        }
    }

    /// Establish a verified session for the Connection Manager: the same
    /// connect logic as `test`, but the socket is handed back to be held as
    /// the active path rather than discarded.
    pub async fn establish(&self, config: &ProxyConfig) -> Result<(TcpStream, u64)> {
        config.validate().map_err(ProxyError::Validation)?;
        let endpoint = endpoint_of(config);
        let connect_options = self.connect_options();
        let start = Instant::now();

        let establish = async {
            match config.proxy_type {
                ProxyType::Socks5 => {
                    let mut stream = connect_proxy_stream(&endpoint, &connect_options).await?;
                    socks5_handshake(&mut stream, &endpoint).await?;
                    Ok::<_, proxydesk_proxy::TunnelError>(stream)
                }
                ProxyType::Http | ProxyType::Https => {
                    let (stream, _) = connect_http_tunnel(
                        &endpoint,
                        &self.options.probe_host,
                        self.options.probe_port,
                        &connect_options,
                    )
                    .await?;
                    Ok(stream)
                }
            }
        };

        match tokio::time::timeout(self.options.test_timeout, establish).await {
            Ok(Ok(stream)) => Ok((stream, start.elapsed().as_millis() as u64)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProxyError::connect("activation timed out")),
        }
    }

    async fn open_tunnel(
        &self,
        config: &ProxyConfig,
        target_host: &str,
        target_port: u16,
    ) -> Result<TcpStream> {
        let endpoint = endpoint_of(config);
        let connect_options = self.connect_options();
        let stream = match config.proxy_type {
            ProxyType::Socks5 => {
                connect_socks5_tunnel(&endpoint, target_host, target_port, &connect_options).await?
            }
            ProxyType::Http | ProxyType::Https => {
                let (stream, _) =
                    connect_http_tunnel(&endpoint, target_host, target_port, &connect_options)
                        .await?;
                stream
            }
        };
        Ok(stream)
    }

    fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Some(self.options.connect_timeout),
        }
    }
}

impl Default for ProxyTester {
    fn default() -> Self {
        Self::new(TesterOptions::default())
    }
}

fn endpoint_of(config: &ProxyConfig) -> ProxyEndpoint {
    ProxyEndpoint {
        host: config.host.clone(),
        port: config.port,
        username: config.username.clone(),
        password: config.password.clone(),
    }
}

/// Minimal HTTP exchange through the established tunnel: GET the echo
/// document, parse the response, return the body as the observed IP.
async fn fetch_external_ip(stream: &mut TcpStream, host: &str) -> Result<Option<String>> {
    let request =
        format!("GET / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\nAccept: text/plain\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ProxyError::connect(format!("failed to send probe request: {e}")))?;

    let mut buf = Vec::with_capacity(1024);
    let mut tmp = [0u8; 512];
    loop {
        let n = stream
            .read(&mut tmp)
            .await
            .map_err(|e| ProxyError::connect(format!("failed to read probe response: {e}")))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.len() > 64 * 1024 {
            return Err(ProxyError::Protocol("probe response too large".to_string()));
        }
    }

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(&buf) {
        Ok(httparse::Status::Complete(header_len)) => {
            let code = response.code.unwrap_or(0);
            if code != 200 {
                return Err(ProxyError::Protocol(format!(
                    "probe target returned HTTP {code}"
                )));
            }
            let body = String::from_utf8_lossy(&buf[header_len..]);
            let ip = body.trim();
            if ip.is_empty() {
                Ok(None)
            } else {
                Ok(Some(ip.to_string()))
            }
        }
        Ok(httparse::Status::Partial) => Err(ProxyError::Protocol(
            "probe response incomplete".to_string(),
        )),
        Err(e) => Err(ProxyError::Protocol(format!(
            "malformed probe response: {e}"
        ))),
    }
}
