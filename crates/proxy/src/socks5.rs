//! Client side of the SOCKS5 protocol (RFC 1928) with username/password
//! subnegotiation (RFC 1929).

use std::net::IpAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::{ProxyEndpoint, Result, TunnelError};

const SOCKS5_VERSION: u8 = 0x05;
const AUTH_NO_AUTH: u8 = 0x00;
const AUTH_USERNAME_PASSWORD: u8 = 0x02;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;
const AUTH_SUBNEG_VERSION: u8 = 0x01;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Method negotiation plus optional username/password subnegotiation.
/// Leaves the stream ready for a request.
pub async fn socks5_handshake(stream: &mut TcpStream, proxy: &ProxyEndpoint) -> Result<()> {
    let offer_auth = proxy.username.is_some();
    let greeting: &[u8] = if offer_auth {
        &[SOCKS5_VERSION, 2, AUTH_NO_AUTH, AUTH_USERNAME_PASSWORD]
    } else {
        &[SOCKS5_VERSION, 1, AUTH_NO_AUTH]
    };
    write_all(stream, greeting).await?;

    let mut resp = [0u8; 2];
    read_exact(stream, &mut resp).await?;
    if resp[0] != SOCKS5_VERSION {
        return Err(TunnelError::protocol(format!(
            "proxy returned unsupported SOCKS version 0x{:02x}",
            resp[0]
        )));
    }

    match resp[1] {
        AUTH_NO_AUTH => Ok(()),
        AUTH_USERNAME_PASSWORD => {
            if !offer_auth {
                return Err(TunnelError::auth(
                    "proxy requires authentication but no credentials are configured",
                ));
            }
            authenticate(stream, proxy).await
        }
        AUTH_NO_ACCEPTABLE => Err(TunnelError::auth(
            "proxy rejected all offered authentication methods",
        )),
        method => Err(TunnelError::protocol(format!(
            "proxy selected unsupported auth method 0x{method:02x}"
        ))),
    }
}

async fn authenticate(stream: &mut TcpStream, proxy: &ProxyEndpoint) -> Result<()> {
    let username = proxy.username.as_deref().unwrap_or("");
    let password = proxy.password.as_deref().unwrap_or("");
    if username.len() > 255 || password.len() > 255 {
        return Err(TunnelError::protocol(
            "SOCKS5 credentials longer than 255 bytes",
        ));
    }

    let mut request = Vec::with_capacity(3 + username.len() + password.len());
    request.push(AUTH_SUBNEG_VERSION);
    request.push(username.len() as u8);
    request.extend_from_slice(username.as_bytes());
    request.push(password.len() as u8);
    request.extend_from_slice(password.as_bytes());
    write_all(stream, &request).await?;

    let mut resp = [0u8; 2];
    read_exact(stream, &mut resp).await?;
    if resp[1] != 0x00 {
        return Err(TunnelError::auth(format!(
            "proxy rejected credentials (status 0x{:02x})",
            resp[1]
        )));
    }
    Ok(())
}

/// Issue a CONNECT request for the target and consume the reply, including
/// the bound-address trailer.
pub async fn socks5_connect(
    stream: &mut TcpStream,
    target_host: &str,
    target_port: u16,
) -> Result<()> {
    let mut request = Vec::with_capacity(7 + target_host.len());
    request.push(SOCKS5_VERSION);
    request.push(CMD_CONNECT);
    request.push(0x00); // RSV
    match target_host.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&v4.octets());
        }
        Ok(IpAddr::V6(v6)) => {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&v6.octets());
        }
        Err(_) => {
            if target_host.len() > 255 {
                return Err(TunnelError::protocol("target host name longer than 255 bytes"));
            }
            request.push(ATYP_DOMAIN);
            request.push(target_host.len() as u8);
            request.extend_from_slice(target_host.as_bytes());
        }
    }
    request.extend_from_slice(&target_port.to_be_bytes());
    write_all(stream, &request).await?;

    let mut head = [0u8; 4];
    read_exact(stream, &mut head).await?;
    if head[0] != SOCKS5_VERSION {
        return Err(TunnelError::protocol(format!(
            "invalid SOCKS5 reply version 0x{:02x}",
            head[0]
        )));
    }
    if head[1] != 0x00 {
        let reason = match head[1] {
            0x01 => "general failure",
            0x02 => "connection not allowed",
            0x03 => "network unreachable",
            0x04 => "host unreachable",
            0x05 => "connection refused",
            0x06 => "TTL expired",
            0x07 => "command not supported",
            0x08 => "address type not supported",
            _ => "unknown error",
        };
        return Err(TunnelError::connect(format!(
            "proxy refused CONNECT: {reason} (0x{:02x})",
            head[1]
        )));
    }

    // Consume BND.ADDR and BND.PORT
    match head[3] {
        ATYP_IPV4 => {
            let mut rest = [0u8; 6];
            read_exact(stream, &mut rest).await?;
        }
        ATYP_IPV6 => {
            let mut rest = [0u8; 18];
            read_exact(stream, &mut rest).await?;
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            read_exact(stream, &mut len).await?;
            let mut rest = vec![0u8; len[0] as usize + 2];
            read_exact(stream, &mut rest).await?;
        }
        atyp => {
            return Err(TunnelError::protocol(format!(
                "unsupported bind address type 0x{atyp:02x}"
            )));
        }
    }

    Ok(())
}

async fn write_all(stream: &mut TcpStream, data: &[u8]) -> Result<()> {
    stream
        .write_all(data)
        .await
        .map_err(|e| TunnelError::connect(format!("proxy write failed: {e}")))
}

async fn read_exact(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    stream
        .read_exact(buf)
        .await
        .map_err(|e| TunnelError::connect(format!("proxy read failed: {e}")))?;
    Ok(())
}
