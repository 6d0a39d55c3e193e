//! Minimal hand-rolled SOCKS5 client: enough of RFC 1928 to CONNECT through
//! an unauthenticated proxy and hand back a connected TCP stream.
//!
//! Used both by the Proxy Tester (liveness probing) and by transport B of
//! the Range Fetcher (hand-rolled HTTP/1.1 over a manually-dialed socket).

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const SOCKS_VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const REP_SUCCEEDED: u8 = 0x00;

/// Dials `proxy_host:proxy_port`, performs the SOCKS5 handshake (no
/// authentication, per the RFC with no authentication required), and asks
/// the proxy to CONNECT to `target_host:target_port`. Returns the resulting
/// TCP stream with both read and write timeouts set to `timeout`.
pub fn connect_via_socks5(
    proxy_host: &str,
    proxy_port: u16,
    target_host: &str,
    target_port: u16,
    timeout: Duration,
) -> Result<TcpStream> {
    let proxy_addr = resolve_one(proxy_host, proxy_port)?;
    let mut stream = TcpStream::connect_timeout(&proxy_addr, timeout)
        .with_context(|| format!("connecting to SOCKS5 proxy {proxy_host}:{proxy_port}"))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    negotiate_no_auth(&mut stream)?;
    request_connect(&mut stream, target_host, target_port)?;

    Ok(stream)
}

fn resolve_one(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("resolving {host}:{port}"))?
        .next()
        .with_context(|| format!("no addresses for {host}:{port}"))
}

fn negotiate_no_auth(stream: &mut TcpStream) -> Result<()> {
    stream.write_all(&[SOCKS_VERSION, 1, METHOD_NO_AUTH])?;

    let mut reply = [0u8; 2];
    stream
        .read_exact(&mut reply)
        .context("reading SOCKS5 method selection reply")?;
    if reply[0] != SOCKS_VERSION {
        bail!("SOCKS5 proxy replied with unexpected version {}", reply[0]);
    }
    if reply[1] != METHOD_NO_AUTH {
        bail!("SOCKS5 proxy requires an authentication method we don't support");
    }
    Ok(())
}

fn request_connect(stream: &mut TcpStream, target_host: &str, target_port: u16) -> Result<()> {
    let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0x00];

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
                bail!("target hostname too long for SOCKS5 domain encoding");
            }
            request.push(ATYP_DOMAIN);
            request.push(target_host.len() as u8);
            request.extend_from_slice(target_host.as_bytes());
        }
    }
    request.extend_from_slice(&target_port.to_be_bytes());

    stream
        .write_all(&request)
        .context("sending SOCKS5 CONNECT request")?;

    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .context("reading SOCKS5 CONNECT reply header")?;
    if header[0] != SOCKS_VERSION {
        bail!("SOCKS5 CONNECT reply had unexpected version {}", header[0]);
    }
    if header[1] != REP_SUCCEEDED {
        bail!("SOCKS5 CONNECT failed with reply code {}", header[1]);
    }

    // Drain the bound address so the stream is positioned at the tunneled payload.
    match header[3] {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4 + 2];
            stream.read_exact(&mut addr)?;
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 16 + 2];
            stream.read_exact(&mut addr)?;
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len)?;
            let mut addr = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut addr)?;
        }
        other => bail!("SOCKS5 CONNECT reply had unknown address type {other}"),
    }

    Ok(())
}
