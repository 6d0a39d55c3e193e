//! Transport B: a hand-rolled HTTP/1.1 request over a manually SOCKS5-dialed
//! TCP socket, TLS-upgraded with rustls for `https` targets. Used when
//! transport A's connection-pooled client and a SOCKS5 endpoint don't get
//! along; parses the status line and headers itself, then streams the body.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use crate::proxy::{connect_via_socks5, ProxyRecord};
use crate::retry::SegmentError;

use super::sink::{ChunkSink, SinkControl};
use super::{AttemptOutcome, Timeouts};

const USER_AGENT: &str = "Multi-Socks-Downloader/1.0";
const READ_PIECE: usize = 64 * 1024;

enum Conn {
    Plain(TcpStream),
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Conn::Plain(s) => s.read(buf),
            Conn::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Conn::Plain(s) => s.write(buf),
            Conn::Tls(s) => s.write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Conn::Plain(s) => s.flush(),
            Conn::Tls(s) => s.flush(),
        }
    }
}

pub fn attempt(
    url: &str,
    range_header: Option<&str>,
    proxy: Option<&ProxyRecord>,
    timeouts: Timeouts,
    sink: &mut ChunkSink,
) -> Result<AttemptOutcome, SegmentError> {
    let parsed = url::Url::parse(url).map_err(|e| SegmentError::Network(net_err(e.to_string())))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| SegmentError::Network(net_err("URL has no host".into())))?
        .to_string();
    let is_https = parsed.scheme() == "https";
    let port = parsed.port_or_known_default().unwrap_or(if is_https { 443 } else { 80 });

    let tcp = match proxy {
        Some(p) => connect_via_socks5(&p.host, p.port, &host, port, timeouts.connect)
            .map_err(|e| SegmentError::Network(net_err(e.to_string())))?,
        None => {
            let addr = format!("{host}:{port}");
            let addrs: Vec<_> = std::net::ToSocketAddrs::to_socket_addrs(&addr)
                .map_err(SegmentError::Network)?
                .collect();
            let addr = addrs
                .first()
                .copied()
                .ok_or_else(|| SegmentError::Network(net_err(format!("no addresses for {addr}"))))?;
            let s = TcpStream::connect_timeout(&addr, timeouts.connect).map_err(SegmentError::Network)?;
            s
        }
    };
    tcp.set_read_timeout(Some(timeouts.read)).map_err(SegmentError::Network)?;
    tcp.set_write_timeout(Some(timeouts.read)).map_err(SegmentError::Network)?;

    let mut conn = if is_https {
        Conn::Tls(Box::new(tls_wrap(tcp, &host)?))
    } else {
        Conn::Plain(tcp)
    };

    let mut path = parsed.path().to_string();
    if let Some(q) = parsed.query() {
        path.push('?');
        path.push_str(q);
    }
    if path.is_empty() {
        path.push('/');
    }

    let mut request = format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {USER_AGENT}\r\nConnection: close\r\nAccept: */*\r\n"
    );
    if let Some(range) = range_header {
        request.push_str(&format!("Range: {range}\r\n"));
    }
    request.push_str("\r\n");

    conn.write_all(request.as_bytes()).map_err(SegmentError::Network)?;

    let status_line = read_line(&mut conn)?;
    let status = parse_status_code(&status_line)?;

    let mut content_length: Option<u64> = None;
    let mut chunked = false;
    loop {
        let line = read_line(&mut conn)?;
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            if name == "content-length" {
                content_length = value.parse::<u64>().ok();
            } else if name == "transfer-encoding" && value.to_ascii_lowercase().contains("chunked") {
                chunked = true;
            }
        }
    }

    if status == 416 {
        return Ok(AttemptOutcome::RangeNotSupported);
    }
    if status != 200 && status != 206 {
        return Err(SegmentError::Http(status));
    }

    let control = if chunked {
        stream_chunked(&mut conn, sink)?
    } else if let Some(len) = content_length {
        stream_fixed(&mut conn, len, sink)?
    } else {
        stream_until_eof(&mut conn, sink)?
    };

    Ok(AttemptOutcome::Streamed(control))
}

fn net_err(msg: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, msg)
}

fn tls_wrap(tcp: TcpStream, host: &str) -> Result<rustls::StreamOwned<rustls::ClientConnection, TcpStream>, SegmentError> {
    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        let _ = roots.add(cert);
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| SegmentError::Network(net_err(format!("invalid DNS name: {host}"))))?;
    let client = rustls::ClientConnection::new(Arc::new(config), server_name)
        .map_err(|e| SegmentError::Network(net_err(e.to_string())))?;

    Ok(rustls::StreamOwned::new(client, tcp))
}

/// Reads a CRLF- or LF-terminated line, one byte at a time (header sections
/// are small; this keeps us from needing a buffered wrapper around `Conn`).
fn read_line(conn: &mut Conn) -> Result<String, SegmentError> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = conn.read(&mut byte).map_err(SegmentError::Network)?;
        if n == 0 {
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        if byte[0] != b'\r' {
            bytes.push(byte[0]);
        }
    }
    String::from_utf8(bytes).map_err(|e| SegmentError::Network(net_err(e.to_string())))
}

fn parse_status_code(status_line: &str) -> Result<u32, SegmentError> {
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| SegmentError::Network(net_err(format!("malformed status line: {status_line}"))))
}

/// Reads exactly `remaining` bytes (or fewer if the sink stops early),
/// feeding each piece to `sink`. Returns `Continue` if `remaining` bytes were
/// all delivered without the sink signalling `Done`/`Stop`; returns that
/// signal unchanged otherwise. Distinguishing "this fixed-length read is
/// exhausted" from "the sink says the overall transfer is done" matters for
/// chunked transfers, where one chunk ending is not the whole body ending.
fn pump_fixed(conn: &mut Conn, mut remaining: u64, sink: &mut ChunkSink) -> Result<SinkControl, SegmentError> {
    let mut buf = vec![0u8; READ_PIECE];
    while remaining > 0 {
        let want = (remaining as usize).min(buf.len());
        let n = conn.read(&mut buf[..want]).map_err(SegmentError::Network)?;
        if n == 0 {
            return Err(SegmentError::PartialTransfer {
                expected: remaining,
                received: 0,
            });
        }
        remaining -= n as u64;
        match sink.accept(&buf[..n])? {
            SinkControl::Continue => continue,
            control => return Ok(control),
        }
    }
    Ok(SinkControl::Continue)
}

/// Streams a Content-Length-bounded body in full; `Continue` at the end means
/// the whole body arrived, which this reports as `Done`.
fn stream_fixed(conn: &mut Conn, remaining: u64, sink: &mut ChunkSink) -> Result<SinkControl, SegmentError> {
    match pump_fixed(conn, remaining, sink)? {
        SinkControl::Continue => Ok(SinkControl::Done),
        other => Ok(other),
    }
}

fn stream_until_eof(conn: &mut Conn, sink: &mut ChunkSink) -> Result<SinkControl, SegmentError> {
    let mut buf = vec![0u8; READ_PIECE];
    loop {
        let n = conn.read(&mut buf).map_err(SegmentError::Network)?;
        if n == 0 {
            return Ok(SinkControl::Done);
        }
        match sink.accept(&buf[..n])? {
            SinkControl::Continue => continue,
            control => return Ok(control),
        }
    }
}

fn stream_chunked(conn: &mut Conn, sink: &mut ChunkSink) -> Result<SinkControl, SegmentError> {
    loop {
        let size_line = read_line(conn)?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = u64::from_str_radix(size_str, 16)
            .map_err(|_| SegmentError::Network(net_err(format!("bad chunk size: {size_line}"))))?;

        if size == 0 {
            loop {
                let trailer = read_line(conn)?;
                if trailer.is_empty() {
                    break;
                }
            }
            return Ok(SinkControl::Done);
        }

        match pump_fixed(conn, size, sink)? {
            SinkControl::Continue => {
                let _ = read_line(conn)?;
            }
            other => return Ok(other),
        }
    }
}
