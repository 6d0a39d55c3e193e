//! Transport A: HTTP over a SOCKS5-tunneled connection using a
//! connection-pooled client.

use std::io::Read;

use crate::proxy::ProxyRecord;
use crate::retry::SegmentError;

use super::sink::{ChunkSink, SinkControl};
use super::{AttemptOutcome, Timeouts};

const USER_AGENT: &str = "Multi-Socks-Downloader/1.0";

/// Issues the GET (ranged, when `range_header` is given) through `proxy` (or
/// direct, when `None`), streaming the body through `sink` as it arrives.
pub fn attempt(
    url: &str,
    range_header: Option<&str>,
    proxy: Option<&ProxyRecord>,
    timeouts: Timeouts,
    sink: &mut ChunkSink,
) -> Result<AttemptOutcome, SegmentError> {
    let client = build_client(proxy, timeouts)?;

    let mut request = client.get(url).header("User-Agent", USER_AGENT);
    if let Some(range) = range_header {
        request = request.header("Range", range);
    }

    let mut response = request.send().map_err(|e| SegmentError::Network(reqwest_io_error(&e)))?;

    let status = response.status().as_u16() as u32;
    if status == 416 {
        return Ok(AttemptOutcome::RangeNotSupported);
    }
    if status != 200 && status != 206 {
        return Err(SegmentError::Http(status));
    }

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(SegmentError::Network)?;
        if n == 0 {
            return Ok(AttemptOutcome::Streamed(SinkControl::Done));
        }
        match sink.accept(&buf[..n])? {
            SinkControl::Continue => continue,
            control => return Ok(AttemptOutcome::Streamed(control)),
        }
    }
}

fn build_client(
    proxy: Option<&ProxyRecord>,
    timeouts: Timeouts,
) -> Result<reqwest::blocking::Client, SegmentError> {
    let mut builder = reqwest::blocking::Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.read)
        .redirect(reqwest::redirect::Policy::limited(10));

    if let Some(p) = proxy {
        let proxy_url = format!("socks5h://{}:{}", p.host, p.port);
        let reqwest_proxy = reqwest::Proxy::all(&proxy_url).map_err(|e| SegmentError::Network(reqwest_io_error(&e)))?;
        builder = builder.proxy(reqwest_proxy);
    }

    builder
        .build()
        .map_err(|e| SegmentError::Network(reqwest_io_error(&e)))
}

/// Maps a reqwest error onto the closest `std::io::ErrorKind` so it flows
/// through the same classification path as transport B's raw socket errors.
fn reqwest_io_error(e: &reqwest::Error) -> std::io::Error {
    let kind = if e.is_timeout() {
        std::io::ErrorKind::TimedOut
    } else if e.is_connect() {
        std::io::ErrorKind::ConnectionRefused
    } else {
        std::io::ErrorKind::Other
    };
    std::io::Error::new(kind, e.to_string())
}
