//! Transport C: direct curl client (libcurl) with the SOCKS5 endpoint set as
//! `CURLOPT_PROXY`, streamed through `ChunkSink` via curl's scoped transfer API.

use crate::proxy::ProxyRecord;
use crate::retry::SegmentError;

use super::sink::{ChunkSink, SinkControl};
use super::{AttemptOutcome, Timeouts};

const USER_AGENT: &str = "Multi-Socks-Downloader/1.0";

pub fn attempt(
    url: &str,
    range_header: Option<&str>,
    proxy: Option<&ProxyRecord>,
    timeouts: Timeouts,
    sink: &mut ChunkSink,
) -> Result<AttemptOutcome, SegmentError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(SegmentError::Curl)?;
    easy.useragent(USER_AGENT).map_err(SegmentError::Curl)?;
    easy.follow_location(true).map_err(SegmentError::Curl)?;
    easy.connect_timeout(timeouts.connect).map_err(SegmentError::Curl)?;
    easy.timeout(timeouts.read).map_err(SegmentError::Curl)?;

    if let Some(range) = range_header {
        let mut headers = curl::easy::List::new();
        headers
            .append(&format!("Range: {range}"))
            .map_err(SegmentError::Curl)?;
        easy.http_headers(headers).map_err(SegmentError::Curl)?;
    }

    if let Some(p) = proxy {
        let proxy_url = format!("socks5h://{}:{}", p.host, p.port);
        easy.proxy(&proxy_url).map_err(SegmentError::Curl)?;
    }

    let mut final_control: Option<SinkControl> = None;
    let mut write_err: Option<SegmentError> = None;

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| match sink.accept(data) {
                Ok(SinkControl::Continue) => Ok(data.len()),
                Ok(control) => {
                    final_control = Some(control);
                    Ok(0)
                }
                Err(e) => {
                    write_err = Some(e);
                    Ok(0)
                }
            })
            .map_err(SegmentError::Curl)?;

        if let Err(e) = transfer.perform() {
            if final_control.is_none() && write_err.is_none() {
                return Err(SegmentError::Curl(e));
            }
        }
    }

    if let Some(e) = write_err {
        return Err(e);
    }

    let status = easy.response_code().map_err(SegmentError::Curl)?;
    if status == 416 {
        return Ok(AttemptOutcome::RangeNotSupported);
    }
    if status != 200 && status != 206 {
        return Err(SegmentError::Http(status));
    }

    Ok(AttemptOutcome::Streamed(
        final_control.unwrap_or(SinkControl::Done),
    ))
}
