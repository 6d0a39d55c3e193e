//! Range Fetcher and Single-stream Fetcher: the per-segment and whole-body
//! download workers, each trying transport A, then B, then C in turn before
//! giving up, per the retry/backoff policy in `crate::retry`.

mod client_a;
mod client_b;
mod client_c;
mod sink;

pub use sink::{ChunkSink, SinkControl, NO_UPPER_BOUND};

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::proxy::ProxyRecord;
use crate::retry::{run_with_retry, RetryPolicy, SegmentError};
use crate::segmenter::Segment;
use crate::storage::StorageWriter;

/// Connect/read timeouts shared by every transport attempt.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            read: Duration::from_secs(30),
        }
    }
}

/// What a single transport attempt produced.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    /// The body streamed through to `sink`, ending in this control state.
    Streamed(SinkControl),
    /// The server replied 416; the caller must not retry this.
    RangeNotSupported,
}

/// Outcome of a full `fetch_segment`/`fetch_single_stream` call, after
/// transport fallback and retry have both been exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The range (or whole body) was written in full.
    Done,
    /// The cooperative stop signal was observed; `current`/`downloaded_size`
    /// reflect exactly what was persisted.
    Stopped,
    /// The server refused range requests (HTTP 416); caller should latch to
    /// single-stream mode and restart the task.
    RangeNotSupported,
}

/// Retry policy for a single segment/stream attempt: §4.4 step 7 calls for
/// "up to 3 times with a short backoff".
fn segment_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(300),
        max_delay: Duration::from_secs(5),
    }
}

/// Tries transport A, then B, then C, in order, until one succeeds, returns
/// `RangeNotSupported`, or all three have failed (in which case the last
/// transport's error is returned). This absorbs SOCKS5 endpoints that behave
/// differently under a connection-pooled stack vs. a raw socket vs. curl.
fn attempt_with_fallback(
    url: &str,
    range_header: Option<&str>,
    proxy: Option<&ProxyRecord>,
    timeouts: Timeouts,
    sink: &mut ChunkSink,
) -> Result<AttemptOutcome, SegmentError> {
    match client_a::attempt(url, range_header, proxy, timeouts, sink) {
        Ok(outcome) => return Ok(outcome),
        Err(SegmentError::Http(code)) => return Err(SegmentError::Http(code)),
        Err(_) => {}
    }

    match client_b::attempt(url, range_header, proxy, timeouts, sink) {
        Ok(outcome) => return Ok(outcome),
        Err(SegmentError::Http(code)) => return Err(SegmentError::Http(code)),
        Err(_) => {}
    }

    client_c::attempt(url, range_header, proxy, timeouts, sink)
}

/// Downloads one segment's remaining bytes (`segment.current..=segment.end_inclusive`)
/// into `storage`, trying each transport in turn and retrying transient
/// failures per `segment_retry_policy()`. `on_progress` is invoked with each
/// chunk's byte count as it is written.
///
/// A 416 anywhere in the fallback chain short-circuits immediately: it is
/// never retried and never falls through to another transport attempt
/// (callers should check `RangeNotSupported` before consulting `segment`).
pub fn fetch_segment(
    url: &str,
    segment: &mut Segment,
    storage: &StorageWriter,
    proxy: Option<&ProxyRecord>,
    stop_flag: &AtomicBool,
    timeouts: Timeouts,
    mut on_progress: impl FnMut(u64),
) -> Result<FetchOutcome, SegmentError> {
    if segment.completed || segment.current > segment.end_inclusive {
        return Ok(FetchOutcome::Done);
    }

    let policy = segment_retry_policy();
    let mut outcome = FetchOutcome::Stopped;

    run_with_retry(&policy, || {
        let range_header = segment.range_header_value();
        let mut sink = ChunkSink::new(
            storage,
            segment.current,
            segment.end_inclusive,
            stop_flag,
            &mut on_progress,
        );
        let result = attempt_with_fallback(url, Some(&range_header), proxy, timeouts, &mut sink);
        segment.current = sink.current();

        match result {
            Ok(AttemptOutcome::RangeNotSupported) => {
                outcome = FetchOutcome::RangeNotSupported;
                Ok(())
            }
            Ok(AttemptOutcome::Streamed(SinkControl::Done)) => {
                segment.mark_completed();
                outcome = FetchOutcome::Done;
                Ok(())
            }
            Ok(AttemptOutcome::Streamed(SinkControl::Stop)) | Ok(AttemptOutcome::Streamed(SinkControl::Continue)) => {
                outcome = FetchOutcome::Stopped;
                Ok(())
            }
            Err(e) => Err(e),
        }
    })?;

    Ok(outcome)
}

/// Downloads the whole body sequentially (no `Range` header), for when
/// `total_size` is unknown, the file is small, or the task has latched to
/// single-stream mode. Uses the first proxy if any are configured.
pub fn fetch_single_stream(
    url: &str,
    storage: &StorageWriter,
    start_at: u64,
    proxy: Option<&ProxyRecord>,
    stop_flag: &AtomicBool,
    timeouts: Timeouts,
    mut on_progress: impl FnMut(u64),
) -> Result<FetchOutcome, SegmentError> {
    let policy = segment_retry_policy();
    let mut current = start_at;
    let mut outcome = FetchOutcome::Stopped;

    run_with_retry(&policy, || {
        let mut sink = ChunkSink::new(storage, current, NO_UPPER_BOUND, stop_flag, &mut on_progress);
        let result = attempt_with_fallback(url, None, proxy, timeouts, &mut sink);
        current = sink.current();

        match result {
            Ok(AttemptOutcome::RangeNotSupported) => {
                outcome = FetchOutcome::RangeNotSupported;
                Ok(())
            }
            Ok(AttemptOutcome::Streamed(SinkControl::Done)) => {
                outcome = FetchOutcome::Done;
                Ok(())
            }
            Ok(AttemptOutcome::Streamed(SinkControl::Stop)) | Ok(AttemptOutcome::Streamed(SinkControl::Continue)) => {
                outcome = FetchOutcome::Stopped;
                Ok(())
            }
            Err(e) => Err(e),
        }
    })?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_segment_short_circuits_when_already_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.downloading");
        let mut builder = crate::storage::StorageWriterBuilder::create(&path).unwrap();
        builder.preallocate(10).unwrap();
        let writer = builder.build();
        let stop = AtomicBool::new(false);

        let mut segment = Segment {
            index: 0,
            start: 0,
            end_inclusive: 9,
            current: 10,
            completed: true,
        };

        let outcome = fetch_segment(
            "http://example.invalid/file",
            &mut segment,
            &writer,
            None,
            &stop,
            Timeouts::default(),
            |_| {},
        )
        .unwrap();
        assert_eq!(outcome, FetchOutcome::Done);
    }
}
