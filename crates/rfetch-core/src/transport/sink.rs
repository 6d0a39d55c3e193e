//! Shared byte sink: every transport funnels its response body through this
//! so offset tracking, the end-of-range truncation, and the stop signal are
//! handled identically regardless of which transport produced the bytes.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::retry::SegmentError;
use crate::storage::StorageWriter;

/// Sentinel used as `end_inclusive` for a single-stream fetch, which has no
/// upper bound to truncate against.
pub const NO_UPPER_BOUND: u64 = u64::MAX;

/// What the sink decided after the most recent chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    /// Keep reading; neither done nor stopped.
    Continue,
    /// `current` reached `end_inclusive + 1`; the range is fully written.
    Done,
    /// The cooperative stop signal was observed; caller should persist and return.
    Stop,
}

/// Writes response bytes into a segment's byte range, tracking `current` and
/// reporting bytes written back to the caller for progress accounting.
pub struct ChunkSink<'a> {
    storage: &'a StorageWriter,
    end_inclusive: u64,
    current: u64,
    stop_flag: &'a AtomicBool,
    on_progress: &'a mut dyn FnMut(u64),
}

impl<'a> ChunkSink<'a> {
    pub fn new(
        storage: &'a StorageWriter,
        start_at: u64,
        end_inclusive: u64,
        stop_flag: &'a AtomicBool,
        on_progress: &'a mut dyn FnMut(u64),
    ) -> Self {
        Self {
            storage,
            end_inclusive,
            current: start_at,
            stop_flag,
            on_progress,
        }
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    /// Writes `data` (truncated if it would overrun `end_inclusive`) at the
    /// current offset, advances `current`, and reports the decision.
    pub fn accept(&mut self, data: &[u8]) -> Result<SinkControl, SegmentError> {
        if data.is_empty() {
            return Ok(self.decide());
        }

        let remaining = if self.end_inclusive == NO_UPPER_BOUND {
            data.len() as u64
        } else {
            (self.end_inclusive + 1).saturating_sub(self.current)
        };
        let take = (data.len() as u64).min(remaining) as usize;

        self.storage
            .write_at(self.current, &data[..take])
            .map_err(|e| SegmentError::Storage(io_error(e)))?;
        self.current += take as u64;
        (self.on_progress)(take as u64);

        Ok(self.decide())
    }

    fn decide(&self) -> SinkControl {
        if self.end_inclusive != NO_UPPER_BOUND && self.current > self.end_inclusive {
            return SinkControl::Done;
        }
        if self.stop_flag.load(Ordering::Relaxed) {
            return SinkControl::Stop;
        }
        SinkControl::Continue
    }
}

fn io_error(e: anyhow::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn storage(dir: &std::path::Path, size: u64) -> StorageWriter {
        let path = dir.join("out.downloading");
        let mut builder = crate::storage::StorageWriterBuilder::create(&path).unwrap();
        builder.preallocate(size).unwrap();
        builder.build()
    }

    #[test]
    fn truncates_at_end_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let writer = storage(dir.path(), 10);
        let stop = AtomicBool::new(false);
        let mut total = 0u64;
        let mut sink = ChunkSink::new(&writer, 5, 7, &stop, &mut |n| total += n);

        let control = sink.accept(b"abcdef").unwrap();
        assert_eq!(control, SinkControl::Done);
        assert_eq!(sink.current(), 8);
        assert_eq!(total, 3);
    }

    #[test]
    fn stops_when_flag_set_between_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let writer = storage(dir.path(), 100);
        let stop = AtomicBool::new(false);
        let mut total = 0u64;
        let mut sink = ChunkSink::new(&writer, 0, 99, &stop, &mut |n| total += n);

        assert_eq!(sink.accept(b"hello").unwrap(), SinkControl::Continue);
        stop.store(true, Ordering::Relaxed);
        assert_eq!(sink.accept(b"world").unwrap(), SinkControl::Stop);
        assert_eq!(total, 10);
    }

    #[test]
    fn no_upper_bound_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let writer = storage(dir.path(), 100);
        let stop = AtomicBool::new(false);
        let mut total = 0u64;
        let mut sink = ChunkSink::new(&writer, 0, NO_UPPER_BOUND, &stop, &mut |n| total += n);
        assert_eq!(sink.accept(&[1u8; 50]).unwrap(), SinkControl::Continue);
        assert_eq!(total, 50);
    }
}
