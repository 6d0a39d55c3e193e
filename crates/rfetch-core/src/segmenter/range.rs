//! Segment type and range planning.

use serde::{Deserialize, Serialize};

/// One contiguous byte range of the target resource, owned by one worker at a time.
///
/// `current` is the next offset to write; the segment is done once
/// `current == end_inclusive + 1`. Invariant: `start <= current <= end_inclusive + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub start: u64,
    pub end_inclusive: u64,
    pub current: u64,
    pub completed: bool,
}

impl Segment {
    /// Total length of the range in bytes.
    pub fn len(&self) -> u64 {
        self.end_inclusive + 1 - self.start
    }

    /// Bytes already written into this segment.
    pub fn downloaded(&self) -> u64 {
        self.current - self.start
    }

    /// HTTP `Range` header value for the remaining, unwritten portion.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}-{}", self.current, self.end_inclusive)
    }

    /// Marks the segment complete: `current` snaps to one past `end_inclusive`.
    pub fn mark_completed(&mut self) {
        self.current = self.end_inclusive + 1;
        self.completed = true;
    }
}

/// Floor on a single segment's size: below this, the per-request overhead of
/// range requests outweighs any parallelism benefit.
const MIN_SEGMENT_SIZE: u64 = 1024 * 1024;

/// Lays out `[0, total_size)` as fixed-size segments of
/// `max(MIN_SEGMENT_SIZE, total_size / parts_count)` bytes each, clamping the
/// last segment's `end_inclusive` to `total_size - 1`.
///
/// `parts_count` is a hint, not a guarantee: when the even split would fall
/// under the floor, the floor wins and the resulting segment count is lower
/// than `parts_count` (e.g. a file much smaller than `parts_count` MiB
/// collapses to a single segment).
///
/// Returns an empty vec if `total_size` is 0 or `parts_count` is 0.
pub fn plan_segments(total_size: u64, parts_count: usize) -> Vec<Segment> {
    if total_size == 0 || parts_count == 0 {
        return Vec::new();
    }

    let segment_size = (total_size / parts_count as u64).max(MIN_SEGMENT_SIZE);

    let mut out = Vec::new();
    let mut offset = 0u64;
    let mut index = 0usize;

    while offset < total_size {
        let end_inclusive = (offset + segment_size - 1).min(total_size - 1);
        out.push(Segment {
            index,
            start: offset,
            end_inclusive,
            current: offset,
            completed: false,
        });
        offset = end_inclusive + 1;
        index += 1;
    }

    out
}
