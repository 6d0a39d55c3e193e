//! Sliding-window speed accounting.
//!
//! A window of up to 15 `(Δt, bytes)` samples, taken no more often than every
//! 300 ms. `current_speed` is the duration-weighted average across the
//! window; the reported speed blends `current_speed` with the task's
//! lifetime average and is clamped to within ±20% of the previous report, so
//! a UI watching it doesn't see it jump around when workers start or stop in
//! bursts.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW_LEN: usize = 15;
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(300);

pub struct SpeedTracker {
    window: VecDeque<(Duration, u64)>,
    last_sample_at: Option<Instant>,
    last_reported: Option<f64>,
}

impl SpeedTracker {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_LEN),
            last_sample_at: None,
            last_reported: None,
        }
    }

    /// Records `bytes_since_last` at `now` if at least `MIN_SAMPLE_INTERVAL`
    /// has passed since the previous sample. Returns whether it sampled;
    /// callers should keep accumulating bytes across no-op calls.
    pub fn maybe_sample(&mut self, now: Instant, bytes_since_last: u64) -> bool {
        if let Some(last) = self.last_sample_at {
            if now.duration_since(last) < MIN_SAMPLE_INTERVAL {
                return false;
            }
        }
        let dt = self
            .last_sample_at
            .map(|last| now.duration_since(last))
            .unwrap_or(MIN_SAMPLE_INTERVAL);
        self.window.push_back((dt, bytes_since_last));
        while self.window.len() > WINDOW_LEN {
            self.window.pop_front();
        }
        self.last_sample_at = Some(now);
        true
    }

    fn current_speed(&self) -> f64 {
        let total_dt: f64 = self.window.iter().map(|(dt, _)| dt.as_secs_f64()).sum();
        if total_dt <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = self
            .window
            .iter()
            .map(|(dt, bytes)| {
                let secs = dt.as_secs_f64().max(f64::EPSILON);
                (*bytes as f64 / secs) * secs
            })
            .sum();
        weighted / total_dt
    }

    /// Blends `current_speed` (70%) with the lifetime average (30%),
    /// clamping to ±20% of the last reported value.
    pub fn report(&mut self, downloaded_size: u64, total_active_time: Duration) -> f64 {
        let current = self.current_speed();
        let average = if total_active_time.as_secs_f64() > 0.0 {
            downloaded_size as f64 / total_active_time.as_secs_f64()
        } else {
            0.0
        };
        let blended = 0.7 * current + 0.3 * average;

        let reported = match self.last_reported {
            Some(prev) if prev > 0.0 => blended.clamp(prev * 0.8, prev * 1.2),
            _ => blended,
        };
        self.last_reported = Some(reported);
        reported
    }

    /// Clears the sample window (used on pause/resume), keeping the last
    /// reported value so the next report isn't clamped against zero.
    pub fn clear_window(&mut self) {
        self.window.clear();
        self.last_sample_at = None;
    }

    /// Forces the next report to zero, used when a task enters a terminal or
    /// paused state (§4.7: reported speed is 0 outside Downloading).
    pub fn zero(&mut self) -> f64 {
        self.window.clear();
        self.last_sample_at = None;
        self.last_reported = Some(0.0);
        0.0
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_respect_min_interval() {
        let mut t = SpeedTracker::new();
        let t0 = Instant::now();
        assert!(t.maybe_sample(t0, 1000));
        assert!(!t.maybe_sample(t0 + Duration::from_millis(100), 500));
        assert!(t.maybe_sample(t0 + Duration::from_millis(400), 500));
    }

    #[test]
    fn report_blends_current_and_average() {
        let mut t = SpeedTracker::new();
        let t0 = Instant::now();
        t.maybe_sample(t0, 3_000_000);
        let reported = t.report(3_000_000, Duration::from_secs(1));
        assert!(reported > 0.0);
    }

    #[test]
    fn report_clamps_to_twenty_percent_band() {
        let mut t = SpeedTracker::new();
        let t0 = Instant::now();
        t.maybe_sample(t0, 1_000_000);
        let first = t.report(1_000_000, Duration::from_secs(1));

        // Huge jump in the next window should be clamped to +20%.
        t.maybe_sample(t0 + Duration::from_millis(300), 100_000_000);
        let second = t.report(101_000_000, Duration::from_secs(1));
        assert!(second <= first * 1.2 + 1e-6);
    }

    #[test]
    fn zero_resets_to_zero_and_stays_clamped_there() {
        let mut t = SpeedTracker::new();
        let t0 = Instant::now();
        t.maybe_sample(t0, 1_000_000);
        t.report(1_000_000, Duration::from_secs(1));
        assert_eq!(t.zero(), 0.0);
    }
}
