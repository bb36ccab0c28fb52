//! Elapsed time and smoothed throughput of a running scan.

use std::time::{Duration, Instant};

/// Weight of the newest sample in the moving average.
const SMOOTHING: f64 = 0.2;

/// Tracks how fast entries are visited, as an exponentially weighted
/// moving average of the rate between two samples.
#[derive(Debug, Clone)]
pub(crate) struct RateMeter {
    start: Instant,
    last_sample: Instant,
    last_count: u64,
    smoothed: Option<f64>,
}

impl RateMeter {
    pub(crate) fn new(start: Instant) -> Self {
        Self {
            start,
            last_sample: start,
            last_count: 0,
            smoothed: None,
        }
    }

    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    /// Records that `count` entries have been visited by `now` and returns
    /// the smoothed rate in entries per second.
    pub(crate) fn observe(&mut self, count: u64, now: Instant) -> f64 {
        let dt = now.saturating_duration_since(self.last_sample).as_secs_f64();
        if dt <= 0.0 {
            return self.smoothed.unwrap_or(0.0);
        }

        let instant_rate = count.saturating_sub(self.last_count) as f64 / dt;
        let rate = match self.smoothed {
            None => instant_rate,
            Some(previous) => previous + SMOOTHING * (instant_rate - previous),
        };
        self.smoothed = Some(rate);
        self.last_sample = now;
        self.last_count = count;
        rate
    }
}
