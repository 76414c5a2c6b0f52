//! Timing for persistence calls.

use std::sync::OnceLock;
use std::time::Instant;

use crate::telemetry::histogram;

/// Monotonic milliseconds since the first call in this process.
pub fn now() -> f64 {
    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_secs_f64() * 1000.0
}

/// Logs elapsed time when dropped, and optionally records it to a histogram.
pub struct TimingGuard {
    label: &'static str,
    histogram: Option<&'static str>,
    start: f64,
}

impl TimingGuard {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            histogram: None,
            start: now(),
        }
    }

    /// Record the elapsed milliseconds under the metric `name` on drop.
    pub fn with_histogram(label: &'static str, name: &'static str) -> Self {
        Self {
            histogram: Some(name),
            ..Self::new(label)
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        now() - self.start
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        if let Some(name) = self.histogram {
            histogram!(name).record(elapsed);
        }
        tracing::trace!(elapsed_ms = elapsed, "{}", self.label);
    }
}
