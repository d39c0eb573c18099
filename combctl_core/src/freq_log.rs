//! Per-channel gating of frequency log rows.
//!
//! Rows are spaced by a fixed period. A late row advances the schedule by one
//! period so the spacing stays constant; a very late row (two periods or more)
//! restarts the schedule from its own time.

use combctl_traits::DeviceError;

/// Destination for logged samples, one stream per channel.
pub trait FrequencySink {
    /// Open a fresh stream for `channel`; called when logging is enabled.
    fn start(&mut self, channel: usize, name: &str) -> Result<(), DeviceError>;
    /// Append `(seconds since start, Hz)`.
    fn record(&mut self, channel: usize, elapsed_s: f64, frequency_hz: f64)
    -> Result<(), DeviceError>;
    /// Close the stream for `channel`, if open.
    fn stop(&mut self, channel: usize) -> Result<(), DeviceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyLogGate {
    period_ms: u64,
    start_ms: u64,
    /// `None` right after `start`, so the first sample always logs.
    last_ms: Option<u64>,
}

impl FrequencyLogGate {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            start_ms: 0,
            last_ms: None,
        }
    }

    pub fn start(&mut self, now_ms: u64) {
        self.start_ms = now_ms;
        self.last_ms = None;
    }

    #[inline]
    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Seconds since `start`.
    pub fn elapsed_s(&self, now_ms: u64) -> f64 {
        now_ms.saturating_sub(self.start_ms) as f64 / 1000.0
    }

    pub fn should_log(&self, now_ms: u64) -> bool {
        match self.last_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) > self.period_ms,
        }
    }

    /// Record that a row was written at `now_ms`.
    pub fn advance(&mut self, now_ms: u64) {
        self.last_ms = Some(match self.last_ms {
            Some(last) if now_ms.saturating_sub(last) < 2 * self.period_ms => last + self.period_ms,
            _ => now_ms,
        });
    }
}
