//! Counter timing helpers.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: f64 = 1_000.0;

/// Counter tick period: 1.5 gate times, in milliseconds.
/// - Rounds to the nearest millisecond.
/// - Ensures result is at least 1 millisecond; non-finite gate times give 1.
#[inline]
pub fn timer_period_ms(gate_time_s: f64) -> u64 {
    let ms = (1.5 * MILLIS_PER_SEC * gate_time_s).round();
    if ms.is_finite() && ms >= 1.0 {
        ms as u64
    } else {
        1
    }
}
