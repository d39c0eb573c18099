//! Frequency-error feedback: one fixed step per eligible tick.
//!
//! Both variants only decide; the session owns the actuators and applies the
//! decision. Elapsed time is `None` when feedback has just been armed, which
//! makes the next evaluation eligible.

use crate::config::{LaserActuator, LaserFeedbackCfg, TempFeedbackCfg};
use crate::limits;
use crate::safety::{StrikeCounter, StrikeOutcome};

/// Line sent to fold the cumulative adjust into the peer's permanent setpoint.
pub const COMMIT_ADJUST: &str = "COMMITADJUST";

/// Wire form of an adjust value: fixed six decimals, newline terminated.
pub fn format_adjust(value: f64) -> String {
    format!("{value:.6}\n")
}

#[inline]
fn is_due(elapsed_ms: Option<u64>, period_ms: u64) -> bool {
    elapsed_ms.is_none_or(|e| e >= period_ms)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LaserDecision {
    /// Period not yet elapsed.
    NotDue,
    /// Within detune and threshold; no correction.
    InBound,
    /// Step the configured actuator by `delta` device units.
    Step { actuator: LaserActuator, delta: i64 },
    /// Outside the allowed detune; strike recorded.
    Strike { strikes: u32, detune_hz: f64 },
    /// Strike limit exceeded; feedback must be disabled.
    Shutoff { detune_hz: f64 },
}

impl LaserDecision {
    /// Whether the shared last-feedback time should move to "now".
    pub fn refreshes_timer(&self) -> bool {
        matches!(self, LaserDecision::InBound | LaserDecision::Step { .. })
    }
}

/// Frequency to reference-laser feedback.
#[derive(Debug, Clone)]
pub struct LaserFeedback {
    cfg: LaserFeedbackCfg,
}

impl LaserFeedback {
    pub fn new(cfg: LaserFeedbackCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &LaserFeedbackCfg {
        &self.cfg
    }

    /// Strike counter with this controller's limit and policy.
    pub fn new_strike_counter(&self) -> StrikeCounter {
        StrikeCounter::new(self.cfg.strike_limit, self.cfg.strike_policy)
    }

    /// Actuator step for a deviation. Current: `dF > 0` lowers the current.
    /// Temperature: `dF > 0` lowers the thermistor set-point (warmer laser,
    /// lower repetition rate).
    pub fn step_for(detune_hz: f64) -> i64 {
        if detune_hz > 0.0 { -1 } else { 1 }
    }

    pub fn evaluate(
        &self,
        strikes: &mut StrikeCounter,
        measured_hz: f64,
        target_hz: f64,
        elapsed_ms: Option<u64>,
    ) -> LaserDecision {
        if !is_due(elapsed_ms, self.cfg.period_ms) {
            return LaserDecision::NotDue;
        }
        let detune_hz = measured_hz - target_hz;
        if detune_hz.abs() > self.cfg.allowed_detune_hz {
            return match strikes.record(true) {
                StrikeOutcome::Shutoff => LaserDecision::Shutoff { detune_hz },
                StrikeOutcome::Strike(n) => LaserDecision::Strike {
                    strikes: n,
                    detune_hz,
                },
                StrikeOutcome::Clear => LaserDecision::InBound,
            };
        }
        strikes.record(false);
        if detune_hz.abs() > self.cfg.threshold_hz {
            LaserDecision::Step {
                actuator: self.cfg.actuator,
                delta: Self::step_for(detune_hz),
            }
        } else {
            LaserDecision::InBound
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempDecision {
    NotDue,
    InBound,
    /// Cumulative adjust moved to `value`; `clamped` when it hit the limit.
    Adjust { value: f64, clamped: bool },
}

/// Frequency to comb-temperature feedback via a remote adjust value.
#[derive(Debug, Clone)]
pub struct TemperatureFeedback {
    cfg: TempFeedbackCfg,
}

impl TemperatureFeedback {
    pub fn new(cfg: TempFeedbackCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &TempFeedbackCfg {
        &self.cfg
    }

    pub fn evaluate(
        &self,
        cumulative_adjust: &mut f64,
        measured_hz: f64,
        target_hz: f64,
        elapsed_ms: Option<u64>,
    ) -> TempDecision {
        if !is_due(elapsed_ms, self.cfg.period_ms) {
            return TempDecision::NotDue;
        }
        let detune_hz = measured_hz - target_hz;
        if detune_hz.abs() <= self.cfg.threshold_hz {
            return TempDecision::InBound;
        }
        let sign = if detune_hz > 0.0 { 1.0 } else { -1.0 };
        let max = self.cfg.max_adjust;
        let raw = *cumulative_adjust + sign * self.cfg.step;
        let value = limits::clamp(raw, -max, max);
        *cumulative_adjust = value;
        TempDecision::Adjust {
            value,
            clamped: value != raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::StrikePolicy;

    fn laser_cfg(actuator: LaserActuator) -> LaserFeedbackCfg {
        LaserFeedbackCfg {
            period_ms: 2000,
            threshold_hz: 5.0,
            allowed_detune_hz: 120.0,
            strike_limit: 3,
            strike_policy: StrikePolicy::Exceeds,
            actuator,
        }
    }

    #[test]
    fn gate_waits_for_period() {
        let fb = LaserFeedback::new(laser_cfg(LaserActuator::Current));
        let mut s = fb.new_strike_counter();
        assert_eq!(fb.evaluate(&mut s, 110.0, 100.0, Some(1999)), LaserDecision::NotDue);
        assert!(matches!(
            fb.evaluate(&mut s, 110.0, 100.0, Some(2000)),
            LaserDecision::Step { .. }
        ));
        assert!(matches!(
            fb.evaluate(&mut s, 110.0, 100.0, None),
            LaserDecision::Step { .. }
        ));
    }

    #[test]
    fn step_direction_per_actuator() {
        for actuator in [LaserActuator::Current, LaserActuator::Temperature] {
            let fb = LaserFeedback::new(laser_cfg(actuator));
            let mut s = fb.new_strike_counter();
            assert_eq!(
                fb.evaluate(&mut s, 110.0, 100.0, None),
                LaserDecision::Step { actuator, delta: -1 }
            );
            assert_eq!(
                fb.evaluate(&mut s, 90.0, 100.0, None),
                LaserDecision::Step { actuator, delta: 1 }
            );
        }
    }

    #[test]
    fn inside_threshold_is_in_bound() {
        let fb = LaserFeedback::new(laser_cfg(LaserActuator::Current));
        let mut s = fb.new_strike_counter();
        let d = fb.evaluate(&mut s, 104.0, 100.0, None);
        assert_eq!(d, LaserDecision::InBound);
        assert!(d.refreshes_timer());
    }

    #[test]
    fn in_bound_sample_clears_strikes() {
        let fb = LaserFeedback::new(laser_cfg(LaserActuator::Current));
        let mut s = fb.new_strike_counter();
        for n in 1..=3 {
            assert!(matches!(
                fb.evaluate(&mut s, 500.0, 100.0, None),
                LaserDecision::Strike { strikes, .. } if strikes == n
            ));
        }
        fb.evaluate(&mut s, 101.0, 100.0, None);
        assert_eq!(s.strikes(), 0);
        assert!(matches!(
            fb.evaluate(&mut s, 500.0, 100.0, None),
            LaserDecision::Strike { strikes: 1, .. }
        ));
    }

    #[test]
    fn strikes_do_not_refresh_timer() {
        let fb = LaserFeedback::new(laser_cfg(LaserActuator::Current));
        let mut s = fb.new_strike_counter();
        let d = fb.evaluate(&mut s, 500.0, 100.0, None);
        assert!(!d.refreshes_timer());
    }

    #[test]
    fn temperature_step_sign_and_clamp() {
        let fb = TemperatureFeedback::new(TempFeedbackCfg {
            period_ms: 10_000,
            threshold_hz: 100.0,
            step: 0.08,
            max_adjust: 0.1,
        });
        let mut adj = 0.0;
        assert_eq!(
            fb.evaluate(&mut adj, 1000.0, 0.0, None),
            TempDecision::Adjust {
                value: 0.08,
                clamped: false
            }
        );
        assert_eq!(
            fb.evaluate(&mut adj, 1000.0, 0.0, None),
            TempDecision::Adjust {
                value: 0.1,
                clamped: true
            }
        );
        let d = fb.evaluate(&mut adj, -1000.0, 0.0, None);
        assert!(matches!(d, TempDecision::Adjust { value, clamped: false } if (value - 0.02).abs() < 1e-12));
        assert_eq!(fb.evaluate(&mut adj, 50.0, 0.0, None), TempDecision::InBound);
    }

    #[test]
    fn adjust_wire_format() {
        assert_eq!(format_adjust(0.08), "0.080000\n");
        assert_eq!(format_adjust(-5.0), "-5.000000\n");
    }
}
