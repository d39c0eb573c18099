//! Configuration types for the counter session and the DAQ temperature controller.
//!
//! These are the runtime configuration structs used by `CounterSession` and
//! `TemperatureController`. They are separate from the TOML-deserialized config
//! in `combctl_config`.

use crate::error::CombError;
use crate::limits::check;
use crate::safety::StrikePolicy;
use crate::thermistor::{SteinhartHart, Thermistor};

/// Which laser parameter the frequency feedback steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaserActuator {
    /// Pump current, in 0.1 mA steps.
    Current,
    /// Thermistor set-point, in 1 Ω steps.
    Temperature,
}

/// Feedback from a measured repetition rate to the reference laser.
#[derive(Debug, Clone)]
pub struct LaserFeedbackCfg {
    /// Minimum time between corrections.
    pub period_ms: u64,
    /// Deviation that triggers one actuator step.
    pub threshold_hz: f64,
    /// Deviations beyond this count as strikes instead of being corrected.
    pub allowed_detune_hz: f64,
    pub strike_limit: u32,
    /// `Exceeds` for the counter path.
    pub strike_policy: StrikePolicy,
    pub actuator: LaserActuator,
}

impl Default for LaserFeedbackCfg {
    fn default() -> Self {
        Self {
            period_ms: 2_000,
            threshold_hz: 5.0,
            allowed_detune_hz: 120.0,
            strike_limit: 3,
            strike_policy: StrikePolicy::Exceeds,
            actuator: LaserActuator::Current,
        }
    }
}

impl LaserFeedbackCfg {
    /// Reject settings the feedback cannot run with: a zero period, negative
    /// or non-finite thresholds, or a zero strike limit.
    pub fn validate(&self) -> Result<(), CombError> {
        check(self.period_ms as f64, 1.0, f64::MAX)?;
        check(self.threshold_hz, 0.0, f64::MAX)?;
        check(self.allowed_detune_hz, 0.0, f64::MAX)?;
        check(f64::from(self.strike_limit), 1.0, f64::from(u32::MAX))?;
        Ok(())
    }
}

/// Feedback from a measured repetition rate to a comb's temperature adjust.
#[derive(Debug, Clone)]
pub struct TempFeedbackCfg {
    pub period_ms: u64,
    pub threshold_hz: f64,
    /// Adjust step in °C.
    pub step: f64,
    /// Cumulative adjust saturates at `±max_adjust` °C.
    pub max_adjust: f64,
}

impl Default for TempFeedbackCfg {
    fn default() -> Self {
        Self {
            period_ms: 10_000,
            threshold_hz: 100.0,
            step: 0.08,
            max_adjust: 5.0,
        }
    }
}

impl TempFeedbackCfg {
    pub fn validate(&self) -> Result<(), CombError> {
        check(self.period_ms as f64, 1.0, f64::MAX)?;
        check(self.threshold_hz, 0.0, f64::MAX)?;
        check(self.step, f64::MIN_POSITIVE, f64::MAX)?;
        check(self.max_adjust, 0.0, f64::MAX)?;
        Ok(())
    }
}

/// One measured comb.
#[derive(Debug, Clone)]
pub struct ChannelCfg {
    pub name: String,
    /// Physical counter input (1 or 2).
    pub counter_channel: u8,
    pub active: bool,
    pub target_hz: f64,
    pub target_min_hz: f64,
    pub target_max_hz: f64,
    /// Localhost port of the temperature controller serving this comb.
    pub temp_port: u16,
}

impl ChannelCfg {
    fn lab(name: &str, counter_channel: u8, target_hz: f64, temp_port: u16) -> Self {
        Self {
            name: name.to_string(),
            counter_channel,
            active: true,
            target_hz,
            target_min_hz: 199.0e6,
            target_max_hz: 201.0e6,
            temp_port,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CounterCfg {
    /// Counter gate time in seconds; the tick period is 1.5x this.
    pub gate_time_s: f64,
    /// Minimum time between two logged samples of a channel.
    pub log_period_ms: u64,
    pub channels: Vec<ChannelCfg>,
}

impl Default for CounterCfg {
    fn default() -> Self {
        Self {
            gate_time_s: 0.1,
            log_period_ms: 1_000,
            channels: vec![
                ChannelCfg::lab("comb 1", 1, 199_869_965.598, 60_002),
                ChannelCfg::lab("comb 2", 2, 199_870_591.410, 60_003),
            ],
        }
    }
}

/// One thermistor-stabilised oven driven through the DAQ.
#[derive(Debug, Clone)]
pub struct ControlLoopCfg {
    pub name: String,
    pub thermistor: Thermistor,
    /// Startup setpoint and filter seed, °C.
    pub temperature_default: f64,
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub enabled_default: bool,
    /// Polarity of the enable line.
    pub enabled_is_high: bool,
    /// Compensator numerator taps, newest sample first.
    pub num: Vec<f64>,
    pub den: Vec<f64>,
    /// Port this loop accepts adjust lines on, if any.
    pub adjust_port: Option<u16>,
}

impl ControlLoopCfg {
    fn lab(name: &str, adjust_port: u16) -> Self {
        Self {
            name: name.to_string(),
            thermistor: Thermistor::new(
                SteinhartHart {
                    a: 1.129_148e-3,
                    b: 2.341_25e-4,
                    c: 8.767_41e-8,
                },
                100e-6,
            ),
            temperature_default: 30.0,
            temperature_min: 15.0,
            temperature_max: 45.0,
            enabled_default: false,
            enabled_is_high: true,
            num: vec![1.0],
            den: vec![1.0],
            adjust_port: Some(adjust_port),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemperatureControllerCfg {
    pub period_ms: u64,
    /// Consecutive out-of-range readings before a loop is forced off.
    pub strike_limit: u32,
    /// `Reaches` for the DAQ path.
    pub strike_policy: StrikePolicy,
    /// Remote adjust saturates at `±setpoint_max_adjust` °C.
    pub setpoint_max_adjust: f64,
    pub loops: Vec<ControlLoopCfg>,
}

impl Default for TemperatureControllerCfg {
    fn default() -> Self {
        Self {
            period_ms: 250,
            strike_limit: 3,
            strike_policy: StrikePolicy::Reaches,
            setpoint_max_adjust: 5.0,
            loops: vec![
                ControlLoopCfg::lab("Oscillator", 60_002),
                ControlLoopCfg::lab("Transceiver", 60_003),
            ],
        }
    }
}
