//! `From` implementations bridging `combctl_config` types to `combctl_core` types.

use crate::config::{
    ChannelCfg, ControlLoopCfg, CounterCfg, LaserActuator, LaserFeedbackCfg, TempFeedbackCfg,
    TemperatureControllerCfg,
};
use crate::safety::StrikePolicy;
use crate::thermistor::{SteinhartHart, Thermistor};

// ── LaserFeedbackCfg ─────────────────────────────────────────────────────────

impl From<combctl_config::Actuator> for LaserActuator {
    fn from(a: combctl_config::Actuator) -> Self {
        match a {
            combctl_config::Actuator::Current => LaserActuator::Current,
            combctl_config::Actuator::Temperature => LaserActuator::Temperature,
        }
    }
}

impl From<&combctl_config::LaserFeedbackCfg> for LaserFeedbackCfg {
    fn from(c: &combctl_config::LaserFeedbackCfg) -> Self {
        Self {
            period_ms: c.period_ms,
            threshold_hz: c.threshold_hz,
            allowed_detune_hz: c.allowed_detune_hz,
            strike_limit: c.strike_limit,
            strike_policy: StrikePolicy::Exceeds,
            actuator: c.actuator.into(),
        }
    }
}

// ── TempFeedbackCfg ──────────────────────────────────────────────────────────

impl From<&combctl_config::TempFeedbackCfg> for TempFeedbackCfg {
    fn from(c: &combctl_config::TempFeedbackCfg) -> Self {
        Self {
            period_ms: c.period_ms,
            threshold_hz: c.threshold_hz,
            step: c.step_c,
            max_adjust: c.max_adjust_c,
        }
    }
}

// ── CounterCfg ───────────────────────────────────────────────────────────────

impl From<&combctl_config::ChannelCfg> for ChannelCfg {
    fn from(c: &combctl_config::ChannelCfg) -> Self {
        Self {
            name: c.name.clone(),
            counter_channel: c.counter_channel,
            active: c.active,
            target_hz: c.target_hz,
            target_min_hz: c.target_min_hz,
            target_max_hz: c.target_max_hz,
            temp_port: c.temp_port,
        }
    }
}

impl From<&combctl_config::Config> for CounterCfg {
    fn from(c: &combctl_config::Config) -> Self {
        Self {
            gate_time_s: c.counter.gate_time_s,
            log_period_ms: c.counter.log_period_ms,
            channels: c.channels.iter().map(ChannelCfg::from).collect(),
        }
    }
}

// ── TemperatureControllerCfg ─────────────────────────────────────────────────

impl From<&combctl_config::ControlLoopCfg> for ControlLoopCfg {
    fn from(c: &combctl_config::ControlLoopCfg) -> Self {
        let [a, b, cc] = c.steinhart;
        Self {
            name: c.name.clone(),
            thermistor: Thermistor::new(SteinhartHart { a, b, c: cc }, c.bias_current),
            temperature_default: c.temperature_default,
            temperature_min: c.temperature_min,
            temperature_max: c.temperature_max,
            enabled_default: c.enabled_default,
            enabled_is_high: c.enabled_is_high,
            num: c.num.clone(),
            den: c.den.clone(),
            adjust_port: c.adjust_port,
        }
    }
}

impl From<&combctl_config::DaqCfg> for TemperatureControllerCfg {
    fn from(c: &combctl_config::DaqCfg) -> Self {
        Self {
            period_ms: c.period_ms,
            strike_limit: c.strike_limit,
            strike_policy: StrikePolicy::Reaches,
            setpoint_max_adjust: c.setpoint_max_adjust,
            loops: c.loops.iter().map(ControlLoopCfg::from).collect(),
        }
    }
}
