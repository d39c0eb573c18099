#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the comb control programs.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section is optional; missing sections take the lab defaults.
//! - Serial port names are checked while parsing (`SerialPortName`).
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// A serial device name: `COM<n>` on Windows or a `/dev/...` path elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct SerialPortName(String);

impl SerialPortName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SerialPortName {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let name: String = raw.split_whitespace().collect();
        let com_ok = name
            .strip_prefix("COM")
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
        let dev_ok = name.strip_prefix("/dev/").is_some_and(|rest| !rest.is_empty());
        if com_ok || dev_ok {
            Ok(Self(name))
        } else {
            Err(format!(
                "invalid serial port name '{raw}': expected COM<n> or /dev/<device>"
            ))
        }
    }
}

impl TryFrom<&str> for SerialPortName {
    type Error = String;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::try_from(raw.to_string())
    }
}

impl fmt::Display for SerialPortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CounterCfg {
    /// Counter gate time in seconds. Ticks run every 1.5 gate times.
    pub gate_time_s: f64,
    /// Minimum spacing of frequency log rows per channel.
    pub log_period_ms: u64,
    /// Serial port of the SCPI counter (RS-232 models); simulated when absent.
    pub scpi_port: Option<SerialPortName>,
    /// Lock the SCPI counter to the external 10 MHz reference.
    pub external_clock: bool,
    /// Expected signal frequency handed to the SCPI counter.
    pub approx_frequency_hz: f64,
    /// Serial port of the economical frame counter; simulated when absent.
    pub economical_port: Option<SerialPortName>,
    /// The economical counter sees `mirror_hz - f`; undo that when set.
    pub mirror_hz: Option<f64>,
    /// Calibration offset between the two counters.
    pub mirror_offset_hz: f64,
}

impl Default for CounterCfg {
    fn default() -> Self {
        Self {
            gate_time_s: 0.1,
            log_period_ms: 1000,
            scpi_port: None,
            external_clock: true,
            approx_frequency_hz: 199_868_311.0,
            economical_port: None,
            mirror_hz: Some(1010e6),
            mirror_offset_hz: 8.646_939_525_961_876,
        }
    }
}

/// Where a channel's frequency is read from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    #[default]
    Scpi,
    Economical,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelCfg {
    pub name: String,
    /// Physical counter input number (1 or 2).
    pub counter_channel: u8,
    #[serde(default)]
    pub counter: CounterKind,
    #[serde(default = "default_true")]
    pub active: bool,
    pub target_hz: f64,
    pub target_min_hz: f64,
    pub target_max_hz: f64,
    /// Localhost port of the temperature controller for this comb.
    pub temp_port: u16,
}

fn default_true() -> bool {
    true
}

fn default_channels() -> Vec<ChannelCfg> {
    vec![
        ChannelCfg {
            name: "comb 1".into(),
            counter_channel: 1,
            counter: CounterKind::Scpi,
            active: true,
            target_hz: 199_869_965.598,
            target_min_hz: 199.0e6,
            target_max_hz: 201.0e6,
            temp_port: 60002,
        },
        ChannelCfg {
            name: "comb 2".into(),
            counter_channel: 2,
            counter: CounterKind::Economical,
            active: true,
            target_hz: 199_870_591.410,
            target_min_hz: 199.0e6,
            target_max_hz: 201.0e6,
            temp_port: 60003,
        },
    ]
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    #[default]
    Current,
    Temperature,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LaserFeedbackCfg {
    pub period_ms: u64,
    pub threshold_hz: f64,
    pub allowed_detune_hz: f64,
    /// Feedback stops once consecutive out-of-range samples exceed this.
    pub strike_limit: u32,
    pub actuator: Actuator,
}

impl Default for LaserFeedbackCfg {
    fn default() -> Self {
        Self {
            period_ms: 2000,
            threshold_hz: 5.0,
            allowed_detune_hz: 120.0,
            strike_limit: 3,
            actuator: Actuator::Current,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TempFeedbackCfg {
    pub period_ms: u64,
    pub threshold_hz: f64,
    /// Adjust step, °C.
    pub step_c: f64,
    /// Cumulative adjust limit, °C.
    pub max_adjust_c: f64,
}

impl Default for TempFeedbackCfg {
    fn default() -> Self {
        Self {
            period_ms: 10_000,
            threshold_hz: 100.0,
            step_c: 0.08,
            max_adjust_c: 5.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LaserCfg {
    /// Serial port of the ORION laser; simulated when absent.
    pub port: Option<SerialPortName>,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    /// Accepted current set-points, 0.1 mA.
    pub current_min: u64,
    pub current_max: u64,
    /// Accepted thermistor set-points, ohms.
    pub temp_min: u64,
    pub temp_max: u64,
    /// Connect at startup.
    pub connect: bool,
}

impl Default for LaserCfg {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            timeout_ms: 100,
            current_min: 600,
            current_max: 1200,
            temp_min: 6500,
            temp_max: 15000,
            connect: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
    /// Directory for per-channel frequency CSV logs; logging is off when absent.
    pub freq_log_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControlLoopCfg {
    pub name: String,
    /// Steinhart-Hart `[A, B, C]`.
    pub steinhart: [f64; 3],
    /// Thermistor bias current, amperes.
    pub bias_current: f64,
    pub temperature_default: f64,
    pub temperature_min: f64,
    pub temperature_max: f64,
    #[serde(default)]
    pub enabled_default: bool,
    #[serde(default = "default_true")]
    pub enabled_is_high: bool,
    /// Compensator numerator taps, newest first.
    #[serde(default = "unit_taps")]
    pub num: Vec<f64>,
    #[serde(default = "unit_taps")]
    pub den: Vec<f64>,
    /// Port the counter program sends adjust lines to.
    pub adjust_port: Option<u16>,
}

fn unit_taps() -> Vec<f64> {
    vec![1.0]
}

fn default_loops() -> Vec<ControlLoopCfg> {
    ["Oscillator", "Transceiver"]
        .into_iter()
        .zip([60002u16, 60003])
        .map(|(name, port)| ControlLoopCfg {
            name: name.into(),
            steinhart: [1.129_148e-3, 2.341_25e-4, 8.767_41e-8],
            bias_current: 100e-6,
            temperature_default: 30.0,
            temperature_min: 15.0,
            temperature_max: 45.0,
            enabled_default: false,
            enabled_is_high: true,
            num: unit_taps(),
            den: unit_taps(),
            adjust_port: Some(port),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaqCfg {
    pub period_ms: u64,
    /// Consecutive panics that force a loop off.
    pub strike_limit: u32,
    /// Remote adjust limit, °C.
    pub setpoint_max_adjust: f64,
    pub loops: Vec<ControlLoopCfg>,
}

impl Default for DaqCfg {
    fn default() -> Self {
        Self {
            period_ms: 250,
            strike_limit: 3,
            setpoint_max_adjust: 5.0,
            loops: default_loops(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub counter: CounterCfg,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelCfg>,
    #[serde(default)]
    pub laser_feedback: LaserFeedbackCfg,
    #[serde(default)]
    pub temp_feedback: TempFeedbackCfg,
    #[serde(default)]
    pub laser: LaserCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub daq: DaqCfg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            counter: CounterCfg::default(),
            channels: default_channels(),
            laser_feedback: LaserFeedbackCfg::default(),
            temp_feedback: TempFeedbackCfg::default(),
            laser: LaserCfg::default(),
            logging: Logging::default(),
            daq: DaqCfg::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn finite(v: f64) -> bool {
    v.is_finite()
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Counter
        if !(finite(self.counter.gate_time_s) && self.counter.gate_time_s > 0.0) {
            eyre::bail!("counter.gate_time_s must be > 0");
        }
        if self.counter.gate_time_s > 60.0 {
            eyre::bail!("counter.gate_time_s is unreasonably large (>60s)");
        }
        if self.counter.log_period_ms == 0 {
            eyre::bail!("counter.log_period_ms must be >= 1");
        }
        if let Some(m) = self.counter.mirror_hz
            && !(finite(m) && m > 0.0)
        {
            eyre::bail!("counter.mirror_hz must be > 0");
        }
        if !finite(self.counter.mirror_offset_hz) {
            eyre::bail!("counter.mirror_offset_hz must be finite");
        }

        // Channels
        if self.channels.is_empty() {
            eyre::bail!("channels must list at least one channel");
        }
        let mut seen_inputs = HashSet::new();
        let mut seen_ports = HashSet::new();
        for (i, ch) in self.channels.iter().enumerate() {
            if ch.counter_channel != 1 && ch.counter_channel != 2 {
                eyre::bail!("channels[{i}].counter_channel must be 1 or 2");
            }
            if !seen_inputs.insert(ch.counter_channel) {
                eyre::bail!(
                    "channels[{i}].counter_channel {} is already used by another channel",
                    ch.counter_channel
                );
            }
            if !(finite(ch.target_min_hz) && finite(ch.target_max_hz)) {
                eyre::bail!("channels[{i}] target limits must be finite");
            }
            if ch.target_min_hz > ch.target_max_hz {
                eyre::bail!("channels[{i}].target_min_hz must be <= target_max_hz");
            }
            if !(ch.target_hz >= ch.target_min_hz && ch.target_hz <= ch.target_max_hz) {
                eyre::bail!("channels[{i}].target_hz must be within [target_min_hz, target_max_hz]");
            }
            if ch.temp_port == 0 {
                eyre::bail!("channels[{i}].temp_port must be >= 1");
            }
            if !seen_ports.insert(ch.temp_port) {
                eyre::bail!("channels[{i}].temp_port {} is already used", ch.temp_port);
            }
        }

        // Laser feedback
        let lf = &self.laser_feedback;
        if lf.period_ms == 0 {
            eyre::bail!("laser_feedback.period_ms must be >= 1");
        }
        if !(finite(lf.threshold_hz) && lf.threshold_hz >= 0.0) {
            eyre::bail!("laser_feedback.threshold_hz must be >= 0");
        }
        if !(finite(lf.allowed_detune_hz) && lf.allowed_detune_hz >= lf.threshold_hz) {
            eyre::bail!("laser_feedback.allowed_detune_hz must be >= threshold_hz");
        }
        if lf.strike_limit == 0 {
            eyre::bail!("laser_feedback.strike_limit must be >= 1");
        }

        // Temperature feedback
        let tf = &self.temp_feedback;
        if tf.period_ms == 0 {
            eyre::bail!("temp_feedback.period_ms must be >= 1");
        }
        if !(finite(tf.threshold_hz) && tf.threshold_hz >= 0.0) {
            eyre::bail!("temp_feedback.threshold_hz must be >= 0");
        }
        if !(finite(tf.step_c) && tf.step_c > 0.0) {
            eyre::bail!("temp_feedback.step_c must be > 0");
        }
        if !(finite(tf.max_adjust_c) && tf.max_adjust_c > 0.0) {
            eyre::bail!("temp_feedback.max_adjust_c must be > 0");
        }

        // Laser
        if self.laser.baud_rate == 0 {
            eyre::bail!("laser.baud_rate must be > 0");
        }
        if self.laser.timeout_ms == 0 {
            eyre::bail!("laser.timeout_ms must be >= 1");
        }
        if self.laser.current_min > self.laser.current_max {
            eyre::bail!("laser.current_min must be <= laser.current_max");
        }
        if self.laser.temp_min > self.laser.temp_max {
            eyre::bail!("laser.temp_min must be <= laser.temp_max");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        // DAQ
        if self.daq.period_ms == 0 {
            eyre::bail!("daq.period_ms must be >= 1");
        }
        if self.daq.strike_limit == 0 {
            eyre::bail!("daq.strike_limit must be >= 1");
        }
        if !(finite(self.daq.setpoint_max_adjust) && self.daq.setpoint_max_adjust > 0.0) {
            eyre::bail!("daq.setpoint_max_adjust must be > 0");
        }
        if self.daq.loops.is_empty() {
            eyre::bail!("daq.loops must list at least one control loop");
        }
        let mut seen_adjust = HashSet::new();
        for (i, l) in self.daq.loops.iter().enumerate() {
            if l.steinhart.iter().any(|c| !c.is_finite()) || l.steinhart[2] == 0.0 {
                eyre::bail!("daq.loops[{i}].steinhart must be finite with C != 0");
            }
            if !(finite(l.bias_current) && l.bias_current > 0.0) {
                eyre::bail!("daq.loops[{i}].bias_current must be > 0");
            }
            if !(finite(l.temperature_min) && finite(l.temperature_max)) {
                eyre::bail!("daq.loops[{i}] temperature limits must be finite");
            }
            if l.temperature_min > l.temperature_max {
                eyre::bail!("daq.loops[{i}].temperature_min must be <= temperature_max");
            }
            if !(l.temperature_default >= l.temperature_min
                && l.temperature_default <= l.temperature_max)
            {
                eyre::bail!(
                    "daq.loops[{i}].temperature_default must be within [temperature_min, temperature_max]"
                );
            }
            if l.num.is_empty() || l.den.is_empty() {
                eyre::bail!("daq.loops[{i}] filter taps must not be empty");
            }
            if l.num.iter().chain(&l.den).any(|t| !t.is_finite()) {
                eyre::bail!("daq.loops[{i}] filter taps must be finite");
            }
            if l.den[0] == 0.0 {
                eyre::bail!("daq.loops[{i}].den[0] must be != 0");
            }
            if let Some(port) = l.adjust_port {
                if port == 0 {
                    eyre::bail!("daq.loops[{i}].adjust_port must be >= 1");
                }
                if !seen_adjust.insert(port) {
                    eyre::bail!("daq.loops[{i}].adjust_port {port} is already used");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_names() {
        assert!(SerialPortName::try_from("COM6").is_ok());
        assert!(SerialPortName::try_from("/dev/ttyUSB0").is_ok());
        assert_eq!(
            SerialPortName::try_from(" COM 18 ").map(|p| p.to_string()),
            Ok("COM18".to_string())
        );
        assert!(SerialPortName::try_from("COM").is_err());
        assert!(SerialPortName::try_from("COMx").is_err());
        assert!(SerialPortName::try_from("/dev/").is_err());
        assert!(SerialPortName::try_from("ttyUSB0").is_err());
    }

    #[test]
    fn defaults_validate() {
        Config::default().validate().expect("defaults are valid");
    }
}
