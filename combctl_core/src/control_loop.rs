//! One thermistor-stabilised temperature loop: interlock, setpoint, filter, DAC value.
//!
//! No DAQ I/O happens here; `TemperatureController` feeds voltages in and
//! writes the returned values out.

use crate::config::ControlLoopCfg;
use crate::error::{BuildError, CombError};
use crate::filter::DigitalFilter;
use crate::limits::Limits;
use crate::thermistor::Thermistor;

/// Values to write back to the DAQ after one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    /// Analog setpoint voltage for the temperature controller.
    pub voltage: f64,
    /// Level of the enable line, already corrected for polarity.
    pub digital_enable: bool,
    /// Actual temperature outside its limits, or unreadable.
    pub panic: bool,
}

#[derive(Debug, Clone)]
pub struct ControlLoop {
    name: String,
    thermistor: Thermistor,
    limits: Limits,
    temperature_default: f64,
    enabled_is_high: bool,
    adjust_port: Option<u16>,
    filter: DigitalFilter,

    requested_enable: bool,
    requested_setpoint: f64,
    requested_adjust: f64,

    read_actual: f64,
    read_setpoint: f64,
}

impl ControlLoop {
    pub fn new(cfg: &ControlLoopCfg) -> Result<Self, BuildError> {
        let limits = Limits::new(cfg.temperature_min, cfg.temperature_max)?;
        if !limits.contains(cfg.temperature_default) {
            return Err(BuildError::InvalidConfig(format!(
                "{}: default temperature {} outside [{}, {}]",
                cfg.name, cfg.temperature_default, cfg.temperature_min, cfg.temperature_max
            )));
        }
        let filter = DigitalFilter::new(cfg.num.clone(), cfg.den.clone(), cfg.temperature_default)?;
        Ok(Self {
            name: cfg.name.clone(),
            thermistor: cfg.thermistor,
            limits,
            temperature_default: cfg.temperature_default,
            enabled_is_high: cfg.enabled_is_high,
            adjust_port: cfg.adjust_port,
            filter,
            requested_enable: cfg.enabled_default,
            requested_setpoint: cfg.temperature_default,
            requested_adjust: 0.0,
            read_actual: f64::NAN,
            read_setpoint: f64::NAN,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adjust_port(&self) -> Option<u16> {
        self.adjust_port
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn is_acceptable_setpoint(&self, celsius: f64) -> bool {
        self.limits.contains(celsius)
    }

    /// Operator setpoint; rejected values leave the current one in place.
    pub fn set_setpoint(&mut self, celsius: f64) -> Result<(), CombError> {
        self.requested_setpoint = self.limits.check(celsius)?;
        Ok(())
    }

    pub fn setpoint(&self) -> f64 {
        self.requested_setpoint
    }

    pub fn set_enable(&mut self, enable: bool) {
        self.requested_enable = enable;
    }

    pub fn is_enabled(&self) -> bool {
        self.requested_enable
    }

    /// Offset added to the setpoint on the next steps (not validated, the sum is clamped).
    pub fn set_adjust(&mut self, celsius: f64) {
        self.requested_adjust = celsius;
    }

    pub fn adjust(&self) -> f64 {
        self.requested_adjust
    }

    /// Last actual temperature, °C (NaN before the first step or on a sensor fault).
    pub fn read_actual(&self) -> f64 {
        self.read_actual
    }

    /// Last setpoint read back from the controller, °C.
    pub fn read_setpoint(&self) -> f64 {
        self.read_setpoint
    }

    pub fn thermistor(&self) -> &Thermistor {
        &self.thermistor
    }

    /// Re-prime the compensator at the default temperature.
    pub fn reset_filter(&mut self) {
        self.filter.reset(self.temperature_default);
    }

    pub fn do_step(&mut self, actual_v: f64, setpoint_v: f64) -> StepOutput {
        self.read_actual = self.thermistor.volt_to_temp(actual_v);
        self.read_setpoint = self.thermistor.volt_to_temp(setpoint_v);

        // NaN (open or shorted thermistor) is outside every range.
        let panic = !self.limits.contains(self.read_actual);
        let safe_enable = self.requested_enable && !panic;

        let requested = self
            .limits
            .clamp(self.requested_setpoint + self.requested_adjust);
        let filtered = self.limits.clamp(self.filter.step(requested));
        let voltage = self.thermistor.temp_to_volt(filtered);

        StepOutput {
            voltage,
            digital_enable: safe_enable ^ !self.enabled_is_high,
            panic,
        }
    }
}
