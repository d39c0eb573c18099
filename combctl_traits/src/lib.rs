//! Device seams for the comb control stack.
//!
//! Every collaborator the tick handlers talk to is reduced to a small trait.
//! Errors cross these boundaries as `Box<dyn Error + Send + Sync>`; the core
//! maps them to typed errors.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error used at every trait boundary.
pub type DeviceError = Box<dyn std::error::Error + Send + Sync>;

/// Frequency counter (GPIB or serial). Measurements are armed per channel and
/// collected on the following tick.
pub trait FrequencyCounter {
    /// Arm a measurement on the given physical counter channel.
    fn begin_measurement(&mut self, channel: u8) -> Result<(), DeviceError>;
    /// Fetch the result of the last armed measurement in Hz.
    fn get_result(&mut self) -> Result<f64, DeviceError>;
    fn set_gate_time(&mut self, seconds: f64) -> Result<(), DeviceError>;
    fn gate_time(&self) -> f64;
}

/// Analog input task; returns one value per configured channel, in order.
pub trait AnalogInput {
    fn read_values(&mut self) -> Result<Vec<f64>, DeviceError>;
}

/// Analog output task; accepts one value per configured channel, in order.
pub trait AnalogOutput {
    fn write_values(&mut self, values: &[f64]) -> Result<(), DeviceError>;
}

/// Digital output lines, addressed by loop index.
pub trait DigitalOutput {
    fn write_line(&mut self, index: usize, level: bool) -> Result<(), DeviceError>;
}

/// Client side of a newline-terminated text link.
pub trait LineLink {
    fn send_line(&mut self, line: &str) -> Result<(), DeviceError>;
}

/// Opens line links to a local port.
pub trait LineConnector {
    fn connect(&mut self, port: u16) -> Result<Box<dyn LineLink>, DeviceError>;
}

/// Server side of a line link. Never blocks; `None` when nothing is pending.
pub trait LineSource {
    fn poll_line(&mut self) -> Option<String>;
}

/// Reference laser actuator. Deltas are in device units (0.1 mA for current,
/// ohms of thermistor set-point for temperature); the new set-point is returned.
pub trait ReferenceLaser {
    fn change_current(&mut self, delta: i64) -> Result<u64, DeviceError>;
    fn change_temperature(&mut self, delta: i64) -> Result<u64, DeviceError>;
    /// Thermistor set-point in ohms.
    fn temperature(&mut self) -> Result<u64, DeviceError>;
    fn set_temperature(&mut self, ohms: u64) -> Result<(), DeviceError>;
    /// Restore the power-on set-points.
    fn restore_defaults(&mut self) -> Result<(), DeviceError>;
}

impl<T: FrequencyCounter + ?Sized> FrequencyCounter for Box<T> {
    fn begin_measurement(&mut self, channel: u8) -> Result<(), DeviceError> {
        (**self).begin_measurement(channel)
    }
    fn get_result(&mut self) -> Result<f64, DeviceError> {
        (**self).get_result()
    }
    fn set_gate_time(&mut self, seconds: f64) -> Result<(), DeviceError> {
        (**self).set_gate_time(seconds)
    }
    fn gate_time(&self) -> f64 {
        (**self).gate_time()
    }
}

impl<T: ReferenceLaser + ?Sized> ReferenceLaser for Box<T> {
    fn change_current(&mut self, delta: i64) -> Result<u64, DeviceError> {
        (**self).change_current(delta)
    }
    fn change_temperature(&mut self, delta: i64) -> Result<u64, DeviceError> {
        (**self).change_temperature(delta)
    }
    fn temperature(&mut self) -> Result<u64, DeviceError> {
        (**self).temperature()
    }
    fn set_temperature(&mut self, ohms: u64) -> Result<(), DeviceError> {
        (**self).set_temperature(ohms)
    }
    fn restore_defaults(&mut self) -> Result<(), DeviceError> {
        (**self).restore_defaults()
    }
}
