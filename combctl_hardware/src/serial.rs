//! Serial ports for the reference laser and the economical counter (8-N-1, no flow control).
use crate::error::{HwError, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::time::Duration;

pub type Port = Box<dyn SerialPort>;

pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Port> {
    let port = serialport::new(name, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|e| HwError::Serial(format!("{name}: {e}")))?;
    tracing::info!(port = name, baud_rate, "serial port opened");
    Ok(port)
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| HwError::Serial(e.to_string()))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
