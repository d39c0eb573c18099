//! Driver for an ORION reference laser on any byte transport.

use super::codec::{Request, Response, read_packet};
use super::command::{Command, status_text};
use super::STATUS_OK;
use crate::error::CombError;
use combctl_traits::{DeviceError, ReferenceLaser};
use std::io::{Read, Write};
use std::time::Duration;

/// Serial line settings the laser expects (8-N-1, no flow control).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Values read from the laser when the link is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaserInfo {
    /// Factory default pump current (0.1 mA).
    pub factory_current: u64,
    /// Factory default thermistor set-point (ohms).
    pub factory_temp: u64,
    pub nonvolatile_current: u64,
    pub nonvolatile_temp: u64,
    /// Volatile set-points at connection time.
    pub initial_current: u64,
    pub initial_temp: u64,
    pub serial_number: u64,
    pub part_number: String,
}

pub struct OrionLaser<P: Read + Write> {
    port: P,
    name: String,
    next_packet_id: u8,
    current_limits: (u64, u64),
    temp_limits: (u64, u64),
    info: LaserInfo,
}

fn io_err(e: std::io::Error) -> CombError {
    if e.kind() == std::io::ErrorKind::TimedOut {
        CombError::Timeout
    } else {
        CombError::InstrumentIo(e.to_string())
    }
}

impl<P: Read + Write> OrionLaser<P> {
    /// Open a session: enable the serial interface, read the identity and
    /// set-point registers, then disable it again. On failure the interface is
    /// disabled on a best-effort basis before the error is returned.
    pub fn connect(port: P, port_name: &str) -> Result<Self, CombError> {
        let mut laser = Self {
            port,
            name: format!("ORION laser on {port_name}"),
            next_packet_id: 0,
            current_limits: super::command::CURRENT_LIMITS,
            temp_limits: super::command::TEMPERATURE_LIMITS,
            info: LaserInfo::default(),
        };
        match laser.with_serial(Self::read_info) {
            Ok(info) => {
                laser.name = format!("ORION laser (SN{}) on {port_name}", info.serial_number);
                tracing::info!(
                    laser = %laser.name,
                    part_number = %info.part_number,
                    current = info.initial_current,
                    temp_ohms = info.initial_temp,
                    "reference laser connected"
                );
                laser.info = info;
                Ok(laser)
            }
            Err(e) => {
                tracing::warn!(port = port_name, error = %e, "failed initial configuration of laser");
                Err(e)
            }
        }
    }

    fn read_info(&mut self) -> Result<LaserInfo, CombError> {
        Ok(LaserInfo {
            factory_current: self.read_value(Command::DefaultCurrentRead)?,
            factory_temp: self.read_value(Command::DefaultTempRead)?,
            nonvolatile_current: self.read_value(Command::NonVolatileCurrentRead)?,
            nonvolatile_temp: self.read_value(Command::NonVolatileTempRead)?,
            initial_current: self.read_value(Command::VolatileCurrentRead)?,
            initial_temp: self.read_value(Command::VolatileTempRead)?,
            serial_number: self.read_value(Command::SerialNumberRead)?,
            part_number: self.transact(Command::PartNumberRead, None)?.text(),
        })
    }

    /// Override the accepted set-point windows (current in 0.1 mA, temperature in ohms).
    pub fn set_limits(&mut self, current: (u64, u64), temp: (u64, u64)) {
        self.current_limits = current;
        self.temp_limits = temp;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self) -> &LaserInfo {
        &self.info
    }

    fn limits_for(&self, command: Command) -> Option<(u64, u64)> {
        match command {
            Command::VolatileCurrentWrite | Command::NonVolatileCurrentWrite => {
                Some(self.current_limits)
            }
            Command::VolatileTempWrite | Command::NonVolatileTempWrite => Some(self.temp_limits),
            _ => None,
        }
    }

    fn packet_id(&mut self) -> u8 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        id
    }

    fn transact(&mut self, command: Command, value: Option<u64>) -> Result<Response, CombError> {
        if let Some((min, max)) = self.limits_for(command) {
            let Some(v) = value else {
                return Err(CombError::State(format!("{command} requires a value")));
            };
            if v < min || v > max {
                return Err(CombError::ValidationRejected {
                    value: v as f64,
                    min: min as f64,
                    max: max as f64,
                });
            }
        }
        let packet_id = self.packet_id();
        let request = Request::new(command, value, packet_id).to_bytes();
        tracing::trace!(%command, packet = ?request, "laser request");
        self.port.write_all(&request).map_err(io_err)?;
        self.port.flush().map_err(io_err)?;
        let raw = read_packet(&mut self.port)?;
        tracing::trace!(%command, packet = ?raw, "laser response");
        Ok(Response::parse(&raw, Some(packet_id))?)
    }

    /// Send one command and return the decoded value. A non-zero status or a
    /// write echo that differs from the request is logged, not returned as an error.
    pub fn execute(&mut self, command: Command, value: Option<u64>) -> Result<Option<u64>, CombError> {
        let response = self.transact(command, value)?;
        let returned = response.value()?;
        if response.status != STATUS_OK {
            tracing::warn!(
                %command,
                status = response.status,
                "laser status error: {}",
                status_text(response.status)
            );
        } else if value.is_some() && returned != value {
            tracing::warn!(
                %command,
                requested = ?value,
                reported = ?returned,
                "reported set point does not match requested"
            );
        }
        Ok(returned)
    }

    /// `execute` with the serial interface enabled around it, except for the
    /// enable/disable commands themselves.
    pub fn execute_enabled(
        &mut self,
        command: Command,
        value: Option<u64>,
    ) -> Result<Option<u64>, CombError> {
        match command {
            Command::EnableSerial | Command::DisableSerial => self.execute(command, value),
            _ => self.with_serial(|l| l.execute(command, value)),
        }
    }

    fn read_value(&mut self, command: Command) -> Result<u64, CombError> {
        self.execute(command, None)?
            .ok_or_else(|| CombError::InstrumentFault(format!("laser returned no data for {command}")))
    }

    /// Run `f` with the serial interface enabled, disabling it afterwards
    /// even when `f` fails.
    fn with_serial<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CombError>,
    ) -> Result<T, CombError> {
        self.execute(Command::EnableSerial, None)?;
        let out = f(self);
        let disabled = self.execute(Command::DisableSerial, None);
        let out = out?;
        disabled?;
        Ok(out)
    }

    /// Volatile thermistor set-point in ohms.
    pub fn get_temperature(&mut self) -> Result<u64, CombError> {
        self.with_serial(|l| l.read_value(Command::VolatileTempRead))
    }

    /// Volatile pump current in 0.1 mA.
    pub fn get_current(&mut self) -> Result<u64, CombError> {
        self.with_serial(|l| l.read_value(Command::VolatileCurrentRead))
    }

    pub fn set_temperature(&mut self, ohms: u64) -> Result<(), CombError> {
        self.with_serial(|l| l.execute(Command::VolatileTempWrite, Some(ohms)).map(drop))
    }

    pub fn set_current(&mut self, deci_ma: u64) -> Result<(), CombError> {
        self.with_serial(|l| l.execute(Command::VolatileCurrentWrite, Some(deci_ma)).map(drop))
    }

    fn change(&mut self, read: Command, write: Command, delta: i64) -> Result<u64, CombError> {
        self.with_serial(|l| {
            let current = l.read_value(read)?;
            let target = current.checked_add_signed(delta).ok_or(CombError::ValidationRejected {
                value: current as f64 + delta as f64,
                min: 0.0,
                max: u64::MAX as f64,
            })?;
            l.execute(write, Some(target))?;
            Ok(target)
        })
    }

    /// Read-modify-write of the volatile temperature set-point. Returns the new value.
    pub fn change_temperature(&mut self, delta_ohms: i64) -> Result<u64, CombError> {
        self.change(Command::VolatileTempRead, Command::VolatileTempWrite, delta_ohms)
    }

    /// Read-modify-write of the volatile current set-point. Returns the new value.
    pub fn change_current(&mut self, delta_deci_ma: i64) -> Result<u64, CombError> {
        self.change(
            Command::VolatileCurrentRead,
            Command::VolatileCurrentWrite,
            delta_deci_ma,
        )
    }

    /// Restore the volatile set-points from the non-volatile ones. With
    /// `reset_to_factory` the non-volatile registers are first rewritten with
    /// the factory defaults.
    pub fn set_to_default(&mut self, reset_to_factory: bool) -> Result<(), CombError> {
        let mut info = self.info.clone();
        self.with_serial(|l| {
            if reset_to_factory {
                l.execute(Command::NonVolatileCurrentWrite, Some(info.factory_current))?;
                l.execute(Command::NonVolatileTempWrite, Some(info.factory_temp))?;
                info.nonvolatile_current = info.factory_current;
                info.nonvolatile_temp = info.factory_temp;
            }
            l.execute(Command::VolatileCurrentWrite, Some(info.nonvolatile_current))?;
            l.execute(Command::VolatileTempWrite, Some(info.nonvolatile_temp))?;
            Ok(())
        })?;
        self.info = info;
        tracing::info!(laser = %self.name, reset_to_factory, "laser set-points restored");
        Ok(())
    }

    /// Disable the serial interface (best effort) and hand back the transport.
    pub fn close(mut self) -> P {
        if let Err(e) = self.execute(Command::DisableSerial, None) {
            tracing::debug!(error = %e, "disable serial on close failed");
        }
        tracing::info!(laser = %self.name, "reference laser closed");
        self.port
    }
}

/// Try each candidate port for an ORION laser and return the names of
/// those that answer, keeping only `serial_number` when given. Every laser
/// found is closed again.
pub fn find<P, I, F>(ports: I, mut open: F, serial_number: Option<u64>) -> Vec<String>
where
    P: Read + Write,
    I: IntoIterator<Item = String>,
    F: FnMut(&str) -> Result<P, CombError>,
{
    let mut found = Vec::new();
    for port in ports {
        let laser = match open(&port).and_then(|p| OrionLaser::connect(p, &port)) {
            Ok(laser) => laser,
            Err(e) => {
                tracing::debug!(port = %port, error = %e, "no ORION laser on port");
                continue;
            }
        };
        let sn = laser.info().serial_number;
        tracing::info!(port = %port, serial_number = sn, "ORION laser found");
        laser.close();
        if serial_number.is_none_or(|want| want == sn) {
            found.push(port);
        }
    }
    found
}

impl<P: Read + Write> ReferenceLaser for OrionLaser<P> {
    fn change_current(&mut self, delta: i64) -> Result<u64, DeviceError> {
        OrionLaser::change_current(self, delta).map_err(|e| Box::new(e) as DeviceError)
    }

    fn change_temperature(&mut self, delta: i64) -> Result<u64, DeviceError> {
        OrionLaser::change_temperature(self, delta).map_err(|e| Box::new(e) as DeviceError)
    }

    fn temperature(&mut self) -> Result<u64, DeviceError> {
        self.get_temperature().map_err(|e| Box::new(e) as DeviceError)
    }

    fn set_temperature(&mut self, ohms: u64) -> Result<(), DeviceError> {
        OrionLaser::set_temperature(self, ohms).map_err(|e| Box::new(e) as DeviceError)
    }

    fn restore_defaults(&mut self) -> Result<(), DeviceError> {
        self.set_to_default(false).map_err(|e| Box::new(e) as DeviceError)
    }
}
