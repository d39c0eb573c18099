//! Scripted devices for driving combctl_core without hardware.
//!
//! Handles are cheap clones over shared state so a test can keep one while
//! the session owns the other.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use combctl_traits::{
    AnalogInput, AnalogOutput, DeviceError, DigitalOutput, FrequencyCounter, LineConnector,
    LineLink, LineSource, ReferenceLaser,
};

use crate::config::LaserActuator;
use crate::orion::{Command, HEADER, Request, STATUS_OK, decode_request, encode_response};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn device_error(msg: impl Into<String>) -> DeviceError {
    Box::new(io::Error::other(msg.into()))
}

// ── Counter ──

/// Frequency counter that replays a fixed list of readings, one per
/// `get_result`, and records every armed channel. An exhausted script errors.
pub struct ScriptedCounter {
    readings: VecDeque<Result<f64, &'static str>>,
    armed: Vec<u8>,
    gate_time: f64,
}

impl ScriptedCounter {
    pub fn new(readings: Vec<Result<f64, &'static str>>) -> Self {
        Self {
            readings: readings.into(),
            armed: Vec::new(),
            gate_time: 0.1,
        }
    }

    /// Queue more readings behind the remaining ones.
    pub fn push(&mut self, reading: Result<f64, &'static str>) {
        self.readings.push_back(reading);
    }

    /// Channels passed to `begin_measurement`, oldest first.
    pub fn armed(&self) -> Vec<u8> {
        self.armed.clone()
    }
}

impl FrequencyCounter for ScriptedCounter {
    fn begin_measurement(&mut self, channel: u8) -> Result<(), DeviceError> {
        self.armed.push(channel);
        Ok(())
    }

    fn get_result(&mut self) -> Result<f64, DeviceError> {
        match self.readings.pop_front() {
            Some(Ok(hz)) => Ok(hz),
            Some(Err(msg)) => Err(device_error(msg)),
            None => Err(device_error("script exhausted")),
        }
    }

    fn set_gate_time(&mut self, seconds: f64) -> Result<(), DeviceError> {
        self.gate_time = seconds;
        Ok(())
    }

    fn gate_time(&self) -> f64 {
        self.gate_time
    }
}

// ── Reference laser ──

#[derive(Debug)]
struct LaserState {
    current: u64,
    temperature: u64,
    steps: Vec<(LaserActuator, i64)>,
    restores: u32,
    fail: bool,
}

/// `ReferenceLaser` that applies deltas to two registers without limits.
#[derive(Debug, Clone)]
pub struct ScriptedLaser {
    state: Arc<Mutex<LaserState>>,
}

impl Default for ScriptedLaser {
    fn default() -> Self {
        Self::new(1000, 10_000)
    }
}

impl ScriptedLaser {
    pub fn new(current: u64, temperature: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(LaserState {
                current,
                temperature,
                steps: Vec::new(),
                restores: 0,
                fail: false,
            })),
        }
    }

    /// Make every following call fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }

    pub fn current(&self) -> u64 {
        lock(&self.state).current
    }

    pub fn temperature(&self) -> u64 {
        lock(&self.state).temperature
    }

    /// Successful steps, oldest first.
    pub fn steps(&self) -> Vec<(LaserActuator, i64)> {
        lock(&self.state).steps.clone()
    }

    pub fn restores(&self) -> u32 {
        lock(&self.state).restores
    }

    fn step(&self, actuator: LaserActuator, delta: i64) -> Result<u64, DeviceError> {
        let mut st = lock(&self.state);
        if st.fail {
            return Err(device_error("laser write failed"));
        }
        let register = match actuator {
            LaserActuator::Current => &mut st.current,
            LaserActuator::Temperature => &mut st.temperature,
        };
        let next = register
            .checked_add_signed(delta)
            .ok_or_else(|| device_error("set-point underflow"))?;
        *register = next;
        st.steps.push((actuator, delta));
        Ok(next)
    }
}

impl ReferenceLaser for ScriptedLaser {
    fn change_current(&mut self, delta: i64) -> Result<u64, DeviceError> {
        self.step(LaserActuator::Current, delta)
    }

    fn change_temperature(&mut self, delta: i64) -> Result<u64, DeviceError> {
        self.step(LaserActuator::Temperature, delta)
    }

    fn temperature(&mut self) -> Result<u64, DeviceError> {
        let st = lock(&self.state);
        if st.fail {
            return Err(device_error("laser read failed"));
        }
        Ok(st.temperature)
    }

    fn set_temperature(&mut self, ohms: u64) -> Result<(), DeviceError> {
        let mut st = lock(&self.state);
        if st.fail {
            return Err(device_error("laser write failed"));
        }
        st.temperature = ohms;
        Ok(())
    }

    fn restore_defaults(&mut self) -> Result<(), DeviceError> {
        let mut st = lock(&self.state);
        if st.fail {
            return Err(device_error("laser write failed"));
        }
        st.restores += 1;
        Ok(())
    }
}

// ── Line links ──

#[derive(Debug, Default)]
struct LinkState {
    lines: HashMap<u16, Vec<String>>,
    refused: HashSet<u16>,
    broken: HashSet<u16>,
}

/// Connector whose links append every line to a per-port record.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    state: Arc<Mutex<LinkState>>,
}

impl RecordingConnector {
    /// Lines sent to `port` so far, verbatim.
    pub fn lines(&self, port: u16) -> Vec<String> {
        lock(&self.state).lines.get(&port).cloned().unwrap_or_default()
    }

    /// Refuse new connections to `port`.
    pub fn refuse(&self, port: u16) {
        lock(&self.state).refused.insert(port);
    }

    /// Make sends on open links to `port` fail.
    pub fn break_link(&self, port: u16) {
        lock(&self.state).broken.insert(port);
    }
}

impl LineConnector for RecordingConnector {
    fn connect(&mut self, port: u16) -> Result<Box<dyn LineLink>, DeviceError> {
        if lock(&self.state).refused.contains(&port) {
            return Err(Box::new(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("connection to port {port} refused"),
            )));
        }
        Ok(Box::new(RecordingLink {
            port,
            state: Arc::clone(&self.state),
        }))
    }
}

struct RecordingLink {
    port: u16,
    state: Arc<Mutex<LinkState>>,
}

impl LineLink for RecordingLink {
    fn send_line(&mut self, line: &str) -> Result<(), DeviceError> {
        let mut st = lock(&self.state);
        if st.broken.contains(&self.port) {
            return Err(Box::new(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "peer closed the link",
            )));
        }
        st.lines.entry(self.port).or_default().push(line.to_string());
        Ok(())
    }
}

/// `LineSource` fed by hand.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    pending: Arc<Mutex<VecDeque<String>>>,
}

impl ScriptedSource {
    pub fn push(&self, line: impl Into<String>) {
        lock(&self.pending).push_back(line.into());
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl LineSource for ScriptedSource {
    fn poll_line(&mut self) -> Option<String> {
        lock(&self.pending).pop_front()
    }
}

// ── DAQ ──

#[derive(Debug, Default)]
struct DaqState {
    inputs: Vec<f64>,
    fail_reads: bool,
    fail_writes: bool,
    outputs: Vec<Vec<f64>>,
    digital: Vec<(usize, bool)>,
}

/// Shared state behind the three scripted DAQ tasks.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDaq {
    state: Arc<Mutex<DaqState>>,
}

impl ScriptedDaq {
    /// `inputs` is what every read returns until changed.
    pub fn new(inputs: Vec<f64>) -> Self {
        let daq = Self::default();
        daq.set_inputs(inputs);
        daq
    }

    pub fn set_inputs(&self, inputs: Vec<f64>) {
        lock(&self.state).inputs = inputs;
    }

    pub fn fail_reads(&self, fail: bool) {
        lock(&self.state).fail_reads = fail;
    }

    /// Make analog and digital writes fail.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Every analog write, oldest first.
    pub fn outputs(&self) -> Vec<Vec<f64>> {
        lock(&self.state).outputs.clone()
    }

    /// Every digital line write as `(index, level)`, oldest first.
    pub fn digital_writes(&self) -> Vec<(usize, bool)> {
        lock(&self.state).digital.clone()
    }

    pub fn analog_in(&self) -> ScriptedAnalogIn {
        ScriptedAnalogIn(Arc::clone(&self.state))
    }

    pub fn analog_out(&self) -> ScriptedAnalogOut {
        ScriptedAnalogOut(Arc::clone(&self.state))
    }

    pub fn digital_out(&self) -> ScriptedDigitalOut {
        ScriptedDigitalOut(Arc::clone(&self.state))
    }
}

pub struct ScriptedAnalogIn(Arc<Mutex<DaqState>>);
pub struct ScriptedAnalogOut(Arc<Mutex<DaqState>>);
pub struct ScriptedDigitalOut(Arc<Mutex<DaqState>>);

impl AnalogInput for ScriptedAnalogIn {
    fn read_values(&mut self) -> Result<Vec<f64>, DeviceError> {
        let st = lock(&self.0);
        if st.fail_reads {
            return Err(device_error("analog input task failed"));
        }
        Ok(st.inputs.clone())
    }
}

impl AnalogOutput for ScriptedAnalogOut {
    fn write_values(&mut self, values: &[f64]) -> Result<(), DeviceError> {
        let mut st = lock(&self.0);
        if st.fail_writes {
            return Err(device_error("analog output task failed"));
        }
        st.outputs.push(values.to_vec());
        Ok(())
    }
}

impl DigitalOutput for ScriptedDigitalOut {
    fn write_line(&mut self, index: usize, level: bool) -> Result<(), DeviceError> {
        let mut st = lock(&self.0);
        if st.fail_writes {
            return Err(device_error("digital output task failed"));
        }
        st.digital.push((index, level));
        Ok(())
    }
}

// ── ORION laser ──

/// Register file of the simulated ORION laser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrionRegisters {
    pub factory_current: u64,
    pub factory_temp: u64,
    pub nonvolatile_current: u64,
    pub nonvolatile_temp: u64,
    pub volatile_current: u64,
    pub volatile_temp: u64,
    pub serial_number: u64,
    /// At most eight ASCII characters.
    pub part_number: String,
    pub serial_enabled: bool,
}

impl Default for OrionRegisters {
    fn default() -> Self {
        Self {
            factory_current: 900,
            factory_temp: 10_000,
            nonvolatile_current: 900,
            nonvolatile_temp: 10_000,
            volatile_current: 900,
            volatile_temp: 10_000,
            serial_number: 31_337,
            part_number: "RIO0194".into(),
            serial_enabled: false,
        }
    }
}

#[derive(Debug, Default)]
struct OrionState {
    regs: OrionRegisters,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    requests: Vec<Request>,
    silent: bool,
    corrupt_next: bool,
    status_override: Option<u8>,
}

/// Byte transport that answers ORION requests like the laser firmware:
/// reads return the register, in-range writes update it and echo the value,
/// out-of-range writes answer status 0x30 with the old value.
#[derive(Debug, Clone, Default)]
pub struct SimulatedOrionLink {
    state: Arc<Mutex<OrionState>>,
}

impl SimulatedOrionLink {
    pub fn new(regs: OrionRegisters) -> Self {
        Self {
            state: Arc::new(Mutex::new(OrionState {
                regs,
                ..OrionState::default()
            })),
        }
    }

    pub fn registers(&self) -> OrionRegisters {
        lock(&self.state).regs.clone()
    }

    /// Requests decoded so far, oldest first.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.state).requests.clone()
    }

    /// Stop answering; reads then time out.
    pub fn set_silent(&self, silent: bool) {
        lock(&self.state).silent = silent;
    }

    /// Break the checksum of the next response.
    pub fn corrupt_next(&self) {
        lock(&self.state).corrupt_next = true;
    }

    /// Report this status on every response instead of the computed one.
    pub fn force_status(&self, status: Option<u8>) {
        lock(&self.state).status_override = status;
    }
}

fn ascii_value(text: &str) -> u64 {
    text.bytes()
        .take(8)
        .fold(0u64, |acc, b| (acc << 8) | u64::from(b))
}

impl OrionState {
    /// Pull whole packets out of the inbox and queue their responses.
    fn process(&mut self) {
        loop {
            match self.inbox.iter().position(|&b| b == HEADER) {
                Some(0) => {}
                Some(n) => {
                    self.inbox.drain(..n);
                }
                None => {
                    self.inbox.clear();
                    return;
                }
            }
            if self.inbox.len() < 3 {
                return;
            }
            let len = usize::from(self.inbox[2]) + 2;
            if self.inbox.len() < len {
                return;
            }
            let packet: Vec<u8> = self.inbox.drain(..len).collect();
            // The firmware ignores garbage; the host sees a timeout.
            let Ok(request) = decode_request(&packet) else {
                continue;
            };
            self.requests.push(request);
            if self.silent {
                continue;
            }
            let (value, status) = self.answer(request);
            let mut response = encode_response(
                request.command,
                value,
                self.status_override.unwrap_or(status),
                request.packet_id,
            );
            if std::mem::take(&mut self.corrupt_next) {
                let n = response.len();
                response[n - 2] ^= 0xFF;
            }
            self.outbox.extend(response);
        }
    }

    fn answer(&mut self, request: Request) -> (Option<u64>, u8) {
        let regs = &mut self.regs;
        let register = match request.command {
            Command::DefaultCurrentRead => return (Some(regs.factory_current), STATUS_OK),
            Command::DefaultTempRead => return (Some(regs.factory_temp), STATUS_OK),
            Command::SerialNumberRead => return (Some(regs.serial_number), STATUS_OK),
            Command::PartNumberRead => return (Some(ascii_value(&regs.part_number)), STATUS_OK),
            Command::FirmwareRead => return (Some(0x0102), STATUS_OK),
            Command::OnTimeRead => return (Some(3600), STATUS_OK),
            Command::StatusRead | Command::ItuChannelRead => return (Some(0), STATUS_OK),
            Command::ActualTempRead | Command::BoardTempRead => return (Some(2500), STATUS_OK),
            Command::PhotodiodeVoltageRead => return (Some(1200), STATUS_OK),
            Command::EnableSerial => {
                regs.serial_enabled = true;
                return (None, STATUS_OK);
            }
            Command::DisableSerial => {
                regs.serial_enabled = false;
                return (None, STATUS_OK);
            }
            Command::VolatileCurrentRead | Command::VolatileCurrentWrite => {
                &mut regs.volatile_current
            }
            Command::VolatileTempRead | Command::VolatileTempWrite => &mut regs.volatile_temp,
            Command::NonVolatileCurrentRead | Command::NonVolatileCurrentWrite => {
                &mut regs.nonvolatile_current
            }
            Command::NonVolatileTempRead | Command::NonVolatileTempWrite => {
                &mut regs.nonvolatile_temp
            }
        };
        match (request.value, request.command.limits()) {
            (Some(v), Some((min, max))) if (min..=max).contains(&v) => {
                *register = v;
                (Some(v), STATUS_OK)
            }
            (Some(_), Some(_)) => (Some(*register), 0x30),
            _ => (Some(*register), STATUS_OK),
        }
    }
}

impl Write for SimulatedOrionLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut st = lock(&self.state);
        st.inbox.extend_from_slice(buf);
        st.process();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SimulatedOrionLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut st = lock(&self.state);
        if st.outbox.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no response from laser"));
        }
        let mut n = 0;
        while n < buf.len() {
            match st.outbox.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}
