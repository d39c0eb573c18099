//! Frequency counter drivers over a byte transport.
//!
//! - `EconomicalCounter`: serial counter that streams fixed 29-byte ASCII frames.
//! - `ScpiCounter`: HP/Agilent 53131A-style counter driven with SCPI strings.
//! - `CounterBank`: one `FrequencyCounter` over several instruments, routed by channel.

use crate::error::CombError;
use combctl_traits::{DeviceError, FrequencyCounter};
use std::io::{Read, Write};

/// Select the high-speed input on channel 2.
pub const SELECT_HIGH_SPEED: &[u8] = b"$E2222*";
/// Select the low-speed input on channel 2.
pub const SELECT_LOW_SPEED: &[u8] = b"$E2020*";
pub const ECONOMICAL_FRAME_LEN: usize = 29;
const FRAME_MARKER: &str = "F-CH2:";

fn boxed(e: CombError) -> DeviceError {
    Box::new(e)
}

fn io_err(e: std::io::Error) -> CombError {
    if e.kind() == std::io::ErrorKind::TimedOut {
        CombError::Timeout
    } else {
        CombError::InstrumentIo(e.to_string())
    }
}

/// Extract the reading between `F-CH2:` and the following carriage return.
pub fn parse_economical_frame(frame: &[u8]) -> Result<f64, CombError> {
    let text = String::from_utf8_lossy(frame);
    let (_, tail) = text
        .split_once(FRAME_MARKER)
        .ok_or_else(|| CombError::InstrumentFault(format!("frame has no {FRAME_MARKER} marker")))?;
    let field = tail.split('\r').next().unwrap_or(tail).trim();
    field
        .parse::<f64>()
        .map_err(|_| CombError::InstrumentFault(format!("unparseable reading {field:?}")))
}

/// Image correction for a counter that sees the beat below a mirror frequency:
/// `f = mirror - reading + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirrorCorrection {
    pub mirror_hz: f64,
    pub offset_hz: f64,
}

impl Default for MirrorCorrection {
    fn default() -> Self {
        Self {
            mirror_hz: 1010e6,
            offset_hz: 8.646_939_525_961_876,
        }
    }
}

impl MirrorCorrection {
    #[inline]
    pub fn apply(&self, reading: f64) -> f64 {
        self.mirror_hz - reading + self.offset_hz
    }
}

pub struct EconomicalCounter<P: Read + Write> {
    port: P,
    mirror: Option<MirrorCorrection>,
    gate_time: f64,
}

impl<P: Read + Write> EconomicalCounter<P> {
    pub fn new(port: P, mirror: Option<MirrorCorrection>, gate_time: f64) -> Self {
        Self {
            port,
            mirror,
            gate_time,
        }
    }

    pub fn select_high_speed(&mut self) -> Result<(), CombError> {
        self.port.write_all(SELECT_HIGH_SPEED).map_err(io_err)?;
        self.port.flush().map_err(io_err)
    }

    pub fn select_low_speed(&mut self) -> Result<(), CombError> {
        self.port.write_all(SELECT_LOW_SPEED).map_err(io_err)?;
        self.port.flush().map_err(io_err)
    }

    /// Read one frame and return the (mirror-corrected) frequency in Hz.
    pub fn read_frequency(&mut self) -> Result<f64, CombError> {
        let mut frame = [0u8; ECONOMICAL_FRAME_LEN];
        self.port.read_exact(&mut frame).map_err(io_err)?;
        let reading = parse_economical_frame(&frame)?;
        Ok(match self.mirror {
            Some(m) => m.apply(reading),
            None => reading,
        })
    }
}

impl<P: Read + Write> FrequencyCounter for EconomicalCounter<P> {
    // Single input; the counter streams continuously, so arming is a no-op.
    fn begin_measurement(&mut self, _channel: u8) -> Result<(), DeviceError> {
        Ok(())
    }

    fn get_result(&mut self) -> Result<f64, DeviceError> {
        self.read_frequency().map_err(boxed)
    }

    fn set_gate_time(&mut self, seconds: f64) -> Result<(), DeviceError> {
        self.gate_time = seconds;
        Ok(())
    }

    fn gate_time(&self) -> f64 {
        self.gate_time
    }
}

/// SCPI frequency counter on a line-oriented transport.
pub struct ScpiCounter<P: Read + Write> {
    port: P,
    gate_time: f64,
}

impl<P: Read + Write> ScpiCounter<P> {
    /// Wrap a transport and apply the throughput-oriented default setup.
    pub fn new(port: P, gate_time: f64, external_clock: bool) -> Result<Self, CombError> {
        let mut counter = Self { port, gate_time };
        counter.configure_default()?;
        counter.set_external_clock(external_clock)?;
        Ok(counter)
    }

    fn write_cmd(&mut self, cmd: &str) -> Result<(), CombError> {
        tracing::trace!(cmd, "scpi write");
        self.port.write_all(cmd.as_bytes()).map_err(io_err)?;
        self.port.write_all(b"\n").map_err(io_err)?;
        self.port.flush().map_err(io_err)
    }

    fn read_line(&mut self) -> Result<String, CombError> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte).map_err(io_err)? {
                0 => break,
                _ if byte[0] == b'\n' => break,
                _ => line.push(byte[0]),
            }
        }
        if line.is_empty() {
            return Err(CombError::Timeout);
        }
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// Reset, time-armed gating, display and post-processing off, continuous run.
    pub fn configure_default(&mut self) -> Result<(), CombError> {
        let gate = format!(":FREQ:ARM:STOP:TIM {}", self.gate_time);
        let sequence = [
            "*RST",
            "*CLS",
            "*SRE 0",
            "*ESE 0",
            ":STAT:PRES",
            ":FORMAT ASCII",
            ":EVENT1:LEVEL 0",
            ":EVENT2:LEVEL 0",
            ":FREQ:ARM:STAR:SOUR IMM",
            ":FREQ:ARM:STOP:SOUR TIM",
            gate.as_str(),
            ":DIAG:CAL:INT:AUTO OFF",
            ":DISP:ENAB OFF",
            ":CALC:MATH:STATE OFF",
            ":CALC2:LIM:STATE OFF",
            ":CALC3:AVER:STATE OFF",
            ":HCOPY:CONT OFF",
            "*DDT #15FETC?",
            ":FUNC 'FREQ 2'",
            ":INIT:CONT ON",
        ];
        for cmd in sequence {
            self.write_cmd(cmd)?;
        }
        Ok(())
    }

    pub fn set_external_clock(&mut self, external: bool) -> Result<(), CombError> {
        if external {
            self.write_cmd(":ROSC:SOUR EXT")?;
            self.write_cmd(":ROSC:EXT:CHECK OFF")
        } else {
            self.write_cmd(":ROSC:SOUR INT")
        }
    }

    /// Tell the counter the expected frequency on a channel to skip auto-ranging.
    pub fn set_approx_frequency(&mut self, channel: u8, hz: f64) -> Result<(), CombError> {
        check_channel(channel)?;
        self.write_cmd(&format!(":FREQ:EXP{channel} {hz}"))
    }

    /// Reset the counter and release the transport.
    pub fn close(mut self) -> P {
        for cmd in ["*RST", "*CLS", "*SRE 0", "*ESE 0", ":STAT:PRES"] {
            if let Err(e) = self.write_cmd(cmd) {
                tracing::debug!(error = %e, "counter reset on close failed");
                break;
            }
        }
        self.port
    }
}

fn check_channel(channel: u8) -> Result<(), CombError> {
    if channel == 1 || channel == 2 {
        Ok(())
    } else {
        Err(CombError::State(format!("{channel} is not a valid counter channel")))
    }
}

impl<P: Read + Write> FrequencyCounter for ScpiCounter<P> {
    fn begin_measurement(&mut self, channel: u8) -> Result<(), DeviceError> {
        check_channel(channel).map_err(boxed)?;
        self.write_cmd(&format!(":FUNC 'FREQ {channel}'"))
            .and_then(|()| self.write_cmd("*TRG"))
            .map_err(boxed)
    }

    fn get_result(&mut self) -> Result<f64, DeviceError> {
        let line = self.read_line().map_err(boxed)?;
        line.parse::<f64>().map_err(|_| {
            boxed(CombError::InstrumentFault(format!(
                "unparseable counter reading {line:?}"
            )))
        })
    }

    fn set_gate_time(&mut self, seconds: f64) -> Result<(), DeviceError> {
        self.gate_time = seconds;
        self.write_cmd(&format!(":FREQ:ARM:STOP:TIM {seconds}"))
            .map_err(boxed)
    }

    fn gate_time(&self) -> f64 {
        self.gate_time
    }
}

/// Routes physical channels to instruments. `get_result` reads from
/// whichever instrument was armed last.
pub struct CounterBank {
    routes: Vec<(Vec<u8>, Box<dyn FrequencyCounter>)>,
    armed: Option<usize>,
    gate_time: f64,
}

impl CounterBank {
    pub fn new(gate_time: f64) -> Self {
        Self {
            routes: Vec::new(),
            armed: None,
            gate_time,
        }
    }

    /// Serve `channel` from `counter`; a later route for the same channel wins.
    pub fn route(self, channel: u8, counter: Box<dyn FrequencyCounter>) -> Self {
        self.route_all(&[channel], counter)
    }

    /// Serve several channels from one multi-input instrument.
    pub fn route_all(mut self, channels: &[u8], counter: Box<dyn FrequencyCounter>) -> Self {
        for (served, _) in &mut self.routes {
            served.retain(|c| !channels.contains(c));
        }
        self.routes.retain(|(served, _)| !served.is_empty());
        self.routes.push((channels.to_vec(), counter));
        self
    }

    pub fn channels(&self) -> Vec<u8> {
        self.routes.iter().flat_map(|(c, _)| c.iter().copied()).collect()
    }
}

impl FrequencyCounter for CounterBank {
    fn begin_measurement(&mut self, channel: u8) -> Result<(), DeviceError> {
        let Some(i) = self.routes.iter().position(|(c, _)| c.contains(&channel)) else {
            self.armed = None;
            return Err(boxed(CombError::State(format!(
                "no counter serves channel {channel}"
            ))));
        };
        self.armed = None;
        self.routes[i].1.begin_measurement(channel)?;
        self.armed = Some(i);
        Ok(())
    }

    fn get_result(&mut self) -> Result<f64, DeviceError> {
        let i = self
            .armed
            .ok_or_else(|| boxed(CombError::State("no measurement armed".into())))?;
        self.routes[i].1.get_result()
    }

    fn set_gate_time(&mut self, seconds: f64) -> Result<(), DeviceError> {
        for (_, counter) in &mut self.routes {
            counter.set_gate_time(seconds)?;
        }
        self.gate_time = seconds;
        Ok(())
    }

    fn gate_time(&self) -> f64 {
        self.gate_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory transport: reads from a fixed buffer, records writes.
    struct Loopback {
        rx: Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl Loopback {
        fn new(rx: &[u8]) -> Self {
            Self {
                rx: Cursor::new(rx.to_vec()),
                tx: Vec::new(),
            }
        }
        fn written(&self) -> String {
            String::from_utf8_lossy(&self.tx).to_string()
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.rx.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn frame(reading: &str) -> Vec<u8> {
        let mut f = format!("F-CH2:{reading}\r\n").into_bytes();
        f.resize(ECONOMICAL_FRAME_LEN, b' ');
        f
    }

    #[test]
    fn parses_reading_between_marker_and_cr() {
        assert_eq!(parse_economical_frame(&frame("10000123.5")).unwrap(), 10_000_123.5);
        let mut noisy = b"\n#".to_vec();
        noisy.extend(frame("42.0"));
        assert_eq!(parse_economical_frame(&noisy).unwrap(), 42.0);
    }

    #[test]
    fn missing_marker_is_a_fault() {
        assert!(matches!(
            parse_economical_frame(b"garbage\r"),
            Err(CombError::InstrumentFault(_))
        ));
    }

    #[test]
    fn mirror_correction_is_applied() {
        let mut c = EconomicalCounter::new(
            Loopback::new(&frame("1000000000.0")),
            Some(MirrorCorrection::default()),
            1.0,
        );
        let f = c.get_result().unwrap();
        assert!((f - (10e6 + 8.646_939_525_961_876)).abs() < 1e-6);
    }

    #[test]
    fn channel_select_commands() {
        let mut c = EconomicalCounter::new(Loopback::new(&[]), None, 1.0);
        c.select_high_speed().unwrap();
        c.select_low_speed().unwrap();
        assert_eq!(c.port.written(), "$E2222*$E2020*");
    }

    #[test]
    fn scpi_measure_cycle() {
        let mut c = ScpiCounter::new(Loopback::new(b"+1.99869965598E+008\n"), 1.0, true).unwrap();
        c.begin_measurement(1).unwrap();
        let f = c.get_result().unwrap();
        assert!((f - 199_869_965.598).abs() < 1e-3);
        let log = c.port.written();
        assert!(log.starts_with("*RST\n*CLS\n"));
        assert!(log.contains(":FREQ:ARM:STOP:TIM 1\n"));
        assert!(log.contains(":ROSC:SOUR EXT\n"));
        assert!(log.ends_with(":FUNC 'FREQ 1'\n*TRG\n"));
    }

    #[test]
    fn scpi_rejects_unknown_channel() {
        let mut c = ScpiCounter::new(Loopback::new(b""), 0.1, false).unwrap();
        assert!(c.begin_measurement(3).is_err());
        assert!(c.get_result().is_err());
    }

    #[test]
    fn bank_routes_by_channel() {
        let scpi = ScpiCounter::new(Loopback::new(b"199869965.598\n"), 0.1, false).unwrap();
        let eco = EconomicalCounter::new(
            Loopback::new(&frame("810129408.6")),
            Some(MirrorCorrection::default()),
            0.1,
        );
        let mut bank = CounterBank::new(0.1)
            .route(1, Box::new(scpi))
            .route(2, Box::new(eco));
        assert_eq!(bank.channels(), vec![1, 2]);

        bank.begin_measurement(2).unwrap();
        let f2 = bank.get_result().unwrap();
        assert!((f2 - (1010e6 - 810_129_408.6 + 8.646_939_525_961_876)).abs() < 1e-3);
        bank.begin_measurement(1).unwrap();
        assert!((bank.get_result().unwrap() - 199_869_965.598).abs() < 1e-3);

        assert!(bank.begin_measurement(3).is_err());
        assert!(bank.get_result().is_err());
        bank.set_gate_time(1.0).unwrap();
        assert_eq!(bank.gate_time(), 1.0);
    }

    #[test]
    fn shared_instrument_serves_both_inputs_until_rerouted() {
        use crate::mocks::ScriptedCounter;
        let dual = ScriptedCounter::new(vec![Ok(1.0), Ok(2.0)]);
        let mut bank = CounterBank::new(0.1)
            .route_all(&[1, 2], Box::new(dual))
            .route(2, Box::new(ScriptedCounter::new(vec![Ok(9.0)])));
        assert_eq!(bank.channels(), vec![1, 2]);
        bank.begin_measurement(1).unwrap();
        assert_eq!(bank.get_result().unwrap(), 1.0);
        bank.begin_measurement(2).unwrap();
        assert_eq!(bank.get_result().unwrap(), 9.0);
    }
}
