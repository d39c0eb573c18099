//! What happened during one tick, for display and logging by the caller.

use crate::error::CombError;

/// Notable outcomes of a tick. Safety shutoffs are events, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    /// Counter read failed; the channel was deactivated.
    ReadFailed { channel: usize, error: CombError },
    /// A frequency row was handed to the log sink.
    Logged { channel: usize },
    /// The log sink failed; logging stopped for the channel.
    LogFailed { channel: usize, error: CombError },
    /// Detune beyond the allowed range.
    LaserStrike {
        channel: usize,
        strikes: u32,
        detune_hz: f64,
    },
    /// Strike limit exceeded; laser feedback disabled.
    LaserFeedbackShutoff { channel: usize, detune_hz: f64 },
    /// The laser actuator was stepped to `new_value`.
    LaserCorrection {
        channel: usize,
        delta: i64,
        new_value: u64,
    },
    /// Writing the laser failed; laser feedback disabled.
    LaserWriteFailed { channel: usize, error: CombError },
    /// Cumulative adjust sent to the temperature controller.
    TempAdjustSent {
        channel: usize,
        value: f64,
        clamped: bool,
    },
    /// Sending the adjust failed; temperature feedback disabled.
    TempLinkFailed { channel: usize, error: CombError },
    /// DAQ loop read outside its temperature limits.
    PanicStrike {
        control_loop: usize,
        temperature: f64,
        strikes: u32,
    },
    /// Panic strikes reached the limit; loop disabled.
    LoopForcedOff { control_loop: usize },
    /// Remote adjust folded into the setpoint.
    SetpointCommitted { control_loop: usize, setpoint: f64 },
    /// Folding the adjust would leave the limits; setpoint kept.
    SetpointRejected { control_loop: usize, setpoint: f64 },
    /// Remote adjust for a loop changed.
    AdjustReceived {
        control_loop: usize,
        adjust: f64,
        clamped: bool,
    },
}

/// Result of one counter tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Channel that was read.
    pub index: usize,
    /// `None` when the read failed or the channel was inactive.
    pub frequency: Option<f64>,
    pub events: Vec<TickEvent>,
}

/// Per-loop values after a DAQ tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopReading {
    pub actual: f64,
    pub setpoint_readback: f64,
    pub voltage_out: f64,
    pub digital_enable: bool,
    pub panic: bool,
    pub adjust: f64,
}

/// Result of one DAQ temperature-controller tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TempTickReport {
    pub readings: Vec<LoopReading>,
    pub events: Vec<TickEvent>,
}
