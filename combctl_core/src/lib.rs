#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Control and feedback core for a dual optical frequency comb (hardware-agnostic).
//!
//! Every instrument is reached through the `combctl_traits` seams, so the
//! whole stack runs against scripted devices in tests.
//!
//! ## Architecture
//!
//! - **Counter side**: `CounterSession` alternates measurements between the
//!   comb channels, tracks the beat, logs frequencies and runs the laser and
//!   temperature feedback (`counter_session`, `feedback`, `scheduler`).
//! - **DAQ side**: `TemperatureController` runs the thermistor control loops,
//!   their panic interlock and the remote setpoint adjust (`temperature`,
//!   `control_loop`, `thermistor`, `filter`).
//! - **Instruments**: ORION laser protocol and driver (`orion`), frequency
//!   counters (`counters`).
//! - **Safety**: consecutive-violation strike counting (`safety`).
//!
//! Nothing here terminates the process. Safety shutoffs are reported as
//! `TickEvent`s; instrument failures narrow what keeps running.

pub mod beat;
pub mod channel;
pub mod config;
pub mod control_loop;
pub mod conversions;
pub mod counter_session;
pub mod counters;
pub mod error;
pub mod feedback;
pub mod filter;
pub mod freq_log;
pub mod hw_error;
pub mod limits;
pub mod mocks;
pub mod orion;
pub mod runner;
pub mod safety;
pub mod scheduler;
pub mod status;
pub mod temperature;
pub mod thermistor;
pub mod util;

pub use config::{
    ChannelCfg, ControlLoopCfg, CounterCfg, LaserActuator, LaserFeedbackCfg, TempFeedbackCfg,
    TemperatureControllerCfg,
};
pub use counter_session::CounterSession;
pub use error::{BuildError, CombError, PacketCheck, ProtocolError, Result};
pub use status::{LoopReading, TempTickReport, TickEvent, TickReport};
pub use temperature::TemperatureController;

use combctl_traits::{AnalogInput, AnalogOutput, Clock, DigitalOutput, FrequencyCounter};
use eyre::WrapErr;

/// Build a counter session from a validated configuration file.
pub fn build_counter_session<C, K>(
    cfg: &combctl_config::Config,
    counter: C,
    clock: K,
) -> Result<CounterSession<C, K>>
where
    C: FrequencyCounter,
    K: Clock,
{
    CounterSession::new(
        &CounterCfg::from(cfg),
        LaserFeedbackCfg::from(&cfg.laser_feedback),
        TempFeedbackCfg::from(&cfg.temp_feedback),
        counter,
        clock,
    )
    .wrap_err("building counter session")
}

/// Build the DAQ temperature controller from a validated configuration file.
pub fn build_temperature_controller<I, O, D>(
    cfg: &combctl_config::Config,
    analog_in: I,
    analog_out: O,
    digital_out: D,
) -> Result<TemperatureController<I, O, D>>
where
    I: AnalogInput,
    O: AnalogOutput,
    D: DigitalOutput,
{
    TemperatureController::new(
        &TemperatureControllerCfg::from(&cfg.daq),
        analog_in,
        analog_out,
        digital_out,
    )
    .wrap_err("building temperature controller")
}
