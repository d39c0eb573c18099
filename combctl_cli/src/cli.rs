//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "combctl", version, about = "Frequency comb control CLI")]
pub struct Cli {
    /// Path to config TOML; lab defaults are used when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides `[logging].level`
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Measure the comb channels and run laser / temperature feedback
    Counter {
        /// Stop after this many ticks (runs until Ctrl-C otherwise)
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        /// Channel index whose frequency steers the reference laser
        #[arg(long, value_name = "INDEX")]
        laser_feedback: Option<usize>,
        /// Channel index that sends setpoint adjusts to its temperature controller
        #[arg(long, value_name = "INDEX")]
        temp_feedback: Option<usize>,
    },
    /// Run the DAQ temperature control loops
    Temperature {
        /// Stop after this many ticks (runs until Ctrl-C otherwise)
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        /// Enable every loop at start regardless of `enabled_default`
        #[arg(long, action = ArgAction::SetTrue)]
        enable: bool,
    },
    /// Send one ORION command to the reference laser and print the reply
    Orion {
        /// Protocol mnemonic, e.g. volTempRead or volIWrt
        command: String,
        /// Value for write commands
        #[arg(long, value_name = "N")]
        value: Option<u64>,
    },
    /// Scan serial ports for ORION lasers and list the ones that answer
    FindLaser {
        /// Only report the laser with this serial number
        #[arg(long, value_name = "SN")]
        serial_number: Option<u64>,
    },
    /// Validate the config and build every session without running them
    SelfCheck,
}
