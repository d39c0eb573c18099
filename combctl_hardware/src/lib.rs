//! Instrument adapters for combctl: localhost line links, simulated devices
//! and, with the `hardware` feature, serial ports.
pub mod error;
pub mod ipc;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod sim;
pub mod tcp;

pub use error::HwError;
pub use ipc::LineServer;
pub use sim::{SimulatedCounter, SimulatedDaq};
pub use tcp::TcpConnector;
