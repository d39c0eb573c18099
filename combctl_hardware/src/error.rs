use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("serial port error: {0}")]
    Serial(String),
    #[error("instrument timeout")]
    Timeout,
    #[error("ipc peer disconnected: {0}")]
    Disconnected(String),
    #[error("simulated fault: {0}")]
    Injected(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
