//! Client side of the adjust link: newline-terminated text over localhost TCP.
use crate::error::HwError;
use combctl_traits::{DeviceError, LineConnector, LineLink};
use std::io::{ErrorKind, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
        }
    }
}

impl TcpConnector {
    /// `timeout` bounds both the connect and every write.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl LineConnector for TcpConnector {
    fn connect(&mut self, port: u16) -> Result<Box<dyn LineLink>, DeviceError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(HwError::from)?;
        stream.set_write_timeout(Some(self.timeout)).map_err(HwError::from)?;
        stream.set_nodelay(true).map_err(HwError::from)?;
        tracing::debug!(port, "adjust link connected");
        Ok(Box::new(TcpLink { stream, port }))
    }
}

pub struct TcpLink {
    stream: TcpStream,
    port: u16,
}

impl LineLink for TcpLink {
    fn send_line(&mut self, line: &str) -> Result<(), DeviceError> {
        self.stream
            .write_all(line.as_bytes())
            .and_then(|()| self.stream.flush())
            .map_err(|e| match e.kind() {
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                    HwError::Disconnected(format!("port {}: {e}", self.port))
                }
                ErrorKind::TimedOut | ErrorKind::WouldBlock => HwError::Timeout,
                _ => HwError::Io(e),
            })?;
        Ok(())
    }
}
