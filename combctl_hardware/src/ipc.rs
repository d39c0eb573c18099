//! Localhost line server for remote setpoint adjusts.
//!
//! One background thread owns the listener, serves one client at a time, and
//! pushes every complete line into a bounded channel. The tick handler drains
//! it without blocking through `LineSource::poll_line`.
//!
//! The thread is shut down and joined when the `LineServer` is dropped.
use crate::error::Result;
use combctl_traits::LineSource;
use crossbeam_channel as xch;
use std::io::{BufRead, BufReader, ErrorKind};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Lines waiting for the tick handler; older lines win when it falls behind.
const QUEUE_DEPTH: usize = 64;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct LineServer {
    rx: xch::Receiver<String>,
    port: u16,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl LineServer {
    /// Listen on `127.0.0.1:port`. Port 0 picks a free port; see `port()`.
    pub fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        let (tx, rx) = xch::bounded(QUEUE_DEPTH);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let join_handle = std::thread::spawn(move || {
            while !shutdown_clone.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        tracing::info!(port, %peer, "adjust client connected");
                        if !serve(stream, &tx, &shutdown_clone, port) {
                            break;
                        }
                        tracing::info!(port, "adjust client disconnected");
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        std::thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => {
                        tracing::warn!(port, error = %e, "accept failed");
                        std::thread::sleep(POLL_INTERVAL);
                    }
                }
            }
            tracing::trace!(port, "line server thread exiting cleanly");
        });

        tracing::info!(port, "listening for adjust lines");
        Ok(Self {
            rx,
            port,
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Read lines from one client until it disconnects. Returns `false` when the
/// server should stop (shutdown raised or the receiver is gone).
fn serve(stream: TcpStream, tx: &xch::Sender<String>, shutdown: &AtomicBool, port: u16) -> bool {
    if let Err(e) = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(POLL_INTERVAL)))
    {
        tracing::warn!(port, error = %e, "could not configure client socket");
        return true;
    }
    let mut reader = BufReader::new(stream);
    let mut pending = Vec::new();
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        // Bytes consumed before a timeout stay in `pending`.
        match reader.read_until(b'\n', &mut pending) {
            Ok(0) => return true,
            Ok(_) if pending.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&pending).trim().to_string();
                pending.clear();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(port, line = %line, "adjust line received");
                match tx.try_send(line) {
                    Ok(()) => {}
                    Err(xch::TrySendError::Full(line)) => {
                        tracing::warn!(port, line = %line, "adjust queue full; line dropped");
                    }
                    Err(xch::TrySendError::Disconnected(_)) => return false,
                }
            }
            // EOF in the middle of a line.
            Ok(_) => return true,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                tracing::warn!(port, error = %e, "adjust client read failed");
                return true;
            }
        }
    }
}

impl LineSource for LineServer {
    fn poll_line(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

impl Drop for LineServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!(port = self.port, "line server thread joined"),
                Err(e) => tracing::warn!(?e, "line server thread panicked during shutdown"),
            }
        }
    }
}
