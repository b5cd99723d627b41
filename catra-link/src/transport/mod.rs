//! Transport layer for I/O abstraction
//!
//! A [`Transport`] is an open duplex byte stream with a bounded read: every
//! `read` returns within the poll interval so the worker can observe shutdown
//! and staleness. A [`Connector`] opens transports for an [`Endpoint`].
//!
//! | Endpoint | Transport | Read timeout | Close detection |
//! |----------|-----------|--------------|-----------------|
//! | `Serial` | [`SerialTransport`] | port timeout | I/O error (device vanished) |
//! | `Tcp` | [`TcpTransport`] | socket read timeout | `read == 0` |

use crate::core::types::Endpoint;
use crate::error::Result;
use std::time::Duration;

pub mod discovery;
mod mock;
mod serial;
mod tcp;

pub use discovery::{PortInfo, PortScanner, StaticScanner, SystemScanner, select_port};
pub use mock::{MockConnector, MockTransport};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Transport trait for device communication
pub trait Transport: Send {
    /// Read available bytes into `buffer`
    ///
    /// Returns `Ok(0)` when the poll interval elapsed without data and
    /// `Err(Error::Disconnected)` when the peer closed the stream.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write all of `data`
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Human-readable peer description for logs
    fn peer(&self) -> String;
}

/// Opens transports for endpoints
pub trait Connector: Send {
    /// Open `endpoint`, failing instead of blocking past `timeout`
    fn connect(&mut self, endpoint: &Endpoint, timeout: Duration) -> Result<Box<dyn Transport>>;
}

/// Connector for real serial ports and TCP sockets
#[derive(Debug, Clone)]
pub struct SystemConnector {
    /// Read timeout applied to every opened transport
    pub poll_interval: Duration,
    /// Delay after opening a serial port before streaming
    pub serial_settle: Duration,
}

impl SystemConnector {
    pub fn new(poll_interval: Duration, serial_settle: Duration) -> Self {
        Self {
            poll_interval,
            serial_settle,
        }
    }
}

impl Connector for SystemConnector {
    fn connect(&mut self, endpoint: &Endpoint, timeout: Duration) -> Result<Box<dyn Transport>> {
        match endpoint {
            Endpoint::Serial { path, baud_rate } => {
                let transport =
                    SerialTransport::open(path, *baud_rate, self.poll_interval, self.serial_settle)?;
                Ok(Box::new(transport))
            }
            Endpoint::Tcp { addr } => {
                let transport = TcpTransport::connect(addr, timeout, self.poll_interval)?;
                Ok(Box::new(transport))
            }
        }
    }
}
