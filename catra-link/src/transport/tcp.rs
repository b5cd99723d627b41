//! TCP transport

use super::Transport;
use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP client stream to the base station
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpTransport {
    /// Connect to `addr` (`host:port`)
    ///
    /// Every resolved address is tried with `connect_timeout`; the first
    /// that accepts wins.
    pub fn connect(addr: &str, connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let candidates: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
        if candidates.is_empty() {
            return Err(Error::InvalidEndpoint(format!("'{}' did not resolve", addr)));
        }

        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, connect_timeout) {
                Ok(stream) => return Self::from_stream(stream, candidate, read_timeout),
                Err(e) => {
                    log::debug!("Connect to {} failed: {}", candidate, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .map(Error::Io)
            .unwrap_or_else(|| Error::InvalidEndpoint(addr.to_string())))
    }

    fn from_stream(stream: TcpStream, peer: SocketAddr, read_timeout: Duration) -> Result<Self> {
        // Records are small and latency matters more than throughput
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(read_timeout))?;
        log::info!("Connected to {}", peer);
        Ok(Self { stream, peer })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.stream.read(buffer) {
            Ok(0) => Err(Error::Disconnected),
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        Ok(())
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
