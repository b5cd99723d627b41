//! Serial transport

use super::Transport;
use crate::error::Result;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

/// Serial port wrapper for UART communication
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialTransport {
    /// Open a serial port
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    /// * `baud_rate` - Baud rate (e.g., 9600)
    /// * `read_timeout` - Upper bound on a single read
    /// * `settle` - Wait after opening, then discard whatever arrived
    pub fn open(
        path: &str,
        baud_rate: u32,
        read_timeout: Duration,
        settle: Duration,
    ) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()?;

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);

        // Boards with auto-reset reboot on open and print a banner; skip it
        if !settle.is_zero() {
            thread::sleep(settle);
        }
        port.clear(ClearBuffer::Input)?;

        Ok(SerialTransport {
            port,
            path: path.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
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
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn peer(&self) -> String {
        self.path.clone()
    }
}
