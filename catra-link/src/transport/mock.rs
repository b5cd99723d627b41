//! Mock transport and connector for testing

use super::{Connector, Transport};
use crate::core::types::Endpoint;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long an empty mock read blocks, standing in for the poll interval
const EMPTY_READ_DELAY: Duration = Duration::from_millis(5);

/// In-memory duplex stream
///
/// Clones share the same buffers, so a test keeps one handle to inject bytes
/// while the worker owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Simulate the peer closing: reads fail once buffered bytes are drained
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// Bytes injected but not yet read
    pub fn pending(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        {
            let mut inner = self.inner.lock();
            if !inner.read_buffer.is_empty() {
                let n = inner.read_buffer.len().min(buffer.len());
                for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if inner.closed {
                return Err(Error::Disconnected);
            }
        }
        thread::sleep(EMPTY_READ_DELAY);
        Ok(0)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::Disconnected);
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(())
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}

/// Connector handing out scripted outcomes
///
/// Each connect attempt pops the next planned outcome: a transport to hand
/// out, or a refusal. An exhausted plan refuses.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<MockConnectorInner>>,
}

#[derive(Default)]
struct MockConnectorInner {
    plan: VecDeque<Option<MockTransport>>,
    attempts: Vec<Endpoint>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next attempt succeeds with `transport`
    pub fn accept(&self, transport: &MockTransport) -> &Self {
        self.inner.lock().plan.push_back(Some(transport.clone()));
        self
    }

    /// Next attempt is refused
    pub fn refuse(&self) -> &Self {
        self.inner.lock().plan.push_back(None);
        self
    }

    /// Endpoints of every attempt so far
    pub fn attempts(&self) -> Vec<Endpoint> {
        self.inner.lock().attempts.clone()
    }
}

impl Connector for MockConnector {
    fn connect(&mut self, endpoint: &Endpoint, _timeout: Duration) -> Result<Box<dyn Transport>> {
        let mut inner = self.inner.lock();
        inner.attempts.push(endpoint.clone());
        match inner.plan.pop_front().flatten() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("mock refused {}", endpoint),
            ))),
        }
    }
}
