//! Ingestion worker
//!
//! One thread owns the transport and drives the connection state machine:
//!
//! ```text
//! loop {
//!     drain commands (connect / disconnect / send / shutdown)
//!     match state {
//!         Idle | Failed   => wait for a command
//!         Discovering     => pick an endpoint
//!         Connecting      => open the transport
//!         Streaming/Stale => read -> decode -> parse -> store, check staleness
//!         Disconnected    => wait out the backoff, then reconnect
//!     }
//! }
//! ```
//!
//! Every read is bounded by the poll interval, so the shutdown flag is seen
//! within one interval. Transport errors become state transitions; nothing is
//! returned out of the thread.

use super::{LinkEvent, Shared};
use crate::config::{LinkConfig, TimingConfig, TransportKind};
use crate::core::types::{ConnectionState, ControlEvent, Endpoint, Target};
use crate::error::{Error, Result};
use crate::protocol::{Field, LineDecoder, RecordParser};
use crate::transport::{Connector, PortScanner, Transport, select_port};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Receive buffer size for a single transport read
const READ_CHUNK: usize = 4096;

/// Requests from the [`Link`](super::Link) handle to the worker
#[derive(Debug)]
pub(crate) enum Command {
    Connect(Target),
    Disconnect,
    Send(Vec<u8>),
    Shutdown,
}

pub(crate) struct Worker {
    shared: Arc<Shared>,
    link: LinkConfig,
    timing: TimingConfig,
    parser: RecordParser,
    decoder: LineDecoder,
    connector: Box<dyn Connector>,
    scanner: Box<dyn PortScanner>,
    commands: Receiver<Command>,
    events: Sender<LinkEvent>,
    controls: Sender<ControlEvent>,
    transport: Option<Box<dyn Transport>>,
    target: Target,
    endpoint: Option<Endpoint>,
    /// Set once a connection dropped; connect failures then back off instead of failing
    retrying: bool,
    attempts: u32,
    retry_at: Instant,
    read_buf: Vec<u8>,
    running: bool,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        shared: Arc<Shared>,
        link: LinkConfig,
        timing: TimingConfig,
        parser: RecordParser,
        connector: Box<dyn Connector>,
        scanner: Box<dyn PortScanner>,
        commands: Receiver<Command>,
        events: Sender<LinkEvent>,
        controls: Sender<ControlEvent>,
    ) -> Self {
        Self {
            shared,
            link,
            timing,
            parser,
            decoder: LineDecoder::new(),
            connector,
            scanner,
            commands,
            events,
            controls,
            transport: None,
            target: Target::Auto,
            endpoint: None,
            retrying: false,
            attempts: 0,
            retry_at: Instant::now(),
            read_buf: vec![0u8; READ_CHUNK],
            running: true,
        }
    }

    /// Worker thread entry point
    pub(crate) fn run(mut self) {
        log::info!("Link worker started");

        while self.running && !self.shared.shutdown.load(Ordering::Relaxed) {
            self.drain_commands();
            if !self.running {
                break;
            }
            self.step();
        }

        self.release();
        if self.state() != ConnectionState::Idle {
            self.set_state(ConnectionState::Idle);
        }
        log::info!("Link worker exiting");
    }

    fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    fn step(&mut self) {
        match self.state() {
            ConnectionState::Idle | ConnectionState::Failed => {
                self.wait_for_command(self.timing.poll_interval());
            }
            ConnectionState::Discovering => self.discover(),
            ConnectionState::Connecting => self.connect(),
            ConnectionState::Streaming | ConnectionState::Stale => self.receive(),
            ConnectionState::Disconnected => {
                let now = Instant::now();
                if now >= self.retry_at {
                    self.attempts += 1;
                    log::info!(
                        "Reconnecting (attempt {}{})",
                        self.attempts,
                        match self.timing.max_reconnect_attempts {
                            0 => String::new(),
                            max => format!("/{}", max),
                        }
                    );
                    self.set_state(ConnectionState::Connecting);
                } else {
                    let wait = (self.retry_at - now).min(self.timing.poll_interval());
                    self.wait_for_command(wait);
                }
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running = false;
                    break;
                }
            }
        }
    }

    fn wait_for_command(&mut self, timeout: Duration) {
        match self.commands.recv_timeout(timeout) {
            Ok(command) => self.apply(command),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.running = false,
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Connect(target) => {
                log::info!("Connect requested: {:?}", target);
                self.release();
                if self.state() != ConnectionState::Idle {
                    self.set_state(ConnectionState::Idle);
                }
                self.target = target;
                self.endpoint = None;
                self.retrying = false;
                self.attempts = 0;
                self.set_state(ConnectionState::Discovering);
            }
            Command::Disconnect => {
                log::info!("Disconnect requested");
                self.release();
                self.retrying = false;
                if self.state() != ConnectionState::Idle {
                    self.set_state(ConnectionState::Idle);
                }
            }
            Command::Send(data) => self.send(&data),
            Command::Shutdown => self.running = false,
        }
    }

    fn send(&mut self, data: &[u8]) {
        let Some(transport) = self.transport.as_mut() else {
            log::warn!("Dropping {} outbound bytes: not connected", data.len());
            return;
        };
        match transport.write_all(data) {
            Ok(()) => log::trace!("Sent {} bytes", data.len()),
            Err(e) => self.transport_lost(e),
        }
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    fn discover(&mut self) {
        match self.resolve() {
            Ok(endpoint) => {
                log::info!("Selected endpoint {}", endpoint);
                self.endpoint = Some(endpoint);
                self.set_state(ConnectionState::Connecting);
            }
            Err(e) => {
                log::error!("Discovery failed: {}", e);
                self.set_state(ConnectionState::Failed);
            }
        }
    }

    /// Explicit endpoint, else first keyword-matching serial port, else fallback
    fn resolve(&self) -> Result<Endpoint> {
        if let Target::Endpoint(endpoint) = &self.target {
            return Ok(endpoint.clone());
        }

        if self.link.transport == TransportKind::Serial {
            match self.scanner.scan() {
                Ok(ports) => {
                    log::debug!("Scanned {} serial port(s)", ports.len());
                    if let Some(port) = select_port(&ports, &self.link.keywords) {
                        log::info!("Discovered {} ({})", port.name, port.description);
                        return self.link.parse_endpoint(&port.name);
                    }
                }
                Err(e) => log::warn!("Serial port scan failed: {}", e),
            }
        }

        match self.link.fallback()? {
            Some(endpoint) => {
                log::info!("No port matched, using fallback {}", endpoint);
                Ok(endpoint)
            }
            None => Err(Error::NoEndpoint),
        }
    }

    fn connect(&mut self) {
        let Some(endpoint) = self.endpoint.clone() else {
            log::error!("Connecting without an endpoint");
            self.set_state(ConnectionState::Failed);
            return;
        };

        match self
            .connector
            .connect(&endpoint, self.timing.connect_timeout())
        {
            Ok(transport) => {
                log::info!("Connected to {} ({})", endpoint, transport.peer());
                self.transport = Some(transport);
                self.decoder.reset();
                self.shared.liveness.touch();
                self.attempts = 0;
                self.set_state(ConnectionState::Streaming);
                self.emit(LinkEvent::Connected(endpoint));
            }
            Err(e) => {
                log::warn!("Connect to {} failed: {}", endpoint, e);
                if self.retrying && self.retries_left() {
                    self.schedule_retry();
                } else {
                    self.retrying = false;
                    self.set_state(ConnectionState::Failed);
                }
            }
        }
    }

    fn retries_left(&self) -> bool {
        match self.timing.max_reconnect_attempts {
            0 => true,
            max => self.attempts < max,
        }
    }

    fn schedule_retry(&mut self) {
        self.retry_at = Instant::now() + self.timing.reconnect_backoff();
        self.set_state(ConnectionState::Disconnected);
    }

    fn transport_lost(&mut self, error: Error) {
        log::warn!("Transport lost: {}", error);
        self.release();
        self.retrying = true;
        self.schedule_retry();
    }

    fn release(&mut self) {
        if let Some(transport) = self.transport.take() {
            log::info!("Closing transport {}", transport.peer());
        }
        self.decoder.reset();
    }

    // ========================================================================
    // Streaming
    // ========================================================================

    fn receive(&mut self) {
        let result = match self.transport.as_mut() {
            Some(transport) => transport.read(&mut self.read_buf),
            None => Err(Error::Disconnected),
        };

        match result {
            Ok(0) => {}
            Ok(n) => {
                log::trace!("Received {} bytes", n);
                self.shared.stats.add_bytes(n);
                let records: Vec<String> = self.decoder.feed(&self.read_buf[..n]).collect();
                for record in records {
                    self.ingest(&record);
                }
                self.guard_pending();
            }
            Err(e) => {
                self.transport_lost(e);
                return;
            }
        }

        if self.state() == ConnectionState::Streaming
            && self.shared.liveness.is_stale(self.timing.stale_timeout())
        {
            log::warn!(
                "No record for {:?}, link is stale",
                self.shared.liveness.elapsed()
            );
            self.set_state(ConnectionState::Stale);
        }
    }

    fn ingest(&mut self, record: &str) {
        self.shared.liveness.touch();
        self.shared.stats.add_record();
        if self.state() == ConnectionState::Stale {
            log::info!("Record received, link recovered");
            self.set_state(ConnectionState::Streaming);
        }

        let parsed = self.parser.parse(record);
        if !parsed.dropped.is_empty() {
            self.shared.stats.add_field_errors(parsed.dropped.len());
        }
        if parsed.is_unrecognized() && !record.is_empty() {
            self.shared.stats.add_unrecognized();
        }

        for field in parsed.fields {
            match field {
                Field::Sample { channel, value } => {
                    if let Err(e) = self.shared.store.append(channel, value) {
                        log::warn!("Sample dropped: {}", e);
                        self.shared.stats.add_field_errors(1);
                    }
                }
                Field::Control(event) => {
                    log::info!("Control event: {:?}", event);
                    self.emit_control(event);
                }
            }
        }
    }

    fn guard_pending(&mut self) {
        let pending = self.decoder.pending_len();
        if pending > self.timing.max_pending_bytes {
            log::warn!(
                "Discarding {} bytes without a delimiter (limit {})",
                pending,
                self.timing.max_pending_bytes
            );
            self.decoder.reset();
            self.shared.stats.add_overflow();
        }
    }

    // ========================================================================
    // State and events
    // ========================================================================

    fn set_state(&mut self, to: ConnectionState) {
        match self.shared.state.transition(to) {
            Ok(transition) => {
                log::info!("Link state: {} -> {}", transition.from, transition.to);
                self.emit(LinkEvent::StateChanged(transition));
            }
            Err(e) => log::error!("{}", e),
        }
    }

    fn emit(&self, event: LinkEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            log::debug!("Event queue full, dropped {:?}", event);
        }
    }

    fn emit_control(&self, event: ControlEvent) {
        if let Err(TrySendError::Full(event)) = self.controls.try_send(event) {
            log::warn!("Control queue full, dropped {:?}", event);
        }
    }
}
