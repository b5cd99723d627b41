//! Connection manager and collaborator interface
//!
//! [`Link`] is the handle the rest of the application holds. It spawns the
//! ingestion worker (the only writer to the store, the liveness timestamp and
//! the connection state) and exposes read-side accessors that never block on
//! I/O.
//!
//! # Threads
//!
//! | Thread | Role |
//! |--------|------|
//! | `catra-link` | transport I/O, decode, parse, append, state transitions |
//! | caller(s) | `snapshot`, `state`, `is_stale`, `clear`, requests |
//!
//! # Queues
//!
//! State notifications ([`Link::events`]) and control markers
//! ([`Link::controls`]) travel on separate bounded queues. The worker never
//! blocks on either; a full queue drops the new entry. State events are
//! advisory (the current state is always readable via [`Link::state`]), so a
//! burst of them can never crowd out a control marker.
//!
//! # Example
//! ```no_run
//! use catra_link::config::Config;
//! use catra_link::core::types::{ChannelId, Target};
//! use catra_link::link::Link;
//! use catra_link::store::SampleStore;
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let store = Arc::new(SampleStore::new(&config.buffers));
//! let mut link = Link::with_system(&config, store)?;
//! link.request_connect(Target::Auto)?;
//! let temps = link.snapshot(ChannelId::Temperature);
//! link.shutdown()?;
//! # Ok::<(), catra_link::error::Error>(())
//! ```

pub mod liveness;
pub mod state;
pub mod stats;
mod worker;

pub use liveness::LivenessMonitor;
pub use state::{StateCell, Transition};
pub use stats::{IngestCounters, IngestStats};

use crate::config::Config;
use crate::core::types::{ChannelId, ConnectionState, ControlEvent, Endpoint, Sample, Target};
use crate::error::{Error, Result};
use crate::protocol::RecordParser;
use crate::store::{ClearScope, SampleStore};
use crate::transport::{Connector, PortScanner, SystemConnector, SystemScanner};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use worker::{Command, Worker};

/// Queue depth for state events awaiting the collaborator
const EVENT_QUEUE_DEPTH: usize = 256;

/// Queue depth for control markers awaiting the collaborator
const CONTROL_QUEUE_DEPTH: usize = 64;

/// State notifications from the worker
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The connection state changed
    StateChanged(Transition),
    /// A transport was opened to this endpoint
    Connected(Endpoint),
}

/// State shared between the worker and the handle
pub(crate) struct Shared {
    pub(crate) store: Arc<SampleStore>,
    pub(crate) state: StateCell,
    pub(crate) liveness: LivenessMonitor,
    pub(crate) stats: IngestStats,
    pub(crate) shutdown: AtomicBool,
}

/// Handle to a running ingestion worker
pub struct Link {
    shared: Arc<Shared>,
    commands: Sender<Command>,
    events: Receiver<LinkEvent>,
    controls: Receiver<ControlEvent>,
    stale_timeout: Duration,
    handle: Option<JoinHandle<()>>,
}

impl Link {
    /// Spawn the worker in `Idle`
    ///
    /// Nothing is opened until [`request_connect`](Self::request_connect).
    pub fn spawn<C, S>(
        config: &Config,
        store: Arc<SampleStore>,
        connector: C,
        scanner: S,
    ) -> Result<Self>
    where
        C: Connector + 'static,
        S: PortScanner + 'static,
    {
        let parser = RecordParser::catra()?;
        Self::spawn_with_parser(config, store, parser, Box::new(connector), Box::new(scanner))
    }

    /// Spawn with real serial/TCP transports and OS port enumeration
    pub fn with_system(config: &Config, store: Arc<SampleStore>) -> Result<Self> {
        let connector = SystemConnector::new(
            config.timing.poll_interval(),
            Duration::from_millis(config.link.serial_settle_ms),
        );
        Self::spawn(config, store, connector, SystemScanner)
    }

    /// Spawn with a custom extractor registry
    pub fn spawn_with_parser(
        config: &Config,
        store: Arc<SampleStore>,
        parser: RecordParser,
        connector: Box<dyn Connector>,
        scanner: Box<dyn PortScanner>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            store,
            state: StateCell::new(),
            liveness: LivenessMonitor::new(),
            stats: IngestStats::default(),
            shutdown: AtomicBool::new(false),
        });
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = bounded(EVENT_QUEUE_DEPTH);
        let (control_tx, control_rx) = bounded(CONTROL_QUEUE_DEPTH);

        let worker = Worker::new(
            Arc::clone(&shared),
            config.link.clone(),
            config.timing.clone(),
            parser,
            connector,
            scanner,
            command_rx,
            event_tx,
            control_tx,
        );

        let handle = thread::Builder::new()
            .name("catra-link".to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::Other(format!("Failed to spawn link worker: {}", e)))?;

        Ok(Self {
            shared,
            commands: command_tx,
            events: event_rx,
            controls: control_rx,
            stale_timeout: config.timing.stale_timeout(),
            handle: Some(handle),
        })
    }

    /// The store this link writes into
    pub fn store(&self) -> &Arc<SampleStore> {
        &self.shared.store
    }

    /// Point-in-time copy of a channel
    pub fn snapshot(&self, channel: ChannelId) -> Vec<Sample> {
        self.shared.store.snapshot(channel)
    }

    /// Buffered positions as (x, y) pairs
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.shared.store.positions()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Empty one channel or all of them
    pub fn clear(&self, scope: impl Into<ClearScope>) {
        self.shared.store.clear(scope);
    }

    /// Drop any current connection and connect to `target`
    pub fn request_connect(&self, target: Target) -> Result<()> {
        self.command(Command::Connect(target))
    }

    /// Drop any current connection and go idle
    pub fn request_disconnect(&self) -> Result<()> {
        self.command(Command::Disconnect)
    }

    /// Write one line to the device (a trailing newline is added if missing)
    pub fn send(&self, line: &str) -> Result<()> {
        let mut data = line.as_bytes().to_vec();
        if data.last() != Some(&b'\n') {
            data.push(b'\n');
        }
        self.command(Command::Send(data))
    }

    /// Connected, but nothing accepted within the stale timeout
    pub fn is_stale(&self) -> bool {
        match self.state() {
            ConnectionState::Stale => true,
            ConnectionState::Streaming => self.shared.liveness.is_stale(self.stale_timeout),
            _ => false,
        }
    }

    /// Time since the last accepted record
    pub fn last_update_age(&self) -> Duration {
        self.shared.liveness.elapsed()
    }

    /// State change and connect notifications
    ///
    /// Bounded; if nobody drains it, new events are dropped once it is full.
    pub fn events(&self) -> Receiver<LinkEvent> {
        self.events.clone()
    }

    /// Control markers from the record stream (`MAP_COMPLETE <name>`)
    ///
    /// Separate from [`events`](Self::events), so undrained state events
    /// never cost a marker.
    pub fn controls(&self) -> Receiver<ControlEvent> {
        self.controls.clone()
    }

    pub fn stats(&self) -> IngestCounters {
        self.shared.stats.snapshot()
    }

    /// Stop the worker, close the transport and wait for the thread
    ///
    /// Samples already in the store are kept.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        log::info!("Stopping link worker");
        self.shared.shutdown.store(true, Ordering::Relaxed);
        // Wakes a worker blocked waiting for commands
        let _ = self.commands.send(Command::Shutdown);
        handle.join().map_err(|_| Error::ThreadPanic)
    }

    fn command(&self, command: Command) -> Result<()> {
        if self.handle.is_none() {
            return Err(Error::WorkerStopped);
        }
        self.commands.send(command).map_err(|_| Error::WorkerStopped)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Link worker did not stop cleanly: {}", e);
        }
    }
}
