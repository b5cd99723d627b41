//! catra-link - Headless telemetry daemon for the C.A.T.R.A. sensor unit
//!
//! Connects to the unit (serial auto-discovery or TCP), keeps the latest
//! samples in memory, writes a JSON map capture whenever the unit reports
//! `MAP_COMPLETE <name>`, and logs a status line periodically.
//!
//! When the link fails and `fallback.synthetic` is set, synthetic data is
//! written to the store instead, so downstream readers keep working.
//!
//! Usage:
//!   catra-link --config catra.toml
//!   catra-link --transport tcp --endpoint 192.168.137.97:8888
//!   RUST_LOG=debug catra-link --synthetic

use catra_link::config::{Config, TransportKind};
use catra_link::core::types::{ChannelId, ConnectionState, ControlEvent};
use catra_link::error::{Error, Result};
use catra_link::export::capture_and_clear;
use catra_link::link::{Link, LinkEvent};
use catra_link::producer::{FallbackPolicy, ProducerKind, SyntheticProducer};
use catra_link::store::SampleStore;
use clap::Parser;
use crossbeam_channel::select;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Event loop wake-up interval
const EVENT_POLL: Duration = Duration::from_millis(200);

/// C.A.T.R.A. telemetry link daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint override: AUTO, a serial device path, or host:port
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Transport override
    #[arg(short, long, value_enum)]
    transport: Option<TransportKind>,

    /// Substitute synthetic data when the link fails
    #[arg(long)]
    synthetic: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Seconds between status lines (0 = off)
    #[arg(long, default_value = "5")]
    status_interval: u64,
}

/// Producers owned by the daemon
struct Daemon {
    config: Config,
    store: Arc<SampleStore>,
    policy: FallbackPolicy,
    synthetic: Option<SyntheticProducer>,
}

impl Daemon {
    fn handle(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::StateChanged(transition) => self.on_state(transition.to),
            LinkEvent::Connected(endpoint) => log::info!("Streaming from {}", endpoint),
        }
    }

    fn control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::MapComplete(name) => self.capture(&name),
        }
    }

    fn on_state(&mut self, state: ConnectionState) {
        match self.policy.select(state) {
            ProducerKind::Synthetic if self.synthetic.is_none() => {
                log::warn!("Link failed, substituting synthetic data");
                match SyntheticProducer::spawn(Arc::clone(&self.store), &self.config.fallback) {
                    Ok(producer) => self.synthetic = Some(producer),
                    Err(e) => log::error!("Could not start synthetic producer: {}", e),
                }
            }
            ProducerKind::RealTransport if state == ConnectionState::Streaming => {
                if let Some(mut producer) = self.synthetic.take() {
                    log::info!("Real link is back, stopping synthetic data");
                    if let Err(e) = producer.stop() {
                        log::error!("Synthetic producer did not stop cleanly: {}", e);
                    }
                }
            }
            ProducerKind::RealTransport if state == ConnectionState::Failed => {
                log::error!("Link failed and no synthetic fallback is enabled");
            }
            _ => {}
        }
    }

    fn capture(&self, name: &str) {
        log::info!("Map complete: {}", name);
        match capture_and_clear(&self.store, &self.config.export.directory, Some(name)) {
            Ok(path) => log::info!("Map '{}' written to {}", name, path.display()),
            Err(Error::EmptyCapture) => {}
            Err(e) => log::error!("Failed to save map '{}': {}", name, e),
        }
    }

    fn stop(&mut self) -> Result<()> {
        match self.synthetic.take() {
            Some(mut producer) => producer.stop(),
            None => Ok(()),
        }
    }
}

fn log_status(link: &Link) {
    let store = link.store();
    let stats = link.stats();
    log::info!(
        "state={} stale={} age={:.1}s points={} temp={:?} hum={:?} pres={:?} records={} unrecognized={} field_errors={}",
        link.state(),
        link.is_stale(),
        link.last_update_age().as_secs_f64(),
        store.len(ChannelId::Position),
        store.latest(ChannelId::Temperature).and_then(|s| s.value.as_f64()),
        store.latest(ChannelId::Humidity).and_then(|s| s.value.as_f64()),
        store.latest(ChannelId::Pressure).and_then(|s| s.value.as_f64()),
        stats.records,
        stats.unrecognized,
        stats.field_errors,
    );
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(transport) = args.transport {
        config.link.transport = transport;
    }
    if let Some(endpoint) = &args.endpoint {
        config.link.endpoint = endpoint.clone();
    }
    if args.synthetic {
        config.fallback.synthetic = true;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    if let Some(path) = &args.write_config {
        config.to_file(path)?;
        log::info!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    log::info!("catra-link v{} starting...", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => log::info!("Using config: {}", path.display()),
        None => log::info!("Using built-in defaults"),
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let store = Arc::new(SampleStore::new(&config.buffers));
    let mut link = Link::with_system(&config, Arc::clone(&store))?;
    let events = link.events();
    let controls = link.controls();
    link.request_connect(config.link.target()?)?;

    let mut daemon = Daemon {
        policy: FallbackPolicy::from_config(&config.fallback),
        store,
        synthetic: None,
        config,
    };

    let status_interval = Duration::from_secs(args.status_interval);
    let mut last_status = Instant::now();

    while running.load(Ordering::Relaxed) {
        let worker_alive = select! {
            recv(controls) -> control => control.map(|c| daemon.control(c)).is_ok(),
            recv(events) -> event => event.map(|e| daemon.handle(e)).is_ok(),
            default(EVENT_POLL) => true,
        };
        if !worker_alive {
            log::error!("Link worker exited unexpectedly");
            break;
        }

        if !status_interval.is_zero() && last_status.elapsed() >= status_interval {
            log_status(&link);
            last_status = Instant::now();
        }
    }

    log::info!("Shutting down...");
    daemon.stop()?;
    link.shutdown()?;
    log::info!("catra-link stopped");
    Ok(())
}
