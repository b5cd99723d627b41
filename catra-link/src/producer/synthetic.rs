//! Synthetic telemetry producer
//!
//! Generates plausible frames so the rest of the pipeline keeps working
//! without hardware. Positions are uniform over the sweep square; scalar
//! channels wander inside their band with Gaussian steps.

use crate::config::FallbackConfig;
use crate::core::types::{ChannelId, SampleValue};
use crate::error::{Error, Result};
use crate::store::SampleStore;
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, StandardNormal, Uniform};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Half-width of the square positions are drawn from (mm)
const POSITION_RANGE: f64 = 1000.0;
const TEMPERATURE_BAND: (f64, f64) = (20.0, 30.0);
const HUMIDITY_BAND: (f64, f64) = (50.0, 70.0);
const PRESSURE_BAND: (f64, f64) = (90.0, 110.0);
/// Step standard deviation as a fraction of the band width
const WALK_STEP: f64 = 0.05;

/// One synthetic sample set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticFrame {
    pub x: f64,
    pub y: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

/// Deterministic (when seeded) frame generator
pub struct SyntheticSource {
    rng: SmallRng,
    position: Uniform<f64>,
    temperature: f64,
    humidity: f64,
    pressure: f64,
}

impl SyntheticSource {
    /// Create a generator
    ///
    /// If seed is 0, uses random entropy.
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self {
            rng,
            position: Uniform::new_inclusive(-POSITION_RANGE, POSITION_RANGE),
            temperature: midpoint(TEMPERATURE_BAND),
            humidity: midpoint(HUMIDITY_BAND),
            pressure: midpoint(PRESSURE_BAND),
        }
    }

    pub fn next_frame(&mut self) -> SyntheticFrame {
        let x = self.position.sample(&mut self.rng);
        let y = self.position.sample(&mut self.rng);
        self.temperature = self.walk(self.temperature, TEMPERATURE_BAND);
        self.humidity = self.walk(self.humidity, HUMIDITY_BAND);
        self.pressure = self.walk(self.pressure, PRESSURE_BAND);
        SyntheticFrame {
            x,
            y,
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
        }
    }

    fn walk(&mut self, value: f64, (lo, hi): (f64, f64)) -> f64 {
        let n: f64 = self.rng.sample(StandardNormal);
        (value + n * (hi - lo) * WALK_STEP).clamp(lo, hi)
    }
}

fn midpoint((lo, hi): (f64, f64)) -> f64 {
    (lo + hi) / 2.0
}

/// Append one frame to the store
pub fn write_frame(store: &SampleStore, frame: &SyntheticFrame) -> Result<()> {
    store.append_position(frame.x, frame.y);
    store.append(ChannelId::Temperature, SampleValue::Scalar(frame.temperature))?;
    store.append(ChannelId::Humidity, SampleValue::Scalar(frame.humidity))?;
    store.append(ChannelId::Pressure, SampleValue::Scalar(frame.pressure))?;
    Ok(())
}

/// Background thread appending synthetic frames at a fixed interval
pub struct SyntheticProducer {
    shutdown: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl SyntheticProducer {
    pub fn spawn(store: Arc<SampleStore>, config: &FallbackConfig) -> Result<Self> {
        if config.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "fallback.interval_ms must be > 0".to_string(),
            ));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));
        let interval = Duration::from_millis(config.interval_ms);
        let mut source = SyntheticSource::new(config.seed);

        let thread_shutdown = Arc::clone(&shutdown);
        let thread_frames = Arc::clone(&frames);
        let handle = thread::Builder::new()
            .name("catra-synthetic".to_string())
            .spawn(move || {
                log::info!("Synthetic producer started ({:?} interval)", interval);
                while !thread_shutdown.load(Ordering::Relaxed) {
                    match write_frame(&store, &source.next_frame()) {
                        Ok(()) => {
                            thread_frames.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => log::warn!("Synthetic frame dropped: {}", e),
                    }
                    thread::sleep(interval);
                }
                log::info!("Synthetic producer exiting");
            })
            .map_err(|e| Error::Other(format!("Failed to spawn synthetic producer: {}", e)))?;

        Ok(Self {
            shutdown,
            frames,
            handle: Some(handle),
        })
    }

    /// Frames written so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.shutdown.store(true, Ordering::Relaxed);
        handle.join().map_err(|_| Error::ThreadPanic)
    }
}

impl Drop for SyntheticProducer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
