//! Liveness monitor
//!
//! Holds the time of the last accepted record as microseconds since the
//! monitor was created, in a single atomic. The ingestion worker is the only
//! writer; any thread may ask whether the link has gone quiet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Last-update timestamp with staleness check
#[derive(Debug)]
pub struct LivenessMonitor {
    epoch: Instant,
    last_update_us: AtomicU64,
}

impl LivenessMonitor {
    /// New monitor, touched at creation
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_update_us: AtomicU64::new(0),
        }
    }

    /// Record "now" as the last update
    #[inline]
    pub fn touch(&self) {
        let now = self.epoch.elapsed().as_micros() as u64;
        self.last_update_us.store(now, Ordering::Release);
    }

    /// Time since the last update
    pub fn elapsed(&self) -> Duration {
        let last = Duration::from_micros(self.last_update_us.load(Ordering::Acquire));
        self.epoch.elapsed().saturating_sub(last)
    }

    /// True when nothing was accepted for longer than `timeout`
    #[inline]
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.elapsed() > timeout
    }
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new()
    }
}
