//! Bounded sample store
//!
//! One [`SampleRing`] per channel, each behind its own `parking_lot::RwLock`:
//!
//! - **Writer**: the ingestion worker (or the synthetic producer) appends
//! - **Readers**: UI refresh, capture/export, tests take snapshots
//!
//! # Guarantees
//!
//! - An append is atomic. A position is stored as one `(x, y)` element, so no
//!   snapshot can observe one coordinate without the other.
//! - A snapshot is a copy taken under the read lock; later appends do not
//!   change it.
//! - Channels are independent: clearing or overflowing one never touches
//!   another.
//! - Overflow is silent FIFO eviction.
//! - A value whose shape does not fit the channel (a pair on a scalar
//!   channel, a scalar on the position channel) is rejected.
//! - [`SampleStore::take`] drains a channel under one write lock, so every
//!   sample ends up either in the returned batch or in the ring.
//!
//! Sequence numbers come from a single store-wide counter, so they are
//! monotonic across channels in append order.

pub mod ring;

pub use ring::SampleRing;

use crate::config::BufferConfig;
use crate::core::types::{ChannelId, Sample, SampleValue};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which channels a clear applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    Channel(ChannelId),
    All,
}

impl From<ChannelId> for ClearScope {
    fn from(channel: ChannelId) -> Self {
        ClearScope::Channel(channel)
    }
}

/// Thread-safe per-channel ring buffers
#[derive(Debug)]
pub struct SampleStore {
    channels: [RwLock<SampleRing<Sample>>; 5],
    next_seq: AtomicU64,
}

impl SampleStore {
    /// Create a store with capacities from configuration
    pub fn new(buffers: &BufferConfig) -> Self {
        Self {
            channels: ChannelId::ALL.map(|ch| RwLock::new(SampleRing::new(buffers.capacity(ch)))),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Create a store where every channel has the same capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(&BufferConfig {
            position: capacity,
            temperature: capacity,
            humidity: capacity,
            pressure: capacity,
            raw: capacity,
        })
    }

    #[inline]
    fn ring(&self, channel: ChannelId) -> &RwLock<SampleRing<Sample>> {
        &self.channels[channel.index()]
    }

    /// Append a value at the tail of a channel, evicting the oldest if full
    ///
    /// Returns the sequence number assigned to the sample, or
    /// [`Error::ShapeMismatch`] if the value's shape does not fit the channel.
    pub fn append(&self, channel: ChannelId, value: SampleValue) -> Result<u64> {
        if value.as_point().is_some() != channel.is_paired() {
            return Err(Error::ShapeMismatch(channel));
        }
        Ok(self.push(channel, value))
    }

    /// Append an (x, y) pair to the position channel
    pub fn append_position(&self, x: f64, y: f64) -> u64 {
        self.push(ChannelId::Position, SampleValue::Point { x, y })
    }

    fn push(&self, channel: ChannelId, value: SampleValue) -> u64 {
        let mut ring = self.ring(channel).write();
        // Taken under the channel lock so per-channel order matches seq order
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        ring.push(Sample {
            channel,
            value,
            seq,
        });
        seq
    }

    /// Point-in-time copy of a channel, oldest first
    pub fn snapshot(&self, channel: ChannelId) -> Vec<Sample> {
        self.ring(channel).read().to_vec()
    }

    /// Buffered positions as (x, y) pairs, oldest first
    pub fn positions(&self) -> Vec<(f64, f64)> {
        let ring = self.ring(ChannelId::Position).read();
        ring.iter().filter_map(|s| s.value.as_point()).collect()
    }

    /// Buffered positions split into x and y columns from one snapshot
    ///
    /// Both columns always have the same length.
    pub fn position_columns(&self) -> (Vec<f64>, Vec<f64>) {
        self.positions().into_iter().unzip()
    }

    /// Buffered scalar values of a channel, oldest first
    pub fn values(&self, channel: ChannelId) -> Vec<f64> {
        let ring = self.ring(channel).read();
        ring.iter().filter_map(|s| s.value.as_f64()).collect()
    }

    /// Most recent sample of a channel
    pub fn latest(&self, channel: ChannelId) -> Option<Sample> {
        self.ring(channel).read().last().copied()
    }

    /// Arithmetic mean of a scalar channel (`None` when empty or paired)
    pub fn mean(&self, channel: ChannelId) -> Option<f64> {
        mean_of(self.ring(channel).read().iter())
    }

    pub fn len(&self, channel: ChannelId) -> usize {
        self.ring(channel).read().len()
    }

    pub fn is_empty(&self, channel: ChannelId) -> bool {
        self.ring(channel).read().is_empty()
    }

    pub fn capacity(&self, channel: ChannelId) -> usize {
        self.ring(channel).read().capacity()
    }

    /// Empty one channel or all of them
    pub fn clear(&self, scope: impl Into<ClearScope>) {
        match scope.into() {
            ClearScope::Channel(channel) => self.ring(channel).write().clear(),
            ClearScope::All => {
                for ring in &self.channels {
                    ring.write().clear();
                }
            }
        }
    }

    /// Empty every channel
    pub fn clear_all(&self) {
        self.clear(ClearScope::All);
    }

    /// Remove and return a channel's samples, oldest first
    ///
    /// Appends racing with the call land either in the batch or in the
    /// emptied ring, never nowhere.
    pub fn take(&self, channel: ChannelId) -> Vec<Sample> {
        self.ring(channel).write().take()
    }

    /// Put a batch from [`take`](Self::take) back in front of anything
    /// appended since
    ///
    /// The newest `capacity` samples of the combined sequence are kept.
    pub fn restore(&self, channel: ChannelId, older: Vec<Sample>) {
        if older.is_empty() {
            return;
        }
        let mut ring = self.ring(channel).write();
        let newer = ring.take();
        for sample in older.into_iter().chain(newer) {
            ring.push(sample);
        }
    }
}

/// Arithmetic mean of the scalar samples in `samples`
pub fn mean_of<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Option<f64> {
    let (sum, count) = samples
        .into_iter()
        .filter_map(|s| s.value.as_f64())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}
