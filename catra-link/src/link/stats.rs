//! Ingestion counters
//!
//! Written by the worker with relaxed atomics, read by anyone via
//! [`IngestStats::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters
#[derive(Debug, Default)]
pub struct IngestStats {
    bytes: AtomicU64,
    records: AtomicU64,
    unrecognized: AtomicU64,
    field_errors: AtomicU64,
    overflows: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounters {
    /// Bytes received from the transport
    pub bytes: u64,
    /// Delimited records decoded (including empty ones)
    pub records: u64,
    /// Non-empty records no extractor matched
    pub unrecognized: u64,
    /// Matched fields dropped for a bad number
    pub field_errors: u64,
    /// Partial records discarded for exceeding the pending limit
    pub overflows: u64,
}

impl IngestStats {
    #[inline]
    pub(crate) fn add_bytes(&self, n: usize) {
        self.bytes.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_record(&self) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_unrecognized(&self) {
        self.unrecognized.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_field_errors(&self, n: usize) {
        self.field_errors.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestCounters {
        IngestCounters {
            bytes: self.bytes.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            field_errors: self.field_errors.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
        }
    }
}
