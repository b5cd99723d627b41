//! catra-link - Telemetry ingestion for the C.A.T.R.A. sensor unit
//!
//! Reads the unit's line protocol over serial or TCP, parses each record into
//! typed channel samples and keeps the most recent samples per channel in
//! bounded ring buffers that any thread can snapshot.
//!
//! ## Pipeline
//!
//! ```text
//! Transport ─▶ LineDecoder ─▶ RecordParser ─▶ SampleStore ◀── snapshot / clear
//!                                  │
//!                                  └─▶ ControlEvent ─▶ Link::controls ─▶ export
//! ```
//!
//! The [`link::Link`] worker drives everything left of the store on its own
//! thread; readers only ever touch the store and the state cell.

pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod link;
pub mod producer;
pub mod protocol;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use crate::core::types::{
    ChannelId, ConnectionState, ControlEvent, Endpoint, Sample, SampleValue, Target,
};
pub use error::{Error, Result};
pub use link::{Link, LinkEvent};
pub use store::SampleStore;
