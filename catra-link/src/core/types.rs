//! Core data types for telemetry samples, connection state, and endpoints.
//!
//! Key types:
//! - [`Sample`]: One immutable observation on a [`ChannelId`], stamped with a sequence number
//! - [`ConnectionState`]: The link's lifecycle state, owned by the ingestion worker
//! - [`Endpoint`] / [`Target`]: Where the link connects to
//! - [`ControlEvent`]: Out-of-band markers forwarded to the capture/export layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Telemetry channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    /// Lidar point, always an (x, y) pair in millimetres
    Position,
    /// Temperature in degrees Celsius
    Temperature,
    /// Relative humidity in percent
    Humidity,
    /// Pressure in hPa
    Pressure,
    /// Raw integer ADC reading
    Raw,
}

impl ChannelId {
    /// All channels in store order
    pub const ALL: [ChannelId; 5] = [
        ChannelId::Position,
        ChannelId::Temperature,
        ChannelId::Humidity,
        ChannelId::Pressure,
        ChannelId::Raw,
    ];

    /// Dense index used by the store's channel table
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            ChannelId::Position => 0,
            ChannelId::Temperature => 1,
            ChannelId::Humidity => 2,
            ChannelId::Pressure => 3,
            ChannelId::Raw => 4,
        }
    }

    /// Lowercase channel name (matches config keys)
    pub const fn name(self) -> &'static str {
        match self {
            ChannelId::Position => "position",
            ChannelId::Temperature => "temperature",
            ChannelId::Humidity => "humidity",
            ChannelId::Pressure => "pressure",
            ChannelId::Raw => "raw",
        }
    }

    /// Whether samples on this channel carry an (x, y) pair
    #[inline]
    pub const fn is_paired(self) -> bool {
        matches!(self, ChannelId::Position)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sample payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SampleValue {
    /// Floating-point reading
    Scalar(f64),
    /// Integer reading (raw counts)
    Integer(i64),
    /// Coordinate pair, written and read as one unit
    Point { x: f64, y: f64 },
}

impl SampleValue {
    /// Scalar view of the value (`None` for points)
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            SampleValue::Scalar(v) => Some(v),
            SampleValue::Integer(v) => Some(v as f64),
            SampleValue::Point { .. } => None,
        }
    }

    /// Pair view of the value (`None` for scalars)
    pub fn as_point(&self) -> Option<(f64, f64)> {
        match *self {
            SampleValue::Point { x, y } => Some((x, y)),
            _ => None,
        }
    }
}

/// A single immutable observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub channel: ChannelId,
    pub value: SampleValue,
    /// Monotonic across the whole store, assigned at ingestion
    pub seq: u64,
}

/// Link lifecycle state
///
/// ```text
/// Idle ─▶ Discovering ─▶ Connecting ─▶ Streaming ◀─▶ Stale
///              │              │             │          │
///              ▼              ▼             ▼          ▼
///            Failed         Failed      Disconnected ◀─┘
///                                           │
///                                           └─(backoff)─▶ Connecting
/// ```
///
/// Every state may return to `Idle` on disconnect or shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Discovering,
    Connecting,
    Streaming,
    Stale,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// True while a transport handle is open
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Streaming | ConnectionState::Stale)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Stale => "stale",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Concrete transport endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Serial device path (e.g. `/dev/ttyUSB0`, `COM3`) at a baud rate
    Serial { path: String, baud_rate: u32 },
    /// TCP `host:port`
    Tcp { addr: String },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Serial { path, baud_rate } => write!(f, "serial://{}@{}", path, baud_rate),
            Endpoint::Tcp { addr } => write!(f, "tcp://{}", addr),
        }
    }
}

/// What a connect request points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Discover an endpoint (serial keyword scan, else configured fallback)
    Auto,
    /// Use this endpoint as-is
    Endpoint(Endpoint),
}

/// Out-of-band marker carried in the record stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlEvent {
    /// `MAP_COMPLETE <name>`: the unit finished a sweep; capture it under `name`
    MapComplete(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_index_is_dense() {
        for (i, ch) in ChannelId::ALL.iter().enumerate() {
            assert_eq!(ch.index(), i);
        }
    }

    #[test]
    fn test_sample_value_views() {
        assert_eq!(SampleValue::Scalar(1.5).as_f64(), Some(1.5));
        assert_eq!(SampleValue::Integer(42).as_f64(), Some(42.0));
        assert_eq!(SampleValue::Point { x: 1.0, y: 2.0 }.as_f64(), None);
        assert_eq!(
            SampleValue::Point { x: 1.0, y: 2.0 }.as_point(),
            Some((1.0, 2.0))
        );
    }

    #[test]
    fn test_endpoint_display() {
        let serial = Endpoint::Serial {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
        };
        assert_eq!(serial.to_string(), "serial:///dev/ttyUSB0@9600");
        let tcp = Endpoint::Tcp {
            addr: "192.168.137.97:8888".to_string(),
        };
        assert_eq!(tcp.to_string(), "tcp://192.168.137.97:8888");
    }
}
