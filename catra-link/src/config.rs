//! Configuration for catra-link
//!
//! Loads configuration from a TOML file. Every section has defaults matching the
//! serial deployment of the C.A.T.R.A. unit, so a partial file is valid.

use crate::core::types::{ChannelId, Endpoint, Target};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Keyword that requests endpoint discovery instead of a fixed endpoint
pub const AUTO_ENDPOINT: &str = "AUTO";

/// Serial fallback when discovery finds no matching port
pub const DEFAULT_SERIAL_FALLBACK: &str = "COM3";

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub timing: TimingConfig,
    pub buffers: BufferConfig,
    pub fallback: FallbackConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// Transport kind used for `AUTO` resolution and plain endpoint strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Serial,
    Tcp,
}

/// Endpoint selection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Transport kind
    pub transport: TransportKind,
    /// `AUTO`, a serial device path, or a TCP `host:port`
    pub endpoint: String,
    /// Used when `AUTO` discovery finds nothing (or always, for TCP)
    ///
    /// Unset means the transport's default: `COM3` for serial, none for TCP.
    /// An empty string disables the fallback.
    pub fallback_endpoint: Option<String>,
    /// Case-insensitive substrings matched against port descriptions
    pub keywords: Vec<String>,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Delay after opening a serial port before streaming
    ///
    /// Many USB boards reset when the port is opened and print boot noise.
    pub serial_settle_ms: u64,
}

/// Receive-loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// No accepted record for this long while streaming flips the link to stale
    pub stale_timeout_ms: u64,
    /// Upper bound on a single blocking receive
    pub poll_interval_ms: u64,
    /// Upper bound on a connect handshake
    pub connect_timeout_ms: u64,
    /// Delay before reconnecting after the transport dropped
    pub reconnect_backoff_ms: u64,
    /// Automatic reconnect attempts before giving up (0 = unlimited)
    pub max_reconnect_attempts: u32,
    /// Unterminated partial record larger than this is discarded
    pub max_pending_bytes: usize,
}

/// Per-channel ring capacities
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    pub position: usize,
    pub temperature: usize,
    pub humidity: usize,
    pub pressure: usize,
    pub raw: usize,
}

/// Synthetic producer substitution policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Start the synthetic producer when the link fails
    pub synthetic: bool,
    /// Interval between synthetic samples
    pub interval_ms: u64,
    /// RNG seed (0 = entropy)
    pub seed: u64,
}

/// Map capture output
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory receiving `<name>.json` captures
    pub directory: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Serial,
            endpoint: AUTO_ENDPOINT.to_string(),
            fallback_endpoint: None,
            keywords: ["arduino", "usb-serial", "ch340", "ft232r", "usbmodem", "cp210x"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            baud_rate: 9600,
            serial_settle_ms: 1500,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stale_timeout_ms: 3000,
            poll_interval_ms: 50,
            connect_timeout_ms: 2000,
            reconnect_backoff_ms: 2000,
            max_reconnect_attempts: 0,
            max_pending_bytes: 64 * 1024,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            position: 3000,
            temperature: 200,
            humidity: 200,
            pressure: 200,
            raw: 200,
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            synthetic: false,
            interval_ms: 50,
            seed: 0,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("catra_maps"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LinkConfig {
    /// Interpret an endpoint string for the configured transport
    pub fn parse_endpoint(&self, raw: &str) -> Result<Endpoint> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidEndpoint("empty endpoint".to_string()));
        }
        match self.transport {
            TransportKind::Serial => Ok(Endpoint::Serial {
                path: raw.to_string(),
                baud_rate: self.baud_rate,
            }),
            TransportKind::Tcp => {
                let valid = raw
                    .rsplit_once(':')
                    .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
                if !valid {
                    return Err(Error::InvalidEndpoint(format!(
                        "expected host:port, got '{}'",
                        raw
                    )));
                }
                Ok(Endpoint::Tcp {
                    addr: raw.to_string(),
                })
            }
        }
    }

    /// Connect target described by `endpoint`
    pub fn target(&self) -> Result<Target> {
        if self.endpoint.trim().eq_ignore_ascii_case(AUTO_ENDPOINT) {
            Ok(Target::Auto)
        } else {
            self.parse_endpoint(&self.endpoint).map(Target::Endpoint)
        }
    }

    /// Fallback endpoint string in effect for the configured transport
    pub fn fallback_raw(&self) -> Option<&str> {
        match self.fallback_endpoint.as_deref() {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw),
            None => match self.transport {
                TransportKind::Serial => Some(DEFAULT_SERIAL_FALLBACK),
                TransportKind::Tcp => None,
            },
        }
    }

    /// Parsed fallback endpoint, if any
    pub fn fallback(&self) -> Result<Option<Endpoint>> {
        self.fallback_raw()
            .map(|raw| self.parse_endpoint(raw))
            .transpose()
    }
}

impl TimingConfig {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

impl BufferConfig {
    /// Capacity configured for a channel
    pub fn capacity(&self, channel: ChannelId) -> usize {
        match channel {
            ChannelId::Position => self.position,
            ChannelId::Temperature => self.temperature,
            ChannelId::Humidity => self.humidity,
            ChannelId::Pressure => self.pressure,
            ChannelId::Raw => self.raw,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use catra_link::config::Config;
    ///
    /// let config = Config::from_file("catra.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the link cannot run with
    pub fn validate(&self) -> Result<()> {
        for channel in ChannelId::ALL {
            if self.buffers.capacity(channel) == 0 {
                return Err(Error::InvalidConfig(format!(
                    "buffers.{} must be at least 1",
                    channel
                )));
            }
        }

        let timing = [
            ("stale_timeout_ms", self.timing.stale_timeout_ms),
            ("poll_interval_ms", self.timing.poll_interval_ms),
            ("connect_timeout_ms", self.timing.connect_timeout_ms),
        ];
        for (name, value) in timing {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("timing.{} must be > 0", name)));
            }
        }

        if self.timing.max_pending_bytes == 0 {
            return Err(Error::InvalidConfig(
                "timing.max_pending_bytes must be > 0".to_string(),
            ));
        }
        if self.link.baud_rate == 0 {
            return Err(Error::InvalidConfig("link.baud_rate must be > 0".to_string()));
        }
        if self.fallback.synthetic && self.fallback.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "fallback.interval_ms must be > 0".to_string(),
            ));
        }

        // Fail early on a malformed endpoint rather than at connect time
        self.link.target()?;
        self.link.fallback()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.link.transport, TransportKind::Serial);
        assert_eq!(config.link.endpoint, "AUTO");
        assert_eq!(config.link.baud_rate, 9600);
        assert_eq!(config.buffers.position, 3000);
        assert_eq!(config.buffers.temperature, 200);
        assert_eq!(config.timing.stale_timeout_ms, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[link]"));
        assert!(toml_string.contains("[timing]"));
        assert!(toml_string.contains("[buffers]"));
        assert!(toml_string.contains("[fallback]"));
        assert!(toml_string.contains("[export]"));
        assert!(toml_string.contains("[logging]"));

        let parsed = Config::from_toml(&toml_string).unwrap();
        assert_eq!(parsed.buffers.position, config.buffers.position);
        assert_eq!(parsed.link.keywords, config.link.keywords);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [link]
            transport = "tcp"
            endpoint = "192.168.137.97:8888"

            [buffers]
            position = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.link.transport, TransportKind::Tcp);
        assert_eq!(config.link.fallback().unwrap(), None);
        assert_eq!(config.buffers.position, 100);
        assert_eq!(config.buffers.humidity, 200);
        assert_eq!(config.timing.poll_interval_ms, 50);
        assert_eq!(
            config.link.target().unwrap(),
            Target::Endpoint(Endpoint::Tcp {
                addr: "192.168.137.97:8888".to_string()
            })
        );
    }

    #[test]
    fn test_fallback_defaults_per_transport() {
        let serial = LinkConfig::default();
        assert_eq!(
            serial.fallback().unwrap(),
            Some(Endpoint::Serial {
                path: "COM3".to_string(),
                baud_rate: 9600,
            })
        );

        let tcp = LinkConfig {
            transport: TransportKind::Tcp,
            fallback_endpoint: Some("10.0.0.2:8888".to_string()),
            ..LinkConfig::default()
        };
        assert_eq!(
            tcp.fallback().unwrap(),
            Some(Endpoint::Tcp {
                addr: "10.0.0.2:8888".to_string()
            })
        );
    }

    #[test]
    fn test_empty_fallback_disables() {
        let config = Config::from_toml("[link]\nfallback_endpoint = \"\"\n").unwrap();
        assert_eq!(config.link.fallback().unwrap(), None);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = Config::from_toml("[buffers]\nraw = 0\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::from_toml("[timing]\npoll_interval_ms = 0\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_tcp_endpoint_rejected() {
        let result = Config::from_toml(
            r#"
            [link]
            transport = "tcp"
            endpoint = "no-port-here"
            fallback_endpoint = "10.0.0.1:8888"
            "#,
        );
        assert!(matches!(result, Err(Error::InvalidEndpoint(_))));
    }

    #[test]
    fn test_auto_is_case_insensitive() {
        let link = LinkConfig {
            endpoint: "auto".to_string(),
            ..LinkConfig::default()
        };
        assert_eq!(link.target().unwrap(), Target::Auto);
    }

    #[test]
    fn test_serial_endpoint_carries_baud() {
        let link = LinkConfig {
            baud_rate: 115200,
            ..LinkConfig::default()
        };
        assert_eq!(
            link.parse_endpoint("/dev/ttyACM0").unwrap(),
            Endpoint::Serial {
                path: "/dev/ttyACM0".to_string(),
                baud_rate: 115200
            }
        );
    }

    #[test]
    fn test_sample_file_matches_defaults() {
        let sample = Config::from_toml(include_str!("../catra.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(sample.link.keywords, defaults.link.keywords);
        assert_eq!(sample.link.fallback().unwrap(), defaults.link.fallback().unwrap());
        assert_eq!(sample.timing.max_pending_bytes, defaults.timing.max_pending_bytes);
        assert_eq!(sample.buffers.position, defaults.buffers.position);
        assert_eq!(sample.export.directory, defaults.export.directory);
    }

    #[test]
    fn test_to_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catra.toml");
        let mut config = Config::default();
        config.buffers.raw = 42;
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.buffers.raw, 42);
    }
}
