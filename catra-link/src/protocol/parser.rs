//! Record parser: registry of field extractors
//!
//! Each [`FieldExtractor`] pairs a matching [`Rule`] with what it produces: a
//! sample on one channel, or a control event. The parser runs every extractor
//! against every record, so fields are independent:
//!
//! - a record may yield zero, one, or many fields
//! - a missing field yields nothing (not an error)
//! - a matched field whose value is not a number becomes a [`FieldError`] and
//!   the rest of the record is still scanned
//! - a value is the numeric literal right after its tag, so unit suffixes and
//!   separators (`21.5C`, `40%`, `Temp:21.5;Hum:40`) do not spoil it
//!
//! Control markers are checked first. A record recognized as a marker yields
//! only the control event.
//!
//! # Default registry
//!
//! | Extractor | Rule | Example |
//! |-----------|------|---------|
//! | `map_complete` | marker | `MAP_COMPLETE room_a` |
//! | `lidar_tcp` | tagged `LIDAR_DATA_TCP:` keys `X`,`Y` | `LIDAR_DATA_TCP:X:12.5,Y:-3.0` |
//! | `lidar_coord` | pair `LIDAR COORD: X=` / `Y=` | `LIDAR COORD: X=120.0 Y=-4.5` |
//! | `temperature` | `Temp:` | `Temp: 21.5C` |
//! | `humidity` | `Hum:` | `Hum:55%` |
//! | `pressure` | `Pres:` | `Pres: 1013.25` |
//! | `raw` | `RAW:` (integer) | `RAW: 512` |

use crate::core::types::{ChannelId, ControlEvent, SampleValue};
use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;

/// Prefix of the comma-separated `KEY:VALUE` lidar frame sent over TCP
pub const LIDAR_TCP_PREFIX: &str = "LIDAR_DATA_TCP:";

/// Decimal literal with optional sign, fraction and exponent
const FLOAT_LITERAL: &str = r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?";

/// Token that is not a literal; captured so it is reported, not skipped
const OTHER_TOKEN: &str = r"([^\s,;]+)";

/// Regex for a value following `tag`
///
/// Group 1 is the numeric literal (unit suffix left out). Group 2 holds the
/// token instead when no literal of `kind` starts there. An integer followed
/// by `.` or more digits is not an integer literal, so `4.5` lands in group 2.
pub fn value_pattern(tag: &str, kind: NumberKind) -> String {
    let literal = match kind {
        NumberKind::Float => format!("({})", FLOAT_LITERAL),
        NumberKind::Integer => r"([-+]?\d+)(?:[^.\d]|$)".to_string(),
    };
    format!("{}(?:{}|{})", tag, literal, OTHER_TOKEN)
}

/// Numeric type a field is parsed as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Float,
    Integer,
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberKind::Float => f.write_str("float"),
            NumberKind::Integer => f.write_str("integer"),
        }
    }
}

/// Field-level extraction failure (local to one field of one record)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("{field}: '{raw}' is not a valid {kind}")]
    InvalidNumber {
        field: &'static str,
        raw: String,
        kind: NumberKind,
    },
}

/// How an extractor locates its value(s) in a record
#[derive(Debug, Clone)]
pub enum Rule {
    /// Capture group 1 (or group 2, if group 1 did not take part) anywhere
    /// in the record
    Pattern(Regex),
    /// Two independent patterns (x, y); both must match
    Pair(Regex, Regex),
    /// Record starts with `prefix`, followed by comma-separated `KEY:VALUE`
    /// tokens; every key must be present
    Tagged { prefix: String, keys: Vec<String> },
    /// Control marker; capture group 1 is the marker argument
    Marker(Regex),
}

/// What an extractor produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emits {
    Sample { channel: ChannelId, kind: NumberKind },
    MapComplete,
}

/// One typed assignment extracted from a record
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Sample {
        channel: ChannelId,
        value: SampleValue,
    },
    Control(ControlEvent),
}

/// Result of parsing one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRecord {
    /// Successful assignments in registry order
    pub fields: Vec<Field>,
    /// Matched fields that failed numeric conversion
    pub dropped: Vec<FieldError>,
}

impl ParsedRecord {
    /// No extractor matched at all
    pub fn is_unrecognized(&self) -> bool {
        self.fields.is_empty() && self.dropped.is_empty()
    }

    /// The control event, if this record was a marker
    pub fn control(&self) -> Option<&ControlEvent> {
        self.fields.iter().find_map(|f| match f {
            Field::Control(event) => Some(event),
            Field::Sample { .. } => None,
        })
    }

    /// First sample assigned to `channel`
    pub fn sample(&self, channel: ChannelId) -> Option<SampleValue> {
        self.fields.iter().find_map(|f| match f {
            Field::Sample { channel: c, value } if *c == channel => Some(*value),
            _ => None,
        })
    }
}

/// A named registry entry
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    name: &'static str,
    rule: Rule,
    emits: Emits,
}

impl FieldExtractor {
    /// Single numeric value captured by group 1 of `pattern`
    ///
    /// An optional group 2 catches a malformed token so it is reported as a
    /// [`FieldError`] rather than ignored. See [`value_pattern`].
    pub fn scalar(
        name: &'static str,
        channel: ChannelId,
        kind: NumberKind,
        pattern: &str,
    ) -> Result<Self> {
        if channel.is_paired() {
            return Err(Error::InvalidConfig(format!(
                "extractor '{}': {} needs a pair rule",
                name, channel
            )));
        }
        Ok(Self {
            name,
            rule: Rule::Pattern(Regex::new(pattern)?),
            emits: Emits::Sample { channel, kind },
        })
    }

    /// Position from two independent patterns
    pub fn pair(name: &'static str, x_pattern: &str, y_pattern: &str) -> Result<Self> {
        Ok(Self {
            name,
            rule: Rule::Pair(Regex::new(x_pattern)?, Regex::new(y_pattern)?),
            emits: Emits::Sample {
                channel: ChannelId::Position,
                kind: NumberKind::Float,
            },
        })
    }

    /// Values from `KEY:VALUE` tokens after a fixed prefix
    ///
    /// Paired channels take two keys (x, y), scalar channels take one.
    pub fn tagged(
        name: &'static str,
        prefix: &str,
        channel: ChannelId,
        kind: NumberKind,
        keys: &[&str],
    ) -> Result<Self> {
        let expected = if channel.is_paired() { 2 } else { 1 };
        if keys.len() != expected {
            return Err(Error::InvalidConfig(format!(
                "extractor '{}': {} takes {} key(s), got {}",
                name,
                channel,
                expected,
                keys.len()
            )));
        }
        Ok(Self {
            name,
            rule: Rule::Tagged {
                prefix: prefix.to_string(),
                keys: keys.iter().map(|k| k.to_string()).collect(),
            },
            emits: Emits::Sample { channel, kind },
        })
    }

    /// Map-complete control marker
    pub fn marker(name: &'static str, pattern: &str) -> Result<Self> {
        Ok(Self {
            name,
            rule: Rule::Marker(Regex::new(pattern)?),
            emits: Emits::MapComplete,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn emits(&self) -> Emits {
        self.emits
    }

    fn is_marker(&self) -> bool {
        matches!(self.emits, Emits::MapComplete)
    }

    /// Apply this extractor to a record
    ///
    /// `None` when the rule does not match.
    pub fn extract(&self, record: &str) -> Option<std::result::Result<Field, FieldError>> {
        let (channel, kind) = match (self.emits, &self.rule) {
            (Emits::MapComplete, Rule::Marker(re)) => {
                let arg = re.captures(record)?.get(1)?.as_str().trim();
                if arg.is_empty() {
                    return None;
                }
                return Some(Ok(Field::Control(ControlEvent::MapComplete(
                    arg.to_string(),
                ))));
            }
            (Emits::Sample { channel, kind }, _) => (channel, kind),
            (Emits::MapComplete, _) => return None,
        };

        let value = match &self.rule {
            Rule::Pattern(re) => self.scalar_value(captured(re, record)?, kind),
            Rule::Pair(x_re, y_re) => {
                self.point_value(captured(x_re, record)?, captured(y_re, record)?)
            }
            Rule::Tagged { prefix, keys } => {
                let body = record.strip_prefix(prefix.as_str())?;
                match keys.as_slice() {
                    [x_key, y_key] => {
                        let x = tagged_value(body, x_key)?;
                        let y = tagged_value(body, y_key)?;
                        self.point_value(x, y)
                    }
                    [key] => self.scalar_value(tagged_value(body, key)?, kind),
                    _ => return None,
                }
            }
            Rule::Marker(_) => return None,
        };

        Some(value.map(|value| Field::Sample { channel, value }))
    }

    fn scalar_value(
        &self,
        raw: &str,
        kind: NumberKind,
    ) -> std::result::Result<SampleValue, FieldError> {
        match kind {
            NumberKind::Float => self.parse_float(raw).map(SampleValue::Scalar),
            NumberKind::Integer => raw
                .parse::<i64>()
                .map(SampleValue::Integer)
                .map_err(|_| self.invalid(raw, kind)),
        }
    }

    fn point_value(&self, x: &str, y: &str) -> std::result::Result<SampleValue, FieldError> {
        Ok(SampleValue::Point {
            x: self.parse_float(x)?,
            y: self.parse_float(y)?,
        })
    }

    fn parse_float(&self, raw: &str) -> std::result::Result<f64, FieldError> {
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(self.invalid(raw, NumberKind::Float)),
        }
    }

    fn invalid(&self, raw: &str, kind: NumberKind) -> FieldError {
        FieldError::InvalidNumber {
            field: self.name,
            raw: raw.to_string(),
            kind,
        }
    }
}

/// First participating group among 1 and 2
fn captured<'a>(re: &Regex, record: &'a str) -> Option<&'a str> {
    let caps = re.captures(record)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

/// Value of `key` among comma-separated `KEY:VALUE` tokens
fn tagged_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.split(',').find_map(|token| {
        let (k, v) = token.split_once(':')?;
        (k.trim() == key).then(|| v.trim())
    })
}

/// Registry-driven record parser
#[derive(Debug, Clone)]
pub struct RecordParser {
    markers: Vec<FieldExtractor>,
    fields: Vec<FieldExtractor>,
}

impl RecordParser {
    /// Parser with the given registry (order is kept within markers and fields)
    pub fn new(extractors: impl IntoIterator<Item = FieldExtractor>) -> Self {
        let mut parser = Self {
            markers: Vec::new(),
            fields: Vec::new(),
        };
        for extractor in extractors {
            parser.register(extractor);
        }
        parser
    }

    /// Parser for the C.A.T.R.A. wire protocol
    pub fn catra() -> Result<Self> {
        Ok(Self::new([
            FieldExtractor::marker("map_complete", r"^MAP_COMPLETE\s+(.+)$")?,
            FieldExtractor::tagged(
                "lidar_tcp",
                LIDAR_TCP_PREFIX,
                ChannelId::Position,
                NumberKind::Float,
                &["X", "Y"],
            )?,
            FieldExtractor::pair(
                "lidar_coord",
                &value_pattern(r"LIDAR COORD:\s*X=", NumberKind::Float),
                &value_pattern("Y=", NumberKind::Float),
            )?,
            FieldExtractor::scalar(
                "temperature",
                ChannelId::Temperature,
                NumberKind::Float,
                &value_pattern(r"Temp:\s*", NumberKind::Float),
            )?,
            FieldExtractor::scalar(
                "humidity",
                ChannelId::Humidity,
                NumberKind::Float,
                &value_pattern(r"Hum:\s*", NumberKind::Float),
            )?,
            FieldExtractor::scalar(
                "pressure",
                ChannelId::Pressure,
                NumberKind::Float,
                &value_pattern(r"Pres:\s*", NumberKind::Float),
            )?,
            FieldExtractor::scalar(
                "raw",
                ChannelId::Raw,
                NumberKind::Integer,
                &value_pattern(r"RAW:\s*", NumberKind::Integer),
            )?,
        ]))
    }

    /// Add one extractor to the registry
    pub fn register(&mut self, extractor: FieldExtractor) {
        if extractor.is_marker() {
            self.markers.push(extractor);
        } else {
            self.fields.push(extractor);
        }
    }

    /// Registered extractor names, markers first
    pub fn extractor_names(&self) -> Vec<&'static str> {
        self.markers
            .iter()
            .chain(self.fields.iter())
            .map(|e| e.name())
            .collect()
    }

    /// Extract all fields from one record
    pub fn parse(&self, record: &str) -> ParsedRecord {
        let mut parsed = ParsedRecord::default();
        if record.is_empty() {
            log::trace!("Empty record dropped");
            return parsed;
        }

        for marker in &self.markers {
            if let Some(Ok(field)) = marker.extract(record) {
                parsed.fields.push(field);
                return parsed;
            }
        }

        for extractor in &self.fields {
            match extractor.extract(record) {
                Some(Ok(field)) => parsed.fields.push(field),
                Some(Err(e)) => {
                    log::debug!("Dropped field in '{}': {}", record, e);
                    parsed.dropped.push(e);
                }
                None => {}
            }
        }

        if parsed.is_unrecognized() {
            log::debug!("Unrecognized record: {}", record);
        }
        parsed
    }
}
