//! Line protocol: newline framing and field extraction
//!
//! ```text
//! bytes ──▶ LineDecoder ──▶ record ──▶ RecordParser ──▶ Field::Sample  ──▶ SampleStore
//!                                                   └─▶ Field::Control ──▶ Link::controls
//! ```

pub mod decoder;
pub mod parser;

pub use decoder::{LineDecoder, Records};
pub use parser::{
    Emits, Field, FieldError, FieldExtractor, NumberKind, ParsedRecord, RecordParser, Rule,
    value_pattern,
};
