//! Wire-protocol types and framing codec shared between the torchio host and
//! Rust engine-side controllers.
//!
//! The protocol is deliberately small: the host writes exactly one JSON request
//! line to the engine's stdin, and the engine answers on stdout with zero or
//! more newline-framed tagged event lines (`[json:<topic>] <payload>`) plus,
//! immediately before a successful exit, a single unframed JSON document
//! carrying the terminal result. Everything here is pure parsing and
//! formatting; no I/O happens in this crate.

pub mod codec;
pub mod types;

pub use codec::{
    CodecError, DecodedLine, EVENT_MARKER, OutputAccumulator, ParseFailure, decode_line,
    encode_event, encode_request, encode_terminal,
};
pub use types::{
    RequestEnvelope, ResourceCounts, ResourceRecord, ResourceSummary, TaggedEvent, TerminalResult,
};
