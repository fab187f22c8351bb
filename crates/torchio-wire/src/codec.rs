//! Framing codec for the engine protocol.
//!
//! Inbound engine output is classified line by line: a line is a tagged event
//! iff it begins with the literal `[json:` marker; every other line belongs to
//! the raw accumulator, whose concatenation is parsed as the terminal result
//! once the engine exits. The terminal payload is emitted by the engine as a
//! single write that the OS may split across read chunks, so raw bytes are
//! reassembled by concatenation, never parsed per line.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::types::{RequestEnvelope, TaggedEvent, TerminalResult};

/// Literal prefix that distinguishes a tagged event line from raw output.
pub const EVENT_MARKER: &str = "[json:";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed tagged event line: {0}")]
    MalformedEvent(String),
    #[error("failed to encode protocol document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Terminal payload that did not parse as a single JSON document.
///
/// Carries the parser's own message plus the destination path when the caller
/// requested one, so the corrupted output can be located.
#[derive(Debug, Error)]
#[error("terminal payload parsing failed: {message}")]
pub struct ParseFailure {
    pub message: String,
    pub filename: Option<PathBuf>,
}

/// One classified line of engine output.
#[derive(Debug, PartialEq)]
pub enum DecodedLine {
    /// A newline-framed `[json:<topic>] <payload>` diagnostic.
    Event(TaggedEvent),
    /// Anything else; contributes to the terminal payload.
    Raw(Vec<u8>),
}

/// Encode the single outbound request as one newline-terminated JSON line.
pub fn encode_request<O: Serialize>(html: &str, options: &O) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(&RequestEnvelope { html, options })?;
    line.push('\n');
    Ok(line)
}

/// Engine-side half: frame a tagged event line, newline included.
pub fn encode_event(topic: &str, payload: &serde_json::Value) -> String {
    format!("{EVENT_MARKER}{topic}] {payload}\n")
}

/// Engine-side half: serialize the terminal result document. Written without a
/// trailing newline, as trailing raw output rather than an event.
pub fn encode_terminal(result: &TerminalResult) -> Result<String, CodecError> {
    Ok(serde_json::to_string(result)?)
}

/// Classify one complete line (without its newline terminator).
pub fn decode_line(line: &[u8]) -> Result<DecodedLine, CodecError> {
    if !line.starts_with(EVENT_MARKER.as_bytes()) {
        return Ok(DecodedLine::Raw(line.to_vec()));
    }
    let text = std::str::from_utf8(line)
        .map_err(|err| CodecError::MalformedEvent(format!("event line is not utf-8: {err}")))?;
    let rest = &text[EVENT_MARKER.len()..];
    let bracket = rest.find(']').ok_or_else(|| {
        CodecError::MalformedEvent(format!("missing topic terminator in `{text}`"))
    })?;
    let topic = &rest[..bracket];
    let body = rest[bracket + 1..].strip_prefix(' ').unwrap_or(&rest[bracket + 1..]);
    let payload: serde_json::Value = serde_json::from_str(body)
        .map_err(|err| CodecError::MalformedEvent(format!("invalid payload for `{topic}`: {err}")))?;
    Ok(DecodedLine::Event(TaggedEvent::new(topic, payload)))
}

/// Stateful decoder for one engine run.
///
/// Feed it chunks as they arrive; complete event lines come back immediately,
/// raw bytes accumulate until [`finish`](Self::finish). A line split across
/// chunk boundaries is held back until its newline arrives; whatever remains
/// unterminated at exit is treated as trailing raw output.
#[derive(Debug, Default)]
pub struct OutputAccumulator {
    pending: Vec<u8>,
    raw: Vec<u8>,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of engine stdout, returning any complete tagged
    /// events it finished. Malformed event lines are dropped with a warning;
    /// folding them into the raw accumulator would corrupt the terminal
    /// payload.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<TaggedEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let rest = self.pending.split_off(newline + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop(); // the newline itself
            match decode_line(&line) {
                Ok(DecodedLine::Event(event)) => events.push(event),
                Ok(DecodedLine::Raw(bytes)) => {
                    self.raw.extend_from_slice(&bytes);
                    self.raw.push(b'\n');
                }
                Err(err) => {
                    warn!(
                        target = "torchio::wire",
                        op = "codec::push_chunk",
                        error = %err,
                        "Dropping malformed engine event line"
                    );
                }
            }
        }
        events
    }

    /// Raw bytes accumulated so far, unterminated tail excluded.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Reassemble the accumulated raw output and parse it as the one terminal
    /// result document.
    pub fn finish(mut self, filename: Option<&Path>) -> Result<TerminalResult, ParseFailure> {
        self.raw.append(&mut self.pending);
        let text = String::from_utf8_lossy(&self.raw);
        serde_json::from_str(text.trim()).map_err(|err| ParseFailure {
            message: err.to_string(),
            filename: filename.map(Path::to_path_buf),
        })
    }
}
