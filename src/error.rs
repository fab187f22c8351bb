//! Error taxonomy for one render session.
//!
//! Every failure class surfaces through the single [`ProcessOutcome`] handed
//! to the caller; nothing is retried internally. Retry policy, if any, belongs
//! to whoever wraps multiple sessions.
//!
//! [`ProcessOutcome`]: crate::engine::ProcessOutcome

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid options or request; raised before any process spawns.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The OS failed to start the engine subprocess.
    #[error("failed to spawn engine process: {0}")]
    Spawn(io::Error),

    /// The engine wrote to its diagnostic stream. The message is the
    /// concatenated diagnostic text, verbatim apart from trimming.
    #[error("{message}")]
    Diagnostic { message: String },

    /// The engine exited with a failure code without explaining itself.
    #[error("engine exited with status {code} and produced no diagnostic output")]
    NonZeroExit { code: i32 },

    /// The watchdog fired before the engine finished.
    #[error("{message}")]
    TimedOut { message: String },

    /// The terminal payload was not a single valid JSON document.
    #[error("{message}")]
    Parse {
        message: String,
        filename: Option<PathBuf>,
    },

    /// The outbound request line could not be serialized.
    #[error("failed to encode render request: {0}")]
    Encode(#[from] serde_json::Error),

    /// Filesystem failure while consuming a rendered artifact.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn diagnostic(message: impl Into<String>) -> Self {
        Self::Diagnostic {
            message: message.into(),
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::TimedOut {
            message: message.into(),
        }
    }

    /// Build the parse-failure message the way callers will read it: the
    /// parser's own words, then the destination path when one is known, to aid
    /// locating the corrupted output.
    pub fn parse(message: impl Into<String>, filename: Option<&Path>) -> Self {
        let mut message = format!("terminal payload parsing failed: {}", message.into());
        if let Some(path) = filename {
            message.push_str(&format!("\n  -> in '{}'", path.display()));
        }
        Self::Parse {
            message,
            filename: filename.map(Path::to_path_buf),
        }
    }

    /// True for failures raised before a subprocess existed.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_appends_destination_path() {
        let err = EngineError::parse("unexpected token", Some(Path::new("/out/doc.pdf")));
        let text = err.to_string();
        assert!(text.starts_with("terminal payload parsing failed: unexpected token"));
        assert!(text.contains("/out/doc.pdf"));
    }

    #[test]
    fn parse_error_without_path_omits_location_line() {
        let err = EngineError::parse("unexpected token", None);
        assert!(!err.to_string().contains("->"));
    }

    #[test]
    fn diagnostic_message_is_verbatim() {
        assert_eq!(EngineError::diagnostic("boom").to_string(), "boom");
    }
}
