//! Host-side orchestration of a single render.
//!
//! One session owns one engine subprocess for the lifetime of one request;
//! sessions are never reused and share no state with each other, so any
//! number may run concurrently. There is no external cancel: the watchdog is
//! the sole cancellation trigger, and a caller that must abort early can kill
//! the subprocess itself, which the engine loop treats like any other
//! teardown.

use std::sync::Arc;

use tracing::debug;

use torchio_wire::{TaggedEvent, codec};

use crate::{
    config::{RenderOptions, ResolvedEngine},
    engine::{self, ProcessOutcome},
    error::EngineError,
};

/// An HTML document plus the options for rendering it. Immutable once
/// constructed; handed to exactly one [`RenderSession`].
#[derive(Debug, Clone)]
pub struct RenderRequest {
    html: String,
    options: RenderOptions,
}

impl RenderRequest {
    pub fn new(html: impl Into<String>, options: RenderOptions) -> Self {
        Self {
            html: html.into(),
            options,
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }
}

/// Receives tagged events from the engine in real time, independent of the
/// final outcome. Events are ephemeral; the sink sees each one exactly once
/// and the session keeps nothing.
pub trait EventSink: Send + Sync {
    fn event(&self, event: TaggedEvent);
}

impl<F> EventSink for F
where
    F: Fn(TaggedEvent) + Send + Sync,
{
    fn event(&self, event: TaggedEvent) {
        self(event)
    }
}

/// Default sink: engine chatter goes to the log, nowhere else.
struct TracingSink;

impl EventSink for TracingSink {
    fn event(&self, event: TaggedEvent) {
        if let Some(message) = event.message() {
            debug!(
                target = "torchio::session",
                topic = %event.topic,
                "[engine] {message}"
            );
        }
    }
}

/// Single-shot coordinator for one render request.
///
/// Construction validates the request fully; no subprocess is spawned until
/// [`render`](Self::render), and none is spawned at all when validation
/// fails.
pub struct RenderSession {
    request: RenderRequest,
    engine: ResolvedEngine,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("request", &self.request)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl RenderSession {
    pub fn new(request: RenderRequest) -> Result<Self, EngineError> {
        if request.html.is_empty() {
            return Err(EngineError::configuration(
                "cannot render without an html source",
            ));
        }
        let engine = request.options.resolve()?;
        Ok(Self {
            request,
            engine,
            sink: Arc::new(TracingSink),
        })
    }

    /// Replace the default tracing sink with a caller-supplied one.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the render to its single outcome. Consumes the session; one
    /// request, one subprocess, one result.
    pub async fn render(self) -> ProcessOutcome {
        let request_line = match codec::encode_request(self.request.html(), self.request.options())
        {
            Ok(line) => line,
            Err(codec::CodecError::Encode(err)) => {
                return ProcessOutcome::Failed(EngineError::Encode(err));
            }
            Err(other) => {
                return ProcessOutcome::Failed(EngineError::configuration(other.to_string()));
            }
        };
        engine::run(&self.engine, &request_line, self.sink.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_html_fails_before_any_spawn() {
        let options = RenderOptions::new().with_engine_path("/bin/true");
        let err = RenderSession::new(RenderRequest::new("", options)).expect_err("must fail");
        assert!(err.is_configuration(), "unexpected error: {err}");
    }

    #[test]
    fn whitespace_only_html_is_a_valid_source() {
        // Only the truly empty string is rejected; what a whitespace document
        // renders to is the engine's business.
        let options = RenderOptions::new().with_engine_path("/bin/true");
        RenderSession::new(RenderRequest::new("  \n\t", options)).expect("must validate");
    }

    #[test]
    fn missing_engine_path_fails_before_any_spawn() {
        let err = RenderSession::new(RenderRequest::new("<p>hi</p>", RenderOptions::default()))
            .expect_err("must fail");
        assert!(err.is_configuration(), "unexpected error: {err}");
    }
}
