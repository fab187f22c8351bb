//! torchio coordinates an external, sandboxed page-rendering engine process
//! to turn HTML into a fixed-layout document (PDF by default).
//!
//! The host hands the engine one JSON request line on stdin, streams tagged
//! log events back while it runs, and recovers either a terminal result (the
//! artifact path plus per-asset fetch bookkeeping) or a classified failure.
//! Engine-side, [`ResourceBarrier`] gates final capture until every dependent
//! asset fetch has settled.
//!
//! ```no_run
//! use torchio::{RenderOptions, RenderRequest, RenderSession};
//!
//! # async fn demo() -> Result<(), torchio::EngineError> {
//! let options = RenderOptions::new()
//!     .with_engine_path("/usr/local/bin/page-engine")
//!     .with_timeout_ms(30_000);
//! let session = RenderSession::new(RenderRequest::new("<div id='pageContent'>hi</div>", options))?;
//! let result = session.render().await.into_result()?;
//! println!("rendered to {}", result.filename);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod barrier;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;

pub use artifact::{ArtifactStream, RenderArtifact};
pub use barrier::{BarrierTimedOut, ResourceBarrier, ResourceEvent, UrlRewrite};
pub use config::{PageSection, RenderOptions, ViewportSize};
pub use engine::ProcessOutcome;
pub use error::EngineError;
pub use session::{EventSink, RenderRequest, RenderSession};

/// Wire-protocol types and codec, re-exported for engine-side controllers.
pub use torchio_wire as wire;

/// One-call convenience: validate, render, and wrap the result as an
/// artifact ready for the buffer/stream/file adapters.
pub async fn render(
    html: impl Into<String>,
    options: RenderOptions,
) -> Result<RenderArtifact, EngineError> {
    let explicit_destination = options.filename.is_some();
    let session = RenderSession::new(RenderRequest::new(html, options))?;
    let result = session.render().await.into_result()?;
    Ok(RenderArtifact::from_result(result, explicit_destination))
}
