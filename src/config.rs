//! Typed render options with defaults, validated once at session construction.
//!
//! Serialization is wire-compatible with the engine protocol: camelCase keys,
//! `type`/`timeout` shorthand, absent fields omitted. Host-side process wiring
//! (`engine_path`, `engine_args`, `script_path`) never crosses the boundary.

use std::{
    collections::BTreeMap,
    env,
    ffi::OsString,
    path::PathBuf,
    time::Duration,
};

use serde::Serialize;

use crate::error::EngineError;

pub const DEFAULT_OUTPUT_TYPE: &str = "pdf";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_QUALITY: u8 = 75;

/// Environment fallback for the engine binary when the options leave it unset.
pub const ENGINE_PATH_ENV: &str = "TORCHIO_ENGINE_PATH";

/// Flat configuration for one render. Every recognized option is enumerated
/// here; there is no pass-through for unknown keys.
///
/// The layout-affecting fields (viewport, headers/footers, page geometry) are
/// carried opaquely for the engine-side layout layer; the coordination core
/// never interprets them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// Output format understood by the engine.
    #[serde(rename = "type")]
    pub output_type: String,
    pub quality: u8,
    /// Watchdog budget for the whole render. Must be greater than zero.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,

    /// Path to the engine binary. Required; [`ENGINE_PATH_ENV`] is consulted
    /// when unset, and resolution fails fast when neither is available.
    #[serde(skip)]
    pub engine_path: Option<PathBuf>,
    /// Extra arguments placed before the controller script path.
    #[serde(skip)]
    pub engine_args: Vec<String>,
    /// Override for the engine-side controller script, appended as the final
    /// process argument. Engines with an embedded controller leave this unset.
    #[serde(skip)]
    pub script_path: Option<PathBuf>,

    /// Explicit destination. When absent the engine derives a temporary path
    /// and the caller owns cleanup through the artifact adapters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<PathBuf>,

    /// URL prefix under which relative asset references nominally resolve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Replacement prefix (typically a `file://` root) substituted for `base`
    /// before each asset fetch proceeds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport_size: Option<ViewportSize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub http_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<PageSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<PageSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            output_type: DEFAULT_OUTPUT_TYPE.to_string(),
            quality: DEFAULT_QUALITY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            engine_path: None,
            engine_args: Vec::new(),
            script_path: None,
            filename: None,
            base: None,
            base_path: None,
            viewport_size: None,
            http_headers: BTreeMap::new(),
            header: None,
            footer: None,
            border: None,
            width: None,
            height: None,
            format: None,
            orientation: None,
            dpi: None,
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = Some(path.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_base(mut self, base: impl Into<String>, base_path: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self.base_path = Some(base_path.into());
        self
    }

    /// Validate and freeze the process-facing half of the options. Called once
    /// at session construction; no subprocess exists until this succeeds.
    pub(crate) fn resolve(&self) -> Result<ResolvedEngine, EngineError> {
        let engine_path = self
            .engine_path
            .clone()
            .or_else(|| env::var_os(ENGINE_PATH_ENV).map(PathBuf::from))
            .ok_or_else(|| {
                EngineError::configuration(format!(
                    "engine binary path is not set; provide RenderOptions::engine_path \
                     or the {ENGINE_PATH_ENV} environment variable"
                ))
            })?;
        if self.timeout_ms == 0 {
            return Err(EngineError::configuration(
                "timeout must be greater than zero",
            ));
        }

        let mut args: Vec<OsString> = self.engine_args.iter().map(OsString::from).collect();
        if let Some(script) = &self.script_path {
            args.push(script.clone().into_os_string());
        }

        Ok(ResolvedEngine {
            engine_path,
            args,
            timeout: Duration::from_millis(self.timeout_ms),
            filename: self.filename.clone(),
        })
    }
}

/// Viewport dimensions in pixels, forwarded to the layout layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

/// Header or footer region template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
}

/// The validated, process-facing subset of [`RenderOptions`].
#[derive(Debug, Clone)]
pub(crate) struct ResolvedEngine {
    pub(crate) engine_path: PathBuf,
    pub(crate) args: Vec<OsString>,
    pub(crate) timeout: Duration,
    pub(crate) filename: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_serialize_with_wire_names() {
        let options = RenderOptions::default();
        let value = serde_json::to_value(&options).expect("serialize");
        assert_eq!(value["type"], "pdf");
        assert_eq!(value["timeout"], 30_000);
        assert_eq!(value["quality"], 75);
        assert!(value.get("filename").is_none());
        assert!(value.get("enginePath").is_none(), "host wiring must not leak");
    }

    #[test]
    fn base_pair_uses_camel_case() {
        let options = RenderOptions::new().with_base("http://ph.local/", "file:///srv/site/");
        let value = serde_json::to_value(&options).expect("serialize");
        assert_eq!(value["base"], "http://ph.local/");
        assert_eq!(value["basePath"], "file:///srv/site/");
    }

    #[test]
    fn resolve_requires_engine_path() {
        let err = RenderOptions::default().resolve().expect_err("must fail");
        assert!(err.is_configuration(), "unexpected error: {err}");
    }

    #[test]
    fn resolve_rejects_zero_timeout() {
        let err = RenderOptions::new()
            .with_engine_path("/usr/bin/true")
            .with_timeout_ms(0)
            .resolve()
            .expect_err("must fail");
        assert!(err.is_configuration(), "unexpected error: {err}");
    }

    #[test]
    fn script_path_is_the_final_argument() {
        let mut options = RenderOptions::new().with_engine_path("/opt/engine");
        options.engine_args = vec!["--sandbox".to_string()];
        options.script_path = Some(PathBuf::from("/opt/controller.js"));
        let resolved = options.resolve().expect("resolve");
        assert_eq!(resolved.args.len(), 2);
        assert_eq!(resolved.args[0], OsString::from("--sandbox"));
        assert_eq!(resolved.args[1], OsString::from("/opt/controller.js"));
    }
}
