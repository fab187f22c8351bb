//! Serde types exchanged between the host process and the engine subprocess.
//!
//! Field names stay camelCase (and the short `req`/`rec`/`err` keys) for
//! interoperability with existing engine-side controller scripts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The single outbound request document, written as one line to the engine's
/// stdin at process start.
#[derive(Debug, Serialize)]
pub struct RequestEnvelope<'a, O: Serialize> {
    pub html: &'a str,
    pub options: &'a O,
}

/// An out-of-band diagnostic message emitted by the engine while it runs.
/// Forwarded to the caller's sink and discarded; never part of the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl TaggedEvent {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// The conventional human-readable `msg` field of the payload, when present.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("msg").and_then(serde_json::Value::as_str)
    }
}

/// The one-time final document the engine writes just before exiting zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalResult {
    /// Path of the rendered artifact on the shared filesystem.
    pub filename: String,
    /// Per-asset fetch bookkeeping accumulated by the engine-side barrier.
    #[serde(default)]
    pub resources: ResourceSummary,
}

/// Per-asset fetch outcomes, in first-observation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    #[serde(rename = "req", default)]
    pub requested: Vec<ResourceRecord>,
    #[serde(rename = "rec", default)]
    pub received: Vec<ResourceRecord>,
    #[serde(rename = "err", default)]
    pub errored: Vec<ResourceRecord>,
}

impl ResourceSummary {
    /// Distinct-URL counters derived from the record lists.
    pub fn counts(&self) -> ResourceCounts {
        fn distinct(records: &[ResourceRecord]) -> usize {
            records
                .iter()
                .map(|record| record.url.as_str())
                .collect::<BTreeSet<_>>()
                .len()
        }

        ResourceCounts {
            requested: distinct(&self.requested),
            received: distinct(&self.received),
            errored: distinct(&self.errored),
        }
    }
}

/// A single asset reference. Engine controllers may attach more fields to
/// these records on the wire; only the URL is contractual.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(default)]
    pub url: String,
}

impl ResourceRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Distinct-URL tallies over a [`ResourceSummary`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub requested: usize,
    pub received: usize,
    pub errored: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_result_uses_short_wire_keys() {
        let json = r#"{
            "filename": "/tmp/torchio-42.pdf",
            "resources": {
                "req": [{"url": "file:///assets/a.css", "method": "GET"}],
                "rec": [{"url": "file:///assets/a.css"}],
                "err": []
            }
        }"#;
        let result: TerminalResult = serde_json::from_str(json).expect("decode");
        assert_eq!(result.filename, "/tmp/torchio-42.pdf");
        assert_eq!(result.resources.requested.len(), 1);
        assert_eq!(result.resources.requested[0].url, "file:///assets/a.css");
    }

    #[test]
    fn counts_deduplicate_urls() {
        let summary = ResourceSummary {
            requested: vec![
                ResourceRecord::new("a"),
                ResourceRecord::new("a"),
                ResourceRecord::new("b"),
            ],
            received: vec![ResourceRecord::new("a")],
            errored: vec![],
        };
        let counts = summary.counts();
        assert_eq!(counts.requested, 2);
        assert_eq!(counts.received, 1);
        assert_eq!(counts.errored, 0);
    }
}
