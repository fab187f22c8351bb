//! Engine-side completion gate over dependent asset fetches.
//!
//! The barrier tracks per-URL request/response/error flags and answers one
//! question: have all observed fetches reached a terminal outcome? The
//! engine-side controller attaches it before triggering network-dependent
//! rendering and captures final output only after [`await_settled`] resolves.
//!
//! Settlement policy: an `errored` fetch counts as terminal. A document whose
//! only stylesheet 404s must still render; waiting on a response that will
//! never come just converts a broken asset into a host-side timeout.
//!
//! [`await_settled`]: ResourceBarrier::await_settled

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use thiserror::Error;
use tokio::time::{Instant, interval};
use torchio_wire::{ResourceCounts, ResourceRecord, ResourceSummary};

/// Default cadence of the settlement poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One kind of per-asset observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    Requested,
    Received,
    Errored,
}

/// Prefix substitution applied to every asset URL before its fetch proceeds,
/// so relative references inside the document resolve against a local
/// filesystem root instead of the nominal web origin.
#[derive(Debug, Clone)]
pub struct UrlRewrite {
    pub from: String,
    pub to: String,
}

impl UrlRewrite {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Substitute the configured prefix, exactly once.
    pub fn apply(&self, url: &str) -> String {
        match url.strip_prefix(&self.from) {
            Some(rest) => format!("{}{rest}", self.to),
            None => url.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct UrlState {
    seq: usize,
    requested: bool,
    received: bool,
    errored: bool,
}

impl UrlState {
    fn terminal(&self) -> bool {
        self.received || self.errored
    }
}

#[derive(Debug, Error)]
#[error("resources did not settle within {waited:?}")]
pub struct BarrierTimedOut {
    pub waited: Duration,
}

/// Per-session asset bookkeeping. Owned by the engine-side renderer instance;
/// only the serialized [`ResourceSummary`] ever crosses the process boundary.
#[derive(Debug, Default)]
pub struct ResourceBarrier {
    urls: DashMap<String, UrlState>,
    next_seq: AtomicUsize,
    rewrite: Option<UrlRewrite>,
}

impl ResourceBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rewrite(rewrite: UrlRewrite) -> Self {
        Self {
            rewrite: Some(rewrite),
            ..Self::default()
        }
    }

    /// Intercept an outgoing fetch: rewrite the URL, record it as requested,
    /// and hand back the URL the fetch should actually use.
    pub fn on_request(&self, url: &str) -> String {
        let rewritten = match &self.rewrite {
            Some(rewrite) => rewrite.apply(url),
            None => url.to_string(),
        };
        self.observe(ResourceEvent::Requested, &rewritten);
        rewritten
    }

    /// Record an observation for a URL. Flags are only ever set, never unset;
    /// repeated observations of the same kind are idempotent.
    pub fn observe(&self, event: ResourceEvent, url: &str) {
        let mut state = self.urls.entry(url.to_string()).or_insert_with(|| UrlState {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            ..UrlState::default()
        });
        match event {
            ResourceEvent::Requested => state.requested = true,
            ResourceEvent::Received => state.received = true,
            ResourceEvent::Errored => state.errored = true,
        }
    }

    /// Distinct-URL tallies over the current table.
    pub fn counts(&self) -> ResourceCounts {
        let mut counts = ResourceCounts::default();
        for entry in self.urls.iter() {
            if entry.requested {
                counts.requested += 1;
            }
            if entry.received {
                counts.received += 1;
            }
            if entry.errored {
                counts.errored += 1;
            }
        }
        counts
    }

    /// True once every distinct requested URL has a terminal outcome.
    pub fn is_settled(&self) -> bool {
        let mut requested = 0usize;
        let mut terminal = 0usize;
        for entry in self.urls.iter() {
            if entry.requested {
                requested += 1;
            }
            if entry.terminal() {
                terminal += 1;
            }
        }
        terminal >= requested
    }

    /// Poll [`is_settled`](Self::is_settled) on a fixed interval until it
    /// holds, bounded by `max_wait`. Resolves immediately when already
    /// settled. The barrier has no internal deadline of its own; callers pass
    /// the remaining session budget so the host-side timeout stays the real
    /// upper bound.
    pub async fn await_settled(
        &self,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<(), BarrierTimedOut> {
        if self.is_settled() {
            return Ok(());
        }
        let deadline = Instant::now() + max_wait;
        let mut ticker = interval(poll_interval);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            if self.is_settled() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BarrierTimedOut { waited: max_wait });
            }
        }
    }

    /// Snapshot for the terminal result, in first-observation order.
    pub fn summary(&self) -> ResourceSummary {
        let mut entries: Vec<(usize, String, bool, bool, bool)> = self
            .urls
            .iter()
            .map(|entry| {
                (
                    entry.seq,
                    entry.key().clone(),
                    entry.requested,
                    entry.received,
                    entry.errored,
                )
            })
            .collect();
        entries.sort_by_key(|(seq, ..)| *seq);

        let mut summary = ResourceSummary::default();
        for (_, url, requested, received, errored) in entries {
            if requested {
                summary.requested.push(ResourceRecord::new(url.clone()));
            }
            if received {
                summary.received.push(ResourceRecord::new(url.clone()));
            }
            if errored {
                summary.errored.push(ResourceRecord::new(url));
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsettled_while_a_request_is_outstanding() {
        let barrier = ResourceBarrier::new();
        barrier.observe(ResourceEvent::Requested, "file:///a.css");
        assert!(!barrier.is_settled());

        barrier.observe(ResourceEvent::Received, "file:///a.css");
        assert!(barrier.is_settled());
    }

    #[test]
    fn empty_barrier_is_settled() {
        assert!(ResourceBarrier::new().is_settled());
    }

    #[test]
    fn errored_counts_as_terminal() {
        let barrier = ResourceBarrier::new();
        barrier.observe(ResourceEvent::Requested, "file:///missing.png");
        assert!(!barrier.is_settled());

        barrier.observe(ResourceEvent::Errored, "file:///missing.png");
        assert!(barrier.is_settled());
    }

    #[test]
    fn duplicate_requests_need_one_terminal_event() {
        let barrier = ResourceBarrier::new();
        barrier.observe(ResourceEvent::Requested, "file:///a.css");
        barrier.observe(ResourceEvent::Requested, "file:///a.css");
        barrier.observe(ResourceEvent::Received, "file:///a.css");
        assert!(barrier.is_settled());

        let counts = barrier.counts();
        assert_eq!(counts.requested, 1);
        assert_eq!(counts.received, 1);
    }

    #[test]
    fn on_request_rewrites_prefix_once() {
        let barrier = ResourceBarrier::with_rewrite(UrlRewrite::new(
            "http://ph.local/",
            "file:///srv/site/",
        ));
        let rewritten = barrier.on_request("http://ph.local/css/http://ph.local/nested");
        assert_eq!(rewritten, "file:///srv/site/css/http://ph.local/nested");

        // The table is keyed by the rewritten URL, matching the URLs that
        // later received/errored events will carry.
        barrier.observe(ResourceEvent::Received, &rewritten);
        assert!(barrier.is_settled());
    }

    #[test]
    fn urls_outside_the_base_pass_through() {
        let rewrite = UrlRewrite::new("http://ph.local/", "file:///srv/site/");
        assert_eq!(rewrite.apply("https://cdn.example/x.js"), "https://cdn.example/x.js");
    }

    #[test]
    fn summary_preserves_first_observation_order() {
        let barrier = ResourceBarrier::new();
        barrier.observe(ResourceEvent::Requested, "b");
        barrier.observe(ResourceEvent::Requested, "a");
        barrier.observe(ResourceEvent::Received, "b");
        barrier.observe(ResourceEvent::Errored, "a");

        let summary = barrier.summary();
        let requested: Vec<&str> = summary.requested.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(requested, vec!["b", "a"]);
        assert_eq!(summary.received[0].url, "b");
        assert_eq!(summary.errored[0].url, "a");
    }

    #[tokio::test]
    async fn await_settled_returns_immediately_when_settled() {
        let barrier = ResourceBarrier::new();
        barrier
            .await_settled(DEFAULT_POLL_INTERVAL, Duration::from_secs(1))
            .await
            .expect("already settled");
    }

    #[tokio::test]
    async fn await_settled_observes_late_terminal_events() {
        let barrier = std::sync::Arc::new(ResourceBarrier::new());
        barrier.observe(ResourceEvent::Requested, "file:///slow.png");

        let waiter = std::sync::Arc::clone(&barrier);
        let handle = tokio::spawn(async move {
            waiter
                .await_settled(Duration::from_millis(5), Duration::from_secs(5))
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        barrier.observe(ResourceEvent::Received, "file:///slow.png");
        handle.await.expect("join").expect("settled");
    }

    #[tokio::test]
    async fn await_settled_is_bounded() {
        let barrier = ResourceBarrier::new();
        barrier.observe(ResourceEvent::Requested, "file:///never.png");
        let err = barrier
            .await_settled(Duration::from_millis(5), Duration::from_millis(30))
            .await
            .expect_err("must hit the bound");
        assert_eq!(err.waited, Duration::from_millis(30));
    }
}
