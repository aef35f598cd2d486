//! Engine counters, injected as an `Arc<Metrics>` handle at construction.
//!
//! The in-flight gauge brackets every provider call and is the only shared
//! mutable counter in the core; all fields use atomics so concurrent
//! dispatch and retry paths can update them without coordination.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use herald_common::types::ChannelKind;

#[derive(Debug, Default)]
pub struct Metrics {
    received: AtomicU64,
    dedupe_hits: AtomicU64,
    dispatched: [AtomicU64; 3],
    sent: [AtomicU64; 3],
    failed: [AtomicU64; 3],
    inflight: [AtomicI64; 3],
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub dedupe_hits: u64,
    pub dispatched: [u64; 3],
    pub sent: [u64; 3],
    pub failed: [u64; 3],
    pub inflight: [i64; 3],
}

fn idx(channel: ChannelKind) -> usize {
    match channel {
        ChannelKind::Push => 0,
        ChannelKind::Email => 1,
        ChannelKind::Sms => 2,
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dedupe_hit(&self) {
        self.dedupe_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, channel: ChannelKind) {
        self.dispatched[idx(channel)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, channel: ChannelKind) {
        self.sent[idx(channel)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self, channel: ChannelKind) {
        self.failed[idx(channel)].fetch_add(1, Ordering::Relaxed);
    }

    /// Adjust the in-flight gauge for a channel (+1 before a provider call,
    /// -1 after it returns).
    pub fn inflight_add(&self, channel: ChannelKind, delta: i64) {
        self.inflight[idx(channel)].fetch_add(delta, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dedupe_hits: self.dedupe_hits.load(Ordering::Relaxed),
            dispatched: self.dispatched.each_ref().map(|c| c.load(Ordering::Relaxed)),
            sent: self.sent.each_ref().map(|c| c.load(Ordering::Relaxed)),
            failed: self.failed.each_ref().map(|c| c.load(Ordering::Relaxed)),
            inflight: self.inflight.each_ref().map(|c| c.load(Ordering::Relaxed)),
        }
    }

    pub fn sent_total(&self, channel: ChannelKind) -> u64 {
        self.sent[idx(channel)].load(Ordering::Relaxed)
    }

    pub fn inflight_current(&self, channel: ChannelKind) -> i64 {
        self.inflight[idx(channel)].load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_received();
        metrics.record_received();
        metrics.record_dispatched(ChannelKind::Push);
        metrics.record_sent(ChannelKind::Email);
        metrics.record_failed(ChannelKind::Push);

        let snap = metrics.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.dispatched, [1, 0, 0]);
        assert_eq!(snap.sent, [0, 1, 0]);
        assert_eq!(snap.failed, [1, 0, 0]);
    }

    #[test]
    fn test_inflight_gauge_brackets() {
        let metrics = Metrics::new();
        metrics.inflight_add(ChannelKind::Sms, 1);
        assert_eq!(metrics.inflight_current(ChannelKind::Sms), 1);
        metrics.inflight_add(ChannelKind::Sms, -1);
        assert_eq!(metrics.inflight_current(ChannelKind::Sms), 0);
    }
}
