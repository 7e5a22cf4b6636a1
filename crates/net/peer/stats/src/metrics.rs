//! Metrics for statistics persistence.

use std::time::Duration;

use metrics::{Counter, Gauge, Histogram};

use crate::registry::{LoadSummary, SaveSummary};

/// Handles registered once per registry.
#[derive(Clone)]
pub(crate) struct PeerStatsMetrics {
    save_created: Counter,
    save_updated: Counter,
    save_deleted: Counter,
    load_loaded: Counter,
    load_discarded: Counter,
    save_duration: Histogram,
    tracked_peers: Gauge,
    inactive_peers: Gauge,
}

impl std::fmt::Debug for PeerStatsMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerStatsMetrics").finish_non_exhaustive()
    }
}

impl Default for PeerStatsMetrics {
    fn default() -> Self {
        Self {
            save_created: metrics::counter!("peer_stats.save.created_total"),
            save_updated: metrics::counter!("peer_stats.save.updated_total"),
            save_deleted: metrics::counter!("peer_stats.save.deleted_total"),
            load_loaded: metrics::counter!("peer_stats.load.loaded_total"),
            load_discarded: metrics::counter!("peer_stats.load.discarded_total"),
            save_duration: metrics::histogram!("peer_stats.save.duration_seconds"),
            tracked_peers: metrics::gauge!("peer_stats.tracked_peers"),
            inactive_peers: metrics::gauge!("peer_stats.inactive_peers"),
        }
    }
}

impl PeerStatsMetrics {
    pub(crate) fn record_save(&self, summary: &SaveSummary, elapsed: Duration, tracked: usize) {
        self.save_created.increment(summary.created as u64);
        self.save_updated.increment(summary.updated as u64);
        self.save_deleted.increment(summary.deleted as u64);
        self.save_duration.record(elapsed.as_secs_f64());
        self.tracked_peers.set(tracked as f64);
    }

    pub(crate) fn record_load(&self, summary: &LoadSummary, tracked: usize) {
        self.load_loaded.increment(summary.loaded as u64);
        self.load_discarded.increment(summary.discarded as u64);
        self.tracked_peers.set(tracked as f64);
    }

    pub(crate) fn set_inactive(&self, inactive: usize) {
        self.inactive_peers.set(inactive as f64);
    }
}
