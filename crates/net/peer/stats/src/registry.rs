//! Process-wide peer statistics registry.
//!
//! The registry maps identities to shared [`PeerStats`] entities and flushes
//! them to a slot store. Event reporting only takes the map lock long enough
//! to find or insert the entity; the counter update itself is lock-free.
//!
//! Persistence keeps one store slot per peer:
//!
//! | entity state                 | on save              |
//! |------------------------------|----------------------|
//! | tombstoned, persisted        | slot deleted         |
//! | tombstoned, never persisted  | dropped from memory  |
//! | persisted, dirty             | slot overwritten     |
//! | persisted, clean             | skipped              |
//! | never persisted              | written to new slot  |
//!
//! The store is opened for the duration of one load or save and released on
//! every exit path. Each pass commits once.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use peerstat_storage_slot::{SlotIndex, SlotStore, SlotStoreError, SlotStoreProvider};
use tracing::{debug, info, trace, warn};
use web_time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::error::StatisticsError;
use crate::event::PeerStatsEvent;
use crate::ident::PeerIdentHash;
use crate::metrics::PeerStatsMetrics;
use crate::observer::BuildTimeObserver;
use crate::peer::{PeerStats, PeerStatsSnapshot};
use crate::record::{self, StoreRecord};
use crate::score::{ScoreDistribution, compute_score};

type PeerMap = HashMap<PeerIdentHash, Arc<PeerStats>>;

/// Outcome of a [`PeerStatsRegistry::save`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Entities written to a new slot.
    pub created: usize,
    /// Dirty entities overwritten in place.
    pub updated: usize,
    /// Tombstoned entities whose slot was deleted.
    pub deleted: usize,
    /// Tombstoned entities that were never persisted.
    pub dropped: usize,
}

impl SaveSummary {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of a [`PeerStatsRegistry::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    /// Unreadable or duplicate records deleted from the store.
    pub discarded: usize,
}

/// Result of an inactivity scan.
#[derive(Debug, Clone, Default)]
pub struct InactiveReport {
    /// Inactive peers without floodfill history, then those with it.
    pub inactive: Vec<PeerIdentHash>,
    /// Scores of live peers without floodfill history.
    pub non_floodfill: ScoreDistribution,
    /// Scores of live peers with floodfill history.
    pub floodfill: ScoreDistribution,
}

enum Flushed {
    Created,
    Updated,
    Clean,
}

/// Concurrent registry of peer statistics.
pub struct PeerStatsRegistry<P> {
    provider: P,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    peers: Mutex<PeerMap>,
    build_times: BuildTimeObserver,
    metrics: PeerStatsMetrics,
}

impl<P> std::fmt::Debug for PeerStatsRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerStatsRegistry")
            .field("peers", &self.peers.lock().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: SlotStoreProvider> PeerStatsRegistry<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, RegistryConfig::default())
    }

    pub fn with_config(provider: P, config: RegistryConfig) -> Self {
        Self {
            provider,
            build_times: BuildTimeObserver::new(config.observe_build_times),
            config,
            clock: Arc::new(SystemClock),
            peers: Mutex::new(HashMap::new()),
            metrics: PeerStatsMetrics::default(),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn build_time_observer(&self) -> &BuildTimeObserver {
        &self.build_times
    }

    // --- Lookup ---

    /// Return the entity for `peer`, creating it on first reference.
    pub fn get_or_create(&self, peer: PeerIdentHash) -> Arc<PeerStats> {
        let mut peers = self.peers.lock();
        Arc::clone(
            peers
                .entry(peer)
                .or_insert_with(|| Arc::new(PeerStats::new(peer, self.clock.now_millis()))),
        )
    }

    pub fn get(&self, peer: &PeerIdentHash) -> Option<Arc<PeerStats>> {
        self.peers.lock().get(peer).cloned()
    }

    pub fn contains(&self, peer: &PeerIdentHash) -> bool {
        self.peers.lock().contains_key(peer)
    }

    /// Number of tracked entities, tombstoned ones included.
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live (not tombstoned) peers.
    pub fn peers(&self) -> Vec<PeerIdentHash> {
        self.peers
            .lock()
            .iter()
            .filter(|(_, stats)| !stats.is_deleted())
            .map(|(peer, _)| *peer)
            .collect()
    }

    /// Snapshots of live peers, highest score first.
    pub fn snapshots(&self) -> Vec<PeerStatsSnapshot> {
        let mut snapshots: Vec<_> = self
            .peers
            .lock()
            .values()
            .filter(|stats| !stats.is_deleted())
            .map(|stats| stats.snapshot())
            .collect();
        snapshots.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    // --- Events ---

    /// Record one observation about `peer`.
    pub fn update(&self, peer: PeerIdentHash, event: PeerStatsEvent) {
        let stats = self.get_or_create(peer);
        if event.is_success() {
            stats.touch(self.clock.now_millis());
        }
        stats.apply(&event);
        stats.mark_dirty();
        trace!(?peer, event = <&'static str>::from(event), "peer statistics updated");
    }

    pub fn successful_connect(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::SuccessfulConnect);
    }

    pub fn failed_to_connect(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::FailedToConnect);
    }

    pub fn information_faulty(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::InformationFaulty);
    }

    pub fn slow_handshake_connect(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::SlowHandshakeConnect);
    }

    pub fn successful_tunnel_member(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::SuccessfulTunnelMember);
    }

    pub fn declined_tunnel_member(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::DeclinedTunnelMember);
    }

    pub fn successful_tunnel_test(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::SuccessfulTunnelTest);
    }

    pub fn failed_tunnel_test(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::FailedTunnelTest);
    }

    pub fn tunnel_build_timeout(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::TunnelBuildTimeout);
    }

    pub fn floodfill_update_timeout(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::FloodfillUpdateTimeout);
    }

    pub fn floodfill_update_success(&self, peer: PeerIdentHash) {
        self.update(peer, PeerStatsEvent::FloodfillUpdateSuccess);
    }

    pub fn max_bandwidth(&self, peer: PeerIdentHash, bandwidth: f32) {
        self.update(peer, PeerStatsEvent::MaxBandwidth(bandwidth));
    }

    /// Record a tunnel build time already divided by its hop count.
    pub fn tunnel_build_time_per_hop(&self, peer: PeerIdentHash, per_hop: Duration) {
        self.build_times.observe(per_hop);
        self.update(peer, PeerStatsEvent::TunnelBuildTimePerHop(per_hop));
    }

    // --- Maintenance ---

    /// Tombstone `peer`; its slot is released on the next save.
    pub fn remove(&self, peer: &PeerIdentHash) -> bool {
        let removed = self
            .peers
            .lock()
            .get(peer)
            .is_some_and(|stats| stats.mark_deleted());
        if removed {
            debug!(?peer, "peer statistics removed");
        }
        removed
    }

    /// Tombstone every entity created more than `retention` ago, then save.
    pub fn remove_old_statistics(&self, retention: Duration) -> Result<SaveSummary, StatisticsError> {
        let now = self.clock.now_millis();
        let retention_ms = u64::try_from(retention.as_millis()).unwrap_or(u64::MAX);
        let mut expired = 0usize;
        for stats in self.peers.lock().values() {
            if now.abs_diff(stats.created()) > retention_ms && stats.mark_deleted() {
                expired += 1;
            }
        }
        debug!(expired, ?retention, "expired peer statistics");
        self.save()
    }

    /// Recompute every live peer's score. Returns how many changed.
    pub fn update_score(&self) -> usize {
        let peers = self.peers.lock();
        let mut changed = 0;
        for stats in peers.values().filter(|stats| !stats.is_deleted()) {
            let score = compute_score(&stats.snapshot(), &self.config.weights);
            if stats.set_score(score) {
                stats.mark_dirty();
                changed += 1;
            }
        }
        trace!(changed, total = peers.len(), "peer scores updated");
        changed
    }

    /// Peers whose failure counters cross the inactivity thresholds.
    pub fn get_inactive(&self) -> Vec<PeerIdentHash> {
        self.inactive_report().inactive
    }

    /// Inactive peers plus the score distribution of each partition.
    pub fn inactive_report(&self) -> InactiveReport {
        let report = {
            let peers = self.peers.lock();
            let (floodfill, non_floodfill): (Vec<_>, Vec<_>) = peers
                .iter()
                .map(|(peer, stats)| (peer, &**stats))
                .filter(|(_, stats)| !stats.is_deleted())
                .partition(|(_, stats)| stats.has_floodfill_history());

            let policy = &self.config.inactivity;
            let inactive = non_floodfill
                .iter()
                .chain(&floodfill)
                .filter(|(_, stats)| policy.is_inactive(&stats.snapshot()))
                .map(|(peer, _)| **peer)
                .collect();

            InactiveReport {
                inactive,
                non_floodfill: ScoreDistribution::from_peers(non_floodfill.iter().copied()),
                floodfill: ScoreDistribution::from_peers(floodfill.iter().copied()),
            }
        };

        trace!(
            inactive = report.inactive.len(),
            non_floodfill_mean = report.non_floodfill.mean,
            non_floodfill_std_dev = report.non_floodfill.std_dev,
            floodfill_mean = report.floodfill.mean,
            floodfill_std_dev = report.floodfill.std_dev,
            "inactivity scan"
        );
        self.metrics.set_inactive(report.inactive.len());
        report
    }

    // --- Persistence ---

    /// Populate the registry from the store.
    ///
    /// Records that fail to decode are deleted from the store. When two slots
    /// hold the same identity, the later one wins and the earlier is deleted.
    /// Entities already in memory keep their counters and adopt the slot of
    /// their record, so loading twice leaves the store untouched.
    pub fn load(&self) -> Result<LoadSummary, StatisticsError> {
        let mut peers = self.peers.lock();
        let started = Instant::now();
        let store = self.provider.open()?;
        let (loaded, summary) = scan(&store)?;
        store.commit()?;
        drop(store);

        let merged = merge(&mut peers, loaded);
        self.metrics.record_load(&summary, peers.len());
        info!(
            loaded = summary.loaded,
            discarded = summary.discarded,
            merged,
            elapsed = ?started.elapsed(),
            "peer statistics loaded"
        );
        Ok(summary)
    }

    /// Flush pending changes to the store.
    ///
    /// An empty registry returns immediately without opening the store. All
    /// changes are committed together; on any store error nothing is
    /// committed and every entity touched by the pass is left dirty with its
    /// previous slot, so the next save retries it.
    pub fn save(&self) -> Result<SaveSummary, StatisticsError> {
        let mut peers = self.peers.lock();
        if peers.is_empty() {
            return Ok(SaveSummary::default());
        }
        let started = Instant::now();
        let store = self.provider.open()?;

        let mut pass = FlushPass::default();
        let result = pass.flush(&store, &peers).and_then(|()| store.commit());
        drop(store);
        if let Err(err) = result {
            pass.roll_back();
            return Err(err.into());
        }

        for peer in &pass.erased {
            peers.remove(peer);
        }
        let summary = pass.summary;
        let elapsed = started.elapsed();
        self.metrics.record_save(&summary, elapsed, peers.len());
        info!(
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            dropped = summary.dropped,
            tracked = peers.len(),
            ?elapsed,
            "peer statistics saved"
        );
        Ok(summary)
    }
}

fn scan<S: SlotStore>(store: &S) -> Result<(PeerMap, LoadSummary), SlotStoreError> {
    let mut loaded = PeerMap::new();
    let mut summary = LoadSummary::default();

    let mut cursor = None;
    while let Some(slot) = store.next(cursor)? {
        cursor = Some(slot);
        let bytes = store.read(slot)?;
        match record::decode(&bytes) {
            Ok(StoreRecord::PeerStatistics(snapshot)) => {
                let stats = Arc::new(PeerStats::from_snapshot(&snapshot, Some(slot)));
                let stale = loaded
                    .insert(snapshot.id, stats)
                    .and_then(|previous| previous.slot());
                match stale {
                    Some(stale) => {
                        warn!(peer = ?snapshot.id, %stale, %slot, "duplicate statistics record");
                        store.delete(stale)?;
                        summary.discarded += 1;
                    }
                    None => summary.loaded += 1,
                }
            }
            Err(err) => {
                warn!(%slot, %err, "discarding unreadable statistics record");
                store.delete(slot)?;
                summary.discarded += 1;
            }
        }
    }
    Ok((loaded, summary))
}

/// Move freshly loaded entities into `peers`. Returns how many identities
/// were already tracked.
fn merge(peers: &mut PeerMap, loaded: PeerMap) -> usize {
    let mut merged = 0;
    for (peer, stats) in loaded {
        match peers.entry(peer) {
            Entry::Vacant(entry) => {
                entry.insert(stats);
            }
            Entry::Occupied(entry) => {
                let current = entry.get();
                if current.slot() != stats.slot() {
                    current.set_slot(stats.slot());
                    current.mark_dirty();
                }
                merged += 1;
            }
        }
    }
    merged
}

/// Bookkeeping for one save pass.
#[derive(Default)]
struct FlushPass {
    summary: SaveSummary,
    /// Tombstoned entities to drop from memory once committed.
    erased: Vec<PeerIdentHash>,
    /// Entities whose slot was written or freed, with their slot before the pass.
    touched: Vec<(Arc<PeerStats>, Option<SlotIndex>)>,
}

impl FlushPass {
    fn flush<S: SlotStore>(&mut self, store: &S, peers: &PeerMap) -> Result<(), SlotStoreError> {
        for (peer, stats) in peers {
            let previous = stats.slot();
            if stats.is_deleted() {
                match previous {
                    Some(slot) => {
                        self.touched.push((Arc::clone(stats), previous));
                        store.delete(slot)?;
                        stats.set_slot(None);
                        self.summary.deleted += 1;
                    }
                    None => self.summary.dropped += 1,
                }
                self.erased.push(*peer);
                continue;
            }

            let flushed = flush_one(store, stats);
            if !matches!(flushed, Ok(Flushed::Clean)) {
                self.touched.push((Arc::clone(stats), previous));
            }
            match flushed? {
                Flushed::Created => self.summary.created += 1,
                Flushed::Updated => self.summary.updated += 1,
                Flushed::Clean => {}
            }
        }
        Ok(())
    }

    /// Undo the in-memory side of an uncommitted pass.
    fn roll_back(self) {
        for (stats, slot) in self.touched {
            stats.set_slot(slot);
            stats.mark_dirty();
        }
    }
}

/// Write one live entity. The dirty flag is cleared before encoding so an
/// update racing with the write marks it dirty again.
fn flush_one<S: SlotStore>(store: &S, stats: &PeerStats) -> Result<Flushed, SlotStoreError> {
    let dirty = stats.take_dirty();
    match stats.slot() {
        Some(slot) if dirty => {
            let record = record::encode_peer_stats(&stats.snapshot());
            match store.overwrite(slot, &record) {
                Ok(()) => Ok(Flushed::Updated),
                // Slot vanished underneath us; persist afresh.
                Err(SlotStoreError::NotFound(_)) => {
                    stats.set_slot(Some(store.write(&record)?));
                    Ok(Flushed::Created)
                }
                Err(err) => Err(err),
            }
        }
        Some(_) => Ok(Flushed::Clean),
        None => {
            let record = record::encode_peer_stats(&stats.snapshot());
            stats.set_slot(Some(store.write(&record)?));
            Ok(Flushed::Created)
        }
    }
}

#[cfg(test)]
mod tests {
    use peerstat_storage_slot::MemorySlotStore;

    use super::*;
    use crate::clock::ManualClock;

    fn peer(n: u8) -> PeerIdentHash {
        PeerIdentHash::repeat_byte(n)
    }

    fn registry() -> (PeerStatsRegistry<MemorySlotStore>, MemorySlotStore, ManualClock) {
        registry_on(&MemorySlotStore::new())
    }

    fn registry_on(
        store: &MemorySlotStore,
    ) -> (PeerStatsRegistry<MemorySlotStore>, MemorySlotStore, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let registry = PeerStatsRegistry::new(store.clone()).with_clock(clock.clone());
        (registry, store.clone(), clock)
    }

    #[test]
    fn test_first_reference_creates() {
        let (registry, _, _) = registry();
        assert!(registry.is_empty());

        let stats = registry.get_or_create(peer(1));
        assert_eq!(stats.created(), 1_000_000);
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&stats, &registry.get_or_create(peer(1))));
    }

    #[test]
    fn test_success_refreshes_last_seen() {
        let (registry, _, clock) = registry();
        registry.failed_to_connect(peer(1));
        assert_eq!(registry.get(&peer(1)).unwrap().last_seen(), 0);

        clock.advance(Duration::from_secs(5));
        registry.successful_tunnel_test(peer(1));
        assert_eq!(registry.get(&peer(1)).unwrap().last_seen(), 1_005_000);

        clock.advance(Duration::from_secs(5));
        registry.max_bandwidth(peer(1), 100.0);
        assert_eq!(registry.get(&peer(1)).unwrap().last_seen(), 1_005_000);
    }

    #[test]
    fn test_empty_save_does_not_open_store() {
        let (registry, store, _) = registry();
        assert!(registry.save().unwrap().is_noop());
        assert_eq!(store.opens(), 0);
    }

    #[test]
    fn test_save_lifecycle() {
        let (registry, store, _) = registry();
        registry.successful_connect(peer(1));
        registry.successful_connect(peer(2));

        let first = registry.save().unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(store.len(), 2);

        assert!(registry.save().unwrap().is_noop());

        registry.failed_tunnel_test(peer(1));
        let second = registry.save().unwrap();
        assert_eq!(second.updated, 1);
        assert_eq!(second.created, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_remove_unpersisted_is_dropped() {
        let (registry, store, _) = registry();
        registry.successful_connect(peer(1));
        assert!(registry.remove(&peer(1)));
        assert!(!registry.remove(&peer(1)));
        assert!(registry.peers().is_empty());

        let summary = registry.save().unwrap();
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.created, 0);
        assert!(store.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_write_keeps_entity_dirty() {
        let (registry, store, _) = registry();
        registry.successful_connect(peer(1));

        store.set_fail_writes(true);
        assert!(matches!(registry.save(), Err(StatisticsError::Store(_))));
        assert_eq!(store.open_handles(), 0);
        assert!(registry.get(&peer(1)).unwrap().is_dirty());

        store.set_fail_writes(false);
        assert_eq!(registry.save().unwrap().created, 1);
    }

    #[test]
    fn test_overwrite_of_vanished_slot_rewrites() {
        let (registry, store, _) = registry();
        registry.successful_connect(peer(1));
        registry.save().unwrap();

        let slot = registry.get(&peer(1)).unwrap().slot().unwrap();
        let handle = store.open().unwrap();
        handle.delete(slot).unwrap();
        handle.commit().unwrap();
        drop(handle);

        registry.successful_connect(peer(1));
        let summary = registry.save().unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_score_marks_changed_only() {
        let (registry, _, _) = registry();
        registry.get_or_create(peer(1));
        registry.successful_tunnel_test(peer(2));
        registry.save().unwrap();

        // Peer 1 has no history, so its score stays 0.
        assert_eq!(registry.update_score(), 1);
        assert!(!registry.get(&peer(1)).unwrap().is_dirty());
        assert!(registry.get(&peer(2)).unwrap().is_dirty());
        assert_eq!(registry.update_score(), 0);
    }

    #[test]
    fn test_snapshots_sorted_by_score() {
        let (registry, _, _) = registry();
        registry.failed_to_connect(peer(1));
        registry.successful_connect(peer(2));
        registry.get_or_create(peer(3));
        registry.update_score();

        let order: Vec<_> = registry.snapshots().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![peer(2), peer(3), peer(1)]);
    }

    #[test]
    fn test_inactive_report_partitions() {
        let (registry, _, _) = registry();
        for _ in 0..9 {
            registry.failed_tunnel_test(peer(1));
            registry.failed_tunnel_test(peer(2));
        }
        registry.floodfill_update_timeout(peer(2));
        registry.successful_connect(peer(3));
        registry.update_score();

        let report = registry.inactive_report();
        assert_eq!(report.inactive, vec![peer(1), peer(2)]);
        assert_eq!(report.non_floodfill.count, 2);
        assert_eq!(report.floodfill.count, 1);

        registry.remove(&peer(1));
        assert_eq!(registry.get_inactive(), vec![peer(2)]);
    }

    #[test]
    fn test_update_score_skips_tombstoned() {
        let (registry, _, _) = registry();
        for _ in 0..4 {
            registry.successful_connect(peer(1));
            registry.successful_connect(peer(2));
        }
        registry.save().unwrap();

        assert!(registry.remove(&peer(1)));
        let removed = registry.get(&peer(1)).unwrap();
        let dirty_before = removed.is_dirty();

        assert_eq!(registry.update_score(), 1);
        assert_eq!(removed.score(), 0.0);
        assert_eq!(removed.is_dirty(), dirty_before);
        assert!(registry.get(&peer(2)).unwrap().score() > 0.0);
    }

    #[test]
    fn test_remove_unknown_peer() {
        let (registry, store, _) = registry();
        registry.successful_connect(peer(1));

        assert!(!registry.remove(&peer(2)));
        assert!(!registry.contains(&peer(2)));
        assert_eq!(registry.len(), 1);
        assert_eq!(store.opens(), 0);
    }

    #[test]
    fn test_second_load_keeps_records() {
        let (registry, store, _) = registry();
        registry.successful_connect(peer(1));
        registry.failed_to_connect(peer(2));
        registry.save().unwrap();
        let slots = store.slots();

        let reloaded = PeerStatsRegistry::new(store.clone());
        let first = reloaded.load().unwrap();
        assert_eq!(first, LoadSummary { loaded: 2, discarded: 0 });

        let second = reloaded.load().unwrap();
        assert_eq!(second, LoadSummary { loaded: 2, discarded: 0 });
        assert_eq!(store.slots(), slots);
        assert_eq!(reloaded.len(), 2);
        assert!(!reloaded.get(&peer(1)).unwrap().is_dirty());

        assert!(reloaded.save().unwrap().is_noop());
        assert_eq!(store.slots(), slots);
    }

    #[test]
    fn test_load_adopts_slot_for_tracked_peer() {
        let (registry, store, _) = registry();
        registry.successful_connect(peer(1));
        registry.save().unwrap();
        let slot = registry.get(&peer(1)).unwrap().slot();

        // Seen before the load ran: counters stay, the record's slot is adopted.
        let (live, _, _) = registry_on(&store);
        live.failed_to_connect(peer(1));
        assert_eq!(live.load().unwrap().loaded, 1);

        let stats = live.get(&peer(1)).unwrap();
        assert_eq!(stats.slot(), slot);
        assert_eq!(stats.successful_connects(), 0);
        assert_eq!(stats.failed_connects(), 1);

        assert_eq!(live.save().unwrap().updated, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let (registry, store, _) = registry();
        registry.successful_connect(peer(1));
        registry.save().unwrap();
        registry.successful_connect(peer(2));
        registry.failed_to_connect(peer(1));
        let slot = registry.get(&peer(1)).unwrap().slot();

        store.set_fail_commits(true);
        assert!(matches!(registry.save(), Err(StatisticsError::Store(_))));
        assert_eq!(store.open_handles(), 0);
        assert_eq!(store.len(), 1);

        // Nothing was committed, so the new peer has no slot yet.
        let fresh = registry.get(&peer(2)).unwrap();
        assert_eq!(fresh.slot(), None);
        assert!(fresh.is_dirty());
        assert_eq!(registry.get(&peer(1)).unwrap().slot(), slot);
        assert!(registry.get(&peer(1)).unwrap().is_dirty());

        store.set_fail_commits(false);
        let summary = registry.save().unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_failed_commit_keeps_tombstone() {
        let (registry, store, _) = registry();
        registry.successful_connect(peer(1));
        registry.save().unwrap();
        registry.remove(&peer(1));

        store.set_fail_commits(true);
        assert!(registry.save().is_err());
        assert!(registry.contains(&peer(1)));
        assert_eq!(store.len(), 1);

        store.set_fail_commits(false);
        assert_eq!(registry.save().unwrap().deleted, 1);
        assert!(store.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_commits_once() {
        let (registry, store, _) = registry();
        for n in 0..10 {
            registry.successful_connect(peer(n));
        }
        assert_eq!(registry.save().unwrap().created, 10);
        assert_eq!(store.commits(), 1);
    }
}
