//! Lock-free per-peer statistics using atomics.
//!
//! A [`PeerStats`] is created once per identity, wrapped in `Arc`, and updated
//! concurrently by every subsystem that observes the peer. Counters only ever
//! grow; the bandwidth and build-time fields keep a running maximum and
//! minimum. Persistence bookkeeping (slot, dirty, tombstone) lives next to the
//! counters so the registry can flush without a second lookup table.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use peerstat_storage_slot::SlotIndex;
use portable_atomic::{AtomicF32, AtomicF64};
use serde::Serialize;

use crate::event::PeerStatsEvent;
use crate::ident::PeerIdentHash;

/// Relaxed is enough: counters do not guard other memory, and a flush that
/// misses an in-flight increment leaves the dirty flag set for the next pass.
const ORD: Ordering = Ordering::Relaxed;

/// Build time value meaning "never observed".
pub const BUILD_TIME_UNSET: f32 = f32::INFINITY;

/// Statistics for one peer.
#[derive(Debug)]
pub struct PeerStats {
    id: PeerIdentHash,
    /// Unix millis, fixed at first reference.
    created: u64,
    last_seen: AtomicU64,

    successful_connects: AtomicU32,
    failed_connects: AtomicU32,
    information_faulty: AtomicU32,
    slow_handshake_connects: AtomicU32,
    successful_tunnel_member: AtomicU32,
    declined_tunnel_member: AtomicU32,
    successful_tunnel_tests: AtomicU32,
    failed_tunnel_tests: AtomicU32,
    tunnel_build_timeouts: AtomicU32,
    floodfill_update_timeouts: AtomicU32,
    floodfill_update_successes: AtomicU32,

    max_bandwidth_seen: AtomicF32,
    /// Fastest observed build time per hop in milliseconds.
    tunnel_build_time_ms_per_hop: AtomicF32,
    score: AtomicF64,

    /// 0 = not persisted.
    slot: AtomicU32,
    dirty: AtomicBool,
    deleted: AtomicBool,
}

impl PeerStats {
    /// Fresh statistics for a peer first referenced at `created` (Unix millis).
    pub fn new(id: PeerIdentHash, created: u64) -> Self {
        Self {
            id,
            created,
            last_seen: AtomicU64::new(0),
            successful_connects: AtomicU32::new(0),
            failed_connects: AtomicU32::new(0),
            information_faulty: AtomicU32::new(0),
            slow_handshake_connects: AtomicU32::new(0),
            successful_tunnel_member: AtomicU32::new(0),
            declined_tunnel_member: AtomicU32::new(0),
            successful_tunnel_tests: AtomicU32::new(0),
            failed_tunnel_tests: AtomicU32::new(0),
            tunnel_build_timeouts: AtomicU32::new(0),
            floodfill_update_timeouts: AtomicU32::new(0),
            floodfill_update_successes: AtomicU32::new(0),
            max_bandwidth_seen: AtomicF32::new(0.0),
            tunnel_build_time_ms_per_hop: AtomicF32::new(BUILD_TIME_UNSET),
            score: AtomicF64::new(0.0),
            slot: AtomicU32::new(0),
            dirty: AtomicBool::new(true),
            deleted: AtomicBool::new(false),
        }
    }

    /// Rebuild from a persisted snapshot. The result is clean.
    pub fn from_snapshot(snapshot: &PeerStatsSnapshot, slot: Option<SlotIndex>) -> Self {
        Self {
            id: snapshot.id,
            created: snapshot.created,
            last_seen: AtomicU64::new(snapshot.last_seen),
            successful_connects: AtomicU32::new(snapshot.successful_connects),
            failed_connects: AtomicU32::new(snapshot.failed_connects),
            information_faulty: AtomicU32::new(snapshot.information_faulty),
            slow_handshake_connects: AtomicU32::new(snapshot.slow_handshake_connects),
            successful_tunnel_member: AtomicU32::new(snapshot.successful_tunnel_member),
            declined_tunnel_member: AtomicU32::new(snapshot.declined_tunnel_member),
            successful_tunnel_tests: AtomicU32::new(snapshot.successful_tunnel_tests),
            failed_tunnel_tests: AtomicU32::new(snapshot.failed_tunnel_tests),
            tunnel_build_timeouts: AtomicU32::new(snapshot.tunnel_build_timeouts),
            floodfill_update_timeouts: AtomicU32::new(snapshot.floodfill_update_timeouts),
            floodfill_update_successes: AtomicU32::new(snapshot.floodfill_update_successes),
            max_bandwidth_seen: AtomicF32::new(snapshot.max_bandwidth_seen),
            tunnel_build_time_ms_per_hop: AtomicF32::new(snapshot.tunnel_build_time_ms_per_hop),
            score: AtomicF64::new(snapshot.score),
            slot: AtomicU32::new(slot.map_or(0, SlotIndex::get)),
            dirty: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> PeerIdentHash {
        self.id
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen.load(ORD)
    }

    pub(crate) fn touch(&self, now: u64) {
        self.last_seen.fetch_max(now, ORD);
    }

    /// Apply one event's counter mutation.
    pub(crate) fn apply(&self, event: &PeerStatsEvent) {
        match event {
            PeerStatsEvent::SuccessfulConnect => increment(&self.successful_connects),
            PeerStatsEvent::FailedToConnect => increment(&self.failed_connects),
            PeerStatsEvent::InformationFaulty => increment(&self.information_faulty),
            PeerStatsEvent::SlowHandshakeConnect => increment(&self.slow_handshake_connects),
            PeerStatsEvent::SuccessfulTunnelMember => increment(&self.successful_tunnel_member),
            PeerStatsEvent::DeclinedTunnelMember => increment(&self.declined_tunnel_member),
            PeerStatsEvent::SuccessfulTunnelTest => increment(&self.successful_tunnel_tests),
            PeerStatsEvent::FailedTunnelTest => increment(&self.failed_tunnel_tests),
            PeerStatsEvent::TunnelBuildTimeout => increment(&self.tunnel_build_timeouts),
            PeerStatsEvent::FloodfillUpdateTimeout => increment(&self.floodfill_update_timeouts),
            PeerStatsEvent::FloodfillUpdateSuccess => increment(&self.floodfill_update_successes),
            PeerStatsEvent::MaxBandwidth(bandwidth) => {
                self.max_bandwidth_seen.fetch_max(*bandwidth, ORD);
            }
            PeerStatsEvent::TunnelBuildTimePerHop(per_hop) => {
                self.tunnel_build_time_ms_per_hop
                    .fetch_min(duration_millis_f32(*per_hop), ORD);
            }
        }
    }

    pub fn successful_connects(&self) -> u32 {
        self.successful_connects.load(ORD)
    }

    pub fn failed_connects(&self) -> u32 {
        self.failed_connects.load(ORD)
    }

    pub fn information_faulty(&self) -> u32 {
        self.information_faulty.load(ORD)
    }

    pub fn slow_handshake_connects(&self) -> u32 {
        self.slow_handshake_connects.load(ORD)
    }

    pub fn successful_tunnel_member(&self) -> u32 {
        self.successful_tunnel_member.load(ORD)
    }

    pub fn declined_tunnel_member(&self) -> u32 {
        self.declined_tunnel_member.load(ORD)
    }

    pub fn successful_tunnel_tests(&self) -> u32 {
        self.successful_tunnel_tests.load(ORD)
    }

    pub fn failed_tunnel_tests(&self) -> u32 {
        self.failed_tunnel_tests.load(ORD)
    }

    pub fn tunnel_build_timeouts(&self) -> u32 {
        self.tunnel_build_timeouts.load(ORD)
    }

    pub fn floodfill_update_timeouts(&self) -> u32 {
        self.floodfill_update_timeouts.load(ORD)
    }

    pub fn floodfill_update_successes(&self) -> u32 {
        self.floodfill_update_successes.load(ORD)
    }

    /// True once the peer has answered or missed at least one floodfill update.
    pub fn has_floodfill_history(&self) -> bool {
        self.floodfill_update_successes() != 0 || self.floodfill_update_timeouts() != 0
    }

    pub fn max_bandwidth_seen(&self) -> f32 {
        self.max_bandwidth_seen.load(ORD)
    }

    /// Fastest observed build time per hop, `None` until one is recorded.
    pub fn tunnel_build_time_per_hop(&self) -> Option<Duration> {
        build_time_from_millis(self.tunnel_build_time_ms_per_hop.load(ORD))
    }

    pub fn score(&self) -> f64 {
        self.score.load(ORD)
    }

    /// Store a recomputed score. Returns true if the value changed.
    pub(crate) fn set_score(&self, score: f64) -> bool {
        self.score.swap(score, ORD).to_bits() != score.to_bits()
    }

    pub fn slot(&self) -> Option<SlotIndex> {
        SlotIndex::new(self.slot.load(ORD))
    }

    pub(crate) fn set_slot(&self, slot: Option<SlotIndex>) {
        self.slot.store(slot.map_or(0, SlotIndex::get), ORD);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Clear the dirty flag, returning whether it was set.
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Tombstoned: excluded from scoring, erased on the next flush.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) -> bool {
        !self.deleted.swap(true, Ordering::AcqRel)
    }

    pub fn snapshot(&self) -> PeerStatsSnapshot {
        PeerStatsSnapshot {
            id: self.id,
            created: self.created,
            last_seen: self.last_seen(),
            successful_connects: self.successful_connects(),
            failed_connects: self.failed_connects(),
            information_faulty: self.information_faulty(),
            slow_handshake_connects: self.slow_handshake_connects(),
            successful_tunnel_member: self.successful_tunnel_member(),
            declined_tunnel_member: self.declined_tunnel_member(),
            successful_tunnel_tests: self.successful_tunnel_tests(),
            failed_tunnel_tests: self.failed_tunnel_tests(),
            tunnel_build_timeouts: self.tunnel_build_timeouts(),
            floodfill_update_timeouts: self.floodfill_update_timeouts(),
            floodfill_update_successes: self.floodfill_update_successes(),
            max_bandwidth_seen: self.max_bandwidth_seen(),
            tunnel_build_time_ms_per_hop: self.tunnel_build_time_ms_per_hop.load(ORD),
            score: self.score(),
        }
    }
}

/// Point-in-time copy of a peer's statistics, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerStatsSnapshot {
    pub id: PeerIdentHash,
    pub created: u64,
    pub last_seen: u64,
    pub successful_connects: u32,
    pub failed_connects: u32,
    pub information_faulty: u32,
    pub slow_handshake_connects: u32,
    pub successful_tunnel_member: u32,
    pub declined_tunnel_member: u32,
    pub successful_tunnel_tests: u32,
    pub failed_tunnel_tests: u32,
    pub tunnel_build_timeouts: u32,
    pub floodfill_update_timeouts: u32,
    pub floodfill_update_successes: u32,
    pub max_bandwidth_seen: f32,
    /// [`BUILD_TIME_UNSET`] until a build time is recorded.
    pub tunnel_build_time_ms_per_hop: f32,
    pub score: f64,
}

impl PeerStatsSnapshot {
    /// Empty statistics for `id`.
    pub fn new(id: PeerIdentHash, created: u64) -> Self {
        Self {
            id,
            created,
            last_seen: 0,
            successful_connects: 0,
            failed_connects: 0,
            information_faulty: 0,
            slow_handshake_connects: 0,
            successful_tunnel_member: 0,
            declined_tunnel_member: 0,
            successful_tunnel_tests: 0,
            failed_tunnel_tests: 0,
            tunnel_build_timeouts: 0,
            floodfill_update_timeouts: 0,
            floodfill_update_successes: 0,
            max_bandwidth_seen: 0.0,
            tunnel_build_time_ms_per_hop: BUILD_TIME_UNSET,
            score: 0.0,
        }
    }

    pub fn has_floodfill_history(&self) -> bool {
        self.floodfill_update_successes != 0 || self.floodfill_update_timeouts != 0
    }

    pub fn tunnel_build_time_per_hop(&self) -> Option<Duration> {
        build_time_from_millis(self.tunnel_build_time_ms_per_hop)
    }
}

fn increment(counter: &AtomicU32) {
    // Saturate instead of wrapping back to zero.
    let _ = counter.fetch_update(ORD, ORD, |value| value.checked_add(1));
}

fn duration_millis_f32(duration: Duration) -> f32 {
    (duration.as_secs_f64() * 1000.0) as f32
}

fn build_time_from_millis(millis: f32) -> Option<Duration> {
    if millis.is_finite() && millis >= 0.0 {
        Some(Duration::from_secs_f64(f64::from(millis) / 1000.0))
    } else {
        None
    }
}
