//! On-disk record layout.
//!
//! Every slot holds one record: a little-endian `u32` tag followed by the
//! tag's payload. Only [`StoreRecordId::PeerStatistics`] is defined today.
//!
//! ```text
//! tag          u32   = 1
//! id           [u8; 32]
//! created      u64   unix millis
//! last_seen    u64   unix millis
//! counters     11 x u32
//! bandwidth    f32
//! build time   f32   ms per hop, +inf when unset
//! score        f64
//! ```
//!
//! Trailing bytes after a complete payload are ignored.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ident::{IDENT_HASH_LEN, PeerIdentHash};
use crate::peer::PeerStatsSnapshot;

const TAG_LEN: usize = 4;
const COUNTERS: usize = 11;

/// Payload length of a [`StoreRecordId::PeerStatistics`] record.
pub const PEER_STATS_PAYLOAD_LEN: usize = IDENT_HASH_LEN + 8 + 8 + COUNTERS * 4 + 4 + 4 + 8;

/// Record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr)]
#[repr(u32)]
pub enum StoreRecordId {
    PeerStatistics = 1,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("unknown record tag {0}")]
    UnknownTag(u32),
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRecord {
    PeerStatistics(PeerStatsSnapshot),
}

/// Encode a peer statistics record, tag included.
pub fn encode_peer_stats(snapshot: &PeerStatsSnapshot) -> Bytes {
    let mut buf = BytesMut::with_capacity(TAG_LEN + PEER_STATS_PAYLOAD_LEN);
    buf.put_u32_le(StoreRecordId::PeerStatistics as u32);
    buf.put_slice(snapshot.id.as_bytes());
    buf.put_u64_le(snapshot.created);
    buf.put_u64_le(snapshot.last_seen);
    for counter in [
        snapshot.successful_connects,
        snapshot.failed_connects,
        snapshot.information_faulty,
        snapshot.slow_handshake_connects,
        snapshot.successful_tunnel_member,
        snapshot.declined_tunnel_member,
        snapshot.successful_tunnel_tests,
        snapshot.failed_tunnel_tests,
        snapshot.tunnel_build_timeouts,
        snapshot.floodfill_update_timeouts,
        snapshot.floodfill_update_successes,
    ] {
        buf.put_u32_le(counter);
    }
    buf.put_f32_le(snapshot.max_bandwidth_seen);
    buf.put_f32_le(snapshot.tunnel_build_time_ms_per_hop);
    buf.put_f64_le(snapshot.score);
    buf.freeze()
}

/// Decode one slot's contents.
pub fn decode(record: &[u8]) -> Result<StoreRecord, RecordError> {
    let mut buf = record;
    ensure_remaining(buf, TAG_LEN)?;
    let tag = buf.get_u32_le();
    match StoreRecordId::from_repr(tag) {
        Some(StoreRecordId::PeerStatistics) => {
            decode_peer_stats(buf).map(StoreRecord::PeerStatistics)
        }
        None => Err(RecordError::UnknownTag(tag)),
    }
}

fn decode_peer_stats(mut buf: &[u8]) -> Result<PeerStatsSnapshot, RecordError> {
    ensure_remaining(buf, PEER_STATS_PAYLOAD_LEN)?;

    let mut id = [0u8; IDENT_HASH_LEN];
    buf.copy_to_slice(&mut id);
    let mut snapshot = PeerStatsSnapshot::new(PeerIdentHash::new(id), buf.get_u64_le());
    snapshot.last_seen = buf.get_u64_le();
    snapshot.successful_connects = buf.get_u32_le();
    snapshot.failed_connects = buf.get_u32_le();
    snapshot.information_faulty = buf.get_u32_le();
    snapshot.slow_handshake_connects = buf.get_u32_le();
    snapshot.successful_tunnel_member = buf.get_u32_le();
    snapshot.declined_tunnel_member = buf.get_u32_le();
    snapshot.successful_tunnel_tests = buf.get_u32_le();
    snapshot.failed_tunnel_tests = buf.get_u32_le();
    snapshot.tunnel_build_timeouts = buf.get_u32_le();
    snapshot.floodfill_update_timeouts = buf.get_u32_le();
    snapshot.floodfill_update_successes = buf.get_u32_le();
    snapshot.max_bandwidth_seen = buf.get_f32_le();
    snapshot.tunnel_build_time_ms_per_hop = buf.get_f32_le();
    snapshot.score = buf.get_f64_le();
    Ok(snapshot)
}

fn ensure_remaining(buf: &[u8], expected: usize) -> Result<(), RecordError> {
    if buf.remaining() < expected {
        return Err(RecordError::Truncated {
            expected,
            actual: buf.remaining(),
        });
    }
    Ok(())
}
