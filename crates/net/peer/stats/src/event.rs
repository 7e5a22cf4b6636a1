//! Observations reported against a peer.

use std::time::Duration;

/// One observation about a peer.
///
/// Every variant bumps exactly one field of [`PeerStats`](crate::PeerStats).
/// Success variants also refresh the peer's last-seen time.
#[derive(Debug, Clone, Copy, PartialEq, strum::IntoStaticStr, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PeerStatsEvent {
    SuccessfulConnect,
    FailedToConnect,
    /// The peer's published information failed validation.
    InformationFaulty,
    SlowHandshakeConnect,
    SuccessfulTunnelMember,
    DeclinedTunnelMember,
    SuccessfulTunnelTest,
    FailedTunnelTest,
    /// The peer never answered a tunnel build request.
    TunnelBuildTimeout,
    FloodfillUpdateTimeout,
    FloodfillUpdateSuccess,
    /// Bandwidth advertised or measured for the peer, in KiB/s.
    MaxBandwidth(f32),
    /// Observed tunnel build time divided by hop count.
    TunnelBuildTimePerHop(Duration),
}

impl PeerStatsEvent {
    /// Whether this event proves the peer was reachable.
    pub const fn is_success(&self) -> bool {
        matches!(
            self,
            Self::SuccessfulConnect
                | Self::SuccessfulTunnelMember
                | Self::SuccessfulTunnelTest
                | Self::TunnelBuildTimePerHop(_)
                | Self::FloodfillUpdateSuccess
        )
    }
}
