//! Path MTU policy for datagram transports.
//!
//! MTU values are fixed per address family and already account for the
//! IP + UDP header overhead of that family:
//!
//! | family | link MTU (min / target / max) | overhead | payload (min / target / max) |
//! |--------|-------------------------------|----------|------------------------------|
//! | IPv4   | 620 / 1484 / 1484             | 28       | 592 / 1456 / 1456            |
//! | IPv6   | 1280 / 1280 / 1472            | 48       | 1232 / 1232 / 1424           |
//!
//! Endpoints without an IP component (DNS names, unix sockets, in-memory
//! transports) are rejected rather than mapped to a default.

use std::net::IpAddr;

use auto_impl::auto_impl;
use libp2p::Multiaddr;
use libp2p::multiaddr::Protocol;

/// IPv4 + UDP header size.
pub const IPV4_UDP_OVERHEAD: u16 = 28;
/// IPv6 + UDP header size (including a typical extension header allowance).
pub const IPV6_UDP_OVERHEAD: u16 = 48;

const IPV4_LINK_MTU: u16 = 1484;
const IPV4_MIN_LINK_MTU: u16 = 620;
const IPV6_LINK_MTU: u16 = 1280;
const IPV6_MAX_LINK_MTU: u16 = 1472;

/// Receive buffer size large enough for any IPv4 datagram payload we send.
pub const MTU_BUFFER_SIZE: usize = (IPV4_LINK_MTU - IPV4_UDP_OVERHEAD) as usize;

/// Payload size limits for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtuConfig {
    /// Size to use for outgoing datagrams.
    pub mtu: u16,
    pub mtu_max: u16,
    pub mtu_min: u16,
}

impl MtuConfig {
    pub const IPV4: Self = Self {
        mtu: IPV4_LINK_MTU - IPV4_UDP_OVERHEAD,
        mtu_max: IPV4_LINK_MTU - IPV4_UDP_OVERHEAD,
        mtu_min: IPV4_MIN_LINK_MTU - IPV4_UDP_OVERHEAD,
    };

    pub const IPV6: Self = Self {
        mtu: IPV6_LINK_MTU - IPV6_UDP_OVERHEAD,
        mtu_max: IPV6_MAX_LINK_MTU - IPV6_UDP_OVERHEAD,
        mtu_min: IPV6_LINK_MTU - IPV6_UDP_OVERHEAD,
    };

    pub fn for_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::IPV4,
            IpAddr::V6(_) => Self::IPV6,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MtuError {
    #[error("unsupported address family: {0}")]
    UnsupportedAddressFamily(Multiaddr),
}

/// MTU lookup and feedback.
#[auto_impl(&, Box, Arc)]
pub trait MtuProvider: Send + Sync {
    /// MTU limits for `endpoint`; `None` means "unknown peer" and yields the
    /// IPv4 limits.
    fn mtu(&self, endpoint: Option<&Multiaddr>) -> Result<MtuConfig, MtuError>;

    /// Report the limits actually used towards `endpoint`.
    fn mtu_used(&self, endpoint: &Multiaddr, mtu: &MtuConfig);
}

/// Fixed per-family MTU policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticMtuPolicy;

impl MtuProvider for StaticMtuPolicy {
    fn mtu(&self, endpoint: Option<&Multiaddr>) -> Result<MtuConfig, MtuError> {
        let Some(endpoint) = endpoint else {
            return Ok(MtuConfig::IPV4);
        };
        extract_ip(endpoint)
            .map(MtuConfig::for_ip)
            .ok_or_else(|| MtuError::UnsupportedAddressFamily(endpoint.clone()))
    }

    // No path MTU discovery yet.
    fn mtu_used(&self, _endpoint: &Multiaddr, _mtu: &MtuConfig) {}
}

fn extract_ip(addr: &Multiaddr) -> Option<IpAddr> {
    addr.iter().find_map(|proto| match proto {
        Protocol::Ip4(ip) => Some(IpAddr::V4(ip)),
        Protocol::Ip6(ip) => Some(IpAddr::V6(ip)),
        _ => None,
    })
}
