//! Peer identity hash.

use std::fmt;
use std::str::FromStr;

/// Length of a peer identity hash in bytes.
pub const IDENT_HASH_LEN: usize = 32;

/// Opaque fixed-size identifier of a network destination.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::From, derive_more::Deref)]
pub struct PeerIdentHash([u8; IDENT_HASH_LEN]);

impl PeerIdentHash {
    pub const fn new(bytes: [u8; IDENT_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash with every byte set to `byte`.
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; IDENT_HASH_LEN])
    }

    pub const fn as_bytes(&self) -> &[u8; IDENT_HASH_LEN] {
        &self.0
    }

    /// Copy the hash out of a slice of exactly [`IDENT_HASH_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; IDENT_HASH_LEN]>::try_from(bytes).ok().map(Self)
    }
}

impl AsRef<[u8]> for PeerIdentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerIdentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Abbreviated form for log lines.
impl fmt::Debug for PeerIdentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter().take(4) {
            write!(f, "{byte:02x}")?;
        }
        f.write_str("…")
    }
}

impl serde::Serialize for PeerIdentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for PeerIdentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseIdentError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for PeerIdentHash {
    type Err = ParseIdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
        Self::from_slice(&bytes).ok_or(ParseIdentError::InvalidLength(bytes.len()))
    }
}
