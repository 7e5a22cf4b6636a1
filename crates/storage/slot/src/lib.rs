//! Addressable slot storage for tagged binary records.
//!
//! A slot store hands out integer indices for opaque byte records and lets
//! callers enumerate, overwrite and delete them. Stores are opened through a
//! [`SlotStoreProvider`]; the returned handle owns the underlying resource and
//! releases it on drop, so every exit path of a load or flush gives it back.
//!
//! Changes made through a handle become visible to other handles only once
//! [`SlotStore::commit`] succeeds. A handle dropped without committing
//! discards them.
//!
//! - [`RedbSlotStore`] - on-disk backend (feature `redb`, enabled by default)
//! - [`MemorySlotStore`] - in-memory backend with fault injection (feature `test-utils`)

mod error;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
#[cfg(feature = "redb")]
mod redb_store;

use std::fmt;
use std::num::NonZeroU32;

use auto_impl::auto_impl;

pub use error::SlotStoreError;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemorySlotHandle, MemorySlotStore};
#[cfg(feature = "redb")]
pub use redb_store::{RedbSlotStore, RedbSlotStoreProvider};

/// Index of an occupied slot. Slot indices start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(NonZeroU32);

impl SlotIndex {
    /// The lowest slot index a store can hand out.
    pub const FIRST: Self = Self(NonZeroU32::MIN);

    /// Returns `None` for the reserved index 0.
    pub const fn new(index: u32) -> Option<Self> {
        match NonZeroU32::new(index) {
            Some(index) => Some(Self(index)),
            None => None,
        }
    }

    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// The index following this one, if the index space is not exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SlotIndex> for u32 {
    fn from(slot: SlotIndex) -> Self {
        slot.get()
    }
}

/// Slot-addressed record storage.
///
/// Index allocation for [`write`](SlotStore::write) is backend-defined; callers
/// must only rely on the returned index staying valid until it is deleted.
#[auto_impl(&, Box, Arc)]
pub trait SlotStore: Send + Sync {
    /// First occupied slot strictly after `after`, or the first occupied slot
    /// when `after` is `None`.
    fn next(&self, after: Option<SlotIndex>) -> Result<Option<SlotIndex>, SlotStoreError>;

    fn read(&self, slot: SlotIndex) -> Result<Vec<u8>, SlotStoreError>;

    /// Store a record in a fresh slot and return its index.
    fn write(&self, record: &[u8]) -> Result<SlotIndex, SlotStoreError>;

    /// Replace the record held by an occupied slot.
    fn overwrite(&self, slot: SlotIndex, record: &[u8]) -> Result<(), SlotStoreError>;

    /// Free a slot. Deleting an empty slot is not an error.
    fn delete(&self, slot: SlotIndex) -> Result<(), SlotStoreError>;

    /// Make every change since the last commit durable. Committing a handle
    /// with no changes is a no-op.
    fn commit(&self) -> Result<(), SlotStoreError>;
}

/// Opens scoped [`SlotStore`] handles.
///
/// The handle is dropped at the end of each load or flush pass; backends that
/// hold exclusive resources (file locks, database handles) release them there.
#[auto_impl(&, Box, Arc)]
pub trait SlotStoreProvider: Send + Sync {
    type Store: SlotStore;

    fn open(&self) -> Result<Self::Store, SlotStoreError>;
}
