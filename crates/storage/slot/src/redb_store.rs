//! redb-based slot storage backend.
//!
//! This module provides [`RedbSlotStore`], a persistent slot store backed by
//! the redb embedded database, and [`RedbSlotStoreProvider`], which opens it
//! from a path for the duration of one pass.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use redb::{Database, ReadableTable, Table, TableDefinition, WriteTransaction};
use tracing::debug;

use crate::{SlotIndex, SlotStore, SlotStoreError, SlotStoreProvider};

/// Table definition for slots.
/// Key: slot index (never 0)
/// Value: record bytes
const SLOTS_TABLE: TableDefinition<u32, &[u8]> = TableDefinition::new("slots");

type SlotsTable<'txn> = Table<'txn, u32, &'static [u8]>;

/// redb-based slot store.
///
/// New records are appended after the highest occupied slot. The database
/// file stays locked for as long as the store is alive.
///
/// The first mutation begins a write transaction that every later call on
/// this handle shares, reads included, until [`SlotStore::commit`].
pub struct RedbSlotStore {
    db: Database,
    txn: Mutex<Option<WriteTransaction>>,
}

impl std::fmt::Debug for RedbSlotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbSlotStore")
            .field("pending", &self.txn.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl RedbSlotStore {
    /// Open or create a slot store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SlotStoreError> {
        let db = Database::create(path)?;

        // Ensure the slots table exists
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SLOTS_TABLE)?;
        }
        write_txn.commit()?;

        debug!("opened redb slot store");
        Ok(Self {
            db,
            txn: Mutex::new(None),
        })
    }

    /// Run `f` against the slots table of the handle's write transaction,
    /// beginning one if none is pending.
    fn with_write<R>(
        &self,
        f: impl FnOnce(&mut SlotsTable<'_>) -> Result<R, SlotStoreError>,
    ) -> Result<R, SlotStoreError> {
        let mut guard = self.txn.lock();
        let txn = match guard.take() {
            Some(txn) => txn,
            None => self.db.begin_write()?,
        };
        let txn = guard.insert(txn);
        let mut table = txn.open_table(SLOTS_TABLE)?;
        f(&mut table)
    }
}

fn first_from(
    table: &impl ReadableTable<u32, &'static [u8]>,
    start: u32,
) -> Result<Option<SlotIndex>, SlotStoreError> {
    match table.range(start..)?.next() {
        Some(entry) => {
            let (key, _) = entry?;
            Ok(SlotIndex::new(key.value()))
        }
        None => Ok(None),
    }
}

fn read_from(
    table: &impl ReadableTable<u32, &'static [u8]>,
    slot: SlotIndex,
) -> Result<Vec<u8>, SlotStoreError> {
    match table.get(slot.get())? {
        Some(value) => Ok(value.value().to_vec()),
        None => Err(SlotStoreError::NotFound(slot)),
    }
}

impl SlotStore for RedbSlotStore {
    fn next(&self, after: Option<SlotIndex>) -> Result<Option<SlotIndex>, SlotStoreError> {
        let start = match after {
            Some(slot) => match slot.next() {
                Some(next) => next.get(),
                None => return Ok(None),
            },
            None => SlotIndex::FIRST.get(),
        };

        let guard = self.txn.lock();
        match guard.as_ref() {
            Some(txn) => first_from(&txn.open_table(SLOTS_TABLE)?, start),
            None => {
                let read_txn = self.db.begin_read()?;
                first_from(&read_txn.open_table(SLOTS_TABLE)?, start)
            }
        }
    }

    fn read(&self, slot: SlotIndex) -> Result<Vec<u8>, SlotStoreError> {
        let guard = self.txn.lock();
        match guard.as_ref() {
            Some(txn) => read_from(&txn.open_table(SLOTS_TABLE)?, slot),
            None => {
                let read_txn = self.db.begin_read()?;
                read_from(&read_txn.open_table(SLOTS_TABLE)?, slot)
            }
        }
    }

    fn write(&self, record: &[u8]) -> Result<SlotIndex, SlotStoreError> {
        self.with_write(|table| {
            let last = table.last()?.map(|(key, _)| key.value());
            let slot = match last.and_then(SlotIndex::new) {
                Some(last) => last.next().ok_or(SlotStoreError::Exhausted)?,
                None => SlotIndex::FIRST,
            };
            table.insert(slot.get(), record)?;
            Ok(slot)
        })
    }

    fn overwrite(&self, slot: SlotIndex, record: &[u8]) -> Result<(), SlotStoreError> {
        self.with_write(|table| {
            if table.get(slot.get())?.is_none() {
                return Err(SlotStoreError::NotFound(slot));
            }
            table.insert(slot.get(), record)?;
            Ok(())
        })
    }

    fn delete(&self, slot: SlotIndex) -> Result<(), SlotStoreError> {
        self.with_write(|table| {
            table.remove(slot.get())?;
            Ok(())
        })
    }

    fn commit(&self) -> Result<(), SlotStoreError> {
        match self.txn.lock().take() {
            Some(txn) => Ok(txn.commit()?),
            None => Ok(()),
        }
    }
}

/// Opens a [`RedbSlotStore`] at a fixed path on every `open`.
#[derive(Debug, Clone)]
pub struct RedbSlotStoreProvider {
    path: PathBuf,
}

impl RedbSlotStoreProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the provider, making parent directories if needed.
    pub fn new_with_create_dir(path: impl Into<PathBuf>) -> Result<Self, SlotStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SlotStoreProvider for RedbSlotStoreProvider {
    type Store = RedbSlotStore;

    fn open(&self) -> Result<Self::Store, SlotStoreError> {
        RedbSlotStore::open(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_read() {
        let dir = tempdir().unwrap();
        let store = RedbSlotStore::open(dir.path().join("test.sto")).unwrap();

        let slot = store.write(b"hello world").unwrap();
        assert_eq!(slot, SlotIndex::FIRST);
        assert_eq!(store.read(slot).unwrap(), b"hello world");
    }

    #[test]
    fn test_overwrite() {
        let dir = tempdir().unwrap();
        let store = RedbSlotStore::open(dir.path().join("test.sto")).unwrap();

        let slot = store.write(b"first").unwrap();
        store.overwrite(slot, b"second").unwrap();
        assert_eq!(store.read(slot).unwrap(), b"second");

        let missing = SlotIndex::new(99).unwrap();
        assert!(matches!(
            store.overwrite(missing, b"x"),
            Err(SlotStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_and_next() {
        let dir = tempdir().unwrap();
        let store = RedbSlotStore::open(dir.path().join("test.sto")).unwrap();

        for i in 0..4u8 {
            store.write(&[i]).unwrap();
        }
        store.delete(SlotIndex::new(2).unwrap()).unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        while let Some(slot) = store.next(cursor).unwrap() {
            seen.push(slot.get());
            cursor = Some(slot);
        }
        assert_eq!(seen, vec![1, 3, 4]);
    }

    #[test]
    fn test_appends_after_highest_slot() {
        let dir = tempdir().unwrap();
        let store = RedbSlotStore::open(dir.path().join("test.sto")).unwrap();

        store.write(b"a").unwrap();
        let b = store.write(b"b").unwrap();
        store.delete(SlotIndex::FIRST).unwrap();

        assert_eq!(store.write(b"c").unwrap(), b.next().unwrap());
    }

    #[test]
    fn test_provider_reopen() {
        let dir = tempdir().unwrap();
        let provider = RedbSlotStoreProvider::new(dir.path().join("stats.sto"));

        let slot = {
            let store = provider.open().unwrap();
            let slot = store.write(b"persisted").unwrap();
            store.commit().unwrap();
            slot
        };

        let store = provider.open().unwrap();
        assert_eq!(store.read(slot).unwrap(), b"persisted");
    }

    #[test]
    fn test_provider_creates_parent_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.sto");
        let provider = RedbSlotStoreProvider::new_with_create_dir(&path).unwrap();

        let store = provider.open().unwrap();
        store.write(b"x").unwrap();
        store.commit().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_uncommitted_changes_are_discarded() {
        let dir = tempdir().unwrap();
        let provider = RedbSlotStoreProvider::new(dir.path().join("stats.sto"));

        let kept = {
            let store = provider.open().unwrap();
            let slot = store.write(b"kept").unwrap();
            store.commit().unwrap();
            slot
        };
        {
            let store = provider.open().unwrap();
            store.write(b"lost").unwrap();
            store.delete(kept).unwrap();
            // Reads on the same handle see pending changes.
            assert_eq!(store.next(Some(kept)).unwrap().map(SlotIndex::get), Some(2));
            assert!(matches!(store.read(kept), Err(SlotStoreError::NotFound(_))));
        }

        let store = provider.open().unwrap();
        assert_eq!(store.read(kept).unwrap(), b"kept");
        assert_eq!(store.next(Some(kept)).unwrap(), None);
    }

    #[test]
    fn test_one_commit_covers_many_writes() {
        let dir = tempdir().unwrap();
        let provider = RedbSlotStoreProvider::new(dir.path().join("stats.sto"));

        {
            let store = provider.open().unwrap();
            for i in 0..16u8 {
                store.write(&[i]).unwrap();
            }
            store.commit().unwrap();
            // Nothing pending after the commit.
            store.commit().unwrap();
        }

        let store = provider.open().unwrap();
        assert_eq!(store.read(SlotIndex::new(16).unwrap()).unwrap(), vec![15]);
    }
}
