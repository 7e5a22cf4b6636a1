//! In-memory slot store for tests (does not persist across restarts).

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{SlotIndex, SlotStore, SlotStoreError, SlotStoreProvider};

const ORD: Ordering = Ordering::SeqCst;

type Slots = BTreeMap<u32, Vec<u8>>;

#[derive(Debug, Default)]
struct Shared {
    slots: Mutex<Slots>,
    open_handles: AtomicUsize,
    opens: AtomicUsize,
    commits: AtomicUsize,
    fail_writes: AtomicBool,
    fail_commits: AtomicBool,
    unavailable: AtomicBool,
}

/// In-memory slot store.
///
/// Cloning yields another view of the same slots, so a test can keep one clone
/// to inspect the store while the registry owns another as its provider.
/// Freed slots are reused lowest-first. Each handle works on its own copy of
/// the slots, published on commit.
#[derive(Debug, Clone, Default)]
pub struct MemorySlotStore {
    shared: Arc<Shared>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a raw record without opening a handle (for seeding fixtures).
    pub fn insert_raw(&self, record: &[u8]) -> Result<SlotIndex, SlotStoreError> {
        allocate(&mut self.shared.slots.lock(), record)
    }

    pub fn get(&self, slot: SlotIndex) -> Option<Vec<u8>> {
        self.shared.slots.lock().get(&slot.get()).cloned()
    }

    pub fn contains(&self, slot: SlotIndex) -> bool {
        self.shared.slots.lock().contains_key(&slot.get())
    }

    pub fn slots(&self) -> Vec<SlotIndex> {
        self.shared
            .slots
            .lock()
            .keys()
            .filter_map(|index| SlotIndex::new(*index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shared.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles currently open (not yet dropped).
    pub fn open_handles(&self) -> usize {
        self.shared.open_handles.load(ORD)
    }

    /// Total number of successful `open` calls.
    pub fn opens(&self) -> usize {
        self.shared.opens.load(ORD)
    }

    /// Total number of successful `commit` calls that published changes.
    pub fn commits(&self) -> usize {
        self.shared.commits.load(ORD)
    }

    /// Make `write` and `overwrite` fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, ORD);
    }

    /// Make `commit` fail until reset. Pending changes stay unpublished.
    pub fn set_fail_commits(&self, fail: bool) {
        self.shared.fail_commits.store(fail, ORD);
    }

    /// Make `open` fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, ORD);
    }

    fn check_writable(&self) -> Result<(), SlotStoreError> {
        if self.shared.fail_writes.load(ORD) {
            return Err(SlotStoreError::Io(std::io::Error::other(
                "injected write failure",
            )));
        }
        Ok(())
    }
}

fn allocate(slots: &mut Slots, record: &[u8]) -> Result<SlotIndex, SlotStoreError> {
    let mut candidate = SlotIndex::FIRST;
    for index in slots.keys() {
        if *index != candidate.get() {
            break;
        }
        candidate = candidate.next().ok_or(SlotStoreError::Exhausted)?;
    }
    slots.insert(candidate.get(), record.to_vec());
    Ok(candidate)
}

impl SlotStoreProvider for MemorySlotStore {
    type Store = MemorySlotHandle;

    fn open(&self) -> Result<Self::Store, SlotStoreError> {
        if self.shared.unavailable.load(ORD) {
            return Err(SlotStoreError::Unavailable("injected open failure".into()));
        }
        self.shared.open_handles.fetch_add(1, ORD);
        self.shared.opens.fetch_add(1, ORD);
        Ok(MemorySlotHandle {
            working: Mutex::new(self.shared.slots.lock().clone()),
            pending: AtomicBool::new(false),
            store: self.clone(),
        })
    }
}

/// Open handle on a [`MemorySlotStore`]; decrements the open count on drop.
#[derive(Debug)]
pub struct MemorySlotHandle {
    store: MemorySlotStore,
    working: Mutex<Slots>,
    pending: AtomicBool,
}

impl Drop for MemorySlotHandle {
    fn drop(&mut self) {
        self.store.shared.open_handles.fetch_sub(1, ORD);
    }
}

impl SlotStore for MemorySlotHandle {
    fn next(&self, after: Option<SlotIndex>) -> Result<Option<SlotIndex>, SlotStoreError> {
        let lower = after.map_or(Bound::Unbounded, |slot| Bound::Excluded(slot.get()));
        Ok(self
            .working
            .lock()
            .range((lower, Bound::Unbounded))
            .next()
            .and_then(|(index, _)| SlotIndex::new(*index)))
    }

    fn read(&self, slot: SlotIndex) -> Result<Vec<u8>, SlotStoreError> {
        self.working
            .lock()
            .get(&slot.get())
            .cloned()
            .ok_or(SlotStoreError::NotFound(slot))
    }

    fn write(&self, record: &[u8]) -> Result<SlotIndex, SlotStoreError> {
        self.store.check_writable()?;
        let slot = allocate(&mut self.working.lock(), record)?;
        self.pending.store(true, ORD);
        Ok(slot)
    }

    fn overwrite(&self, slot: SlotIndex, record: &[u8]) -> Result<(), SlotStoreError> {
        self.store.check_writable()?;
        match self.working.lock().get_mut(&slot.get()) {
            Some(existing) => {
                *existing = record.to_vec();
                self.pending.store(true, ORD);
                Ok(())
            }
            None => Err(SlotStoreError::NotFound(slot)),
        }
    }

    fn delete(&self, slot: SlotIndex) -> Result<(), SlotStoreError> {
        if self.working.lock().remove(&slot.get()).is_some() {
            self.pending.store(true, ORD);
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), SlotStoreError> {
        if !self.pending.load(ORD) {
            return Ok(());
        }
        if self.store.shared.fail_commits.load(ORD) {
            return Err(SlotStoreError::Database("injected commit failure".into()));
        }
        *self.store.shared.slots.lock() = self.working.lock().clone();
        self.pending.store(false, ORD);
        self.store.shared.commits.fetch_add(1, ORD);
        Ok(())
    }
}
