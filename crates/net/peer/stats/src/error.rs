use peerstat_storage_slot::SlotStoreError;

/// Errors surfaced by statistics persistence.
///
/// Unreadable records are not errors; they are discarded during load.
#[derive(Debug, thiserror::Error)]
pub enum StatisticsError {
    #[error("statistics store: {0}")]
    Store(#[from] SlotStoreError),
}
