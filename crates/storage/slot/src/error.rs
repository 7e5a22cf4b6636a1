//! Slot store error types.

use crate::SlotIndex;

/// Errors from slot store operations.
#[derive(Debug, thiserror::Error)]
pub enum SlotStoreError {
    /// The slot holds no record.
    #[error("slot {0} is empty")]
    NotFound(SlotIndex),

    /// No free slot index is left.
    #[error("slot index space exhausted")]
    Exhausted,

    /// The store could not be opened or is no longer usable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Database backend error.
    #[error("database error: {0}")]
    Database(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "redb")]
mod redb_errors {
    use super::SlotStoreError;

    impl From<redb::DatabaseError> for SlotStoreError {
        fn from(err: redb::DatabaseError) -> Self {
            SlotStoreError::Unavailable(err.to_string())
        }
    }

    impl From<redb::TransactionError> for SlotStoreError {
        fn from(err: redb::TransactionError) -> Self {
            SlotStoreError::Database(err.to_string())
        }
    }

    impl From<redb::TableError> for SlotStoreError {
        fn from(err: redb::TableError) -> Self {
            SlotStoreError::Database(err.to_string())
        }
    }

    impl From<redb::StorageError> for SlotStoreError {
        fn from(err: redb::StorageError) -> Self {
            SlotStoreError::Database(err.to_string())
        }
    }

    impl From<redb::CommitError> for SlotStoreError {
        fn from(err: redb::CommitError) -> Self {
            SlotStoreError::Database(err.to_string())
        }
    }
}
