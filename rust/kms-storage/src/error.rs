use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KmsStorageError {
    /// An error that occurs when a named store cannot be opened
    #[error("Failed to open store '{name}': {reason}")]
    OpenStore {
        /// The logical name of the store
        name: String,
        /// Why the store could not be opened
        reason: String,
    },

    /// An error that occurs while encoding a record for storage
    #[error("Failed to encode a record: {0}")]
    EncodeFailed(String),

    /// An error that occurs while decoding a stored record
    #[error("Failed to decode a record: {0}")]
    DecodeFailed(String),

    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),
}
