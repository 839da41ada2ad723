use async_trait::async_trait;

use crate::KmsStorageError;

mod memory;
pub use memory::*;

mod fs;
pub use fs::*;

/// A [StorageBackend] is a facade over some generalized storage substrate that
/// is capable of storing and/or retrieving values by some key
#[async_trait]
pub trait StorageBackend: Clone + Send + Sync {
    /// The key type used by this [StorageBackend]
    type Key: Send + Sync;
    /// The value type able to be stored by this [StorageBackend]
    type Value: Send;
    /// The error type produced by this [StorageBackend]
    type Error: Into<KmsStorageError>;

    /// Store the given value against the given key
    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error>;

    /// Retrieve a value (if any) stored against the given key
    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error>;

    /// Store the given value only if nothing is stored against the key yet.
    ///
    /// The check and the write are a single atomic step. Returns `None` when
    /// the value was written, or `Some(existing)` carrying the value that was
    /// already stored (and was left untouched).
    async fn set_if_absent(
        &mut self,
        key: Self::Key,
        value: Self::Value,
    ) -> Result<Option<Self::Value>, Self::Error>;
}
