#![warn(missing_docs)]

//! Named key/value stores for the key-management service.
//!
//! A [StorageProvider] opens stores by logical name (`keystore`,
//! `masterkey`, `capability`, `kms`), and each store is a [StorageBackend]
//! with three operations: read a value, write a value, and write a value only
//! if nothing is stored yet.
//!
//! ```rust
//! use kms_storage::{MemoryStorageProvider, StorageBackend, StorageProvider};
//!
//! # async fn example() -> Result<(), kms_storage::KmsStorageError> {
//! let provider = MemoryStorageProvider::default();
//! let mut store = provider.open_store("keystore").await?;
//!
//! store.set("ks-1".to_string(), b"{}".to_vec()).await?;
//! assert_eq!(store.get(&"ks-1".to_string()).await?, Some(b"{}".to_vec()));
//! # Ok(())
//! # }
//! ```
//!
//! A missing entry is `Ok(None)`, never an error, so callers can tell "not
//! found" apart from a failing backend.

mod error;
pub use error::*;

mod storage;
pub use storage::*;

#[cfg(any(test, feature = "helpers"))]
mod helpers;
#[cfg(any(test, feature = "helpers"))]
pub use helpers::*;
