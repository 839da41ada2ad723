#![warn(missing_docs)]

//! Keystores and the keys inside them.
//!
//! This crate provides the three pieces of state behind the key-management
//! service:
//!
//! - the **master key**, provisioned exactly once per deployment by
//!   [`provision_master_key`] and held as a [`MasterKeyReader`] for the
//!   lifetime of the process;
//! - **keystore records** ([`Keystore`]), created from [`KeystoreOptions`]
//!   and persisted through a [`KeystoreRepository`];
//! - **keys**, managed per keystore by a [`LocalKms`] that keeps every key
//!   wrapped under the master key.
//!
//! ```rust
//! use kms_keystore::{KeyType, KmsProvider, provision_master_key};
//! use kms_storage::{MemoryStorageProvider, StorageProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorageProvider::default();
//! let master_key = provision_master_key(&storage).await?;
//!
//! let kms = KmsProvider::new(storage.open_store("kms").await?, &master_key);
//! let keys = kms.kms("ks-1");
//! let key_id = keys.create_key(KeyType::Ed25519).await?;
//! let signature = keys.sign(&key_id, b"hello").await?;
//! keys.verify(&key_id, &signature, b"hello").await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod master_key;
pub use master_key::*;

mod key;
pub use key::*;

mod kms;
pub use kms::*;

mod keystore;
pub use keystore::*;
