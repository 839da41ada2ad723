//! Get-or-create provisioning of the process-wide master key.

use std::{fmt::Debug, sync::Arc};

use kms_storage::{StorageBackend, StorageProvider};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::MasterKeyError;

/// Name of the store that holds the master key.
pub const MASTER_KEY_STORE_NAME: &str = "masterkey";

/// Record name of the master key inside [`MASTER_KEY_STORE_NAME`].
pub const MASTER_KEY_DB_KEY_NAME: &str = "masterkey";

/// Length of the master key in bytes.
pub const MASTER_KEY_LENGTH: usize = 32;

/// Read access to a secret held in memory.
pub trait SecretReader: Send + Sync {
    /// The secret bytes.
    fn read_secret(&self) -> &[u8];
}

/// The provisioned master key. Clones share the same zeroize-on-drop buffer.
#[derive(Clone)]
pub struct MasterKeyReader {
    secret: Arc<Zeroizing<[u8; MASTER_KEY_LENGTH]>>,
}

impl MasterKeyReader {
    fn new(secret: Zeroizing<[u8; MASTER_KEY_LENGTH]>) -> Self {
        Self {
            secret: Arc::new(secret),
        }
    }

    fn from_stored(bytes: &[u8]) -> Result<Self, MasterKeyError> {
        let mut secret = Zeroizing::new([0u8; MASTER_KEY_LENGTH]);
        if bytes.len() != MASTER_KEY_LENGTH {
            return Err(MasterKeyError::InvalidLength(bytes.len()));
        }
        secret.copy_from_slice(bytes);
        Ok(Self::new(secret))
    }
}

impl SecretReader for MasterKeyReader {
    fn read_secret(&self) -> &[u8] {
        self.secret.as_slice()
    }
}

impl Debug for MasterKeyReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKeyReader")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Returns the master key, generating and persisting it on first use.
///
/// Every call against the same storage yields the same key bytes. A fresh
/// key is written with create-if-absent semantics: when two processes race
/// on an empty store, the loser discards its candidate and adopts the key
/// the winner persisted. Any storage failure (opening the store, reading, or
/// writing) is returned unchanged and no reader is produced. A read failure
/// other than "not found" never leads to a write.
pub async fn provision_master_key<Provider>(
    provider: &Provider,
) -> Result<MasterKeyReader, MasterKeyError>
where
    Provider: StorageProvider,
{
    let mut store = provider.open_store(MASTER_KEY_STORE_NAME).await?;
    let key = MASTER_KEY_DB_KEY_NAME.to_string();

    if let Some(stored) = store.get(&key).await? {
        debug!("using the persisted master key");
        return MasterKeyReader::from_stored(&stored);
    }

    let candidate = generate_master_key()?;
    match store.set_if_absent(key, candidate.to_vec()).await? {
        None => {
            info!("generated and persisted a new master key");
            Ok(MasterKeyReader::new(candidate))
        }
        Some(winner) => {
            warn!("master key was provisioned concurrently, adopting the persisted key");
            MasterKeyReader::from_stored(&winner)
        }
    }
}

fn generate_master_key() -> Result<Zeroizing<[u8; MASTER_KEY_LENGTH]>, MasterKeyError> {
    let mut secret = Zeroizing::new([0u8; MASTER_KEY_LENGTH]);
    getrandom::getrandom(secret.as_mut_slice()).map_err(MasterKeyError::Rng)?;
    Ok(secret)
}
