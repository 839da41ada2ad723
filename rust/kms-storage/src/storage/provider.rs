use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{FileSystemStorageBackend, KmsStorageError, MemoryStorageBackend, StorageBackend};

/// Opens named stores. Each logical store (keystore metadata, the master key,
/// capabilities, wrapped key material) is kept apart from the others.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// The store handle produced by this provider
    type Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>
        + 'static;

    /// Open (creating it if needed) the store with the given name
    async fn open_store(&self, name: &str) -> Result<Self::Backend, KmsStorageError>;
}

/// A [StorageProvider] whose stores live in memory for the lifetime of the
/// provider. Opening the same name twice yields handles onto the same store.
#[derive(Clone, Default)]
pub struct MemoryStorageProvider {
    stores: Arc<Mutex<HashMap<String, MemoryStorageBackend<String, Vec<u8>>>>>,
}

#[async_trait]
impl StorageProvider for MemoryStorageProvider {
    type Backend = MemoryStorageBackend<String, Vec<u8>>;

    async fn open_store(&self, name: &str) -> Result<Self::Backend, KmsStorageError> {
        let mut stores = self.stores.lock().await;
        Ok(stores.entry(name.to_string()).or_default().clone())
    }
}

/// A [StorageProvider] that keeps each store in its own sub-directory of a
/// root directory.
#[derive(Clone, Debug)]
pub struct FileSystemStorageProvider {
    root_dir: PathBuf,
}

impl FileSystemStorageProvider {
    /// Creates a provider rooted at `root_dir`. Directories are created
    /// lazily when a store is opened.
    pub fn new<Pathlike>(root_dir: Pathlike) -> Self
    where
        Pathlike: AsRef<Path>,
    {
        Self {
            root_dir: root_dir.as_ref().to_owned(),
        }
    }
}

#[async_trait]
impl StorageProvider for FileSystemStorageProvider {
    type Backend = FileSystemStorageBackend<String, Vec<u8>>;

    async fn open_store(&self, name: &str) -> Result<Self::Backend, KmsStorageError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(KmsStorageError::OpenStore {
                name: name.to_string(),
                reason: "store names must be a single path segment".to_string(),
            });
        }

        FileSystemStorageBackend::new(self.root_dir.join(name))
            .await
            .map_err(|error| KmsStorageError::OpenStore {
                name: name.to_string(),
                reason: error.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[tokio::test]
    async fn it_shares_memory_stores_by_name() -> Result<()> {
        let provider = MemoryStorageProvider::default();

        let mut first = provider.open_store("keystore").await?;
        first.set("a".into(), vec![1]).await?;

        let second = provider.open_store("keystore").await?;
        assert_eq!(second.get(&"a".into()).await?, Some(vec![1]));

        let other = provider.open_store("masterkey").await?;
        assert_eq!(other.get(&"a".into()).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn it_keeps_file_system_stores_in_separate_directories() -> Result<()> {
        let root = tempfile::tempdir()?;
        let provider = FileSystemStorageProvider::new(root.path());

        let mut keystore = provider.open_store("keystore").await?;
        keystore.set("a".into(), vec![1]).await?;

        let capability = provider.open_store("capability").await?;
        assert_eq!(capability.get(&"a".into()).await?, None);
        assert_eq!(keystore.root_dir(), root.path().join("keystore"));

        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_store_names_that_escape_the_root() -> Result<()> {
        let root = tempfile::tempdir()?;
        let provider = FileSystemStorageProvider::new(root.path());

        for name in ["", "..", "a/b"] {
            let result = provider.open_store(name).await;
            assert!(matches!(result, Err(KmsStorageError::OpenStore { .. })));
        }

        Ok(())
    }
}
