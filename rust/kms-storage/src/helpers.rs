use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    FileSystemStorageBackend, KmsStorageError, MemoryStorageBackend, StorageBackend,
    StorageProvider,
};

/// Creates a persisted [`StorageBackend`] in a fresh temporary directory, for
/// use in tests. The directory lives as long as the returned guard.
pub async fn make_target_storage()
-> Result<(FileSystemStorageBackend<String, Vec<u8>>, tempfile::TempDir)> {
    let root = tempfile::tempdir()?;
    let storage = FileSystemStorageBackend::<String, Vec<u8>>::new(root.path()).await?;
    Ok((storage, root))
}

/// An in-memory store that can be told to fail, and that counts how many
/// writes were attempted against it.
#[derive(Clone, Default)]
pub struct MockStore {
    backend: MemoryStorageBackend<String, Vec<u8>>,
    get_error: Option<KmsStorageError>,
    put_error: Option<KmsStorageError>,
    puts: Arc<AtomicUsize>,
}

impl MockStore {
    /// Make every read fail with `error`.
    pub fn with_get_error(mut self, error: KmsStorageError) -> Self {
        self.get_error = Some(error);
        self
    }

    /// Make every write fail with `error`.
    pub fn with_put_error(mut self, error: KmsStorageError) -> Self {
        self.put_error = Some(error);
        self
    }

    /// The number of writes attempted so far, failed ones included.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn record_put(&self) -> Result<(), KmsStorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        match &self.put_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageBackend for MockStore {
    type Key = String;
    type Value = Vec<u8>;
    type Error = KmsStorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        self.record_put()?;
        self.backend.set(key, value).await
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        if let Some(error) = &self.get_error {
            return Err(error.clone());
        }
        self.backend.get(key).await
    }

    async fn set_if_absent(
        &mut self,
        key: Self::Key,
        value: Self::Value,
    ) -> Result<Option<Self::Value>, Self::Error> {
        self.record_put()?;
        self.backend.set_if_absent(key, value).await
    }
}

/// A [StorageProvider] that hands out one shared [MockStore] for every store
/// name, or fails to open any store at all.
#[derive(Clone, Default)]
pub struct MockStorageProvider {
    store: MockStore,
    open_error: Option<KmsStorageError>,
}

impl MockStorageProvider {
    /// A provider over the given store.
    pub fn new(store: MockStore) -> Self {
        Self {
            store,
            open_error: None,
        }
    }

    /// Make every `open_store` call fail with `error`.
    pub fn with_open_error(mut self, error: KmsStorageError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// The store shared by every opened handle.
    pub fn store(&self) -> &MockStore {
        &self.store
    }
}

#[async_trait]
impl StorageProvider for MockStorageProvider {
    type Backend = MockStore;

    async fn open_store(&self, _name: &str) -> Result<Self::Backend, KmsStorageError> {
        match &self.open_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.store.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[tokio::test]
    async fn it_counts_failed_and_successful_puts() -> Result<()> {
        let mut store = MockStore::default();
        store.set("a".into(), vec![1]).await?;
        store.set_if_absent("b".into(), vec![2]).await?;
        assert_eq!(store.put_count(), 2);

        let mut failing =
            MockStore::default().with_put_error(KmsStorageError::StorageBackend("full".into()));
        assert!(failing.set("a".into(), vec![1]).await.is_err());
        assert_eq!(failing.put_count(), 1);
        assert_eq!(failing.get(&"a".into()).await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn handles_share_the_put_counter() -> Result<()> {
        let provider = MockStorageProvider::default();
        let mut handle = provider.open_store("masterkey").await?;
        handle.set("a".into(), vec![1]).await?;

        assert_eq!(provider.store().put_count(), 1);

        Ok(())
    }
}
