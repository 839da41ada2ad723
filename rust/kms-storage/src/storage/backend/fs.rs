use crate::KmsStorageError;
use async_trait::async_trait;
use base58::ToBase58;
use std::{
    io::{ErrorKind, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use super::StorageBackend;

/// A basic file-system-based [StorageBackend] implementation. All values are
/// stored inside a root directory as files named after their (base58-encoded)
/// keys.
#[derive(Clone)]
pub struct FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    root_dir: PathBuf,
    key_type: PhantomData<Key>,
    value_type: PhantomData<Value>,
}

impl<Key, Value> FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone,
    Value: AsRef<[u8]> + From<Vec<u8>> + Clone,
{
    /// Creates a new [`FileSystemStorageBackend`] that stores files in
    /// `root_dir`.
    pub async fn new<Pathlike>(root_dir: Pathlike) -> Result<Self, KmsStorageError>
    where
        Pathlike: AsRef<Path>,
    {
        let root_dir = root_dir.as_ref().to_owned();
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|error| KmsStorageError::StorageBackend(format!("{error}")))?;
        Ok(Self {
            root_dir,
            key_type: PhantomData,
            value_type: PhantomData,
        })
    }

    /// The directory this backend keeps its files in.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn make_path(&self, key: &Key) -> PathBuf {
        self.root_dir.join(key.as_ref().to_base58())
    }

    async fn read_path(path: PathBuf) -> Result<Option<Value>, KmsStorageError> {
        match tokio::fs::read(path).await {
            Ok(value) => Ok(Some(Value::from(value))),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(KmsStorageError::StorageBackend(format!("{error}"))),
        }
    }
}

#[async_trait]
impl<Key, Value> StorageBackend for FileSystemStorageBackend<Key, Value>
where
    Key: AsRef<[u8]> + Clone + Send + Sync,
    Value: AsRef<[u8]> + Clone + From<Vec<u8>> + Send + Sync,
{
    type Key = Key;
    type Value = Value;
    type Error = KmsStorageError;

    async fn set(&mut self, key: Self::Key, value: Self::Value) -> Result<(), Self::Error> {
        tokio::fs::write(self.make_path(&key), value)
            .await
            .map_err(|error| KmsStorageError::StorageBackend(format!("{error}")))?;
        Ok(())
    }

    async fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>, Self::Error> {
        Self::read_path(self.make_path(key)).await
    }

    async fn set_if_absent(
        &mut self,
        key: Self::Key,
        value: Self::Value,
    ) -> Result<Option<Self::Value>, Self::Error> {
        let path = self.make_path(&key);
        let root_dir = self.root_dir.clone();
        let bytes = value.as_ref().to_vec();

        // The value is written to a temporary file first and then linked into
        // place, so readers never observe a partially written entry and a
        // second writer fails instead of clobbering the first.
        let target = path.clone();
        let persisted = tokio::task::spawn_blocking(move || {
            let mut file = tempfile::NamedTempFile::new_in(&root_dir)?;
            file.write_all(&bytes)?;
            file.as_file().sync_all()?;
            match file.persist_noclobber(&target) {
                Ok(_) => Ok(true),
                Err(error) if error.error.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(error) => Err(error.error),
            }
        })
        .await
        .map_err(|error| KmsStorageError::StorageBackend(format!("{error}")))?
        .map_err(|error: std::io::Error| KmsStorageError::StorageBackend(format!("{error}")))?;

        if persisted {
            return Ok(None);
        }

        debug!(path = %path.display(), "entry already present; write not applied");
        match Self::read_path(path.clone()).await? {
            Some(existing) => Ok(Some(existing)),
            None => {
                warn!(path = %path.display(), "entry vanished while resolving a conflicting write");
                Err(KmsStorageError::StorageBackend(
                    "entry vanished while resolving a conflicting write".to_string(),
                ))
            }
        }
    }
}
