//! Keystore records and their persistence.

use chrono::{DateTime, Utc};
use kms_storage::{KmsStorageError, StorageBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ulid::Ulid;

use crate::{KeyType, KeystoreError, LocalKms};

/// Name of the store that holds keystore records.
pub const KEYSTORE_STORE_NAME: &str = "keystore";

/// A keystore: a controller-owned container of keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keystore {
    /// Keystore id
    pub id: String,
    /// DID of the principal that controls the keystore
    pub controller: String,
    /// Key used for delegation, created when a type is requested
    #[serde(rename = "delegateKeyID", default, skip_serializing_if = "Option::is_none")]
    pub delegate_key_id: Option<String>,
    /// Key used to receive encrypted content
    #[serde(rename = "recipientKeyID", default, skip_serializing_if = "Option::is_none")]
    pub recipient_key_id: Option<String>,
    /// Key used to authenticate content
    #[serde(rename = "macKeyID", default, skip_serializing_if = "Option::is_none")]
    pub mac_key_id: Option<String>,
    /// Vault that holds operational keys, when kept remotely
    #[serde(rename = "operationalVaultID", default, skip_serializing_if = "Option::is_none")]
    pub operational_vault_id: Option<String>,
    /// Capability granting access to the operational vault
    #[serde(
        rename = "operationalEDVCapability",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operational_edv_capability: Option<serde_json::Value>,
    /// Keys created inside this keystore
    #[serde(rename = "operationalKeyIDs", default, skip_serializing_if = "Vec::is_empty")]
    pub operational_key_ids: Vec<String>,
    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Options for creating a [`Keystore`]. Keys are only created for the key
/// types that are set.
#[derive(Debug, Clone, Default)]
pub struct KeystoreOptions {
    id: Option<String>,
    controller: String,
    delegate_key_type: Option<KeyType>,
    recipient_key_type: Option<KeyType>,
    mac_key_type: Option<KeyType>,
    operational_vault_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl KeystoreOptions {
    /// Options for a keystore controlled by `controller`.
    pub fn new(controller: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            ..Default::default()
        }
    }

    /// Use a fixed id instead of a generated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Create a delegate key of `key_type` along with the keystore.
    pub fn with_delegate_key_type(mut self, key_type: KeyType) -> Self {
        self.delegate_key_type = Some(key_type);
        self
    }

    /// Create a recipient key of `key_type` along with the keystore.
    pub fn with_recipient_key_type(mut self, key_type: KeyType) -> Self {
        self.recipient_key_type = Some(key_type);
        self
    }

    /// Create a MAC key of `key_type` along with the keystore.
    pub fn with_mac_key_type(mut self, key_type: KeyType) -> Self {
        self.mac_key_type = Some(key_type);
        self
    }

    /// Record the vault holding the keystore's operational keys.
    pub fn with_operational_vault_id(mut self, vault_id: impl Into<String>) -> Self {
        self.operational_vault_id = Some(vault_id.into());
        self
    }

    /// Use a fixed creation time instead of the current time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// The id the keystore will be created with, if fixed.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Persists [`Keystore`] records as JSON, keyed by keystore id.
#[derive(Clone, Debug)]
pub struct KeystoreRepository<Backend> {
    backend: Backend,
}

impl<Backend> KeystoreRepository<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    /// Wrap the opened keystore store.
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Create a keystore from `options`, creating any requested keys through
    /// `kms_for`, which maps the new keystore id to its key manager.
    ///
    /// Fails without writing anything when the controller is empty, and
    /// with [`KeystoreError::AlreadyExists`] when the id is taken.
    pub async fn create<KmsBackend, KmsFor>(
        &self,
        options: KeystoreOptions,
        kms_for: KmsFor,
    ) -> Result<Keystore, KeystoreError>
    where
        KmsBackend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
        KmsFor: FnOnce(&str) -> LocalKms<KmsBackend>,
    {
        if options.controller.is_empty() {
            return Err(KeystoreError::MissingController);
        }

        let id = options
            .id
            .unwrap_or_else(|| Ulid::new().to_string());
        if self.get(&id).await?.is_some() {
            return Err(KeystoreError::AlreadyExists(id));
        }

        let kms = kms_for(&id);
        let mut keystore = Keystore {
            id: id.clone(),
            controller: options.controller,
            delegate_key_id: None,
            recipient_key_id: None,
            mac_key_id: None,
            operational_vault_id: options.operational_vault_id,
            operational_edv_capability: None,
            operational_key_ids: Vec::new(),
            created_at: Some(options.created_at.unwrap_or_else(Utc::now)),
        };
        if let Some(key_type) = options.delegate_key_type {
            keystore.delegate_key_id = Some(kms.create_key(key_type).await?);
        }
        if let Some(key_type) = options.recipient_key_type {
            keystore.recipient_key_id = Some(kms.create_key(key_type).await?);
        }
        if let Some(key_type) = options.mac_key_type {
            keystore.mac_key_id = Some(kms.create_key(key_type).await?);
        }

        let mut backend = self.backend.clone();
        if backend.set_if_absent(id.clone(), encode(&keystore)?).await?.is_some() {
            return Err(KeystoreError::AlreadyExists(id));
        }

        info!(keystore = %keystore.id, controller = %keystore.controller, "created keystore");
        Ok(keystore)
    }

    /// The keystore with the given id, if any.
    pub async fn get(&self, id: &str) -> Result<Option<Keystore>, KeystoreError> {
        match self.backend.get(&id.to_string()).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Record `key_id` as an operational key of keystore `id`.
    pub async fn add_operational_key(&self, id: &str, key_id: &str) -> Result<Keystore, KeystoreError> {
        let mut keystore = self
            .get(id)
            .await?
            .ok_or_else(|| KeystoreError::NotFound(id.to_string()))?;
        keystore.operational_key_ids.push(key_id.to_string());

        let mut backend = self.backend.clone();
        backend.set(id.to_string(), encode(&keystore)?).await?;

        debug!(keystore = %id, %key_id, "recorded operational key");
        Ok(keystore)
    }
}

fn encode(keystore: &Keystore) -> Result<Vec<u8>, KmsStorageError> {
    serde_json::to_vec(keystore).map_err(|error| KmsStorageError::EncodeFailed(error.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Keystore, KmsStorageError> {
    serde_json::from_slice(bytes).map_err(|error| KmsStorageError::DecodeFailed(error.to_string()))
}
