//! Per-keystore key management.
//!
//! Key material never leaves storage in the clear: each key is sealed with
//! ChaCha20-Poly1305 under the master key, bound to its keystore and key id
//! through the associated data.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use hmac::{Hmac, Mac};
use kms_storage::{KmsStorageError, StorageBackend};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use ulid::Ulid;
use zeroize::Zeroizing;

use crate::{KeyType, KmsError, MasterKeyReader, SecretReader};

/// Name of the store that holds sealed key material.
pub const KMS_STORE_NAME: &str = "kms";

/// Associated data bound into every wrapped content-encryption key.
pub const WRAP_AAD: &[u8] = b"kms/wrap";

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;

type HmacSha256 = Hmac<Sha256>;
type KeyMaterial = Zeroizing<[u8; KEY_LENGTH]>;

/// Ciphertext together with the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// The ciphertext, authentication tag included
    pub ciphertext: Vec<u8>,
    /// The 12 byte nonce
    pub nonce: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKey {
    key_type: KeyType,
    nonce: Vec<u8>,
    sealed: Vec<u8>,
}

/// Hands out a [`LocalKms`] for each keystore over one shared store.
#[derive(Clone, Debug)]
pub struct KmsProvider<Backend> {
    backend: Backend,
    master_key: MasterKeyReader,
}

impl<Backend> KmsProvider<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    /// Creates a provider over `backend`, sealing keys with `master_key`.
    pub fn new(backend: Backend, master_key: &MasterKeyReader) -> Self {
        Self {
            backend,
            master_key: master_key.clone(),
        }
    }

    /// The key manager scoped to `keystore_id`.
    pub fn kms(&self, keystore_id: &str) -> LocalKms<Backend> {
        LocalKms {
            keystore_id: keystore_id.to_string(),
            backend: self.backend.clone(),
            master_key: self.master_key.clone(),
        }
    }
}

/// Key management for the keys of a single keystore.
#[derive(Clone, Debug)]
pub struct LocalKms<Backend> {
    keystore_id: String,
    backend: Backend,
    master_key: MasterKeyReader,
}

impl<Backend> LocalKms<Backend>
where
    Backend: StorageBackend<Key = String, Value = Vec<u8>, Error = KmsStorageError>,
{
    /// The keystore this manager operates on.
    pub fn keystore_id(&self) -> &str {
        &self.keystore_id
    }

    /// Generate a key of `key_type` and return its id.
    pub async fn create_key(&self, key_type: KeyType) -> Result<String, KmsError> {
        let key_id = Ulid::new().to_string();
        let material = random_key()?;

        let record_name = self.record_name(&key_id);
        let sealed = seal(
            self.master_secret()?,
            material.as_slice(),
            record_name.as_bytes(),
        )?;
        let stored = StoredKey {
            key_type,
            nonce: sealed.nonce,
            sealed: sealed.ciphertext,
        };
        let bytes = serde_json::to_vec(&stored)
            .map_err(|error| KmsStorageError::EncodeFailed(error.to_string()))?;

        let mut backend = self.backend.clone();
        backend.set(record_name, bytes).await?;

        debug!(keystore = %self.keystore_id, %key_id, %key_type, "created key");
        Ok(key_id)
    }

    /// The type of the key named `key_id`.
    pub async fn key_type(&self, key_id: &str) -> Result<KeyType, KmsError> {
        let (key_type, _) = self.load(key_id).await?;
        Ok(key_type)
    }

    /// The raw public key of an Ed25519 key.
    pub async fn export_public_key(&self, key_id: &str) -> Result<Vec<u8>, KmsError> {
        let signing_key = self.signing_key(key_id, "export").await?;
        Ok(signing_key.verifying_key().to_bytes().to_vec())
    }

    /// Sign `message` with an Ed25519 key.
    pub async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Vec<u8>, KmsError> {
        let signing_key = self.signing_key(key_id, "sign").await?;
        Ok(signing_key.sign(message).to_bytes().to_vec())
    }

    /// Check an Ed25519 `signature` over `message`.
    pub async fn verify(
        &self,
        key_id: &str,
        signature: &[u8],
        message: &[u8],
    ) -> Result<(), KmsError> {
        let signing_key = self.signing_key(key_id, "verify").await?;
        let signature = Signature::from_slice(signature).map_err(|_| KmsError::InvalidSignature)?;
        signing_key
            .verifying_key()
            .verify(message, &signature)
            .map_err(|_| KmsError::InvalidSignature)
    }

    /// Encrypt `plaintext` with a ChaCha20-Poly1305 key, authenticating `aad`.
    pub async fn encrypt(
        &self,
        key_id: &str,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Sealed, KmsError> {
        let key = self
            .material(key_id, KeyType::ChaCha20Poly1305, "encrypt")
            .await?;
        seal(&key, plaintext, aad)
    }

    /// Decrypt the output of [`LocalKms::encrypt`].
    pub async fn decrypt(
        &self,
        key_id: &str,
        ciphertext: &[u8],
        aad: &[u8],
        nonce: &[u8],
    ) -> Result<Vec<u8>, KmsError> {
        let key = self
            .material(key_id, KeyType::ChaCha20Poly1305, "decrypt")
            .await?;
        open(&key, ciphertext, aad, nonce)
    }

    /// Compute an HMAC-SHA256 tag over `data`.
    pub async fn compute_mac(&self, key_id: &str, data: &[u8]) -> Result<Vec<u8>, KmsError> {
        let mac = self.mac(key_id, data, "computeMAC").await?;
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Check an HMAC-SHA256 `tag` over `data` in constant time.
    pub async fn verify_mac(&self, key_id: &str, tag: &[u8], data: &[u8]) -> Result<(), KmsError> {
        let mac = self.mac(key_id, data, "verifyMAC").await?;
        mac.verify_slice(tag).map_err(|_| KmsError::InvalidMac)
    }

    /// Wrap a content-encryption key under a ChaCha20-Poly1305 key.
    pub async fn wrap_key(&self, key_id: &str, cek: &[u8]) -> Result<Sealed, KmsError> {
        let key = self
            .material(key_id, KeyType::ChaCha20Poly1305, "wrap")
            .await?;
        seal(&key, cek, WRAP_AAD)
    }

    /// Recover a content-encryption key wrapped by [`LocalKms::wrap_key`].
    pub async fn unwrap_key(
        &self,
        key_id: &str,
        wrapped: &[u8],
        nonce: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, KmsError> {
        let key = self
            .material(key_id, KeyType::ChaCha20Poly1305, "unwrap")
            .await?;
        open(&key, wrapped, WRAP_AAD, nonce).map(Zeroizing::new)
    }

    fn record_name(&self, key_id: &str) -> String {
        format!("{}/{}", self.keystore_id, key_id)
    }

    fn master_secret(&self) -> Result<&[u8; KEY_LENGTH], KmsError> {
        self.master_key
            .read_secret()
            .try_into()
            .map_err(|_| KmsError::CorruptKey("master key".to_string()))
    }

    async fn load(&self, key_id: &str) -> Result<(KeyType, KeyMaterial), KmsError> {
        let record_name = self.record_name(key_id);
        let bytes = self
            .backend
            .get(&record_name)
            .await?
            .ok_or_else(|| KmsError::KeyNotFound(key_id.to_string()))?;
        let stored: StoredKey = serde_json::from_slice(&bytes)
            .map_err(|error| KmsStorageError::DecodeFailed(error.to_string()))?;

        let plaintext = Zeroizing::new(
            open(
                self.master_secret()?,
                &stored.sealed,
                record_name.as_bytes(),
                &stored.nonce,
            )
            .map_err(|_| KmsError::CorruptKey(key_id.to_string()))?,
        );
        let mut material = Zeroizing::new([0u8; KEY_LENGTH]);
        if plaintext.len() != KEY_LENGTH {
            return Err(KmsError::CorruptKey(key_id.to_string()));
        }
        material.copy_from_slice(&plaintext);

        Ok((stored.key_type, material))
    }

    async fn material(
        &self,
        key_id: &str,
        expected: KeyType,
        operation: &'static str,
    ) -> Result<KeyMaterial, KmsError> {
        let (key_type, material) = self.load(key_id).await?;
        if key_type != expected {
            return Err(KmsError::UnsupportedOperation {
                key_type,
                operation,
            });
        }
        Ok(material)
    }

    async fn signing_key(
        &self,
        key_id: &str,
        operation: &'static str,
    ) -> Result<SigningKey, KmsError> {
        let seed = self.material(key_id, KeyType::Ed25519, operation).await?;
        Ok(SigningKey::from_bytes(&seed))
    }

    async fn mac(
        &self,
        key_id: &str,
        data: &[u8],
        operation: &'static str,
    ) -> Result<HmacSha256, KmsError> {
        let key = self
            .material(key_id, KeyType::HmacSha256, operation)
            .await?;
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_slice())
            .map_err(|_| KmsError::CorruptKey(key_id.to_string()))?;
        mac.update(data);
        Ok(mac)
    }
}

fn random_key() -> Result<KeyMaterial, KmsError> {
    let mut material = Zeroizing::new([0u8; KEY_LENGTH]);
    getrandom::getrandom(material.as_mut_slice()).map_err(KmsError::Rng)?;
    Ok(material)
}

fn seal(key: &[u8; KEY_LENGTH], plaintext: &[u8], aad: &[u8]) -> Result<Sealed, KmsError> {
    let mut nonce = [0u8; NONCE_LENGTH];
    getrandom::getrandom(&mut nonce).map_err(KmsError::Rng)?;

    let cipher = ChaCha20Poly1305::new(key.into());
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| KmsError::EncryptionFailed)?;

    Ok(Sealed {
        ciphertext,
        nonce: nonce.to_vec(),
    })
}

fn open(
    key: &[u8; KEY_LENGTH],
    ciphertext: &[u8],
    aad: &[u8],
    nonce: &[u8],
) -> Result<Vec<u8>, KmsError> {
    if nonce.len() != NONCE_LENGTH {
        return Err(KmsError::InvalidNonce(nonce.len()));
    }

    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| KmsError::DecryptionFailed)
}
