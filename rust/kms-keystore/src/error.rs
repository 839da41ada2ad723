use kms_storage::KmsStorageError;

use crate::KeyType;

/// Errors from provisioning the master key.
#[derive(Debug, thiserror::Error)]
pub enum MasterKeyError {
    /// The master key store could not be opened, read or written. The
    /// storage error is passed through as-is.
    #[error(transparent)]
    Storage(#[from] KmsStorageError),

    /// Fresh key material could not be generated.
    #[error("failed to generate master key: {0}")]
    Rng(getrandom::Error),

    /// The stored master key is not usable.
    #[error("stored master key has {0} bytes, expected {expected}", expected = crate::MASTER_KEY_LENGTH)]
    InvalidLength(usize),
}

/// Errors from key-management operations.
#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] KmsStorageError),

    /// No key with the given id exists in the keystore.
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    /// The key type does not support the requested operation.
    #[error("{key_type} keys do not support {operation}")]
    UnsupportedOperation {
        /// Type of the key
        key_type: KeyType,
        /// The requested operation
        operation: &'static str,
    },

    /// Key material or a nonce could not be generated.
    #[error("failed to generate random bytes: {0}")]
    Rng(getrandom::Error),

    /// A stored key could not be unwrapped with the master key.
    #[error("stored key '{0}' cannot be unwrapped")]
    CorruptKey(String),

    /// A signature does not verify.
    #[error("signature verification failed")]
    InvalidSignature,

    /// A MAC does not verify.
    #[error("MAC verification failed")]
    InvalidMac,

    /// Encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Authenticated decryption failed.
    #[error("decryption failed")]
    DecryptionFailed,

    /// A nonce has the wrong length.
    #[error("nonce has {0} bytes, expected 12")]
    InvalidNonce(usize),
}

/// Errors from keystore operations.
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] KmsStorageError),

    /// Creating one of the keystore's keys failed.
    #[error(transparent)]
    Kms(#[from] KmsError),

    /// A keystore must name its controller.
    #[error("keystore controller is required")]
    MissingController,

    /// A keystore with the same id exists.
    #[error("keystore '{0}' already exists")]
    AlreadyExists(String),

    /// No keystore with the given id exists.
    #[error("keystore '{0}' not found")]
    NotFound(String),
}
