//! JSON bodies of the KMS endpoints. Binary fields travel as standard
//! base64.

use kms_keystore::KeyType;
use serde::{Deserialize, Serialize};

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

/// Body of `POST /keystores`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeystoreRequest {
    /// DID of the keystore controller
    pub controller: String,
    /// Key type of the delegate key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_key_type: Option<KeyType>,
    /// Key type of the recipient key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_key_type: Option<KeyType>,
    /// Key type of the MAC key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_key_type: Option<KeyType>,
    /// Vault the keystore is operated with
    #[serde(rename = "operationalVaultID", default, skip_serializing_if = "Option::is_none")]
    pub operational_vault_id: Option<String>,
}

/// Body of `POST /keystores/{keystoreID}/keys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    /// Type of key to create
    pub key_type: KeyType,
}

/// Public half of an exported key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportKeyResponse {
    /// The public key bytes
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

/// Body of the sign endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// Message to sign
    #[serde(with = "base64_bytes")]
    pub message: Vec<u8>,
}

/// Result of the sign endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResponse {
    /// The signature
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

/// Body of the verify endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Signature to check
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
    /// Message the signature covers
    #[serde(with = "base64_bytes")]
    pub message: Vec<u8>,
}

/// Body of the encrypt endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptRequest {
    /// Plain text to encrypt
    #[serde(with = "base64_bytes")]
    pub message: Vec<u8>,
    /// Additional authenticated data, empty when absent
    #[serde(default, with = "base64_bytes")]
    pub aad: Vec<u8>,
}

/// Result of the encrypt endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResponse {
    /// The sealed message
    #[serde(with = "base64_bytes")]
    pub cipher_text: Vec<u8>,
    /// Nonce the message was sealed with
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
}

/// Body of the decrypt endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    /// The sealed message
    #[serde(with = "base64_bytes")]
    pub cipher_text: Vec<u8>,
    /// Additional authenticated data, empty when absent
    #[serde(default, with = "base64_bytes")]
    pub aad: Vec<u8>,
    /// Nonce returned by encrypt
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
}

/// Result of the decrypt endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptResponse {
    /// The opened message
    #[serde(with = "base64_bytes")]
    pub plain_text: Vec<u8>,
}

/// Body of the compute mac endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeMacRequest {
    /// Data to authenticate
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Result of the compute mac endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeMacResponse {
    /// The MAC
    #[serde(with = "base64_bytes")]
    pub mac: Vec<u8>,
}

/// Body of the verify mac endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyMacRequest {
    /// MAC to check
    #[serde(with = "base64_bytes")]
    pub mac: Vec<u8>,
    /// Data the MAC covers
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Body of the wrap endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapRequest {
    /// Content encryption key to wrap
    #[serde(with = "base64_bytes")]
    pub cek: Vec<u8>,
}

/// Result of the wrap endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapResponse {
    /// The wrapped key
    #[serde(with = "base64_bytes")]
    pub wrapped_key: Vec<u8>,
    /// Nonce the key was wrapped with
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
}

/// Body of the unwrap endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwrapRequest {
    /// Key returned by wrap
    #[serde(with = "base64_bytes")]
    pub wrapped_key: Vec<u8>,
    /// Nonce returned by wrap
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
}

/// Result of the unwrap endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwrapResponse {
    /// The unwrapped content encryption key
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
}
