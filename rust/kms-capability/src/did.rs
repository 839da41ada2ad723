//! Ed25519 `did:key` principals and key resolution.

use std::{fmt::Display, str::FromStr};

use async_trait::async_trait;
use base58::{FromBase58, ToBase58};
use ed25519_dalek::VerifyingKey;

use crate::VerificationError;

/// Multicodec prefix of an Ed25519 public key.
const ED25519_PUB: [u8; 2] = [0xed, 0x01];

/// Errors that can occur when parsing a [`DidKey`] from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum DidKeyFromStrError {
    /// The DID header is invalid.
    #[error("invalid did header")]
    InvalidDidHeader,

    /// The base58 prefix 'z' is missing.
    #[error("missing base58 prefix 'z'")]
    MissingBase58Prefix,

    /// The base58 encoding is invalid.
    #[error("invalid base58 encoding")]
    InvalidBase58,

    /// The key bytes are invalid.
    #[error("invalid key bytes")]
    InvalidKey,
}

/// An Ed25519 `did:key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DidKey(pub VerifyingKey);

impl DidKey {
    /// The public key this DID encodes.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }

    /// The multibase-encoded key, which is also the fragment of the DID's
    /// verification method id.
    pub fn fingerprint(&self) -> String {
        let mut raw_bytes = Vec::with_capacity(34);
        raw_bytes.extend_from_slice(&ED25519_PUB);
        raw_bytes.extend_from_slice(self.0.as_bytes());
        format!("z{}", raw_bytes.to_base58())
    }

    /// The verification method id (`did:key:z…#z…`) used as a signature key id.
    pub fn key_id(&self) -> String {
        format!("{self}#{}", self.fingerprint())
    }
}

impl From<VerifyingKey> for DidKey {
    fn from(key: VerifyingKey) -> Self {
        DidKey(key)
    }
}

impl Display for DidKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "did:key:{}", self.fingerprint())
    }
}

impl FromStr for DidKey {
    type Err = DidKeyFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != "did" || parts[1] != "key" {
            return Err(DidKeyFromStrError::InvalidDidHeader);
        }
        let b58 = parts[2]
            .strip_prefix('z')
            .ok_or(DidKeyFromStrError::MissingBase58Prefix)?;
        let key_bytes = b58
            .from_base58()
            .map_err(|_| DidKeyFromStrError::InvalidBase58)?;
        let raw_arr = <[u8; 34]>::try_from(key_bytes.as_slice())
            .map_err(|_| DidKeyFromStrError::InvalidKey)?;
        if raw_arr[..2] != ED25519_PUB {
            return Err(DidKeyFromStrError::InvalidKey);
        }
        let key_arr: [u8; 32] = raw_arr[2..]
            .try_into()
            .map_err(|_| DidKeyFromStrError::InvalidKey)?;
        let key =
            VerifyingKey::from_bytes(&key_arr).map_err(|_| DidKeyFromStrError::InvalidKey)?;
        Ok(DidKey(key))
    }
}

/// A verification key resolved from a signature key id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    /// DID of the key's controller (the key id without its fragment)
    pub controller: String,
    /// The public key
    pub public_key: VerifyingKey,
}

/// Resolves the key id named by a signature to a verification key.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Resolve `key_id` to its verification key and controller.
    async fn resolve(&self, key_id: &str) -> Result<ResolvedKey, VerificationError>;
}

/// Resolves Ed25519 `did:key` identifiers, with or without a fragment,
/// without any network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct DidKeyResolver;

#[async_trait]
impl KeyResolver for DidKeyResolver {
    async fn resolve(&self, key_id: &str) -> Result<ResolvedKey, VerificationError> {
        let resolution_error = |reason: String| VerificationError::KeyResolution {
            key_id: key_id.to_string(),
            reason,
        };

        let (did, fragment) = match key_id.split_once('#') {
            Some((did, fragment)) => (did, Some(fragment)),
            None => (key_id, None),
        };
        let did_key: DidKey = did
            .parse()
            .map_err(|error: DidKeyFromStrError| resolution_error(error.to_string()))?;

        if let Some(fragment) = fragment {
            if fragment != did_key.fingerprint() {
                return Err(resolution_error(format!(
                    "unknown verification method '#{fragment}'"
                )));
            }
        }

        Ok(ResolvedKey {
            controller: did.to_string(),
            public_key: did_key.0,
        })
    }
}
