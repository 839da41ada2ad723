use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// The kinds of key a keystore can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Ed25519 signing key
    #[serde(rename = "ED25519")]
    Ed25519,
    /// HMAC-SHA256 MAC key
    #[serde(rename = "HMACSHA256")]
    HmacSha256,
    /// ChaCha20-Poly1305 AEAD key, also used for key wrapping
    #[serde(rename = "CHACHA20POLY1305")]
    ChaCha20Poly1305,
}

impl KeyType {
    /// Every supported key type.
    pub const ALL: [KeyType; 3] = [
        KeyType::Ed25519,
        KeyType::HmacSha256,
        KeyType::ChaCha20Poly1305,
    ];

    /// The wire name of the key type.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ed25519 => "ED25519",
            KeyType::HmacSha256 => "HMACSHA256",
            KeyType::ChaCha20Poly1305 => "CHACHA20POLY1305",
        }
    }
}

impl Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown key type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported key type '{0}'")]
pub struct UnknownKeyType(pub String);

impl FromStr for KeyType {
    type Err = UnknownKeyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyType::ALL
            .into_iter()
            .find(|key_type| key_type.as_str() == s)
            .ok_or_else(|| UnknownKeyType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_wire_names() {
        for key_type in KeyType::ALL {
            assert_eq!(key_type.as_str().parse::<KeyType>(), Ok(key_type));
            assert_eq!(
                serde_json::to_string(&key_type).ok(),
                Some(format!("\"{key_type}\""))
            );
        }
        assert_eq!(
            "RSA".parse::<KeyType>(),
            Err(UnknownKeyType("RSA".to_string()))
        );
    }
}
