use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, VerifyingKey};
use signature::Verifier;

use crate::VerificationError;

/// A signature suite an invocation may be signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureSuite {
    /// Ed25519 signatures over the HTTP signing string
    Ed25519Signature2018,
}

impl SignatureSuite {
    /// The HTTP-signature `algorithm` parameter this suite answers to.
    pub fn algorithm(&self) -> &'static str {
        match self {
            SignatureSuite::Ed25519Signature2018 => "ed25519",
        }
    }

    /// Verify a base64 encoded `signature` over `message`.
    pub fn verify(
        &self,
        key: &VerifyingKey,
        message: &[u8],
        signature: &str,
    ) -> Result<(), VerificationError> {
        match self {
            SignatureSuite::Ed25519Signature2018 => {
                let bytes = STANDARD
                    .decode(signature)
                    .map_err(|_| VerificationError::InvalidSignature)?;
                let signature = Signature::from_slice(&bytes)
                    .map_err(|_| VerificationError::InvalidSignature)?;
                key.verify(message, &signature)
                    .map_err(|_| VerificationError::InvalidSignature)
            }
        }
    }
}
