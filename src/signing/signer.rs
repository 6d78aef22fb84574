use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use super::Claim;

const SEED_LEN: usize = 32;

/// Claim JSON plus a detached signature over exactly its UTF-8 bytes.
///
/// The payload travels as the JSON text itself, so a client verifies
/// `payload` as-is and then parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedLicense {
    pub payload: String,
    /// Lower-case hex Ed25519 signature.
    pub signature: String,
}

/// Process-wide Ed25519 signing key.
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("public_key", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn from_bytes(seed: [u8; SEED_LEN]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Load a 32-byte seed encoded as standard base64.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| AppError::Internal(format!("Invalid signing key encoding: {}", e)))?;

        let seed: [u8; SEED_LEN] = decoded.as_slice().try_into().map_err(|_| {
            AppError::Internal(format!(
                "Signing key must be {} bytes, got {}",
                SEED_LEN,
                decoded.len()
            ))
        })?;

        Ok(Self::from_bytes(seed))
    }

    /// Fresh random key. Used by tests and local runs without a configured key.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.verifying_key().to_bytes())
    }

    /// Serialize the claim in field-declaration order and sign the bytes.
    pub fn seal<C: Claim>(&self, claim: &C) -> Result<SealedLicense> {
        let payload = serde_json::to_string(claim)?;
        let signature = self.key.sign(payload.as_bytes());

        Ok(SealedLicense {
            payload,
            signature: hex::encode(signature.to_bytes()),
        })
    }
}

/// Check a sealed payload against a public key. Any malformed input is
/// simply a failed verification.
pub fn verify(public_key: &VerifyingKey, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    public_key.verify(payload, &signature).is_ok()
}
