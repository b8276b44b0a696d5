//! Signing Authority
//!
//! The chain writer only ever sees the `Signer` capability. The concrete
//! authority shipped here signs with a local secp256k1 key; anything that can
//! sign a digest string (an HSM client, a remote KMS) fits the same trait.

use std::path::Path;

use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey, VerifyOnly};
use sha2::{Digest, Sha256};

use crate::error::{AuditError, AuditResult};

/// Checks a signature over an entry digest.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, digest: &str, signature: &str) -> bool;
}

/// Produces signatures over entry digests.
///
/// Implementations report any failure as `AuditError::SigningUnavailable`.
pub trait Signer: SignatureVerifier {
    fn sign(&self, digest: &str) -> AuditResult<String>;
}

/// Borrow a signer where only verification is needed.
pub struct SignerVerifier<'a>(pub &'a dyn Signer);

impl SignatureVerifier for SignerVerifier<'_> {
    fn verify(&self, digest: &str, signature: &str) -> bool {
        self.0.verify(digest, signature)
    }
}

fn message_for(digest: &str) -> AuditResult<Message> {
    let message_hash = Sha256::digest(digest.as_bytes());
    Message::from_digest_slice(&message_hash)
        .map_err(|e| AuditError::CryptoError(format!("Invalid message hash: {}", e)))
}

fn verify_with<C: secp256k1::Verification>(
    secp: &Secp256k1<C>,
    public_key: &PublicKey,
    digest: &str,
    signature: &str,
) -> bool {
    let Ok(message) = message_for(digest) else {
        return false;
    };
    let Ok(bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_compact(&bytes) else {
        return false;
    };
    secp.verify_ecdsa(&message, &signature, public_key).is_ok()
}

/// ECDSA/secp256k1 signing authority backed by a local secret key
pub struct Secp256k1Signer {
    secp: Secp256k1<All>,
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Secp256k1Signer {
    pub fn new(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secp,
            secret_key,
            public_key,
        }
    }

    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        Self::new(SecretKey::new(&mut OsRng))
    }

    pub fn from_secret_hex(secret_hex: &str) -> AuditResult<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| AuditError::CryptoError(format!("Invalid secret key hex: {}", e)))?;
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| AuditError::CryptoError(format!("Invalid secret key: {}", e)))?;
        Ok(Self::new(secret_key))
    }

    /// Load a hex-encoded secret key written by `key-manager generate`.
    pub fn from_key_file(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuditError::SigningUnavailable(format!(
                "Failed to read signing key {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_secret_hex(&contents)
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Compressed SEC1 public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    pub fn verifier(&self) -> PublicKeyVerifier {
        PublicKeyVerifier::new(self.public_key)
    }
}

impl SignatureVerifier for Secp256k1Signer {
    fn verify(&self, digest: &str, signature: &str) -> bool {
        verify_with(&self.secp, &self.public_key, digest, signature)
    }
}

impl Signer for Secp256k1Signer {
    fn sign(&self, digest: &str) -> AuditResult<String> {
        let message = message_for(digest)
            .map_err(|e| AuditError::SigningUnavailable(e.to_string()))?;
        let signature = self.secp.sign_ecdsa(&message, &self.secret_key);
        Ok(hex::encode(signature.serialize_compact()))
    }
}

/// Verify-only counterpart holding just the public key
pub struct PublicKeyVerifier {
    secp: Secp256k1<VerifyOnly>,
    public_key: PublicKey,
}

impl PublicKeyVerifier {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            secp: Secp256k1::verification_only(),
            public_key,
        }
    }

    pub fn from_hex(public_key_hex: &str) -> AuditResult<Self> {
        let bytes = hex::decode(public_key_hex.trim())
            .map_err(|e| AuditError::CryptoError(format!("Invalid public key hex: {}", e)))?;
        let public_key = PublicKey::from_slice(&bytes)
            .map_err(|e| AuditError::CryptoError(format!("Invalid public key: {}", e)))?;
        Ok(Self::new(public_key))
    }
}

impl SignatureVerifier for PublicKeyVerifier {
    fn verify(&self, digest: &str, signature: &str) -> bool {
        verify_with(&self.secp, &self.public_key, digest, signature)
    }
}
