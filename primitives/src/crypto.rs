//! Cryptographic operations for the tokenvm execution core.
//!
//! - Ed25519 for transaction authorization
//! - SHA-256 for transaction, block and warp message ids
//! - BLAKE3 for derived ids (imported assets)
//!
//! Verification is deterministic; randomness is only used for key
//! generation outside the execution path.

use crate::types::Id;

pub fn hash_blake3(data: &[u8]) -> Id {
    *blake3::hash(data).as_bytes()
}

pub fn hash_sha256(data: &[u8]) -> Id {
    use sha2::Digest;
    let result = sha2::Sha256::digest(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Verify an Ed25519 signature.
///
/// Returns `false` for malformed public keys as well as bad signatures.
pub fn verify_ed25519(message: &[u8], signature: &[u8; 64], public_key: &[u8; 32]) -> bool {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let sig = Signature::from_bytes(signature);
    verifying_key.verify(message, &sig).is_ok()
}

pub fn sign_ed25519(message: &[u8], secret_key: &ed25519_dalek::SigningKey) -> [u8; 64] {
    use ed25519_dalek::Signer;
    secret_key.sign(message).to_bytes()
}

/// Generate an Ed25519 keypair from OS randomness.
///
/// Never called from execution code.
pub fn generate_keypair() -> (ed25519_dalek::VerifyingKey, ed25519_dalek::SigningKey) {
    let mut rng = rand::rngs::OsRng;
    let signing_key = ed25519_dalek::SigningKey::generate(&mut rng);
    let verifying_key = signing_key.verifying_key();
    (verifying_key, signing_key)
}
