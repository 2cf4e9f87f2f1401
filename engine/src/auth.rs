//! Transaction authenticators.

use ed25519_dalek::SigningKey;
use tokenvm_primitives::codec::{self, Reader};
use tokenvm_primitives::crypto::{sign_ed25519, verify_ed25519};
use tokenvm_primitives::{Address, CodecError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// Single ed25519 signer; the signer is both actor and fee payer.
    Ed25519 { signer: Address, signature: [u8; 64] },
}

impl Auth {
    pub const ED25519: u8 = 0;

    pub fn sign(digest: &[u8], key: &SigningKey) -> Self {
        Self::Ed25519 {
            signer: *key.verifying_key().as_bytes(),
            signature: sign_ed25519(digest, key),
        }
    }

    pub fn type_id(&self) -> u8 {
        match self {
            Self::Ed25519 { .. } => Self::ED25519,
        }
    }

    pub fn actor(&self) -> Address {
        match self {
            Self::Ed25519 { signer, .. } => *signer,
        }
    }

    pub fn payer(&self) -> Address {
        match self {
            Self::Ed25519 { signer, .. } => *signer,
        }
    }

    pub fn verify(&self, digest: &[u8]) -> bool {
        match self {
            Self::Ed25519 { signer, signature } => verify_ed25519(digest, signature, signer),
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Ed25519 { signer, signature } => {
                codec::write_id(buf, signer);
                buf.extend_from_slice(signature);
            }
        }
    }

    pub fn decode_ed25519(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self::Ed25519 {
            signer: r.read_id()?,
            signature: r.read_signature()?,
        })
    }
}
