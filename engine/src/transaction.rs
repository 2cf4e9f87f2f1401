//! Signed transactions.
//!
//! ## Wire Format (big-endian)
//!
//! ```text
//! [timestamp: i64]          expiry, milliseconds
//! [chain_id: 32]
//! [unit_price: u64]
//! [warp_message: u32 len + bytes, empty if none]
//! [action_type: u8] [action body]
//! [auth_type: u8]   [auth body]
//! ```
//!
//! The signature covers everything before `auth_type`. The transaction id
//! is `sha256` of the full encoding.

use ed25519_dalek::SigningKey;
use tokenvm_primitives::codec::{self, Reader};
use tokenvm_primitives::crypto::hash_sha256;
use tokenvm_primitives::{
    Address, ChainId, CodecError, TxId, WarpMessage, MAX_BLOCK_SIZE, MAX_WARP_MESSAGE_SIZE,
};

use crate::action::Action;
use crate::auth::Auth;
use crate::registry::Registry;
use crate::rules::Rules;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Base {
    /// Expiry. The transaction is valid in blocks with timestamp `<= timestamp`.
    pub timestamp: i64,
    pub chain_id: ChainId,
    /// Native-asset price per unit.
    pub unit_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    base: Base,
    warp_message: Option<WarpMessage>,
    action: Action,
    auth: Auth,
    bytes: Vec<u8>,
    digest_len: usize,
    id: TxId,
}

fn encode_digest(base: &Base, warp_message: Option<&WarpMessage>, action: &Action) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    codec::write_i64(&mut buf, base.timestamp);
    codec::write_id(&mut buf, &base.chain_id);
    codec::write_u64(&mut buf, base.unit_price);
    match warp_message {
        Some(msg) => codec::write_var_bytes(&mut buf, &msg.bytes()),
        None => codec::write_u32(&mut buf, 0),
    }
    codec::write_u8(&mut buf, action.type_id());
    action.encode_into(&mut buf);
    buf
}

impl Transaction {
    /// Build and sign a transaction.
    pub fn sign(base: Base, warp_message: Option<WarpMessage>, action: Action, key: &SigningKey) -> Self {
        let mut bytes = encode_digest(&base, warp_message.as_ref(), &action);
        let digest_len = bytes.len();
        let auth = Auth::sign(&bytes, key);
        codec::write_u8(&mut bytes, auth.type_id());
        auth.encode_into(&mut bytes);
        let id = hash_sha256(&bytes);
        Self { base, warp_message, action, auth, bytes, digest_len, id }
    }

    /// Decode a single transaction. Signatures are not checked here.
    pub fn decode(data: &[u8], registry: &Registry) -> Result<Self, CodecError> {
        if data.len() > MAX_BLOCK_SIZE {
            return Err(CodecError::TooLarge {
                field: "transaction",
                size: data.len(),
                max: MAX_BLOCK_SIZE,
            });
        }
        let mut r = Reader::new(data);
        let base = Base {
            timestamp: r.read_i64()?,
            chain_id: r.read_id()?,
            unit_price: r.read_u64()?,
        };
        let warp_bytes = r.read_var_bytes("warp message", MAX_WARP_MESSAGE_SIZE)?;
        let warp_message = if warp_bytes.is_empty() {
            None
        } else {
            Some(WarpMessage::parse(&warp_bytes)?)
        };
        let action = registry.decode_action(&mut r)?;
        if action.requires_warp() != warp_message.is_some() {
            return Err(CodecError::Invalid("warp message presence"));
        }
        let digest_len = r.position();
        let auth = registry.decode_auth(&mut r)?;
        r.finish()?;
        Ok(Self {
            base,
            warp_message,
            action,
            auth,
            bytes: data.to_vec(),
            digest_len,
            id: hash_sha256(data),
        })
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Signed portion of the encoding.
    pub fn digest(&self) -> &[u8] {
        &self.bytes[..self.digest_len]
    }

    pub fn base(&self) -> &Base {
        &self.base
    }

    pub fn timestamp(&self) -> i64 {
        self.base.timestamp
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn warp_message(&self) -> Option<&WarpMessage> {
        self.warp_message.as_ref()
    }

    pub fn actor(&self) -> Address {
        self.auth.actor()
    }

    pub fn payer(&self) -> Address {
        self.auth.payer()
    }

    pub fn verify_signature(&self) -> bool {
        self.auth.verify(self.digest())
    }

    pub fn state_keys(&self) -> Vec<Vec<u8>> {
        self.action
            .state_keys(&self.actor(), &self.id, self.warp_message.as_ref())
    }

    /// Units charged for this transaction, success or failure.
    pub fn max_units(&self, rules: &Rules) -> u64 {
        let keys = self.state_keys().len() as u64;
        let bytes = (self.size() as u64).div_ceil(rules.bytes_per_unit.max(1));
        let warp = if self.warp_message.is_some() { rules.warp_units } else { 0 };
        rules
            .base_units
            .saturating_add(self.action.max_units())
            .saturating_add(keys.saturating_mul(rules.storage_key_units))
            .saturating_add(bytes)
            .saturating_add(warp)
    }

    /// `max_units * unit_price`, or `None` on overflow.
    pub fn fee(&self, rules: &Rules) -> Option<u64> {
        self.max_units(rules).checked_mul(self.base.unit_price)
    }
}
