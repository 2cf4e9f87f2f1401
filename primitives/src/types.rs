//! Core type aliases and constants for the tokenvm execution core.

/// 32-byte identifier. Transaction, block, asset and chain ids share it.
pub type Id = [u8; 32];

/// Transaction identifier (`sha256` of the signed transaction bytes).
pub type TxId = Id;

/// Block identifier (`sha256` of the encoded block).
pub type BlockId = Id;

/// Asset identifier. Native asset is [`NATIVE_ASSET`].
pub type AssetId = Id;

/// Chain identifier used for replay protection and warp routing.
pub type ChainId = Id;

/// 32-byte account address: the signer's ed25519 public key.
pub type Address = [u8; 32];

/// Upper bound on an encoded block.
pub const MAX_BLOCK_SIZE: usize = 2 * 1024 * 1024; // 2 MiB

/// Upper bound on an embedded warp message.
pub const MAX_WARP_MESSAGE_SIZE: usize = 256 * 1024; // 256 KiB

/// An all-zero id. Used as the genesis parent.
pub const ZERO_ID: Id = [0u8; 32];

/// The fee-paying asset.
pub const NATIVE_ASSET: AssetId = ZERO_ID;

/// Render an id as `0x`-prefixed hex for logs.
pub fn id_to_hex(id: &Id) -> String {
    format!("0x{}", hex::encode(id))
}

/// Short form used in structured log fields.
pub fn short_id(id: &Id) -> String {
    hex::encode(&id[..4])
}

/// Parse a hex string (with or without `0x`) into an id.
pub fn id_from_hex(s: &str) -> Option<Id> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).ok()?;
    bytes.try_into().ok()
}
