//! `tokenvm-primitives`: foundational types for the tokenvm execution core.
//!
//! This crate provides identifiers, the deterministic binary codec, the
//! per-transaction `TxResult` and its wire format, warp messages, unit
//! accounting, the journaled state overlay and the hashing/signature
//! helpers shared by the store, engine and node crates.

pub mod types;
pub mod error;
pub mod codec;
pub mod crypto;
pub mod warp;
pub mod result;
pub mod state;
pub mod units;

pub use types::{
    Address, AssetId, BlockId, ChainId, Id, TxId, MAX_BLOCK_SIZE, MAX_WARP_MESSAGE_SIZE,
    NATIVE_ASSET, ZERO_ID,
};
pub use error::CodecError;
pub use codec::Reader;
pub use warp::WarpMessage;
pub use result::{decode_results, encode_results, TxResult};
pub use state::{Checkpoint, Lookup, StateOverlay};
pub use units::{UnitMeter, UnitsExceeded};
