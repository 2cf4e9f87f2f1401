//! Execution error types.
//!
//! Three tiers, matching how the caller reacts:
//! - [`ActionError`]: business failure; recorded as `TxResult { success: false }`
//! - [`TxError`]: pre-validity failure; the transaction cannot be included
//! - [`ExecError`]: the block as a whole cannot be executed
//!
//! Storage failures surface through [`StateError`] in every tier and are
//! always fatal.

use tokenvm_primitives::{types::short_id, CodecError, TxId, UnitsExceeded};
use tokenvm_store::StoreError;

/// Failure reading or writing staged state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Action touched a key it did not declare.
    #[error("key not specified: {0}")]
    KeyNotSpecified(String),

    #[error("corrupt value under {key}: {source}")]
    Corrupt { key: String, source: CodecError },
}

impl StateError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::KeyNotSpecified(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("asset missing")]
    AssetMissing,

    #[error("asset already exists")]
    AssetExists,

    #[error("native asset cannot be {0}")]
    NativeAsset(&'static str),

    #[error("actor is not the owner")]
    NotOwner,

    #[error("value must be non-zero")]
    ZeroValue,

    #[error("{field} too large")]
    FieldTooLarge { field: &'static str },

    #[error("order missing")]
    OrderMissing,

    #[error("order does not match {0}")]
    OrderMismatch(&'static str),

    #[error("fill of {value} exceeds remaining {remaining}")]
    FillTooLarge { value: u64, remaining: u64 },

    #[error("fill output rounds to zero")]
    FillOutputZero,

    #[error("cannot trade asset for itself")]
    SameAsset,

    #[error("warp message missing")]
    WarpMissing,

    #[error("warp message already imported")]
    WarpReplay,

    #[error("warp message targets another chain")]
    WarpWrongDestination,

    #[error("invalid warp payload: {0}")]
    WarpPayload(CodecError),

    #[error("asset was not imported from the destination chain")]
    WrongReturnChain,

    #[error("outstanding loan too small: have {available}, need {required}")]
    LoanTooSmall { available: u64, required: u64 },

    #[error(transparent)]
    State(#[from] StateError),
}

impl ActionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::State(e) if e.is_fatal())
    }
}

/// A transaction that fails these checks is never part of a valid block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("wrong chain id")]
    WrongChain,

    #[error("expired: tx timestamp {timestamp} < block timestamp {block_timestamp}")]
    Expired { timestamp: i64, block_timestamp: i64 },

    #[error("timestamp {timestamp} beyond validity window ending {limit}")]
    TooFarInFuture { timestamp: i64, limit: i64 },

    #[error("action not valid at {timestamp}")]
    OutsideValidRange { timestamp: i64 },

    #[error("invalid signature")]
    BadSignature,

    #[error("duplicate transaction {}", short_id(.0))]
    Duplicate(TxId),

    #[error("insufficient fee balance: have {available}, need {required}")]
    InsufficientFee { available: u64, required: u64 },

    #[error("fee overflow")]
    FeeOverflow,

    #[error(transparent)]
    State(#[from] StateError),
}

impl TxError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::State(e) if e.is_fatal())
    }
}

/// Failure executing a block against a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("tx {index} ({}) invalid: {source}", short_id(.tx_id))]
    InvalidTx {
        index: usize,
        tx_id: TxId,
        source: TxError,
    },

    #[error("block exceeds unit budget: {0}")]
    Units(#[from] UnitsExceeded),

    #[error("block is {size} bytes, max {max}")]
    TooLarge { size: usize, max: usize },

    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} type 0x{tag:02x} registered twice")]
    Duplicate { kind: &'static str, tag: u8 },
}
