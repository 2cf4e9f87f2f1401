//! Node error types.

use tokenvm_engine::{ExecError, StateError, TxError};
use tokenvm_primitives::types::short_id;
use tokenvm_primitives::{BlockId, CodecError, Id};
use tokenvm_store::StoreError;

/// Mempool admission failure. Anything other than `Duplicate` is a
/// rejection with a reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MempoolError {
    #[error("duplicate transaction")]
    Duplicate,

    #[error("mempool full ({capacity} entries) and tx is not denser than the cheapest entry")]
    Full { capacity: usize },

    #[error("payer {} already has {limit} pending transactions", short_id(.payer))]
    PayerLimit { payer: Id, limit: usize },

    #[error("expired: timestamp {timestamp} < minimum {min}")]
    Expired { timestamp: i64, min: i64 },
}

/// Rejection from [`crate::Vm::submit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid transaction: {0}")]
    Invalid(TxError),

    #[error(transparent)]
    Mempool(#[from] MempoolError),
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("preferred block {} is not the last accepted block {}", short_id(.preferred), short_id(.accepted))]
    PreferredNotAccepted { preferred: BlockId, accepted: BlockId },

    #[error("no accepted block; genesis was never written")]
    MissingGenesis,

    #[error("stored block at height {height} is corrupt: {source}")]
    CorruptBlock { height: u64, source: CodecError },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    #[error("height {height} already has block {}, got {}", short_id(.existing), short_id(.block))]
    ConflictingBlock { height: u64, existing: BlockId, block: BlockId },

    #[error("expected height {expected}, got {got}")]
    WrongHeight { expected: u64, got: u64 },

    #[error("parent {} is not the last accepted block {}", short_id(.got), short_id(.expected))]
    WrongParent { expected: BlockId, got: BlockId },

    #[error("timestamp {got} is before parent timestamp {parent}")]
    WrongTimestamp { parent: i64, got: i64 },

    #[error("no accepted block; genesis was never written")]
    MissingGenesis,

    #[error("invalid block: {0}")]
    InvalidBlock(ExecError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("commit failed: {0}")]
    Store(#[from] StoreError),
}

impl From<ExecError> for AcceptError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::State(e) => Self::State(e),
            other => Self::InvalidBlock(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("malformed gossip: {0}")]
    Codec(#[from] CodecError),

    #[error("unknown gossip tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("send failed: {0}")]
    Send(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderBookError {
    #[error("order {} not tracked", short_id(.0))]
    Missing(Id),

    #[error("remaining may not increase: {current} -> {new}")]
    Increase { current: u64, new: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field}: invalid hex id {value:?}")]
    InvalidId { field: &'static str, value: String },

    #[error("invalid trading pair {0:?}")]
    InvalidPair(String),
}

/// Failure bringing a VM up.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}
