//! Chain rules consulted during validation and unit accounting.

use serde::{Deserialize, Serialize};
use tokenvm_primitives::{ChainId, MAX_BLOCK_SIZE};

/// Protocol parameters. Every validator must run with identical rules or
/// block re-execution diverges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub chain_id: ChainId,

    /// Network id stamped into outgoing warp messages.
    pub network_id: u32,

    /// How far past the block timestamp a transaction may set its expiry.
    pub validity_window_ms: i64,

    /// Unit budget per block.
    pub max_block_units: u64,

    /// Encoded block size limit.
    pub max_block_size: usize,

    /// Flat units charged to every transaction.
    pub base_units: u64,

    /// Units per declared state key.
    pub storage_key_units: u64,

    /// Transaction bytes covered by one unit.
    pub bytes_per_unit: u64,

    /// Extra units for carrying a warp message.
    pub warp_units: u64,

    /// First timestamp at which import/export are valid. `-1` means always.
    pub warp_activation: i64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            chain_id: [0u8; 32],
            network_id: 1337,
            validity_window_ms: 60_000,
            max_block_units: 1_800_000,
            max_block_size: MAX_BLOCK_SIZE,
            base_units: 48,
            storage_key_units: 5,
            bytes_per_unit: 64,
            warp_units: 1_024,
            warp_activation: 0,
        }
    }
}

impl Rules {
    pub fn with_chain_id(chain_id: ChainId) -> Self {
        Self { chain_id, ..Self::default() }
    }
}
