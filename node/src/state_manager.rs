//! Accept pipeline: re-execute a decided block and commit it atomically.
//!
//! One `WriteBatch` per block carries the state writes of every
//! transaction (fees, action effects, inclusion records, outgoing warp
//! messages) plus the block bytes, its id, the encoded results and the
//! last-accepted pointer. If the commit fails nothing lands, and the same
//! block can be accepted again.

use std::sync::Arc;

use parking_lot::Mutex;
use tokenvm_engine::storage::{
    block_id_key, block_key, encode_last_accepted, get_block_bytes, get_block_id, get_block_timestamp, get_last_accepted,
    get_results_bytes, last_accepted_key, results_key, set_asset, set_balance, AssetRecord,
};
use tokenvm_engine::{Block, BlockExecutor, Registry, Rules, StagedState, StateError};
use tokenvm_primitives::types::short_id;
use tokenvm_primitives::{decode_results, encode_results, BlockId, CodecError, TxResult, NATIVE_ASSET, ZERO_ID};
use tokenvm_store::{StateReader, StateStore};
use tracing::{debug, info};

use crate::config::Genesis;
use crate::error::{AcceptError, InitError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Committed(Vec<TxResult>),
    /// The block was already committed at its height.
    AlreadyAccepted,
}

pub struct StateManager {
    store: Arc<dyn StateStore>,
    rules: Rules,
    lock: Mutex<()>,
}

impl StateManager {
    pub fn new(store: Arc<dyn StateStore>, rules: Rules) -> Self {
        Self { store, rules, lock: Mutex::new(()) }
    }

    pub fn snapshot(&self) -> Arc<dyn StateReader> {
        self.store.snapshot()
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// Write the genesis block and allocations unless a chain already
    /// exists. Returns the last accepted `(height, id)`.
    pub fn init_genesis(&self, genesis: &Genesis) -> Result<(u64, BlockId), InitError> {
        let _guard = self.lock.lock();
        let snapshot = self.store.snapshot();
        if let Some(last) = get_last_accepted(&*snapshot)? {
            debug!(height = last.0, "existing chain found");
            return Ok(last);
        }

        let balances = genesis.balances()?;
        let mut state = StagedState::new(snapshot);
        let mut supply = 0u64;
        for (address, balance) in &balances {
            set_balance(&mut state, address, &NATIVE_ASSET, *balance)?;
            supply = supply.saturating_add(*balance);
        }
        let native = AssetRecord {
            symbol: genesis.symbol.as_bytes().to_vec(),
            decimals: genesis.decimals,
            metadata: Vec::new(),
            supply,
            owner: ZERO_ID,
            origin: None,
        };
        set_asset(&mut state, &NATIVE_ASSET, &native)?;

        let block = Block::genesis(genesis.timestamp);
        let mut batch = state.into_batch();
        batch.put(block_key(0), block.bytes().to_vec());
        batch.put(block_id_key(0), block.id().to_vec());
        batch.put(results_key(0), encode_results(&[]));
        batch.put(last_accepted_key(), encode_last_accepted(0, &block.id()));
        self.store.commit(batch)?;

        info!(id = %short_id(&block.id()), allocations = balances.len(), supply, "genesis written");
        Ok((0, block.id()))
    }

    pub fn last_accepted(&self) -> Result<Option<(u64, BlockId)>, StateError> {
        get_last_accepted(&*self.store.snapshot())
    }

    pub fn block(&self, height: u64, registry: &Registry) -> Result<Option<Block>, AcceptError> {
        let Some(bytes) = get_block_bytes(&*self.store.snapshot(), height)? else {
            return Ok(None);
        };
        let block = Block::decode(&bytes, registry).map_err(|e| corrupt("block", height, e))?;
        Ok(Some(block))
    }

    pub fn results(&self, height: u64) -> Result<Option<Vec<TxResult>>, AcceptError> {
        let Some(bytes) = get_results_bytes(&*self.store.snapshot(), height)? else {
            return Ok(None);
        };
        let results = decode_results(&bytes).map_err(|e| corrupt("results", height, e))?;
        Ok(Some(results))
    }

    /// Execute `block` on top of the last accepted block and commit it.
    pub fn accept(&self, block: &Block) -> Result<AcceptOutcome, AcceptError> {
        let _guard = self.lock.lock();
        let snapshot = self.store.snapshot();
        let height = block.height();

        if let Some(existing) = get_block_id(&*snapshot, height)? {
            if existing == block.id() {
                debug!(height, id = %short_id(&existing), "block already accepted");
                return Ok(AcceptOutcome::AlreadyAccepted);
            }
            return Err(AcceptError::ConflictingBlock { height, existing, block: block.id() });
        }

        check_extends(&*snapshot, block)?;
        let executed = BlockExecutor::execute_block(snapshot, block, &self.rules)?;
        let mut batch = executed.state.into_batch();
        batch.put(block_key(height), block.bytes().to_vec());
        batch.put(block_id_key(height), block.id().to_vec());
        batch.put(results_key(height), encode_results(&executed.results));
        batch.put(last_accepted_key(), encode_last_accepted(height, &block.id()));
        let writes = batch.len();
        self.store.commit(batch)?;

        info!(
            height,
            id = %short_id(&block.id()),
            txs = block.txs().len(),
            units = executed.units,
            writes,
            "accepted block"
        );
        Ok(AcceptOutcome::Committed(executed.results))
    }
}

/// Check that `block` sits directly on the last accepted block in
/// `snapshot` and does not go back in time.
pub fn check_extends(snapshot: &dyn StateReader, block: &Block) -> Result<(), AcceptError> {
    let (last_height, last_id) = get_last_accepted(snapshot)?.ok_or(AcceptError::MissingGenesis)?;
    if block.height() != last_height + 1 {
        return Err(AcceptError::WrongHeight { expected: last_height + 1, got: block.height() });
    }
    if block.parent_id() != last_id {
        return Err(AcceptError::WrongParent { expected: last_id, got: block.parent_id() });
    }
    let parent = get_block_timestamp(snapshot, last_height)?.ok_or(AcceptError::MissingGenesis)?;
    if block.timestamp() < parent {
        return Err(AcceptError::WrongTimestamp { parent, got: block.timestamp() });
    }
    Ok(())
}

fn corrupt(what: &'static str, height: u64, source: CodecError) -> StateError {
    StateError::Corrupt { key: format!("{what}@{height}"), source }
}
