//! Block assembly from mempool candidates.
//!
//! The assembler runs candidates through the same [`BlockExecutor::execute_tx`]
//! the state manager uses on accept, so every included transaction is known
//! to re-execute identically. Candidates are sorted into three groups:
//!
//! - included: executed (successfully or as a failed result)
//! - invalid: failed pre-validity and can never be included on this state
//! - deferred: did not fit the remaining unit or size budget

use std::sync::Arc;

use tokenvm_primitives::types::short_id;
use tokenvm_primitives::{BlockId, TxId, TxResult, UnitMeter};
use tokenvm_store::StateReader;
use tracing::{debug, trace};

use crate::block::Block;
use crate::error::{ExecError, TxError};
use crate::executor::BlockExecutor;
use crate::rules::Rules;
use crate::state::StagedState;
use crate::transaction::Transaction;

pub struct AssembledBlock {
    pub block: Block,
    pub results: Vec<TxResult>,
    /// Staged writes of the included transactions.
    pub state: StagedState,
    pub units: u64,
    pub invalid: Vec<(TxId, TxError)>,
    pub deferred: Vec<Transaction>,
}

pub struct BlockAssembler<'a> {
    rules: &'a Rules,
    parent_id: BlockId,
    height: u64,
    timestamp: i64,
    state: StagedState,
    meter: UnitMeter,
    tx_bytes: usize,
    txs: Vec<Transaction>,
    results: Vec<TxResult>,
    invalid: Vec<(TxId, TxError)>,
    deferred: Vec<Transaction>,
}

impl<'a> BlockAssembler<'a> {
    pub fn new(
        snapshot: Arc<dyn StateReader>,
        rules: &'a Rules,
        parent_id: BlockId,
        height: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            rules,
            parent_id,
            height,
            timestamp,
            state: StagedState::new(snapshot),
            meter: UnitMeter::new(rules.max_block_units),
            tx_bytes: 0,
            txs: Vec::new(),
            results: Vec::new(),
            invalid: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// Whether no further transaction of any size could fit.
    pub fn is_full(&self) -> bool {
        self.meter.is_exhausted()
            || Block::size_with(self.txs.len() + 1, self.tx_bytes) >= self.rules.max_block_size
    }

    /// Try to include `tx`. Only storage failures are returned as errors.
    pub fn push(&mut self, tx: Transaction) -> Result<(), ExecError> {
        let units = tx.max_units(self.rules);
        if !self.meter.fits(units) {
            trace!(tx = %short_id(&tx.id()), units, remaining = self.meter.remaining(), "deferred: units");
            self.deferred.push(tx);
            return Ok(());
        }
        let size = Block::size_with(self.txs.len() + 1, self.tx_bytes + tx.size());
        if size > self.rules.max_block_size {
            trace!(tx = %short_id(&tx.id()), size, "deferred: size");
            self.deferred.push(tx);
            return Ok(());
        }

        match BlockExecutor::execute_tx(&mut self.state, &tx, self.rules, self.timestamp) {
            Ok(result) => {
                self.meter.consume(result.units)?;
                self.tx_bytes += tx.size();
                self.results.push(result);
                self.txs.push(tx);
                Ok(())
            }
            Err(TxError::State(e)) if e.is_fatal() => Err(ExecError::State(e)),
            Err(e) => {
                trace!(tx = %short_id(&tx.id()), error = %e, "dropping invalid tx");
                self.invalid.push((tx.id(), e));
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn finish(self) -> AssembledBlock {
        let block = Block::new(self.parent_id, self.height, self.timestamp, self.txs);
        debug!(
            height = self.height,
            txs = block.txs().len(),
            units = self.meter.consumed(),
            invalid = self.invalid.len(),
            deferred = self.deferred.len(),
            "assembled block"
        );
        AssembledBlock {
            block,
            results: self.results,
            state: self.state,
            units: self.meter.consumed(),
            invalid: self.invalid,
            deferred: self.deferred,
        }
    }
}
