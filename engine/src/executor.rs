//! Block executor: the deterministic state transition function.
//!
//! `BlockExecutor::execute_tx` runs one transaction against staged state:
//!
//! 1. Pre-validity: chain id, expiry window, action valid range,
//!    signature, duplicate id
//! 2. Charge `max_units * unit_price` of the native asset to the payer
//! 3. Run the action scoped to its declared keys
//! 4. Record the transaction id so later duplicates are caught
//!
//! A pre-validity failure leaves state untouched and is returned as a
//! [`TxError`]. An action failure is rolled back to the checkpoint taken
//! after the fee charge and recorded as a failed [`TxResult`].
//!
//! `execute_block` applies this to every transaction of a block. It is
//! what the state manager runs on accept and what the builder's output
//! must reproduce exactly.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokenvm_primitives::types::short_id;
use tokenvm_primitives::{TxResult, UnitMeter, NATIVE_ASSET};
use tokenvm_store::StateReader;
use tracing::{debug, trace};

use crate::block::Block;
use crate::error::{ActionError, ExecError, TxError};
use crate::process::{process, ActionContext};
use crate::rules::Rules;
use crate::state::StagedState;
use crate::storage::{get_balance, has_transaction, set_balance, store_transaction, TxRecord};
use crate::transaction::Transaction;

/// Output of [`BlockExecutor::execute_block`]. Nothing is committed yet;
/// `state` carries the writes.
pub struct ExecutedBlock {
    pub results: Vec<TxResult>,
    pub state: StagedState,
    pub units: u64,
}

impl std::fmt::Debug for ExecutedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutedBlock")
            .field("results", &self.results.len())
            .field("pending", &self.state.pending())
            .field("units", &self.units)
            .finish()
    }
}

/// Stateless; all state flows through the `StagedState` argument.
pub struct BlockExecutor;

impl BlockExecutor {
    /// Checks that do not touch state.
    pub fn check_static(tx: &Transaction, rules: &Rules, block_timestamp: i64) -> Result<(), TxError> {
        if tx.base().chain_id != rules.chain_id {
            return Err(TxError::WrongChain);
        }
        if tx.timestamp() < block_timestamp {
            return Err(TxError::Expired { timestamp: tx.timestamp(), block_timestamp });
        }
        let limit = block_timestamp.saturating_add(rules.validity_window_ms);
        if tx.timestamp() > limit {
            return Err(TxError::TooFarInFuture { timestamp: tx.timestamp(), limit });
        }
        let (start, end) = tx.action().valid_range(rules);
        if (start >= 0 && block_timestamp < start) || (end >= 0 && block_timestamp > end) {
            return Err(TxError::OutsideValidRange { timestamp: block_timestamp });
        }
        if !tx.verify_signature() {
            return Err(TxError::BadSignature);
        }
        Ok(())
    }

    /// Execute one transaction. `Err` means the transaction must not be
    /// included; state is unchanged in that case.
    pub fn execute_tx(
        state: &mut StagedState,
        tx: &Transaction,
        rules: &Rules,
        block_timestamp: i64,
    ) -> Result<TxResult, TxError> {
        Self::check_static(tx, rules, block_timestamp)?;

        let tx_id = tx.id();
        if has_transaction(state, &tx_id)? {
            return Err(TxError::Duplicate(tx_id));
        }

        let units = tx.max_units(rules);
        let fee = tx.fee(rules).ok_or(TxError::FeeOverflow)?;
        let payer = tx.payer();
        let available = get_balance(state, &payer, &NATIVE_ASSET)?;
        if available < fee {
            return Err(TxError::InsufficientFee { available, required: fee });
        }
        set_balance(state, &payer, &NATIVE_ASSET, available - fee)?;

        let checkpoint = state.checkpoint();
        state.set_scope(tx.state_keys().into_iter().collect::<BTreeSet<_>>());
        let ctx = ActionContext {
            rules,
            actor: tx.actor(),
            tx_id,
            warp_message: tx.warp_message(),
        };
        let outcome = process(tx.action(), state, &ctx);
        state.clear_scope();

        let result = match outcome {
            Ok(out) => TxResult::success(units, out.output, out.warp_message),
            Err(ActionError::State(e)) if e.is_fatal() => return Err(TxError::State(e)),
            Err(e) => {
                state.rollback(checkpoint);
                trace!(tx = %short_id(&tx_id), action = tx.action().name(), error = %e, "action failed");
                TxResult::failure(units, e.to_string())
            }
        };

        store_transaction(
            state,
            &tx_id,
            &TxRecord { timestamp: block_timestamp, success: result.success, units },
        )?;
        Ok(result)
    }

    /// Execute every transaction of `block` against `snapshot`.
    pub fn execute_block(
        snapshot: Arc<dyn StateReader>,
        block: &Block,
        rules: &Rules,
    ) -> Result<ExecutedBlock, ExecError> {
        if block.size() > rules.max_block_size {
            return Err(ExecError::TooLarge { size: block.size(), max: rules.max_block_size });
        }

        let mut state = StagedState::new(snapshot);
        let mut meter = UnitMeter::new(rules.max_block_units);
        let mut results = Vec::with_capacity(block.txs().len());

        for (index, tx) in block.txs().iter().enumerate() {
            let result = Self::execute_tx(&mut state, tx, rules, block.timestamp()).map_err(|source| match source {
                TxError::State(e) if e.is_fatal() => ExecError::State(e),
                source => ExecError::InvalidTx { index, tx_id: tx.id(), source },
            })?;
            meter.consume(result.units)?;
            results.push(result);
        }

        debug!(
            height = block.height(),
            txs = results.len(),
            units = meter.consumed(),
            writes = state.pending(),
            "executed block"
        );
        Ok(ExecutedBlock { results, state, units: meter.consumed() })
    }
}
