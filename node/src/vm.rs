//! The VM: shared state behind the builder, the gossiper and the consensus
//! callbacks.
//!
//! Consensus drives a `Vm` through `preferred_block`, `set_preferred`,
//! `parse_block`, `accepted` and `rejected`, and listens on the engine
//! channel for `EngineMessage::BlockBuilt`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tokenvm_engine::{Action, Block, BlockExecutor, OrderResult, Registry, Rules, Transaction, TxError};
use tokenvm_primitives::types::short_id;
use tokenvm_primitives::{BlockId, CodecError, TxId, TxResult};
use tokenvm_store::{StateReader, StateStore};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{Config, Genesis};
use crate::consensus::{EngineMessage, NodeId};
use crate::error::{AcceptError, BuildError, InitError, SubmitError};
use crate::mempool::Mempool;
use crate::metrics::Metrics;
use crate::orderbook::{Order, OrderBook};
use crate::state_manager::{check_extends, AcceptOutcome, StateManager};

/// Upper bound on blocks tracked while awaiting a decision.
pub const MAX_PROCESSING_BLOCKS: usize = 256;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct Vm {
    node_id: NodeId,
    config: Config,
    registry: Arc<Registry>,
    state: StateManager,
    mempool: Mempool,
    order_book: OrderBook,
    metrics: Metrics,
    preferred: RwLock<BlockId>,
    processing: Mutex<HashMap<BlockId, Block>>,
    engine: mpsc::Sender<EngineMessage>,
    gossip_tx: mpsc::Sender<Vec<Transaction>>,
    gossip_rx: Mutex<Option<mpsc::Receiver<Vec<Transaction>>>>,
}

impl Vm {
    /// Open the VM over `store`, writing genesis if the store is empty.
    pub fn new(
        node_id: NodeId,
        config: Config,
        genesis: &Genesis,
        registry: Arc<Registry>,
        store: Arc<dyn StateStore>,
        engine: mpsc::Sender<EngineMessage>,
    ) -> Result<Arc<Self>, InitError> {
        let rules = genesis.rules.clone();
        let mempool = Mempool::new(
            rules.clone(),
            config.mempool_size,
            config.mempool_payer_size,
            config.exempt_payers()?,
        );
        let order_book = OrderBook::new(config.tracked_pairs()?);
        let metrics = Metrics::new()?;
        let state = StateManager::new(store, rules);
        let (_, last_id) = state.init_genesis(genesis)?;
        let (gossip_tx, gossip_rx) = mpsc::channel(config.gossip_backlog.max(1));

        debug!(node = %short_id(&node_id), last_accepted = %short_id(&last_id), "vm ready");
        Ok(Arc::new(Self {
            node_id,
            config,
            registry,
            state,
            mempool,
            order_book,
            metrics,
            preferred: RwLock::new(last_id),
            processing: Mutex::new(HashMap::new()),
            engine,
            gossip_tx,
            gossip_rx: Mutex::new(Some(gossip_rx)),
        }))
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rules(&self) -> &Rules {
        self.state.rules()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn order_book(&self) -> &OrderBook {
        &self.order_book
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn snapshot(&self) -> Arc<dyn StateReader> {
        self.state.snapshot()
    }

    // ── Submission ──

    /// Verify and admit transactions. Signatures are checked in parallel
    /// over `config.parallelism` threads. Admitted transactions are queued
    /// for gossip when `gossip` is set.
    pub fn submit(&self, txs: Vec<Transaction>, gossip: bool) -> Vec<Result<TxId, SubmitError>> {
        let verified = self.verify_signatures(&txs);
        let chain_id = self.rules().chain_id;
        let mut admitted = Vec::new();
        let results: Vec<_> = txs
            .into_iter()
            .zip(verified)
            .map(|(tx, ok)| {
                if !ok {
                    return Err(SubmitError::Invalid(TxError::BadSignature));
                }
                if tx.base().chain_id != chain_id {
                    return Err(SubmitError::Invalid(TxError::WrongChain));
                }
                let id = tx.id();
                self.mempool.add(tx.clone())?;
                if gossip {
                    admitted.push(tx);
                }
                Ok(id)
            })
            .collect();

        self.metrics.set_mempool_size(self.mempool.len());
        if !admitted.is_empty() {
            if let Err(e) = self.gossip_tx.try_send(admitted) {
                debug!(error = %e, "gossip backlog full, relying on periodic gossip");
            }
        }
        results
    }

    fn verify_signatures(&self, txs: &[Transaction]) -> Vec<bool> {
        let workers = self.config.parallelism.max(1);
        if workers == 1 || txs.len() < 2 {
            return txs.iter().map(Transaction::verify_signature).collect();
        }
        let chunk = txs.len().div_ceil(workers);
        std::thread::scope(|s| {
            let handles: Vec<_> = txs
                .chunks(chunk)
                .map(|part| {
                    let handle = s.spawn(move || part.iter().map(Transaction::verify_signature).collect::<Vec<_>>());
                    (part.len(), handle)
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|(len, h)| h.join().unwrap_or_else(|_| vec![false; len]))
                .collect()
        })
    }

    /// Hand the gossip backlog receiver to the gossiper. Only the first
    /// caller gets it.
    pub(crate) fn take_gossip_backlog(&self) -> Option<mpsc::Receiver<Vec<Transaction>>> {
        self.gossip_rx.lock().take()
    }

    // ── Blocks ──

    pub fn preferred_block(&self) -> BlockId {
        *self.preferred.read()
    }

    pub fn set_preferred(&self, id: BlockId) {
        *self.preferred.write() = id;
    }

    pub fn last_accepted(&self) -> Result<(u64, BlockId), BuildError> {
        self.state.last_accepted()?.ok_or(BuildError::MissingGenesis)
    }

    /// Decode a block from the network. It is tracked until decided only
    /// if it extends the last accepted block.
    pub fn parse_block(&self, bytes: &[u8]) -> Result<Block, CodecError> {
        let block = Block::decode(bytes, &self.registry)?;
        self.track_candidate(&block);
        Ok(block)
    }

    /// Track a block from a peer. Returns whether it is now tracked.
    pub(crate) fn track_candidate(&self, block: &Block) -> bool {
        let id = block.id();
        let last = match self.state.last_accepted() {
            Ok(Some(last)) => last,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "cannot read last accepted block");
                return false;
            }
        };
        let mut processing = self.processing.lock();
        if processing.contains_key(&id) {
            return true;
        }
        if block.height() != last.0 + 1 || block.parent_id() != last.1 {
            debug!(id = %short_id(&id), height = block.height(), "block does not extend last accepted, not tracked");
            return false;
        }
        if processing.len() >= MAX_PROCESSING_BLOCKS {
            debug!(id = %short_id(&id), "too many processing blocks, not tracked");
            return false;
        }
        processing.insert(id, block.clone());
        true
    }

    pub(crate) fn track_processing(&self, block: Block) {
        self.processing.lock().insert(block.id(), block);
    }

    pub fn processing_block(&self, id: &BlockId) -> Option<Block> {
        self.processing.lock().get(id).cloned()
    }

    pub fn processing_count(&self) -> usize {
        self.processing.lock().len()
    }

    /// Forget every tracked block at or below `height`.
    fn prune_processing(&self, height: u64) {
        self.processing.lock().retain(|_, block| block.height() > height);
    }

    pub(crate) fn announce(&self, msg: EngineMessage) {
        if let Err(e) = self.engine.try_send(msg) {
            warn!(error = %e, "engine channel unavailable");
        }
    }

    pub fn accepted_block(&self, height: u64) -> Result<Option<Block>, AcceptError> {
        self.state.block(height, &self.registry)
    }

    pub fn accepted_results(&self, height: u64) -> Result<Option<Vec<TxResult>>, AcceptError> {
        self.state.results(height)
    }

    /// Commit `block`, then update the order book, metrics and mempool.
    /// Re-accepting a committed block is a no-op.
    pub fn accepted(&self, block: &Block) -> Result<(), AcceptError> {
        let results = match self.state.accept(block)? {
            AcceptOutcome::Committed(results) => results,
            AcceptOutcome::AlreadyAccepted => {
                self.prune_processing(block.height());
                return Ok(());
            }
        };

        for (tx, result) in block.txs().iter().zip(&results) {
            self.metrics.record_tx(tx.action(), result.success);
            if result.success {
                self.apply_order_effects(tx, result);
            }
        }
        self.metrics.block_accepted();

        let ids: Vec<TxId> = block.txs().iter().map(Transaction::id).collect();
        self.mempool.remove(&ids);
        self.mempool.set_min_timestamp(block.timestamp());
        self.metrics.set_mempool_size(self.mempool.len());
        self.prune_processing(block.height());
        self.set_preferred(block.id());
        Ok(())
    }

    fn apply_order_effects(&self, tx: &Transaction, result: &TxResult) {
        match tx.action() {
            Action::CreateOrder(a) => {
                self.order_book.add(Order {
                    id: tx.id(),
                    owner: tx.actor(),
                    in_asset: a.in_asset,
                    in_tick: a.in_tick,
                    out_asset: a.out_asset,
                    out_tick: a.out_tick,
                    remaining: a.supply,
                });
            }
            Action::FillOrder(a) => match OrderResult::decode(&result.output) {
                Ok(fill) if fill.remaining == 0 => {
                    self.order_book.remove(&a.order);
                }
                Ok(fill) => {
                    if let Err(e) = self.order_book.update_remaining(&a.order, fill.remaining) {
                        debug!(order = %short_id(&a.order), error = %e, "order book not updated");
                    }
                }
                Err(e) => warn!(tx = %short_id(&tx.id()), error = %e, "undecodable fill result"),
            },
            Action::CloseOrder(a) => {
                self.order_book.remove(&a.order);
            }
            Action::CreateAsset(_)
            | Action::MintAsset(_)
            | Action::BurnAsset(_)
            | Action::ModifyAsset(_)
            | Action::Transfer(_)
            | Action::ImportAsset(_)
            | Action::ExportAsset(_) => {}
        }
    }

    /// Drop a losing block and return its transactions to the mempool.
    /// Storage is not touched. Returns how many were re-admitted.
    pub fn rejected(&self, block: &Block) -> usize {
        self.processing.lock().remove(&block.id());
        let mut restored = 0;
        for tx in block.txs() {
            match self.mempool.add(tx.clone()) {
                Ok(()) => restored += 1,
                Err(e) => debug!(tx = %short_id(&tx.id()), error = %e, "not restored"),
            }
        }
        self.metrics.set_mempool_size(self.mempool.len());
        debug!(id = %short_id(&block.id()), restored, "rejected block");
        restored
    }

    /// Re-execute a processing block against the last accepted state
    /// without committing.
    pub fn verify(&self, block: &Block) -> Result<Vec<TxResult>, AcceptError> {
        let snapshot = self.snapshot();
        check_extends(&*snapshot, block)?;
        let executed = BlockExecutor::execute_block(snapshot, block, self.rules())?;
        Ok(executed.results)
    }
}
