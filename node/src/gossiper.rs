//! Transaction and block gossip.
//!
//! ## Wire Format
//!
//! ```text
//! [tag: u8]                    0 = transactions, 1 = block
//! tag 0: [count: u32] [tx: u32 len + bytes]*
//! tag 1: [block bytes]
//! ```
//!
//! Inbound gossip never fails the caller: malformed envelopes and items
//! are logged at debug and dropped.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use tokenvm_engine::{Block, Transaction};
use tokenvm_primitives::codec::{self, Reader};
use tokenvm_primitives::types::short_id;
use tokenvm_primitives::{TxId, MAX_BLOCK_SIZE};
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tracing::{debug, trace, warn};

use crate::consensus::{AppSender, NodeId, ProposerMonitor};
use crate::error::GossipError;
use crate::vm::Vm;

pub const TXS_TAG: u8 = 0;
pub const BLOCK_TAG: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipPayload {
    /// Raw transaction encodings, decoded one by one on receipt.
    Txs(Vec<Vec<u8>>),
    Block(Vec<u8>),
}

pub fn encode_txs(txs: &[Transaction]) -> Vec<u8> {
    let body: usize = txs.iter().map(|tx| 4 + tx.size()).sum();
    let mut buf = Vec::with_capacity(5 + body);
    codec::write_u8(&mut buf, TXS_TAG);
    codec::write_u32(&mut buf, txs.len() as u32);
    for tx in txs {
        codec::write_var_bytes(&mut buf, tx.bytes());
    }
    buf
}

pub fn encode_block(block: &Block) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + block.size());
    codec::write_u8(&mut buf, BLOCK_TAG);
    buf.extend_from_slice(block.bytes());
    buf
}

pub fn decode_payload(data: &[u8]) -> Result<GossipPayload, GossipError> {
    let mut r = Reader::new(data);
    match r.read_u8()? {
        TXS_TAG => {
            let count = r.read_count(4)?;
            let mut txs = Vec::with_capacity(count);
            for _ in 0..count {
                txs.push(r.read_var_bytes("transaction", MAX_BLOCK_SIZE)?);
            }
            r.finish()?;
            Ok(GossipPayload::Txs(txs))
        }
        BLOCK_TAG => Ok(GossipPayload::Block(r.read_bytes(r.remaining())?.to_vec())),
        tag => Err(GossipError::UnknownTag(tag)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposerConfig {
    pub gossip_interval: Duration,
    /// Gossip to proposers starting this many heights ahead.
    pub gossip_proposer_diff: u64,
    /// How many consecutive proposers to gossip to.
    pub gossip_proposer_depth: usize,
    /// Skip gossip when this node proposes within this many heights.
    pub build_proposer_diff: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipStrategy {
    /// Broadcast the mempool on `trigger_gossip`.
    Manual,
    /// Periodically send to upcoming proposers, unless this node is about
    /// to build itself.
    Proposer(ProposerConfig),
}

pub struct Gossiper {
    vm: Arc<Vm>,
    strategy: GossipStrategy,
    proposers: Arc<dyn ProposerMonitor>,
    sender: Arc<dyn AppSender>,
    trigger: Notify,
    round_lock: Mutex<()>,
    stop: watch::Receiver<bool>,
    finished: watch::Sender<bool>,
    recent: SyncMutex<HashMap<TxId, Instant>>,
}

impl Gossiper {
    pub fn new(
        vm: Arc<Vm>,
        strategy: GossipStrategy,
        proposers: Arc<dyn ProposerMonitor>,
        sender: Arc<dyn AppSender>,
        stop: watch::Receiver<bool>,
    ) -> Arc<Self> {
        let (finished, _) = watch::channel(true);
        Arc::new(Self {
            vm,
            strategy,
            proposers,
            sender,
            trigger: Notify::new(),
            round_lock: Mutex::new(()),
            stop,
            finished,
            recent: SyncMutex::new(HashMap::new()),
        })
    }

    /// Long-lived gossip loop. Returns once the stop signal is observed.
    pub async fn run(self: Arc<Self>) {
        self.finished.send_replace(false);
        let mut stop = self.stop.clone();
        let mut backlog = self.vm.take_gossip_backlog();
        let interval = match self.strategy {
            GossipStrategy::Manual => None,
            GossipStrategy::Proposer(cfg) => Some(cfg.gossip_interval),
        };
        let mut ticker = tokio::time::interval(interval.unwrap_or(Duration::from_secs(3600)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        debug!(strategy = ?self.strategy, "gossiper started");

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick(), if interval.is_some() => self.round_logged().await,
                _ = self.trigger.notified() => self.round_logged().await,
                Some(txs) = recv_backlog(&mut backlog) => self.gossip_backlog(txs).await,
                res = stop.changed() => if res.is_err() { break },
            }
        }

        self.finished.send_replace(true);
        debug!("gossiper stopped");
    }

    async fn round_logged(&self) {
        match self.gossip_round().await {
            Ok(n) if n > 0 => trace!(txs = n, "gossip round"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "gossip failed"),
        }
    }

    pub fn trigger_gossip(&self) {
        self.trigger.notify_one();
    }

    /// One gossip round per the strategy. Returns how many transactions
    /// were sent.
    pub async fn gossip_round(&self) -> Result<usize, GossipError> {
        let _guard = self.round_lock.lock().await;
        let max_size = self.vm.config().gossip_max_size;
        match self.strategy {
            GossipStrategy::Manual => {
                let txs = self.vm.mempool().snapshot(max_size);
                if txs.is_empty() {
                    return Ok(0);
                }
                self.sender.send_app_gossip(encode_txs(&txs))?;
                self.vm.metrics().gossip_sent(txs.len());
                Ok(txs.len())
            }
            GossipStrategy::Proposer(cfg) => {
                let Some(targets) = self.targets(cfg) else {
                    return Ok(0);
                };
                let txs = self.fresh(self.vm.mempool().snapshot(max_size), cfg.gossip_interval);
                self.send_to(&targets, txs)
            }
        }
    }

    /// Locally submitted transactions, sent eagerly.
    async fn gossip_backlog(&self, txs: Vec<Transaction>) {
        let GossipStrategy::Proposer(cfg) = self.strategy else {
            return;
        };
        let _guard = self.round_lock.lock().await;
        let Some(targets) = self.targets(cfg) else { return };
        let txs = self.fresh(txs, cfg.gossip_interval);
        if let Err(e) = self.send_to(&targets, txs) {
            warn!(error = %e, "backlog gossip failed");
        }
    }

    /// Upcoming proposers other than this node, or `None` if this node is
    /// about to build and should keep its transactions.
    fn targets(&self, cfg: ProposerConfig) -> Option<BTreeSet<NodeId>> {
        let me = self.vm.node_id();
        if self.proposers.proposers(cfg.build_proposer_diff, 1).contains(&me) {
            trace!("about to propose, not gossiping");
            return None;
        }
        let mut targets = self.proposers.proposers(cfg.gossip_proposer_diff, cfg.gossip_proposer_depth);
        targets.remove(&me);
        (!targets.is_empty()).then_some(targets)
    }

    /// Drop transactions gossiped within `ttl`.
    fn fresh(&self, txs: Vec<Transaction>, ttl: Duration) -> Vec<Transaction> {
        let now = Instant::now();
        let mut recent = self.recent.lock();
        recent.retain(|_, at| now.duration_since(*at) < ttl);
        txs.into_iter().filter(|tx| !recent.contains_key(&tx.id())).collect()
    }

    /// Send `txs` to `targets`. Only a successful send marks them recent.
    fn send_to(&self, targets: &BTreeSet<NodeId>, txs: Vec<Transaction>) -> Result<usize, GossipError> {
        if txs.is_empty() {
            return Ok(0);
        }
        self.sender.send_app_gossip_specific(targets, encode_txs(&txs))?;
        let now = Instant::now();
        self.recent.lock().extend(txs.iter().map(|tx| (tx.id(), now)));
        self.vm.metrics().gossip_sent(txs.len());
        Ok(txs.len())
    }

    pub fn gossip_block(&self, block: &Block) {
        if let Err(e) = self.sender.send_app_gossip(encode_block(block)) {
            warn!(id = %short_id(&block.id()), error = %e, "block gossip failed");
        }
    }

    /// Handle inbound gossip from `node`. Returns how many transactions
    /// were admitted to the mempool.
    pub fn handle_app_gossip(&self, node: NodeId, payload: &[u8]) -> usize {
        let payload = match decode_payload(payload) {
            Ok(p) => p,
            Err(e) => {
                debug!(node = %short_id(&node), error = %e, "dropping gossip");
                return 0;
            }
        };
        match payload {
            GossipPayload::Txs(raw) => {
                let total = raw.len();
                let txs: Vec<Transaction> = raw
                    .iter()
                    .filter_map(|bytes| match Transaction::decode(bytes, self.vm.registry()) {
                        Ok(tx) => Some(tx),
                        Err(e) => {
                            debug!(node = %short_id(&node), error = %e, "dropping gossiped tx");
                            None
                        }
                    })
                    .collect();
                let admitted = self
                    .vm
                    .submit(txs, false)
                    .into_iter()
                    .filter(|r| r.is_ok())
                    .count();
                self.vm.metrics().gossip_received(admitted);
                trace!(node = %short_id(&node), total, admitted, "handled tx gossip");
                admitted
            }
            GossipPayload::Block(bytes) => {
                match Block::decode(&bytes, self.vm.registry()) {
                    Ok(block) => {
                        let tracked = self.vm.track_candidate(&block);
                        trace!(node = %short_id(&node), id = %short_id(&block.id()), tracked, "gossiped block");
                    }
                    Err(e) => debug!(node = %short_id(&node), error = %e, "dropping gossiped block"),
                }
                0
            }
        }
    }

    /// Wait for the run loop to exit and any in-flight round to finish.
    pub async fn done(&self) {
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
        let _guard = self.round_lock.lock().await;
    }
}

async fn recv_backlog(backlog: &mut Option<mpsc::Receiver<Vec<Transaction>>>) -> Option<Vec<Transaction>> {
    match backlog {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
