//! Shared test helpers for node integration tests.
//!
//! Provides deterministic keypairs, genesis and VM factories, transaction
//! signing, and in-memory stand-ins for the consensus engine and the
//! network transport.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use tokenvm_engine::action::{Action, Transfer};
use tokenvm_engine::storage::get_balance;
use tokenvm_engine::{Base, Block, Registry, Rules, StagedState, Transaction};
use tokenvm_node::vm::now_ms;
use tokenvm_node::{
    AppSender, BuildStrategy, Builder, Config, EngineMessage, Genesis, GossipError, NodeId, ProposerMonitor, Vm,
};
use tokenvm_node::config::Allocation;
use tokenvm_primitives::{Address, AssetId, ChainId, NATIVE_ASSET};
use tokenvm_store::{MemStore, StateReader, StateStore, StoreError, WriteBatch};
use tokio::sync::{mpsc, watch};

pub const CHAIN_ID: ChainId = [7u8; 32];
pub const NODE_ID: NodeId = [0xaa; 32];

/// Native balance every named account starts with.
pub const INITIAL_BALANCE: u64 = 10_000_000;

// ── Deterministic Keypairs ──

/// Create a deterministic Ed25519 signing key from a single seed byte.
pub fn deterministic_keypair(seed: u8) -> (ed25519_dalek::VerifyingKey, SigningKey) {
    let signing_key = SigningKey::from_bytes(&[seed; 32]);
    let verifying_key = signing_key.verifying_key();
    (verifying_key, signing_key)
}

/// Alice: seed=1, stable address across all tests.
pub fn alice() -> (Address, SigningKey) {
    let (vk, sk) = deterministic_keypair(1);
    (*vk.as_bytes(), sk)
}

/// Bob: seed=2, stable address across all tests.
pub fn bob() -> (Address, SigningKey) {
    let (vk, sk) = deterministic_keypair(2);
    (*vk.as_bytes(), sk)
}

/// Charlie: seed=3, stable address across all tests.
pub fn charlie() -> (Address, SigningKey) {
    let (vk, sk) = deterministic_keypair(3);
    (*vk.as_bytes(), sk)
}

// ── Genesis and VM ──

pub fn rules() -> Rules {
    Rules::with_chain_id(CHAIN_ID)
}

/// Genesis funding alice, bob and charlie.
pub fn genesis_with(rules: Rules) -> Genesis {
    let allocations = [alice().0, bob().0, charlie().0]
        .iter()
        .map(|addr| Allocation { address: hex::encode(addr), balance: INITIAL_BALANCE })
        .collect();
    Genesis { rules, allocations, ..Genesis::default() }
}

pub fn genesis() -> Genesis {
    genesis_with(rules())
}

/// Manual build and gossip, every pair tracked.
pub fn test_config() -> Config {
    Config {
        test_mode: true,
        parallelism: 2,
        track_pairs: vec!["*".to_string()],
        ..Config::default()
    }
}

pub struct TestNode {
    pub vm: Arc<Vm>,
    pub engine: mpsc::Receiver<EngineMessage>,
    pub store: Arc<dyn StateStore>,
}

pub fn node_with(config: Config, genesis: &Genesis, store: Arc<dyn StateStore>) -> TestNode {
    let (engine_tx, engine) = mpsc::channel(64);
    let vm = Vm::new(NODE_ID, config, genesis, Arc::new(Registry::tokenvm()), store.clone(), engine_tx).unwrap();
    TestNode { vm, engine, store }
}

pub fn node() -> TestNode {
    node_with(test_config(), &genesis(), Arc::new(MemStore::new()))
}

/// Builder with a manual strategy and no gossiper. The returned sender
/// stops it.
pub fn manual_builder(vm: &Arc<Vm>) -> (Arc<Builder>, watch::Sender<bool>) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let builder = Builder::new(vm.clone(), BuildStrategy::Manual, Arc::new(tokenvm_node::AnyProposer), None, stop_rx);
    (builder, stop_tx)
}

/// Build one block from the mempool and accept it.
pub async fn build_and_accept(vm: &Vm, builder: &Builder) -> Block {
    let block = builder.build().await.unwrap();
    vm.accepted(&block).unwrap();
    block
}

// ── Transactions ──

/// Sign `action` with a 30 second expiry at unit price 1.
pub fn sign(key: &SigningKey, action: Action) -> Transaction {
    sign_with(key, action, now_ms() + 30_000, 1)
}

pub fn sign_with(key: &SigningKey, action: Action, timestamp: i64, unit_price: u64) -> Transaction {
    Transaction::sign(Base { timestamp, chain_id: CHAIN_ID, unit_price }, None, action, key)
}

pub fn transfer(key: &SigningKey, to: Address, value: u64) -> Transaction {
    sign(key, Action::Transfer(Transfer { to, asset: NATIVE_ASSET, value, memo: vec![] }))
}

/// Submit without gossip and assert every transaction was admitted.
pub fn submit_all(vm: &Vm, txs: Vec<Transaction>) {
    for result in vm.submit(txs, false) {
        result.unwrap();
    }
}

// ── State ──

pub fn balance(vm: &Vm, addr: &Address, asset: &AssetId) -> u64 {
    get_balance(&StagedState::new(vm.snapshot()), addr, asset).unwrap()
}

pub fn native_balance(vm: &Vm, addr: &Address) -> u64 {
    balance(vm, addr, &NATIVE_ASSET)
}

/// Store whose commits can be made to fail on demand.
#[derive(Default)]
pub struct FailingStore {
    inner: MemStore,
    fail: AtomicBool,
}

impl FailingStore {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl StateStore for FailingStore {
    fn snapshot(&self) -> Arc<dyn StateReader> {
        self.inner.snapshot()
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.commit(batch)
    }
}

// ── Consensus and Transport ──

/// Fixed proposer schedule: index `i` proposes `i` heights ahead.
pub struct StaticProposers {
    pub schedule: Vec<NodeId>,
}

impl ProposerMonitor for StaticProposers {
    fn proposers(&self, diff: u64, depth: usize) -> BTreeSet<NodeId> {
        self.schedule.iter().skip(diff as usize).take(depth).copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    /// `None` for a broadcast.
    pub to: Option<BTreeSet<NodeId>>,
    pub payload: Vec<u8>,
}

/// Records outbound gossip instead of sending it. While offline every
/// send fails.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<Sent>>,
    offline: AtomicBool,
}

impl RecordingSender {
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn record(&self, to: Option<BTreeSet<NodeId>>, payload: Vec<u8>) -> Result<(), GossipError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GossipError::Send("peer unreachable".to_string()));
        }
        self.sent.lock().push(Sent { to, payload });
        Ok(())
    }
}

impl AppSender for RecordingSender {
    fn send_app_gossip(&self, payload: Vec<u8>) -> Result<(), GossipError> {
        self.record(None, payload)
    }

    fn send_app_gossip_specific(&self, nodes: &BTreeSet<NodeId>, payload: Vec<u8>) -> Result<(), GossipError> {
        self.record(Some(nodes.clone()), payload)
    }
}
