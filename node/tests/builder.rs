//! Block building and acceptance: unit budgets, expiry, rejection,
//! idempotent accept, storage failures and the builder's run loop.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokenvm_engine::storage::get_last_accepted;
use tokenvm_engine::Block;
use tokenvm_node::builder::TimeConfig;
use tokenvm_node::vm::now_ms;
use tokenvm_node::{AcceptError, AnyProposer, BuildStrategy, Builder, Config, EngineMessage};
use tokenvm_store::StateStore;
use tokio::sync::watch;

use common::*;

const SINK: [u8; 32] = [0x5a; 32];

// ── Test: unit budget ──

#[tokio::test]
async fn test_block_respects_unit_budget() {
    let (_, alice_sk) = alice();
    let units = transfer(&alice_sk, SINK, 1).max_units(&rules());
    let genesis = genesis_with(tokenvm_engine::Rules { max_block_units: units * 2, ..rules() });
    let node = node_with(test_config(), &genesis, Arc::new(tokenvm_store::MemStore::new()));
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);

    let txs = vec![
        transfer(&alice().1, SINK, 1),
        transfer(&bob().1, SINK, 2),
        transfer(&charlie().1, SINK, 3),
    ];
    let first_two = [txs[0].id(), txs[1].id()];
    submit_all(vm, txs.clone());

    let block = build_and_accept(vm, &builder).await;
    let included: Vec<_> = block.txs().iter().map(|tx| tx.id()).collect();
    assert_eq!(included, first_two);
    assert_eq!(vm.mempool().len(), 1);
    assert!(vm.mempool().contains(&txs[2].id()));

    let next = build_and_accept(vm, &builder).await;
    assert_eq!(next.txs().len(), 1);
    assert!(vm.mempool().is_empty());
    assert_eq!(native_balance(vm, &SINK), 6);
}

// ── Test: expired and far-future transactions ──

#[tokio::test]
async fn test_expired_never_included() {
    let node = node();
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);
    let (_, alice_sk) = alice();
    let (_, bob_sk) = bob();

    let expired = sign_with(
        &alice_sk,
        tokenvm_engine::Action::Transfer(tokenvm_engine::action::Transfer {
            to: SINK,
            asset: tokenvm_primitives::NATIVE_ASSET,
            value: 1,
            memo: vec![],
        }),
        now_ms() - 1_000,
        1,
    );
    let too_far = sign_with(
        &bob_sk,
        tokenvm_engine::Action::Transfer(tokenvm_engine::action::Transfer {
            to: SINK,
            asset: tokenvm_primitives::NATIVE_ASSET,
            value: 1,
            memo: vec![],
        }),
        now_ms() + 10 * 60_000,
        1,
    );
    submit_all(vm, vec![expired.clone(), too_far.clone()]);
    assert_eq!(vm.mempool().len(), 2);

    let block = build_and_accept(vm, &builder).await;
    assert!(block.txs().is_empty());
    assert!(vm.mempool().is_empty());
    assert_eq!(native_balance(vm, &SINK), 0);

    // Below the mempool's minimum timestamp now.
    assert!(vm.submit(vec![expired], false)[0].is_err());
}

// ── Test: rejected block returns its transactions ──

#[tokio::test]
async fn test_rejected_block_restores_mempool() {
    let node = node();
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);

    submit_all(vm, vec![transfer(&alice().1, SINK, 1), transfer(&bob().1, SINK, 2)]);
    let block = builder.build().await.unwrap();
    assert_eq!(block.txs().len(), 2);
    assert!(vm.mempool().is_empty());
    assert!(vm.processing_block(&block.id()).is_some());

    assert_eq!(vm.rejected(&block), 2);
    assert_eq!(vm.mempool().len(), 2);
    assert!(vm.processing_block(&block.id()).is_none());
    assert_eq!(native_balance(vm, &SINK), 0);

    let rebuilt = build_and_accept(vm, &builder).await;
    assert_eq!(rebuilt.txs().len(), 2);
    assert_eq!(native_balance(vm, &SINK), 3);
}

// ── Test: accept is idempotent and verify matches ──

#[tokio::test]
async fn test_accept_twice_is_noop() {
    let node = node();
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);
    let (alice_addr, alice_sk) = alice();

    let tx = transfer(&alice_sk, SINK, 10);
    let fee = tx.fee(vm.rules()).unwrap();
    submit_all(vm, vec![tx]);
    let block = builder.build().await.unwrap();

    let verified = vm.verify(&block).unwrap();
    vm.accepted(&block).unwrap();
    vm.accepted(&block).unwrap();

    assert_eq!(vm.accepted_results(block.height()).unwrap(), Some(verified));
    assert_eq!(vm.accepted_block(block.height()).unwrap(), Some(block.clone()));
    assert_eq!(native_balance(vm, &alice_addr), INITIAL_BALANCE - 10 - fee);
    assert_eq!(native_balance(vm, &SINK), 10);
    assert_eq!(vm.metrics().blocks_accepted(), 1);
    assert_eq!(vm.metrics().action_count("transfer"), 1);
    assert_eq!(vm.preferred_block(), block.id());
}

// ── Test: failed commit leaves state untouched ──

#[tokio::test]
async fn test_storage_failure_is_atomic() {
    let store = Arc::new(FailingStore::default());
    let node = node_with(test_config(), &genesis(), store.clone());
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);
    let (alice_addr, alice_sk) = alice();

    submit_all(vm, vec![transfer(&alice_sk, SINK, 10)]);
    let block = builder.build().await.unwrap();
    let before = get_last_accepted(&*store.snapshot()).unwrap().unwrap();

    store.set_failing(true);
    assert!(matches!(vm.accepted(&block), Err(AcceptError::Store(_))));
    assert_eq!(get_last_accepted(&*store.snapshot()).unwrap(), Some(before));
    assert_eq!(native_balance(vm, &alice_addr), INITIAL_BALANCE);
    assert_eq!(native_balance(vm, &SINK), 0);
    assert_eq!(vm.metrics().blocks_accepted(), 0);

    store.set_failing(false);
    vm.accepted(&block).unwrap();
    assert_eq!(native_balance(vm, &SINK), 10);
    assert_eq!(get_last_accepted(&*store.snapshot()).unwrap(), Some((1, block.id())));
}

#[test]
fn test_block_before_parent_rejected() {
    let node = node();
    let vm = &node.vm;
    let (_, genesis_id) = vm.last_accepted().unwrap();

    let backwards = Block::new(genesis_id, 1, -1, vec![]);
    assert!(matches!(vm.verify(&backwards), Err(AcceptError::WrongTimestamp { parent: 0, got: -1 })));
    assert!(matches!(vm.accepted(&backwards), Err(AcceptError::WrongTimestamp { .. })));
    assert_eq!(vm.last_accepted().unwrap(), (0, genesis_id));
}

// ── Test: build requires preferred == last accepted ──

#[tokio::test]
async fn test_build_on_stale_preference_fails() {
    let node = node();
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);

    vm.set_preferred([9; 32]);
    assert!(matches!(
        builder.build().await,
        Err(tokenvm_node::BuildError::PreferredNotAccepted { .. })
    ));
}

// ── Test: run loop ──

#[tokio::test]
async fn test_manual_run_builds_on_trigger() {
    let mut node = node();
    let vm = node.vm.clone();
    let (builder, stop) = manual_builder(&vm);
    let handle = tokio::spawn(builder.clone().run());

    submit_all(&vm, vec![transfer(&alice().1, SINK, 1)]);
    builder.trigger_build();

    let msg = tokio::time::timeout(Duration::from_secs(5), node.engine.recv())
        .await
        .unwrap()
        .unwrap();
    let EngineMessage::BlockBuilt { id, height } = msg;
    assert_eq!(height, 1);
    assert_eq!(vm.processing_block(&id).unwrap().txs().len(), 1);
    assert_eq!(vm.metrics().blocks_built(), 1);

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), builder.done()).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_time_strategy_builds_when_pending() {
    let mut node = node_with(Config::default(), &genesis(), Arc::new(tokenvm_store::MemStore::new()));
    let vm = node.vm.clone();
    let (stop_tx, stop_rx) = watch::channel(false);
    let strategy = BuildStrategy::Time(TimeConfig { build_interval: Duration::from_millis(10) });
    let builder = Builder::new(vm.clone(), strategy, Arc::new(AnyProposer), None, stop_rx);
    let handle = tokio::spawn(builder.clone().run());

    submit_all(&vm, vec![transfer(&alice().1, SINK, 1)]);
    let msg = tokio::time::timeout(Duration::from_secs(5), node.engine.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(msg, EngineMessage::BlockBuilt { height: 1, .. }));

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), builder.done()).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_time_strategy_waits_for_turn() {
    let mut node = node_with(Config::default(), &genesis(), Arc::new(tokenvm_store::MemStore::new()));
    let vm = node.vm.clone();
    let (stop_tx, stop_rx) = watch::channel(false);
    let strategy = BuildStrategy::Time(TimeConfig { build_interval: Duration::from_millis(10) });
    let proposers = Arc::new(StaticProposers { schedule: vec![[1; 32]] });
    let builder = Builder::new(vm.clone(), strategy, proposers, None, stop_rx);
    let handle = tokio::spawn(builder.clone().run());

    submit_all(&vm, vec![transfer(&alice().1, SINK, 1)]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(node.engine.try_recv().is_err());
    assert_eq!(vm.mempool().len(), 1);

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), builder.done()).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_time_strategy_waits_interval_after_build() {
    let mut node = node_with(Config::default(), &genesis(), Arc::new(tokenvm_store::MemStore::new()));
    let vm = node.vm.clone();
    let (stop_tx, stop_rx) = watch::channel(false);
    let strategy = BuildStrategy::Time(TimeConfig { build_interval: Duration::from_millis(300) });
    let builder = Builder::new(vm.clone(), strategy, Arc::new(AnyProposer), None, stop_rx);
    let handle = tokio::spawn(builder.clone().run());

    submit_all(&vm, vec![transfer(&alice().1, SINK, 1)]);
    let first = tokio::time::timeout(Duration::from_secs(5), node.engine.recv())
        .await
        .unwrap()
        .unwrap();

    // Pending work alone does not bring the next build forward.
    submit_all(&vm, vec![transfer(&bob().1, SINK, 2)]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(node.engine.try_recv().is_err());
    assert_eq!(vm.mempool().len(), 1);

    let second = tokio::time::timeout(Duration::from_secs(5), node.engine.recv())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(vm.metrics().blocks_built(), 2);
    assert!(vm.mempool().is_empty());

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), builder.done()).await.unwrap();
    handle.await.unwrap();
}
