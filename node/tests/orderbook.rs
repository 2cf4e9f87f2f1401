//! Order lifecycle through the node: create and mint an asset, place an
//! order, fill it, close it, and check that balances and the in-memory
//! order book follow every accepted block.

mod common;

use std::sync::Arc;

use tokenvm_engine::action::{Action, CloseOrder, CreateAsset, CreateOrder, FillOrder, MintAsset};
use tokenvm_engine::{OrderResult, Transaction};
use tokenvm_node::{Config, PairId, Vm};
use tokenvm_primitives::{AssetId, NATIVE_ASSET};
use tokenvm_store::MemStore;

use common::*;

/// Create asset `AAA` owned by alice and mint her `supply` of it.
async fn mint_asset(vm: &Arc<Vm>, builder: &tokenvm_node::Builder, supply: u64) -> AssetId {
    let (alice_addr, alice_sk) = alice();
    let create = sign(
        &alice_sk,
        Action::CreateAsset(CreateAsset { symbol: b"AAA".to_vec(), decimals: 0, metadata: vec![] }),
    );
    let asset = create.id();
    submit_all(vm, vec![create]);
    build_and_accept(vm, builder).await;

    submit_all(vm, vec![sign(&alice_sk, Action::MintAsset(MintAsset { to: alice_addr, asset, value: supply }))]);
    build_and_accept(vm, builder).await;
    asset
}

/// Alice offers 100 of `asset` for 50 native.
fn place_order(asset: AssetId) -> Transaction {
    let (_, alice_sk) = alice();
    sign(
        &alice_sk,
        Action::CreateOrder(CreateOrder {
            in_asset: asset,
            in_tick: 100,
            out_asset: NATIVE_ASSET,
            out_tick: 50,
            supply: 100,
        }),
    )
}

fn fill(order: &Transaction, asset: AssetId, value: u64) -> Transaction {
    let (alice_addr, _) = alice();
    let (_, bob_sk) = bob();
    sign(
        &bob_sk,
        Action::FillOrder(FillOrder {
            order: order.id(),
            owner: alice_addr,
            in_asset: asset,
            out_asset: NATIVE_ASSET,
            value,
        }),
    )
}

// ── Test: partial then complete fill ──

#[tokio::test]
async fn test_order_fill_lifecycle() {
    let node = node();
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);
    let (alice_addr, _) = alice();
    let (bob_addr, _) = bob();

    let asset = mint_asset(vm, &builder, 100).await;
    assert_eq!(balance(vm, &alice_addr, &asset), 100);

    let order = place_order(asset);
    submit_all(vm, vec![order.clone()]);
    build_and_accept(vm, &builder).await;

    // Supply is escrowed.
    assert_eq!(balance(vm, &alice_addr, &asset), 0);
    let pair = PairId::new(asset, NATIVE_ASSET);
    let open = vm.order_book().orders(&pair, 10);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, order.id());
    assert_eq!(open[0].owner, alice_addr);
    assert_eq!(open[0].remaining, 100);

    let alice_native = native_balance(vm, &alice_addr);
    let bob_native = native_balance(vm, &bob_addr);

    let first = fill(&order, asset, 40);
    let first_fee = first.fee(vm.rules()).unwrap();
    submit_all(vm, vec![first]);
    let block = build_and_accept(vm, &builder).await;

    let results = vm.accepted_results(block.height()).unwrap().unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].success);
    assert_eq!(
        OrderResult::decode(&results[0].output).unwrap(),
        OrderResult { in_amount: 40, out_amount: 20, remaining: 60 }
    );
    assert_eq!(balance(vm, &bob_addr, &asset), 40);
    assert_eq!(native_balance(vm, &alice_addr), alice_native + 20);
    assert_eq!(native_balance(vm, &bob_addr), bob_native - 20 - first_fee);
    assert_eq!(vm.order_book().get(&order.id()).unwrap().remaining, 60);

    submit_all(vm, vec![fill(&order, asset, 60)]);
    build_and_accept(vm, &builder).await;

    assert_eq!(balance(vm, &bob_addr, &asset), 100);
    assert_eq!(native_balance(vm, &alice_addr), alice_native + 50);
    assert!(vm.order_book().get(&order.id()).is_none());
    assert!(vm.order_book().orders(&pair, 10).is_empty());
    assert_eq!(vm.metrics().action_count("fill_order"), 2);
}

// ── Test: overfill fails but keeps the fee ──

#[tokio::test]
async fn test_overfill_is_failed_result() {
    let node = node();
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);
    let (bob_addr, _) = bob();

    let asset = mint_asset(vm, &builder, 100).await;
    let order = place_order(asset);
    submit_all(vm, vec![order.clone()]);
    build_and_accept(vm, &builder).await;

    let bob_native = native_balance(vm, &bob_addr);
    let too_much = fill(&order, asset, 101);
    let fee = too_much.fee(vm.rules()).unwrap();
    submit_all(vm, vec![too_much]);
    let block = build_and_accept(vm, &builder).await;

    let results = vm.accepted_results(block.height()).unwrap().unwrap();
    assert!(!results[0].success);
    assert_eq!(native_balance(vm, &bob_addr), bob_native - fee);
    assert_eq!(balance(vm, &bob_addr, &asset), 0);
    assert_eq!(vm.order_book().get(&order.id()).unwrap().remaining, 100);
    assert_eq!(vm.metrics().txs_failed(), 1);
}

// ── Test: close refunds the remainder ──

#[tokio::test]
async fn test_close_order_refunds() {
    let node = node();
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);
    let (alice_addr, alice_sk) = alice();

    let asset = mint_asset(vm, &builder, 100).await;
    let order = place_order(asset);
    submit_all(vm, vec![order.clone()]);
    build_and_accept(vm, &builder).await;
    submit_all(vm, vec![fill(&order, asset, 40)]);
    build_and_accept(vm, &builder).await;

    submit_all(
        vm,
        vec![sign(&alice_sk, Action::CloseOrder(CloseOrder { order: order.id(), in_asset: asset }))],
    );
    build_and_accept(vm, &builder).await;

    assert_eq!(balance(vm, &alice_addr, &asset), 60);
    assert!(vm.order_book().is_empty());
}

// ── Test: untracked pairs are not indexed ──

#[tokio::test]
async fn test_untracked_pair_not_indexed() {
    let config = Config { track_pairs: vec![], ..test_config() };
    let node = node_with(config, &genesis(), Arc::new(MemStore::new()));
    let vm = &node.vm;
    let (builder, _stop) = manual_builder(vm);
    let (alice_addr, _) = alice();

    let asset = mint_asset(vm, &builder, 100).await;
    submit_all(vm, vec![place_order(asset)]);
    build_and_accept(vm, &builder).await;

    // The order exists on chain but not in the book.
    assert_eq!(balance(vm, &alice_addr, &asset), 0);
    assert!(vm.order_book().is_empty());
}
