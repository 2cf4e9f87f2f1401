//! Gossip between nodes: inbound handling, the manual and proposer
//! strategies, eager backlog gossip and block gossip.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokenvm_engine::{Block, Transaction};
use tokenvm_node::gossiper::{decode_payload, encode_block, encode_txs, GossipPayload, TXS_TAG};
use tokenvm_node::vm::MAX_PROCESSING_BLOCKS;
use tokenvm_node::{
    AnyProposer, GossipError, GossipStrategy, Gossiper, NodeId, ProposerConfig, ProposerMonitor, Vm,
};
use tokenvm_primitives::codec;
use tokio::sync::watch;

use common::*;

const PEER: NodeId = [0x0b; 32];
const SINK: [u8; 32] = [0x5a; 32];

fn proposer_config() -> ProposerConfig {
    ProposerConfig {
        gossip_interval: Duration::from_secs(60),
        gossip_proposer_diff: 3,
        gossip_proposer_depth: 2,
        build_proposer_diff: 1,
    }
}

fn new_gossiper(
    vm: &Arc<Vm>,
    strategy: GossipStrategy,
    proposers: Arc<dyn ProposerMonitor>,
) -> (Arc<Gossiper>, Arc<RecordingSender>, watch::Sender<bool>) {
    let sender = Arc::new(RecordingSender::default());
    let (stop_tx, stop_rx) = watch::channel(false);
    let gossiper = Gossiper::new(vm.clone(), strategy, proposers, sender.clone(), stop_rx);
    (gossiper, sender, stop_tx)
}

fn sent_txs(payload: &[u8]) -> usize {
    match decode_payload(payload).unwrap() {
        GossipPayload::Txs(txs) => txs.len(),
        GossipPayload::Block(_) => panic!("expected transactions"),
    }
}

// ── Test: inbound ──

#[test]
fn test_malformed_gossip_is_dropped() {
    let node = node();
    let (gossiper, _, _stop) = new_gossiper(&node.vm, GossipStrategy::Manual, Arc::new(AnyProposer));

    assert_eq!(gossiper.handle_app_gossip(PEER, &[]), 0);
    assert_eq!(gossiper.handle_app_gossip(PEER, &[0xff, 1, 2]), 0);
    assert_eq!(gossiper.handle_app_gossip(PEER, &[TXS_TAG, 0, 0, 0, 9]), 0);
    assert!(node.vm.mempool().is_empty());
}

#[test]
fn test_inbound_txs_admitted_once() {
    let node = node();
    let (gossiper, _, _stop) = new_gossiper(&node.vm, GossipStrategy::Manual, Arc::new(AnyProposer));

    let good = transfer(&alice().1, SINK, 1);
    let also_good = transfer(&bob().1, SINK, 2);
    let mut forged = transfer(&charlie().1, SINK, 3).bytes().to_vec();
    let last = forged.len() - 1;
    forged[last] ^= 0x01;

    let mut payload = Vec::new();
    codec::write_u8(&mut payload, TXS_TAG);
    codec::write_u32(&mut payload, 4);
    codec::write_var_bytes(&mut payload, good.bytes());
    codec::write_var_bytes(&mut payload, also_good.bytes());
    codec::write_var_bytes(&mut payload, &forged);
    codec::write_var_bytes(&mut payload, b"not a transaction");

    assert_eq!(gossiper.handle_app_gossip(PEER, &payload), 2);
    assert_eq!(node.vm.mempool().len(), 2);
    assert_eq!(node.vm.metrics().gossip_txs_received(), 2);
    assert_eq!(gossiper.handle_app_gossip(PEER, &payload), 0);
}

// ── Test: manual strategy ──

#[tokio::test]
async fn test_manual_round_broadcasts_mempool() {
    let node = node();
    let vm = &node.vm;
    let (gossiper, sender, _stop) = new_gossiper(vm, GossipStrategy::Manual, Arc::new(AnyProposer));

    assert_eq!(gossiper.gossip_round().await.unwrap(), 0);
    assert!(sender.take().is_empty());

    submit_all(vm, vec![transfer(&alice().1, SINK, 1), transfer(&bob().1, SINK, 2)]);
    assert_eq!(gossiper.gossip_round().await.unwrap(), 2);

    let sent = sender.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, None);
    assert_eq!(sent_txs(&sent[0].payload), 2);
    // Gossip never drains the mempool.
    assert_eq!(vm.mempool().len(), 2);
}

// ── Test: proposer strategy ──

#[tokio::test]
async fn test_proposer_round_targets_upcoming_proposers() {
    let node = node();
    let vm = &node.vm;
    let schedule = vec![[1; 32], [2; 32], [3; 32], [4; 32], NODE_ID, [6; 32]];
    let proposers = Arc::new(StaticProposers { schedule });
    let (gossiper, sender, _stop) = new_gossiper(vm, GossipStrategy::Proposer(proposer_config()), proposers);

    submit_all(vm, vec![transfer(&alice().1, SINK, 1)]);
    assert_eq!(gossiper.gossip_round().await.unwrap(), 1);

    let sent = sender.take();
    assert_eq!(sent.len(), 1);
    // Heights 3 and 4 ahead, minus this node.
    assert_eq!(sent[0].to, Some(BTreeSet::from([[4; 32]])));
    assert_eq!(sent_txs(&sent[0].payload), 1);

    // Recently gossiped transactions are not resent.
    assert_eq!(gossiper.gossip_round().await.unwrap(), 0);
    assert!(sender.take().is_empty());
}

#[tokio::test]
async fn test_failed_send_is_retried_next_round() {
    let node = node();
    let vm = &node.vm;
    let schedule = vec![[1; 32], [2; 32], [3; 32], [4; 32], [5; 32]];
    let proposers = Arc::new(StaticProposers { schedule });
    let (gossiper, sender, _stop) = new_gossiper(vm, GossipStrategy::Proposer(proposer_config()), proposers);

    submit_all(vm, vec![transfer(&alice().1, SINK, 1)]);
    sender.set_offline(true);
    assert!(matches!(gossiper.gossip_round().await, Err(GossipError::Send(_))));
    assert_eq!(vm.metrics().gossip_txs_sent(), 0);

    sender.set_offline(false);
    assert_eq!(gossiper.gossip_round().await.unwrap(), 1);
    assert_eq!(sender.take().len(), 1);
    assert_eq!(gossiper.gossip_round().await.unwrap(), 0);
}

#[tokio::test]
async fn test_proposer_round_skipped_when_building_next() {
    let node = node();
    let vm = &node.vm;
    let proposers = Arc::new(StaticProposers { schedule: vec![[1; 32], NODE_ID, [3; 32], [4; 32], [5; 32]] });
    let (gossiper, sender, _stop) = new_gossiper(vm, GossipStrategy::Proposer(proposer_config()), proposers);

    submit_all(vm, vec![transfer(&alice().1, SINK, 1)]);
    assert_eq!(gossiper.gossip_round().await.unwrap(), 0);
    assert!(sender.take().is_empty());
}

#[tokio::test]
async fn test_backlog_gossiped_eagerly() {
    let node = node();
    let vm = node.vm.clone();
    let schedule = vec![[1; 32], [2; 32], [3; 32], [4; 32], [5; 32]];
    let proposers = Arc::new(StaticProposers { schedule });
    let (gossiper, sender, stop) = new_gossiper(&vm, GossipStrategy::Proposer(proposer_config()), proposers);
    let handle = tokio::spawn(gossiper.clone().run());

    let tx = transfer(&alice().1, SINK, 1);
    for result in vm.submit(vec![tx.clone()], true) {
        result.unwrap();
    }

    let sent = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let sent = sender.take();
            if !sent.is_empty() {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(sent[0].to, Some(BTreeSet::from([[4; 32], [5; 32]])));
    match decode_payload(&sent[0].payload).unwrap() {
        GossipPayload::Txs(txs) => assert_eq!(txs, vec![tx.bytes().to_vec()]),
        GossipPayload::Block(_) => panic!("expected transactions"),
    }
    assert_eq!(vm.metrics().gossip_txs_sent(), 1);

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), gossiper.done()).await.unwrap();
    handle.await.unwrap();
}

// ── Test: block gossip ──

#[tokio::test]
async fn test_block_gossip_reaches_peer() {
    let builder_node = node();
    let peer_node = node();
    let (gossiper, sender, _stop) = new_gossiper(&builder_node.vm, GossipStrategy::Manual, Arc::new(AnyProposer));
    let (peer_gossiper, _, _peer_stop) = new_gossiper(&peer_node.vm, GossipStrategy::Manual, Arc::new(AnyProposer));

    let (builder, _build_stop) = manual_builder(&builder_node.vm);
    submit_all(&builder_node.vm, vec![transfer(&alice().1, SINK, 1)]);
    let block = builder.build().await.unwrap();
    gossiper.gossip_block(&block);

    let sent = sender.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, None);
    assert_eq!(peer_gossiper.handle_app_gossip(NODE_ID, &sent[0].payload), 0);
    assert_eq!(peer_node.vm.processing_block(&block.id()), Some(block.clone()));

    // The peer can verify and accept what it received.
    peer_node.vm.accepted(&block).unwrap();
    assert_eq!(native_balance(&peer_node.vm, &SINK), 1);
}

#[test]
fn test_gossiped_blocks_tracked_only_on_tip() {
    let node = node();
    let vm = &node.vm;
    let (gossiper, _, _stop) = new_gossiper(vm, GossipStrategy::Manual, Arc::new(AnyProposer));
    let (_, genesis_id) = vm.last_accepted().unwrap();

    for i in 0..500 {
        let junk = Block::new([0x77; 32], 1_000_000 + i, 0, vec![]);
        assert_eq!(gossiper.handle_app_gossip(PEER, &encode_block(&junk)), 0);
    }
    assert_eq!(vm.processing_count(), 0);

    let siblings: Vec<Block> = (1..=MAX_PROCESSING_BLOCKS as i64 + 10)
        .map(|ts| Block::new(genesis_id, 1, ts, vec![]))
        .collect();
    for block in &siblings {
        gossiper.handle_app_gossip(PEER, &encode_block(block));
    }
    assert_eq!(vm.processing_count(), MAX_PROCESSING_BLOCKS);
    gossiper.handle_app_gossip(PEER, &encode_block(&siblings[0]));
    assert_eq!(vm.processing_count(), MAX_PROCESSING_BLOCKS);

    // Deciding height 1 drops every other candidate for it.
    vm.accepted(&siblings[0]).unwrap();
    assert_eq!(vm.processing_count(), 0);
    assert!(vm.processing_block(&siblings[1].id()).is_none());

    gossiper.handle_app_gossip(PEER, &encode_block(&siblings[1]));
    assert_eq!(vm.parse_block(siblings[2].bytes()).unwrap(), siblings[2]);
    assert!(vm.parse_block(b"not a block").is_err());
    assert_eq!(vm.processing_count(), 0);
}

#[test]
fn test_encode_matches_wire_layout() {
    let tx: Transaction = transfer(&alice().1, SINK, 1);
    let payload = encode_txs(std::slice::from_ref(&tx));
    assert_eq!(payload[0], TXS_TAG);
    assert_eq!(&payload[1..5], &1u32.to_be_bytes());
    assert_eq!(&payload[5..9], &(tx.size() as u32).to_be_bytes());
    assert_eq!(&payload[9..], tx.bytes());
}
