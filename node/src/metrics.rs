//! Prometheus metrics, one registry per VM.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use tokenvm_engine::Action;

pub struct Metrics {
    registry: Registry,
    actions: IntCounterVec,
    txs_failed: IntCounter,
    blocks_accepted: IntCounter,
    blocks_built: IntCounter,
    gossip_txs_received: IntCounter,
    gossip_txs_sent: IntCounter,
    mempool_size: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tokenvm".to_string()), None)?;
        let actions = IntCounterVec::new(
            Opts::new("actions_accepted_total", "accepted transactions by action"),
            &["action"],
        )?;
        let txs_failed = IntCounter::new("txs_failed_total", "accepted transactions whose action failed")?;
        let blocks_accepted = IntCounter::new("blocks_accepted_total", "blocks committed")?;
        let blocks_built = IntCounter::new("blocks_built_total", "blocks built locally")?;
        let gossip_txs_received = IntCounter::new("gossip_txs_received_total", "transactions admitted from gossip")?;
        let gossip_txs_sent = IntCounter::new("gossip_txs_sent_total", "transactions gossiped")?;
        let mempool_size = IntGauge::new("mempool_size", "pending transactions")?;

        registry.register(Box::new(actions.clone()))?;
        registry.register(Box::new(txs_failed.clone()))?;
        registry.register(Box::new(blocks_accepted.clone()))?;
        registry.register(Box::new(blocks_built.clone()))?;
        registry.register(Box::new(gossip_txs_received.clone()))?;
        registry.register(Box::new(gossip_txs_sent.clone()))?;
        registry.register(Box::new(mempool_size.clone()))?;

        Ok(Self {
            registry,
            actions,
            txs_failed,
            blocks_accepted,
            blocks_built,
            gossip_txs_received,
            gossip_txs_sent,
            mempool_size,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_tx(&self, action: &Action, success: bool) {
        self.actions.with_label_values(&[action.name()]).inc();
        if !success {
            self.txs_failed.inc();
        }
    }

    pub fn action_count(&self, name: &str) -> u64 {
        self.actions.with_label_values(&[name]).get()
    }

    pub fn txs_failed(&self) -> u64 {
        self.txs_failed.get()
    }

    pub fn block_accepted(&self) {
        self.blocks_accepted.inc();
    }

    pub fn blocks_accepted(&self) -> u64 {
        self.blocks_accepted.get()
    }

    pub fn block_built(&self) {
        self.blocks_built.inc();
    }

    pub fn blocks_built(&self) -> u64 {
        self.blocks_built.get()
    }

    pub fn gossip_received(&self, n: usize) {
        self.gossip_txs_received.inc_by(n as u64);
    }

    pub fn gossip_txs_received(&self) -> u64 {
        self.gossip_txs_received.get()
    }

    pub fn gossip_sent(&self, n: usize) {
        self.gossip_txs_sent.inc_by(n as u64);
    }

    pub fn gossip_txs_sent(&self) -> u64 {
        self.gossip_txs_sent.get()
    }

    pub fn mempool_size(&self) -> i64 {
        self.mempool_size.get()
    }

    pub fn set_mempool_size(&self, n: usize) {
        self.mempool_size.set(n as i64);
    }
}
