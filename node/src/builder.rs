//! Block builder.
//!
//! A build reads the last accepted block from a store snapshot, requires it
//! to be the preferred block, and fills a [`BlockAssembler`] from the
//! mempool until a budget is reached. Builds are serialized by an async
//! build lock; `done` waits on that lock, so a build that started before a
//! stop request always finishes before shutdown returns.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokenvm_engine::storage::{get_block_bytes, get_last_accepted};
use tokenvm_engine::{Block, BlockAssembler};
use tokenvm_primitives::types::short_id;
use tokenvm_primitives::TxId;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::consensus::{EngineMessage, ProposerMonitor};
use crate::error::BuildError;
use crate::gossiper::Gossiper;
use crate::vm::{now_ms, Vm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeConfig {
    pub build_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStrategy {
    /// Build only on `trigger_build`.
    Manual,
    /// Build every `build_interval` while the mempool is non-empty and this
    /// node is an expected proposer.
    Time(TimeConfig),
}

pub struct Builder {
    vm: Arc<Vm>,
    strategy: BuildStrategy,
    proposers: Arc<dyn ProposerMonitor>,
    gossiper: Option<Arc<Gossiper>>,
    trigger: Notify,
    build_lock: Mutex<()>,
    stop: watch::Receiver<bool>,
    finished: watch::Sender<bool>,
    last_build: SyncMutex<Option<Instant>>,
}

impl Builder {
    pub fn new(
        vm: Arc<Vm>,
        strategy: BuildStrategy,
        proposers: Arc<dyn ProposerMonitor>,
        gossiper: Option<Arc<Gossiper>>,
        stop: watch::Receiver<bool>,
    ) -> Arc<Self> {
        let (finished, _) = watch::channel(true);
        Arc::new(Self {
            vm,
            strategy,
            proposers,
            gossiper,
            trigger: Notify::new(),
            build_lock: Mutex::new(()),
            stop,
            finished,
            last_build: SyncMutex::new(None),
        })
    }

    /// Long-lived build loop. Returns once the stop signal is observed.
    pub async fn run(self: Arc<Self>) {
        self.finished.send_replace(false);
        let mut stop = self.stop.clone();
        debug!(strategy = ?self.strategy, "builder started");

        match self.strategy {
            BuildStrategy::Manual => loop {
                if *stop.borrow() {
                    break;
                }
                tokio::select! {
                    _ = self.trigger.notified() => self.build_logged().await,
                    res = stop.changed() => if res.is_err() { break },
                }
            },
            BuildStrategy::Time(cfg) => {
                let mut due = Instant::now() + cfg.build_interval;
                loop {
                    if *stop.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep_until(due) => {
                            if self.should_build(cfg) {
                                self.build_logged().await;
                            }
                            due = self.next_due(cfg);
                        }
                        _ = self.trigger.notified() => {
                            self.build_logged().await;
                            due = self.next_due(cfg);
                        }
                        res = stop.changed() => if res.is_err() { break },
                    }
                }
            }
        }

        self.finished.send_replace(true);
        debug!("builder stopped");
    }

    fn should_build(&self, cfg: TimeConfig) -> bool {
        if self.vm.mempool().is_empty() {
            return false;
        }
        if let Some(last) = *self.last_build.lock() {
            if last.elapsed() < cfg.build_interval {
                return false;
            }
        }
        let proposers = self.proposers.proposers(0, 1);
        if !proposers.is_empty() && !proposers.contains(&self.vm.node_id()) {
            trace!("not the expected proposer, skipping build");
            return false;
        }
        true
    }

    /// One interval after the last completed build, or one interval from
    /// now if that has already passed.
    fn next_due(&self, cfg: TimeConfig) -> Instant {
        let now = Instant::now();
        match *self.last_build.lock() {
            Some(last) if last + cfg.build_interval > now => last + cfg.build_interval,
            _ => now + cfg.build_interval,
        }
    }

    async fn build_logged(&self) {
        match self.build().await {
            Ok(block) => trace!(id = %short_id(&block.id()), "build round done"),
            Err(e) => warn!(error = %e, "build failed"),
        }
    }

    pub fn trigger_build(&self) {
        self.trigger.notify_one();
    }

    /// Record that a build completed. Time-based builds wait a full
    /// `build_interval` after this.
    pub fn handle_generate_block(&self) {
        *self.last_build.lock() = Some(Instant::now());
    }

    /// Build one block on the last accepted block.
    pub async fn build(&self) -> Result<Block, BuildError> {
        let _guard = self.build_lock.lock().await;
        let vm = &self.vm;
        let rules = vm.rules();
        let snapshot = vm.snapshot();

        let (height, parent_id) = get_last_accepted(&*snapshot)?.ok_or(BuildError::MissingGenesis)?;
        let preferred = vm.preferred_block();
        if preferred != parent_id {
            return Err(BuildError::PreferredNotAccepted { preferred, accepted: parent_id });
        }
        let parent_bytes = get_block_bytes(&*snapshot, height)?.ok_or(BuildError::MissingGenesis)?;
        let parent = Block::decode(&parent_bytes, vm.registry())
            .map_err(|source| BuildError::CorruptBlock { height, source })?;
        let timestamp = now_ms().max(parent.timestamp());

        vm.mempool().set_min_timestamp(timestamp);
        let candidates = vm.mempool().peek(rules.max_block_units);
        let mut assembler = BlockAssembler::new(snapshot, rules, parent_id, height + 1, timestamp);
        for tx in candidates {
            if assembler.is_full() {
                break;
            }
            assembler.push(tx)?;
        }
        let assembled = assembler.finish();

        let mut spent: Vec<TxId> = assembled.block.txs().iter().map(|tx| tx.id()).collect();
        spent.extend(assembled.invalid.iter().map(|(id, _)| *id));
        vm.mempool().remove(&spent);
        vm.metrics().set_mempool_size(vm.mempool().len());

        let block = assembled.block;
        vm.track_processing(block.clone());
        vm.metrics().block_built();
        self.handle_generate_block();
        vm.announce(EngineMessage::BlockBuilt { id: block.id(), height: block.height() });
        if let Some(gossiper) = &self.gossiper {
            gossiper.gossip_block(&block);
        }

        info!(
            height = block.height(),
            id = %short_id(&block.id()),
            txs = block.txs().len(),
            units = assembled.units,
            invalid = assembled.invalid.len(),
            deferred = assembled.deferred.len(),
            "built block"
        );
        Ok(block)
    }

    /// Wait for the run loop to exit and any in-flight build to finish.
    pub async fn done(&self) {
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
        let _guard = self.build_lock.lock().await;
    }
}
