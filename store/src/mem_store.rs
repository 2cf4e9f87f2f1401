//! In-memory copy-on-write state store for tests and local runs.
//!
//! The committed map lives behind an `Arc`. Snapshots clone the `Arc`;
//! a commit builds the next map off to the side and swaps the pointer, so
//! readers holding an older snapshot are never affected. Each commit
//! copies the whole map, so commit cost grows with total state size. Not
//! meant for production chains.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::StoreError;
use crate::state_store::{StateReader, StateStore, WriteBatch, WriteOp};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Clone)]
pub struct MemSnapshot {
    data: Arc<Map>,
    version: u64,
}

impl MemSnapshot {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl StateReader for MemSnapshot {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.data.contains_key(key))
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// In-memory store backed by `BTreeMap` for deterministic key order.
#[derive(Debug, Default)]
pub struct MemStore {
    current: RwLock<MemSnapshot>,
}

impl Default for MemSnapshot {
    fn default() -> Self {
        Self { data: Arc::new(Map::new()), version: 0 }
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with data at version 0.
    pub fn with_data(data: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self {
            current: RwLock::new(MemSnapshot { data: Arc::new(data), version: 0 }),
        }
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}

impl StateStore for MemStore {
    fn snapshot(&self) -> Arc<dyn StateReader> {
        Arc::new(self.current.read().clone())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut current = self.current.write();
        let mut next: Map = (*current.data).clone();
        let ops = batch.len();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put(key, value) => {
                    next.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    next.remove(&key);
                }
            }
        }
        *current = MemSnapshot {
            data: Arc::new(next),
            version: current.version + 1,
        };
        trace!(version = current.version, ops, "committed batch");
        Ok(())
    }
}
