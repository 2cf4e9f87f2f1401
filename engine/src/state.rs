//! Staged state: a committed snapshot with a journaled overlay on top.
//!
//! The builder and the state manager both execute against a `StagedState`.
//! Reads check the overlay first and fall through to the snapshot. While
//! an action runs, access is restricted to the keys it declared; touching
//! anything else fails with [`StateError::KeyNotSpecified`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokenvm_primitives::{Checkpoint, Lookup, StateOverlay};
use tokenvm_store::{StateReader, WriteBatch};

use crate::error::StateError;

pub struct StagedState {
    snapshot: Arc<dyn StateReader>,
    overlay: StateOverlay,
    scope: Option<BTreeSet<Vec<u8>>>,
}

impl StagedState {
    pub fn new(snapshot: Arc<dyn StateReader>) -> Self {
        Self {
            snapshot,
            overlay: StateOverlay::new(),
            scope: None,
        }
    }

    pub fn snapshot(&self) -> &Arc<dyn StateReader> {
        &self.snapshot
    }

    fn check_scope(&self, key: &[u8]) -> Result<(), StateError> {
        match &self.scope {
            Some(keys) if !keys.contains(key) => {
                Err(StateError::KeyNotSpecified(format!("0x{}", hex::encode(key))))
            }
            _ => Ok(()),
        }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        self.check_scope(key)?;
        match self.overlay.lookup(key) {
            Lookup::Value(value) => Ok(Some(value)),
            Lookup::Tombstone => Ok(None),
            Lookup::Absent => Ok(self.snapshot.get(key)?),
        }
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, StateError> {
        Ok(self.get(key)?.is_some())
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StateError> {
        self.check_scope(&key)?;
        self.overlay.put(key, value);
        Ok(())
    }

    pub fn delete(&mut self, key: Vec<u8>) -> Result<(), StateError> {
        self.check_scope(&key)?;
        self.overlay.delete(key);
        Ok(())
    }

    /// Restrict access to `keys` until [`StagedState::clear_scope`].
    pub fn set_scope(&mut self, keys: BTreeSet<Vec<u8>>) {
        self.scope = Some(keys);
    }

    pub fn clear_scope(&mut self) {
        self.scope = None;
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.overlay.checkpoint()
    }

    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.overlay.rollback(checkpoint);
    }

    /// Keys touched so far.
    pub fn pending(&self) -> usize {
        self.overlay.len()
    }

    pub fn into_writes(self) -> BTreeMap<Vec<u8>, Option<Vec<u8>>> {
        self.overlay.into_writes()
    }

    pub fn into_batch(self) -> WriteBatch {
        self.into_writes().into_iter().collect()
    }
}
