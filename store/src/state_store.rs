//! Committed state storage abstraction.
//!
//! Execution never reads the live store. It takes a [`StateReader`]
//! snapshot, layers a write overlay on top and hands the result back as a
//! single [`WriteBatch`]. A snapshot taken before a commit keeps returning
//! the pre-commit values, so a build running concurrently with `accepted`
//! never observes half of a block.

use std::sync::Arc;

use crate::error::StoreError;

/// Read-only view of one committed version.
pub trait StateReader: Send + Sync {
    /// Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Commit counter this view was taken at.
    fn version(&self) -> u64;
}

/// Backing store shared by the builder, executor and state manager.
pub trait StateStore: Send + Sync {
    fn snapshot(&self) -> Arc<dyn StateReader>;

    /// Apply every operation in `batch` or none of them.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Ordered list of writes. Later operations on a key win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(WriteOp::Delete(key));
    }

    /// Append a set-or-delete entry as produced by an overlay drain.
    pub fn apply(&mut self, key: Vec<u8>, value: Option<Vec<u8>>) {
        match value {
            Some(v) => self.put(key, v),
            None => self.delete(key),
        }
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl FromIterator<(Vec<u8>, Option<Vec<u8>>)> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, Option<Vec<u8>>)>>(iter: I) -> Self {
        let mut batch = WriteBatch::new();
        for (key, value) in iter {
            batch.apply(key, value);
        }
        batch
    }
}
