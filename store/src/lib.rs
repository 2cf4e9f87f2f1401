//! `tokenvm-store`: committed state storage.
//!
//! - [`StateStore`]: versioned snapshots plus atomic batch commits
//! - [`StateReader`]: read-only view of one committed version
//! - [`WriteBatch`]: ordered puts and deletes applied all-or-nothing
//! - [`MemStore`]: in-memory copy-on-write implementation for tests

pub mod error;
pub mod state_store;
pub mod mem_store;

pub use error::StoreError;
pub use mem_store::{MemSnapshot, MemStore};
pub use state_store::{StateReader, StateStore, WriteBatch, WriteOp};
