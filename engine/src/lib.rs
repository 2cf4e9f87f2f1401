//! `tokenvm-engine`: deterministic tokenvm execution.
//!
//! This crate implements the state transition function:
//! `f(snapshot, block) → (results, staged writes)`
//!
//! It decodes transactions and blocks, validates each transaction, charges
//! fees, runs the action against scoped staged state and produces one
//! `TxResult` per transaction. Nothing here commits; the node crate owns
//! the store and decides when a staged batch becomes durable.
//!
//! ## Architecture
//!
//! - [`registry::Registry`]: type tag → decoder tables
//! - [`action::Action`]: the closed action set and its declared keys
//! - [`transaction::Transaction`] / [`block::Block`]: signed wire objects
//! - [`state::StagedState`]: snapshot + journaled overlay + key scope
//! - [`storage`]: state key layout and typed record helpers
//! - [`process`]: action semantics
//! - [`executor::BlockExecutor`]: per-tx and per-block execution
//! - [`assembler::BlockAssembler`]: budgeted block construction

pub mod error;
pub mod rules;
pub mod state;
pub mod storage;
pub mod action;
pub mod auth;
pub mod registry;
pub mod transaction;
pub mod block;
pub mod process;
pub mod executor;
pub mod assembler;

pub use action::{Action, OrderResult, WarpTransfer};
pub use assembler::{AssembledBlock, BlockAssembler};
pub use auth::Auth;
pub use block::Block;
pub use error::{ActionError, ExecError, RegistryError, StateError, TxError};
pub use executor::{BlockExecutor, ExecutedBlock};
pub use registry::Registry;
pub use rules::Rules;
pub use state::StagedState;
pub use transaction::{Base, Transaction};
