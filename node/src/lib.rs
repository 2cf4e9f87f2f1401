//! `tokenvm-node`: the parts of a tokenvm node around block execution.
//!
//! - [`mempool`]: fee-density ordered pending pool with payer limits
//! - [`builder`]: turns the mempool into blocks on a timer or on demand
//! - [`gossiper`]: moves transactions between nodes
//! - [`state_manager`]: commits accepted blocks atomically
//! - [`orderbook`]: in-memory index of open orders per tracked pair
//! - [`vm`]: ties them together behind the consensus callbacks
//!
//! Consensus and transport are external; they plug in through the traits
//! in [`consensus`].

pub mod error;
pub mod config;
pub mod consensus;
pub mod mempool;
pub mod orderbook;
pub mod metrics;
pub mod state_manager;
pub mod vm;
pub mod builder;
pub mod gossiper;
pub mod logging;

pub use builder::{BuildStrategy, Builder, TimeConfig};
pub use config::{Allocation, Config, Genesis};
pub use consensus::{AnyProposer, AppSender, EngineMessage, NodeId, ProposerMonitor};
pub use error::{
    AcceptError, BuildError, ConfigError, GossipError, InitError, MempoolError, OrderBookError, SubmitError,
};
pub use gossiper::{GossipStrategy, Gossiper, ProposerConfig};
pub use mempool::Mempool;
pub use metrics::Metrics;
pub use orderbook::{Order, OrderBook, PairId, TrackedPairs};
pub use state_manager::{AcceptOutcome, StateManager};
pub use vm::Vm;
