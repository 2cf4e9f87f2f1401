//! Node configuration and genesis.
//!
//! Both are JSON documents. Every field has a default, so `{}` is a valid
//! config. Ids and addresses are hex strings.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokenvm_engine::Rules;
use tokenvm_primitives::types::id_from_hex;
use tokenvm_primitives::{Address, Id};

use crate::builder::{BuildStrategy, TimeConfig};
use crate::error::ConfigError;
use crate::gossiper::{GossipStrategy, ProposerConfig};
use crate::orderbook::{PairId, TrackedPairs};

/// Static node configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `tracing` filter directive, e.g. `"info"` or `"tokenvm_node=debug"`.
    pub log_level: String,

    /// Threads used for signature verification on submit.
    pub parallelism: usize,

    /// Global mempool capacity.
    pub mempool_size: usize,

    /// Pending transactions allowed per payer.
    pub mempool_payer_size: usize,

    /// Payers exempt from `mempool_payer_size`.
    pub mempool_exempt_payers: Vec<String>,

    /// Locally submitted transactions queued for eager gossip.
    pub gossip_backlog: usize,

    /// Trading pairs indexed by the order book, as `"<hex>-<hex>"`, or
    /// `"*"` for every pair.
    pub track_pairs: Vec<String>,

    /// Manual build and gossip triggers instead of timers.
    pub test_mode: bool,

    pub build_interval_ms: u64,
    pub gossip_interval_ms: u64,
    pub gossip_max_size: usize,
    pub gossip_proposer_diff: u64,
    pub gossip_proposer_depth: usize,
    pub build_proposer_diff: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            parallelism: 4,
            mempool_size: 2_048,
            mempool_payer_size: 32,
            mempool_exempt_payers: Vec::new(),
            gossip_backlog: 1_024,
            track_pairs: Vec::new(),
            test_mode: false,
            build_interval_ms: 500,
            gossip_interval_ms: 1_000,
            gossip_max_size: 256 * 1024,
            gossip_proposer_diff: 3,
            gossip_proposer_depth: 2,
            build_proposer_diff: 1,
        }
    }
}

impl Config {
    /// Parse and validate a JSON config.
    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(data)?;
        config.exempt_payers()?;
        config.tracked_pairs()?;
        Ok(config)
    }

    pub fn exempt_payers(&self) -> Result<BTreeSet<Address>, ConfigError> {
        self.mempool_exempt_payers
            .iter()
            .map(|s| parse_id("mempool_exempt_payers", s))
            .collect()
    }

    pub fn tracked_pairs(&self) -> Result<TrackedPairs, ConfigError> {
        if self.track_pairs.iter().any(|p| p == "*") {
            return Ok(TrackedPairs::All);
        }
        let pairs = self
            .track_pairs
            .iter()
            .map(|p| p.parse::<PairId>())
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(TrackedPairs::Only(pairs))
    }

    pub fn build_strategy(&self) -> BuildStrategy {
        if self.test_mode {
            BuildStrategy::Manual
        } else {
            BuildStrategy::Time(TimeConfig {
                build_interval: Duration::from_millis(self.build_interval_ms),
            })
        }
    }

    pub fn gossip_strategy(&self) -> GossipStrategy {
        if self.test_mode {
            GossipStrategy::Manual
        } else {
            GossipStrategy::Proposer(ProposerConfig {
                gossip_interval: Duration::from_millis(self.gossip_interval_ms),
                gossip_proposer_diff: self.gossip_proposer_diff,
                gossip_proposer_depth: self.gossip_proposer_depth,
                build_proposer_diff: self.build_proposer_diff,
            })
        }
    }
}

pub(crate) fn parse_id(field: &'static str, value: &str) -> Result<Id, ConfigError> {
    id_from_hex(value).ok_or_else(|| ConfigError::InvalidId { field, value: value.to_string() })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Hex address.
    pub address: String,
    pub balance: u64,
}

/// Initial chain state: rules, genesis timestamp and native-asset balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Genesis {
    pub rules: Rules,
    pub timestamp: i64,
    pub symbol: String,
    pub decimals: u8,
    pub allocations: Vec<Allocation>,
}

impl Default for Genesis {
    fn default() -> Self {
        Self {
            rules: Rules::default(),
            timestamp: 0,
            symbol: "TKN".to_string(),
            decimals: 9,
            allocations: Vec::new(),
        }
    }
}

impl Genesis {
    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        let genesis: Self = serde_json::from_slice(data)?;
        genesis.balances()?;
        Ok(genesis)
    }

    pub fn balances(&self) -> Result<Vec<(Address, u64)>, ConfigError> {
        self.allocations
            .iter()
            .map(|a| Ok((parse_id("allocations", &a.address)?, a.balance)))
            .collect()
    }
}
