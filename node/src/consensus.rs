//! Seams to the external consensus engine and network transport.

use std::collections::BTreeSet;

use tokenvm_primitives::{BlockId, Id};

use crate::error::GossipError;

pub type NodeId = Id;

/// Notifications for the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    /// A block was built locally and is ready for `preferred_block` /
    /// verification.
    BlockBuilt { id: BlockId, height: u64 },
}

/// Proposer schedule, owned by the consensus engine.
pub trait ProposerMonitor: Send + Sync {
    /// Nodes expected to propose at heights `diff .. diff + depth` past the
    /// current one. An empty set means no schedule is enforced.
    fn proposers(&self, diff: u64, depth: usize) -> BTreeSet<NodeId>;
}

/// Outbound gossip transport. Implementations must not block; bounded
/// timeouts are the transport's concern.
pub trait AppSender: Send + Sync {
    fn send_app_gossip(&self, payload: Vec<u8>) -> Result<(), GossipError>;

    fn send_app_gossip_specific(&self, nodes: &BTreeSet<NodeId>, payload: Vec<u8>) -> Result<(), GossipError>;
}

/// No proposer schedule: every node may build at any time.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyProposer;

impl ProposerMonitor for AnyProposer {
    fn proposers(&self, _diff: u64, _depth: usize) -> BTreeSet<NodeId> {
        BTreeSet::new()
    }
}
