//! Cluster membership collaborator

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReplicaError, Result};
use crate::NodeId;

/// How a member participates in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    /// Votes in elections and replicates the log.
    Active,
    /// Replicates the log but never votes or runs for election.
    Passive,
    /// Read-only observer; forwards client requests, holds no log.
    Remote,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Active => write!(f, "active"),
            MemberKind::Passive => write!(f, "passive"),
            MemberKind::Remote => write!(f, "remote"),
        }
    }
}

/// A single cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique member identifier.
    pub id: NodeId,
    /// Participation kind.
    pub kind: MemberKind,
}

impl Member {
    /// Creates a member descriptor.
    pub fn new(id: NodeId, kind: MemberKind) -> Self {
        Self { id, kind }
    }
}

/// Static view of cluster membership, injected at construction.
///
/// Membership is read-only from the core's perspective; dynamic
/// reconfiguration is handled by an outer layer.
#[derive(Debug, Clone)]
pub struct Cluster {
    local: Member,
    members: Vec<Member>,
    replication_factor: usize,
}

impl Cluster {
    /// Creates a cluster view. The local node must appear in `members`,
    /// member ids must be unique, and the replication factor must be at
    /// least one.
    pub fn new(local: NodeId, members: Vec<Member>, replication_factor: usize) -> Result<Self> {
        if replication_factor == 0 {
            return Err(ReplicaError::config("replication factor must be at least 1"));
        }
        let local = *members.iter().find(|m| m.id == local).ok_or_else(|| {
            ReplicaError::config(format!("local node {} is not a cluster member", local))
        })?;
        for (i, m) in members.iter().enumerate() {
            if members[..i].iter().any(|other| other.id == m.id) {
                return Err(ReplicaError::config(format!("duplicate member id {}", m.id)));
            }
        }
        Ok(Self {
            local,
            members,
            replication_factor,
        })
    }

    /// The local node id.
    pub fn local_id(&self) -> NodeId {
        self.local.id
    }

    /// The local member descriptor.
    pub fn local(&self) -> &Member {
        &self.local
    }

    /// Looks up a member by id.
    pub fn member(&self, id: NodeId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// All members, in configuration order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// The configured replication factor.
    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Number of votes required to win an election or commit an entry:
    /// a majority of the active members.
    pub fn quorum_size(&self) -> usize {
        let voters = self
            .members
            .iter()
            .filter(|m| m.kind == MemberKind::Active)
            .count();
        voters / 2 + 1
    }

    /// Ids of active members other than the local node.
    pub(crate) fn voting_peer_ids(&self) -> Vec<NodeId> {
        self.members
            .iter()
            .filter(|m| m.kind == MemberKind::Active && m.id != self.local.id)
            .map(|m| m.id)
            .collect()
    }

    /// Ids of members that receive log replication: active and passive
    /// members other than the local node.
    pub(crate) fn replication_peer_ids(&self) -> Vec<NodeId> {
        self.members
            .iter()
            .filter(|m| m.kind != MemberKind::Remote && m.id != self.local.id)
            .map(|m| m.id)
            .collect()
    }
}
