//! Term advertisement surface for upstream partition managers

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::TermListener;
use crate::error::Result;
use crate::replica::Replica;
use crate::{NodeId, Term};

/// Descriptor of the current term as advertised upstream: the epoch, the
/// primary member, and the follower set truncated to the replication
/// factor with the primary excluded, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermInfo {
    /// Election epoch.
    pub term: Term,
    /// Primary member, if one is known.
    pub leader: Option<NodeId>,
    /// Candidate list minus the primary, truncated to
    /// `replication_factor - 1` entries.
    pub followers: Vec<NodeId>,
}

/// Stable handle identifying a registered term listener. Removal by
/// handle is O(1) and avoids structural equality on closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Term advertisement for upstream consumers: current term queries,
/// change notification, and election participation.
#[async_trait]
pub trait TermProvider {
    /// Returns the current term descriptor.
    async fn get_term(&self) -> Result<TermInfo>;

    /// Registers a listener invoked on each term or leadership change.
    /// Returns a handle for removal.
    async fn add_listener(&self, listener: TermListener) -> Result<ListenerId>;

    /// Removes a previously registered listener. Returns whether it was
    /// registered.
    async fn remove_listener(&self, id: ListenerId) -> Result<bool>;

    /// Enters the election on behalf of the local member. Resolves once a
    /// leader is known.
    async fn join(&self) -> Result<()>;

    /// Leaves the election. Withdrawal is not supported; this is a no-op.
    async fn leave(&self) -> Result<()>;
}

#[async_trait]
impl TermProvider for Replica {
    async fn get_term(&self) -> Result<TermInfo> {
        self.term_info().await
    }

    async fn add_listener(&self, listener: TermListener) -> Result<ListenerId> {
        Replica::add_listener(self, listener).await
    }

    async fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        Replica::remove_listener(self, id).await
    }

    async fn join(&self) -> Result<()> {
        if !self.is_open() {
            self.open().await?;
        }
        self.await_leader().await
    }

    async fn leave(&self) -> Result<()> {
        Ok(())
    }
}
