//! Transport collaborator and the in-process test network

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{ReplicaError, Result};
use crate::replica::ReplicaHandle;
use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, ClientRequest, RequestVoteRequest,
    RequestVoteResponse,
};
use crate::NodeId;

/// Delivers protocol RPCs and forwarded client requests to other members.
///
/// Implementations own the wire format and connection management. Every
/// call is a full request/response round trip; responses carry the
/// responder's current term so the core can observe higher terms.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends an AppendEntries RPC to `to` and awaits the response.
    async fn append_entries(
        &self,
        to: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse>;

    /// Sends a RequestVote RPC to `to` and awaits the response.
    async fn request_vote(
        &self,
        to: NodeId,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse>;

    /// Forwards a client request to `to` (the known leader) and awaits
    /// the result buffer.
    async fn forward(&self, to: NodeId, request: ClientRequest) -> Result<Vec<u8>>;
}

#[derive(Default)]
struct NetworkInner {
    nodes: RwLock<HashMap<NodeId, ReplicaHandle>>,
    severed: RwLock<HashSet<NodeId>>,
}

/// An in-process network connecting replicas directly through their
/// handles. Supports partition injection for failover testing.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a replica handle under its node id.
    pub fn register(&self, id: NodeId, handle: ReplicaHandle) {
        if let Ok(mut nodes) = self.inner.nodes.write() {
            nodes.insert(id, handle);
        }
    }

    /// Severs all traffic to and from `id`.
    pub fn partition(&self, id: NodeId) {
        if let Ok(mut severed) = self.inner.severed.write() {
            severed.insert(id);
        }
    }

    /// Restores traffic to and from `id`.
    pub fn heal(&self, id: NodeId) {
        if let Ok(mut severed) = self.inner.severed.write() {
            severed.remove(&id);
        }
    }

    /// Returns a transport bound to `local`.
    pub fn transport(&self, local: NodeId) -> MemoryTransport {
        MemoryTransport {
            local,
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A [`Transport`] endpoint bound to one member of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    local: NodeId,
    inner: Arc<NetworkInner>,
}

impl MemoryTransport {
    fn route(&self, to: NodeId) -> Result<ReplicaHandle> {
        {
            let severed = self
                .inner
                .severed
                .read()
                .map_err(|_| ReplicaError::transport("network registry poisoned"))?;
            if severed.contains(&self.local) || severed.contains(&to) {
                return Err(ReplicaError::transport(format!(
                    "link {} -> {} is partitioned",
                    self.local, to
                )));
            }
        }
        let nodes = self
            .inner
            .nodes
            .read()
            .map_err(|_| ReplicaError::transport("network registry poisoned"))?;
        nodes
            .get(&to)
            .cloned()
            .ok_or_else(|| ReplicaError::transport(format!("unknown member {}", to)))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn append_entries(
        &self,
        to: NodeId,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let handle = self.route(to)?;
        handle.append_entries(request).await
    }

    async fn request_vote(
        &self,
        to: NodeId,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse> {
        let handle = self.route(to)?;
        handle.request_vote(request).await
    }

    async fn forward(&self, to: NodeId, request: ClientRequest) -> Result<Vec<u8>> {
        let handle = self.route(to)?;
        handle.client(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_member_is_a_transport_error() {
        let network = MemoryNetwork::new();
        let transport = network.transport(1);
        let err = transport
            .request_vote(
                2,
                RequestVoteRequest {
                    term: 1,
                    candidate: 1,
                    last_index: 0,
                    last_term: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicaError::Transport(_)));
    }

    #[tokio::test]
    async fn test_partition_blocks_both_directions() {
        let network = MemoryNetwork::new();
        network.partition(2);

        let from_one = network.transport(1);
        let err = from_one
            .forward(2, ClientRequest::Delete(crate::rpc::DeleteRequest { key: vec![1] }))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicaError::Transport(_)));

        let from_two = network.transport(2);
        let err = from_two
            .forward(1, ClientRequest::Delete(crate::rpc::DeleteRequest { key: vec![1] }))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicaError::Transport(_)));

        network.heal(2);
        // Still a transport error, but now because member 1 is unregistered.
        let err = from_two
            .forward(1, ClientRequest::Delete(crate::rpc::DeleteRequest { key: vec![1] }))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicaError::Transport(_)));
    }
}
