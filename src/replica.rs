//! The replica: public surface and the event pump driving the context
//! thread
//!
//! Every RPC, timer expiry, RPC reply and client call becomes an [`Event`]
//! on a single queue drained by the pump. Futures returned to external
//! callers are completed by the pump, so all state mutation stays on the
//! context thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::cluster::{Cluster, MemberKind};
use crate::config::ReplicaConfig;
use crate::context::{Commit, CommitHandler, ExecutionContext, ReplicaContext, TermListener};
use crate::error::{ReplicaError, Result};
use crate::gateway::Gateway;
use crate::log::{LogStore, LogView};
use crate::role::{Role, RoleKind};
use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, ClientRequest, Consistency, RequestVoteRequest,
    RequestVoteResponse,
};
use crate::term::{ListenerId, TermInfo};
use crate::transport::Transport;
use crate::{LogIndex, NodeId, Term};

/// An event processed on the context thread.
pub(crate) enum Event {
    Open(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<Result<()>>),
    AppendEntries(
        AppendEntriesRequest,
        oneshot::Sender<Result<AppendEntriesResponse>>,
    ),
    RequestVote(
        RequestVoteRequest,
        oneshot::Sender<Result<RequestVoteResponse>>,
    ),
    Client(ClientRequest, oneshot::Sender<Result<Vec<u8>>>),
    AppendReply {
        peer: NodeId,
        /// Local term when the RPC was sent; replies from older terms are
        /// discarded.
        term: Term,
        round: u64,
        prev_index: LogIndex,
        sent: u64,
        result: Result<AppendEntriesResponse>,
    },
    VoteReply {
        peer: NodeId,
        term: Term,
        result: Result<RequestVoteResponse>,
    },
    Status(oneshot::Sender<ReplicaStatus>),
    TermInfoQuery(oneshot::Sender<TermInfo>),
    AddListener(TermListener, oneshot::Sender<ListenerId>),
    RemoveListener(ListenerId, oneshot::Sender<bool>),
    AwaitLeader(oneshot::Sender<()>),
    SetRecycleIndex(LogIndex, oneshot::Sender<Result<()>>),
    UpdateVersion(u64),
    Shutdown,
}

/// Point-in-time snapshot of replica state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaStatus {
    /// Active role.
    pub role: RoleKind,
    /// Current election term.
    pub term: Term,
    /// Believed leader for the current term.
    pub leader: Option<NodeId>,
    /// Candidate voted for in the current term.
    pub voted_for: Option<NodeId>,
    /// Freshest cluster configuration version observed.
    pub version: u64,
    /// Highest log index known committed.
    pub commit_index: LogIndex,
    /// First commit index observed after startup.
    pub first_commit_index: LogIndex,
    /// Highest log index applied to the state machine.
    pub last_applied: LogIndex,
    /// Highest log index authorised for compaction.
    pub recycle_index: LogIndex,
    /// Whether the replica is still catching up to the commit frontier
    /// observed at startup.
    pub recovering: bool,
    /// Lifecycle flag.
    pub open: bool,
}

pub(crate) struct Core {
    pub(crate) ctx: ReplicaContext,
    pub(crate) role: Role,
}

async fn sleep_or_park(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl Core {
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        self.ctx.bind_context_thread();
        loop {
            let deadline = self.role.deadline();
            tokio::select! {
                event = rx.recv() => match event {
                    Some(Event::Shutdown) | None => break,
                    Some(event) => self.on_event(event),
                },
                _ = sleep_or_park(deadline) => self.on_timer(),
            }
        }
        let _ = self.role.close(&mut self.ctx);
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Open(reply) => {
                let result = self.do_open();
                let _ = reply.send(result);
            }
            Event::Close(reply) => {
                let result = self.do_close();
                let _ = reply.send(result);
            }
            Event::AppendEntries(request, reply) => {
                let result = self.on_append_entries(request);
                if let Err(e) = &result {
                    self.note_failure(e);
                }
                let _ = reply.send(result);
            }
            Event::RequestVote(request, reply) => {
                let result = self.on_request_vote(request);
                if let Err(e) = &result {
                    self.note_failure(e);
                }
                let _ = reply.send(result);
            }
            Event::Client(request, reply) => {
                if !self.ctx.open {
                    let _ = reply.send(Err(ReplicaError::NotOpen));
                    return;
                }
                if let Err(e) = self.role.client(&mut self.ctx, request, reply) {
                    error!("{} - client request failed: {}", self.ctx.local_id(), e);
                    self.note_failure(&e);
                }
            }
            Event::AppendReply {
                peer,
                term,
                round,
                prev_index,
                sent,
                result,
            } => self.on_append_reply(peer, term, round, prev_index, sent, result),
            Event::VoteReply { peer, term, result } => self.on_vote_reply(peer, term, result),
            Event::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Event::TermInfoQuery(reply) => {
                let _ = reply.send(self.ctx.term_info());
            }
            Event::AddListener(listener, reply) => {
                let _ = reply.send(self.ctx.add_listener(listener));
            }
            Event::RemoveListener(id, reply) => {
                let _ = reply.send(self.ctx.remove_listener(id));
            }
            Event::AwaitLeader(waiter) => self.ctx.await_leader(waiter),
            Event::SetRecycleIndex(index, reply) => {
                let _ = reply.send(self.ctx.set_recycle_index(index));
            }
            Event::UpdateVersion(version) => {
                if let Err(e) = self.ctx.set_version(version) {
                    self.note_failure(&e);
                }
            }
            Event::Shutdown => {}
        }
    }

    fn do_open(&mut self) -> Result<()> {
        if self.ctx.open {
            return Ok(());
        }
        self.ctx.log.open()?;
        self.ctx.set_open(true);
        let target = match self.ctx.cluster().local().kind {
            MemberKind::Active => RoleKind::Follower,
            MemberKind::Passive => RoleKind::Passive,
            MemberKind::Remote => RoleKind::Remote,
        };
        if let Err(e) = self.transition(target) {
            // Unwind: storage closed, role back to start.
            let _ = self.transition(RoleKind::Start);
            let _ = self.ctx.log.close();
            self.ctx.set_open(false);
            return Err(e);
        }
        Ok(())
    }

    fn do_close(&mut self) -> Result<()> {
        if !self.ctx.open {
            return Err(ReplicaError::NotOpen);
        }
        let transition = self.transition(RoleKind::Start);
        let closed = self.ctx.log.close();
        self.ctx.set_open(false);
        self.ctx.abort_leader_waiters();
        transition.and(closed)
    }

    fn on_append_entries(
        &mut self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        if !self.ctx.open {
            return Err(ReplicaError::NotOpen);
        }
        if request.term > self.ctx.term() {
            self.ctx.set_term(request.term)?;
            if matches!(self.role.kind(), RoleKind::Candidate | RoleKind::Leader) {
                self.transition(RoleKind::Follower)?;
            }
        } else if request.term == self.ctx.term() && self.role.kind() == RoleKind::Candidate {
            // A leader exists for our term; concede the election.
            self.transition(RoleKind::Follower)?;
        }
        self.role.append_entries(&mut self.ctx, request)
    }

    fn on_request_vote(&mut self, request: RequestVoteRequest) -> Result<RequestVoteResponse> {
        if !self.ctx.open {
            return Err(ReplicaError::NotOpen);
        }
        if request.term > self.ctx.term() {
            self.ctx.set_term(request.term)?;
            if matches!(self.role.kind(), RoleKind::Candidate | RoleKind::Leader) {
                self.transition(RoleKind::Follower)?;
            }
        }
        self.role.request_vote(&mut self.ctx, request)
    }

    fn on_append_reply(
        &mut self,
        peer: NodeId,
        term: Term,
        round: u64,
        prev_index: LogIndex,
        sent: u64,
        result: Result<AppendEntriesResponse>,
    ) {
        if !self.ctx.open {
            return;
        }
        if let Ok(response) = &result {
            if self.observe_term(response.term) {
                return;
            }
        }
        if term != self.ctx.term() {
            return;
        }
        if let Role::Leader(leader) = &mut self.role {
            if let Err(e) = leader.append_reply(&mut self.ctx, peer, round, prev_index, sent, result)
            {
                error!("{} - replication bookkeeping failed: {}", self.ctx.local_id(), e);
                self.note_failure(&e);
            }
        }
    }

    fn on_vote_reply(&mut self, peer: NodeId, term: Term, result: Result<RequestVoteResponse>) {
        if !self.ctx.open {
            return;
        }
        match result {
            Ok(response) => {
                if self.observe_term(response.term) {
                    return;
                }
                if term != self.ctx.term() {
                    return;
                }
                let next = match &mut self.role {
                    Role::Candidate(candidate) => candidate.vote_reply(&self.ctx, peer, response),
                    _ => None,
                };
                if let Some(kind) = next {
                    if let Err(e) = self.transition(kind) {
                        error!("{} - transition to {} failed: {}", self.ctx.local_id(), kind, e);
                        self.note_failure(&e);
                    }
                }
            }
            Err(e) => debug!("{} - vote request to {} failed: {}", self.ctx.local_id(), peer, e),
        }
    }

    /// Applies the step-down rule: any response carrying a higher term
    /// immediately advances the local term and demotes an elective role.
    /// Returns true when a step-down occurred.
    fn observe_term(&mut self, term: Term) -> bool {
        if term <= self.ctx.term() {
            return false;
        }
        if let Err(e) = self.ctx.set_term(term) {
            self.note_failure(&e);
            return true;
        }
        if matches!(self.role.kind(), RoleKind::Candidate | RoleKind::Leader) {
            if let Err(e) = self.transition(RoleKind::Follower) {
                self.note_failure(&e);
            }
        }
        true
    }

    fn on_timer(&mut self) {
        let due = match self.role.deadline() {
            Some(deadline) => deadline <= Instant::now(),
            None => false,
        };
        if !due {
            return;
        }
        match self.role.on_timeout(&mut self.ctx) {
            Ok(Some(kind)) => {
                if let Err(e) = self.transition(kind) {
                    error!("{} - transition to {} failed: {}", self.ctx.local_id(), kind, e);
                    self.note_failure(&e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("{} - timer handling failed: {}", self.ctx.local_id(), e);
                self.note_failure(&e);
            }
        }
    }

    /// Closes the current role and opens the target, synchronously on the
    /// context thread. Transitioning to the current role is a no-op. A
    /// role whose `open` resolves immediately chains into the follow-on
    /// transition.
    fn transition(&mut self, target: RoleKind) -> Result<()> {
        let mut target = target;
        loop {
            if target == self.role.kind() {
                return Ok(());
            }
            info!("{} - transitioning to {}", self.ctx.local_id(), target);
            self.role.close(&mut self.ctx)?;
            self.role = Role::build(target);
            match self.role.open(&mut self.ctx)? {
                Some(next) => target = next,
                None => return Ok(()),
            }
        }
    }

    /// Storage faults close the role; invariant violations are logged as
    /// fatal and surfaced to the caller.
    fn note_failure(&mut self, e: &ReplicaError) {
        match e {
            ReplicaError::Storage(_) => {
                error!("{} - storage fault, closing role: {}", self.ctx.local_id(), e);
                let _ = self.transition(RoleKind::Start);
                self.ctx.set_open(false);
            }
            ReplicaError::IllegalState(_) => {
                error!("{} - invariant violation: {}", self.ctx.local_id(), e);
            }
            _ => {}
        }
    }

    fn status(&self) -> ReplicaStatus {
        ReplicaStatus {
            role: self.role.kind(),
            term: self.ctx.term(),
            leader: self.ctx.leader(),
            voted_for: self.ctx.voted_for(),
            version: self.ctx.version(),
            commit_index: self.ctx.commit_index(),
            first_commit_index: self.ctx.first_commit_index(),
            last_applied: self.ctx.last_applied(),
            recycle_index: self.ctx.recycle_index(),
            recovering: self.ctx.is_recovering(),
            open: self.ctx.open,
        }
    }
}

/// Cheap, clonable handle used by transports and the gateway to submit
/// work to the context thread.
#[derive(Clone)]
pub struct ReplicaHandle {
    tx: mpsc::UnboundedSender<Event>,
    open: Arc<AtomicBool>,
}

impl ReplicaHandle {
    /// Whether the replica is currently open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Delivers an inbound AppendEntries RPC.
    pub async fn append_entries(
        &self,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        self.request(|tx| Event::AppendEntries(request, tx)).await
    }

    /// Delivers an inbound RequestVote RPC.
    pub async fn request_vote(&self, request: RequestVoteRequest) -> Result<RequestVoteResponse> {
        self.request(|tx| Event::RequestVote(request, tx)).await
    }

    /// Delivers a client request (direct or forwarded from a peer).
    pub async fn client(&self, request: ClientRequest) -> Result<Vec<u8>> {
        self.request(|tx| Event::Client(request, tx)).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> Event,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(build(tx))
            .map_err(|_| ReplicaError::NotOpen)?;
        rx.await.map_err(|_| ReplicaError::Aborted)?
    }

    async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Event) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(build(tx))
            .map_err(|_| ReplicaError::NotOpen)?;
        rx.await.map_err(|_| ReplicaError::Aborted)
    }

    pub(crate) fn send(&self, event: Event) -> Result<()> {
        self.tx.send(event).map_err(|_| ReplicaError::NotOpen)
    }
}

/// A single replica of the replicated log.
///
/// Owns the context thread; dropping the replica shuts the thread down,
/// aborting any in-flight requests. Use [`Replica::close`] for an orderly
/// shutdown first.
pub struct Replica {
    handle: ReplicaHandle,
    gateway: Gateway,
    thread: Option<thread::JoinHandle<()>>,
}

impl Replica {
    /// Starts building a replica.
    pub fn builder() -> ReplicaBuilder {
        ReplicaBuilder::new()
    }

    /// Returns a handle for transports and embedders.
    pub fn handle(&self) -> ReplicaHandle {
        self.handle.clone()
    }

    /// Whether the replica is open.
    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    /// Opens the log store and enters the initial role for the local
    /// member kind.
    pub async fn open(&self) -> Result<()> {
        self.handle.request(Event::Open).await
    }

    /// Transitions to the start role and closes the log store.
    pub async fn close(&self) -> Result<()> {
        self.handle.request(Event::Close).await
    }

    /// Reads a value through the cluster. See [`Consistency`] for the
    /// guarantees of each level.
    pub async fn read(
        &self,
        key: Vec<u8>,
        entry: Vec<u8>,
        consistency: Consistency,
    ) -> Result<Vec<u8>> {
        self.gateway.read(key, entry, consistency).await
    }

    /// Writes a value through the cluster. Resolves once the entry is
    /// committed and applied.
    pub async fn write(
        &self,
        key: Vec<u8>,
        entry: Vec<u8>,
        consistency: Consistency,
    ) -> Result<Vec<u8>> {
        self.gateway.write(key, entry, consistency).await
    }

    /// Deletes a key through the cluster.
    pub async fn delete(&self, key: Vec<u8>, consistency: Consistency) -> Result<Vec<u8>> {
        self.gateway.delete(key, consistency).await
    }

    /// Snapshot of the replica's current state.
    pub async fn status(&self) -> Result<ReplicaStatus> {
        self.handle.query(Event::Status).await
    }

    /// Authorises log compaction up to `index`. Advancement is driven by
    /// an external collaborator and must be monotone.
    pub async fn set_recycle_index(&self, index: LogIndex) -> Result<()> {
        self.handle.request(|tx| Event::SetRecycleIndex(index, tx)).await
    }

    /// Reports a cluster configuration version observed by the membership
    /// layer. The replica keeps the maximum.
    pub fn update_version(&self, version: u64) -> Result<()> {
        self.handle.send(Event::UpdateVersion(version))
    }

    pub(crate) async fn term_info(&self) -> Result<TermInfo> {
        self.handle.query(Event::TermInfoQuery).await
    }

    pub(crate) async fn add_listener(&self, listener: TermListener) -> Result<ListenerId> {
        self.handle.query(|tx| Event::AddListener(listener, tx)).await
    }

    pub(crate) async fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        self.handle.query(|tx| Event::RemoveListener(id, tx)).await
    }

    pub(crate) async fn await_leader(&self) -> Result<()> {
        self.handle.query(Event::AwaitLeader).await
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        let _ = self.handle.send(Event::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Builds a [`Replica`] from its collaborators and configuration.
pub struct ReplicaBuilder {
    config: ReplicaConfig,
    cluster: Option<Cluster>,
    storage: Option<Box<dyn LogStore>>,
    transport: Option<Arc<dyn Transport>>,
    context: Option<ExecutionContext>,
    commit_handler: Option<CommitHandler>,
}

impl ReplicaBuilder {
    fn new() -> Self {
        Self {
            config: ReplicaConfig::default(),
            cluster: None,
            storage: None,
            transport: None,
            context: None,
            commit_handler: None,
        }
    }

    /// Sets the timing configuration.
    pub fn with_config(mut self, config: ReplicaConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the election timeout.
    pub fn with_election_timeout(mut self, timeout: Duration) -> Self {
        self.config.election_timeout = timeout;
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Sets the cluster membership view.
    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Sets the log store collaborator.
    pub fn with_storage(mut self, storage: impl LogStore + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Sets the transport collaborator.
    pub fn with_transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the execution context. A dedicated context named after the
    /// local member is created when omitted.
    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Installs the state machine commit handler.
    pub fn with_commit_handler(
        mut self,
        handler: impl FnMut(Commit<'_>) -> Vec<u8> + Send + 'static,
    ) -> Self {
        self.commit_handler = Some(Box::new(handler));
        self
    }

    /// Validates the configuration, spawns the context thread, and
    /// returns the replica in the start role.
    pub fn build(self) -> Result<Replica> {
        self.config.validate()?;
        let cluster = self
            .cluster
            .ok_or_else(|| ReplicaError::config("cluster is required"))?;
        let storage = self
            .storage
            .ok_or_else(|| ReplicaError::config("storage is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| ReplicaError::config("transport is required"))?;

        let local = cluster.local_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let open_flag = Arc::new(AtomicBool::new(false));
        let ctx = ReplicaContext::new(
            cluster,
            self.config,
            LogView::new(storage),
            transport,
            tx.clone(),
            Arc::clone(&open_flag),
            self.commit_handler,
        );
        let core = Core {
            ctx,
            role: Role::build(RoleKind::Start),
        };

        let context = self
            .context
            .unwrap_or_else(|| ExecutionContext::new(format!("replica-{}", local)));
        let thread = context.spawn(move || core.run(rx))?;

        let handle = ReplicaHandle {
            tx,
            open: open_flag,
        };
        Ok(Replica {
            gateway: Gateway::new(handle.clone()),
            handle,
            thread: Some(thread),
        })
    }
}

impl Default for ReplicaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Member;
    use crate::log::MemoryLogStore;
    use crate::transport::MemoryNetwork;

    #[test]
    fn test_build_requires_collaborators() {
        let err = Replica::builder().build().unwrap_err();
        assert!(matches!(err, ReplicaError::Config(_)));
    }

    #[test]
    fn test_build_validates_config() {
        let cluster = Cluster::new(1, vec![Member::new(1, MemberKind::Active)], 1).unwrap();
        let err = Replica::builder()
            .with_cluster(cluster)
            .with_storage(MemoryLogStore::new())
            .with_transport(MemoryNetwork::new().transport(1))
            .with_election_timeout(Duration::from_millis(10))
            .with_heartbeat_interval(Duration::from_millis(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, ReplicaError::Config(_)));
    }

    #[tokio::test]
    async fn test_not_open_before_open() {
        let cluster = Cluster::new(1, vec![Member::new(1, MemberKind::Active)], 1).unwrap();
        let replica = Replica::builder()
            .with_cluster(cluster)
            .with_storage(MemoryLogStore::new())
            .with_transport(MemoryNetwork::new().transport(1))
            .build()
            .unwrap();

        assert!(!replica.is_open());
        let err = replica
            .read(vec![1], Vec::new(), Consistency::Sequential)
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicaError::NotOpen));

        let err = replica.close().await.unwrap_err();
        assert!(matches!(err, ReplicaError::NotOpen));
    }
}
