//! Replica context: authoritative mutable state and the single-threaded
//! execution anchor
//!
//! Every read and write of replica state happens on one dedicated context
//! thread. External callers submit events through the replica handle; the
//! pump drains them in FIFO order and dispatches to the active role.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::cluster::{Cluster, MemberKind};
use crate::config::ReplicaConfig;
use crate::error::{ReplicaError, Result};
use crate::log::{EntryKind, LogView};
use crate::replica::Event;
use crate::rpc::{AppendEntriesRequest, ClientRequest, RequestVoteRequest};
use crate::term::{ListenerId, TermInfo};
use crate::{LogIndex, NodeId, Term};

/// A named, dedicated execution context: one OS thread running a
/// current-thread tokio runtime that drives the replica's event pump.
#[derive(Debug)]
pub struct ExecutionContext {
    name: String,
}

impl ExecutionContext {
    /// Creates an execution context with the given thread name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub(crate) fn spawn<F, Fut>(self, init: F) -> Result<thread::JoinHandle<()>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()>,
    {
        thread::Builder::new()
            .name(self.name)
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(init()),
                    Err(e) => error!("failed to build context runtime: {}", e),
                }
            })
            .map_err(|e| ReplicaError::config(format!("failed to spawn context thread: {}", e)))
    }
}

/// Verifies that state mutations happen on the context thread.
#[derive(Debug)]
pub(crate) struct ThreadChecker {
    owner: ThreadId,
}

impl ThreadChecker {
    pub(crate) fn new() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        if thread::current().id() != self.owner {
            return Err(ReplicaError::illegal("not on the context thread"));
        }
        Ok(())
    }
}

/// Per-peer replication bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct PeerState {
    /// Index of the next log entry to send.
    pub next_index: LogIndex,
    /// Highest log index known to be replicated.
    pub match_index: LogIndex,
    /// Last successful contact.
    pub last_contact: Instant,
    /// Whether an AppendEntries RPC is outstanding.
    pub in_flight: bool,
    /// Consecutive RPC failures since the last successful contact.
    pub failures: u64,
    /// Highest heartbeat round acknowledged by this peer.
    pub acked_round: u64,
}

impl PeerState {
    pub(crate) fn reset(last_index: LogIndex) -> Self {
        Self {
            next_index: last_index + 1,
            match_index: 0,
            last_contact: Instant::now(),
            in_flight: false,
            failures: 0,
            acked_round: 0,
        }
    }
}

/// An operation handed to the commit handler.
#[derive(Debug)]
pub enum Commit<'a> {
    /// A committed command entry being applied to the state machine. An
    /// empty payload is a tombstone (delete).
    Apply {
        /// Log index of the entry.
        index: LogIndex,
        /// Entry key.
        key: &'a [u8],
        /// Entry payload.
        entry: &'a [u8],
    },
    /// A read evaluated against current state. Must not mutate.
    Query {
        /// Key to read.
        key: &'a [u8],
        /// Query payload from the client.
        entry: &'a [u8],
    },
}

/// State machine callback installed by the owner; invoked only on the
/// context thread. Returns the result buffer delivered to the client.
pub type CommitHandler = Box<dyn FnMut(Commit<'_>) -> Vec<u8> + Send>;

/// Listener invoked on the context thread for each term or leadership
/// change.
pub type TermListener = Box<dyn Fn(TermInfo) + Send>;

/// The process-wide state of one replica.
///
/// Mutations go through the setters below, which enforce the protocol
/// invariants: term monotonicity, vote-at-most-once, commit and apply
/// frontier monotonicity.
pub(crate) struct ReplicaContext {
    cluster: Cluster,
    config: ReplicaConfig,
    pub(crate) log: LogView,
    transport: Arc<dyn crate::transport::Transport>,
    tx: mpsc::UnboundedSender<Event>,
    checker: ThreadChecker,
    open_flag: Arc<AtomicBool>,

    term: Term,
    leader: Option<NodeId>,
    voted_for: Option<NodeId>,
    version: u64,
    commit_index: LogIndex,
    first_commit_index: LogIndex,
    last_applied: LogIndex,
    recycle_index: LogIndex,
    recovering: bool,
    pub(crate) open: bool,
    pub(crate) peers: HashMap<NodeId, PeerState>,
    commit_handler: Option<CommitHandler>,
    listeners: HashMap<ListenerId, TermListener>,
    next_listener: u64,
    leader_waiters: Vec<oneshot::Sender<()>>,
}

impl ReplicaContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cluster: Cluster,
        config: ReplicaConfig,
        log: LogView,
        transport: Arc<dyn crate::transport::Transport>,
        tx: mpsc::UnboundedSender<Event>,
        open_flag: Arc<AtomicBool>,
        commit_handler: Option<CommitHandler>,
    ) -> Self {
        Self {
            cluster,
            config,
            log,
            transport,
            tx,
            checker: ThreadChecker::new(),
            open_flag,
            term: 0,
            leader: None,
            voted_for: None,
            version: 0,
            commit_index: 0,
            first_commit_index: 0,
            last_applied: 0,
            recycle_index: 0,
            recovering: true,
            open: false,
            peers: HashMap::new(),
            commit_handler,
            listeners: HashMap::new(),
            next_listener: 0,
            leader_waiters: Vec::new(),
        }
    }

    /// Rebinds the thread checker to the pump thread. Called once when
    /// the pump starts.
    pub(crate) fn bind_context_thread(&mut self) {
        self.checker = ThreadChecker::new();
    }

    /// Fails unless the caller is on the context thread.
    pub(crate) fn check_thread(&self) -> Result<()> {
        self.checker.check()
    }

    pub(crate) fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub(crate) fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub(crate) fn local_id(&self) -> NodeId {
        self.cluster.local_id()
    }

    pub(crate) fn term(&self) -> Term {
        self.term
    }

    pub(crate) fn leader(&self) -> Option<NodeId> {
        self.leader
    }

    pub(crate) fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub(crate) fn first_commit_index(&self) -> LogIndex {
        self.first_commit_index
    }

    pub(crate) fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub(crate) fn recycle_index(&self) -> LogIndex {
        self.recycle_index
    }

    pub(crate) fn is_recovering(&self) -> bool {
        self.recovering
    }

    pub(crate) fn set_open(&mut self, open: bool) {
        self.open = open;
        self.open_flag.store(open, Ordering::Release);
    }

    /// Advances the term. Greater terms reset the known leader and the
    /// vote; equal or smaller terms are a no-op.
    pub(crate) fn set_term(&mut self, term: Term) -> Result<()> {
        self.check_thread()?;
        if term > self.term {
            let old = self.term;
            self.term = term;
            self.leader = None;
            self.voted_for = None;
            debug!("{} - advanced term {} -> {}", self.local_id(), old, term);
            self.notify_listeners();
        }
        Ok(())
    }

    /// Updates the believed leader for the current term. Finding a leader
    /// clears the vote and completes pending leader-waiters.
    pub(crate) fn set_leader(&mut self, leader: Option<NodeId>) -> Result<()> {
        self.check_thread()?;
        match (self.leader, leader) {
            (old, Some(new)) if old != Some(new) => {
                self.leader = Some(new);
                self.voted_for = None;
                debug!("{} - found leader {} for term {}", self.local_id(), new, self.term);
                for waiter in self.leader_waiters.drain(..) {
                    let _ = waiter.send(());
                }
                self.notify_listeners();
            }
            (Some(old), None) => {
                self.leader = None;
                debug!("{} - lost leader {} for term {}", self.local_id(), old, self.term);
                self.notify_listeners();
            }
            _ => {}
        }
        Ok(())
    }

    /// Records the vote for the current term. At most one vote may be
    /// granted per term, and never while a leader is known.
    pub(crate) fn set_voted_for(&mut self, candidate: Option<NodeId>) -> Result<()> {
        self.check_thread()?;
        if candidate.is_some() && self.voted_for.is_some() {
            return Err(ReplicaError::illegal("already voted for another candidate"));
        }
        if candidate.is_some() && self.leader.is_some() {
            return Err(ReplicaError::illegal("cannot cast vote - leader already exists"));
        }
        self.voted_for = candidate;
        if let Some(c) = candidate {
            debug!("{} - voted for {} in term {}", self.local_id(), c, self.term);
        }
        Ok(())
    }

    /// Advances the commit frontier. The first call after startup records
    /// the recovery target.
    pub(crate) fn set_commit_index(&mut self, index: LogIndex) -> Result<()> {
        self.check_thread()?;
        if index < self.commit_index {
            return Err(ReplicaError::illegal(format!(
                "cannot decrease commit index {} -> {}",
                self.commit_index, index
            )));
        }
        if self.first_commit_index == 0 {
            self.first_commit_index = index;
        }
        self.commit_index = index;
        Ok(())
    }

    /// Advances the apply frontier. Clears `recovering` once the frontier
    /// reaches the first commit index observed after startup.
    pub(crate) fn set_last_applied(&mut self, index: LogIndex) -> Result<()> {
        self.check_thread()?;
        if index < self.last_applied {
            return Err(ReplicaError::illegal(format!(
                "cannot decrease last applied {} -> {}",
                self.last_applied, index
            )));
        }
        if index > self.commit_index {
            return Err(ReplicaError::illegal(format!(
                "last applied {} cannot exceed commit index {}",
                index, self.commit_index
            )));
        }
        self.last_applied = index;
        if self.recovering
            && self.last_applied != 0
            && self.first_commit_index != 0
            && self.last_applied >= self.first_commit_index
        {
            self.recovering = false;
            debug!("{} - recovery complete at index {}", self.local_id(), index);
        }
        Ok(())
    }

    /// Advances the compaction frontier. Advancement is driven by an
    /// external collaborator; the core only enforces monotonicity.
    pub(crate) fn set_recycle_index(&mut self, index: LogIndex) -> Result<()> {
        self.check_thread()?;
        if index < self.recycle_index {
            return Err(ReplicaError::illegal(format!(
                "cannot decrease recycle index {} -> {}",
                self.recycle_index, index
            )));
        }
        self.recycle_index = index;
        Ok(())
    }

    /// Records the freshest cluster configuration version observed.
    pub(crate) fn set_version(&mut self, version: u64) -> Result<()> {
        self.check_thread()?;
        self.version = self.version.max(version);
        Ok(())
    }

    /// Invokes the commit handler, or returns an empty buffer when none
    /// is installed.
    pub(crate) fn commit(&mut self, commit: Commit<'_>) -> Vec<u8> {
        match self.commit_handler.as_mut() {
            Some(handler) => handler(commit),
            None => Vec::new(),
        }
    }

    /// Applies committed entries to the state machine, advancing
    /// `last_applied` up to `commit_index`. Returns the handler output per
    /// applied index so the leader can resolve client waiters.
    pub(crate) fn apply_committed(&mut self) -> Result<Vec<(LogIndex, Vec<u8>)>> {
        let mut applied = Vec::new();
        while self.last_applied < self.commit_index {
            let index = self.last_applied + 1;
            let entry = self.log.entry(index)?;
            let result = match entry.kind {
                EntryKind::Command => self.commit(Commit::Apply {
                    index,
                    key: &entry.key,
                    entry: &entry.entry,
                }),
                EntryKind::NoOp | EntryKind::Config => Vec::new(),
            };
            self.set_last_applied(index)?;
            applied.push((index, result));
        }
        Ok(applied)
    }

    /// Registers a term listener and returns its removal handle.
    pub(crate) fn add_listener(&mut self, listener: TermListener) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId::new(self.next_listener);
        self.listeners.insert(id, listener);
        id
    }

    /// Removes a term listener. Returns whether it was registered.
    pub(crate) fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Registers a waiter completed when a leader is first found.
    pub(crate) fn await_leader(&mut self, waiter: oneshot::Sender<()>) {
        if self.leader.is_some() {
            let _ = waiter.send(());
        } else {
            self.leader_waiters.push(waiter);
        }
    }

    /// Drops pending leader-waiters; their receivers observe `Aborted`.
    pub(crate) fn abort_leader_waiters(&mut self) {
        self.leader_waiters.clear();
    }

    fn notify_listeners(&self) {
        if self.listeners.is_empty() {
            return;
        }
        let info = self.term_info();
        for listener in self.listeners.values() {
            listener(info.clone());
        }
    }

    /// Maps the current election state to a term descriptor: the leader
    /// first, then the remaining active members in configuration order,
    /// truncated to the replication factor.
    pub(crate) fn term_info(&self) -> TermInfo {
        let mut candidates: Vec<NodeId> = Vec::new();
        if let Some(leader) = self.leader {
            candidates.push(leader);
        }
        for member in self.cluster.members() {
            if member.kind == MemberKind::Active && Some(member.id) != self.leader {
                candidates.push(member.id);
            }
        }
        let followers = if self.leader.is_some() && candidates.len() > 1 {
            let cut = candidates.len().min(self.cluster.replication_factor());
            candidates[1..cut].to_vec()
        } else {
            Vec::new()
        };
        TermInfo {
            term: self.term,
            leader: self.leader,
            followers,
        }
    }

    /// Spawns an AppendEntries round trip to `to`, posting the reply as a
    /// pump event. The RPC is bounded by half the election timeout.
    pub(crate) fn send_append(&self, to: NodeId, request: AppendEntriesRequest, round: u64) {
        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        let deadline = self.config.rpc_timeout();
        let term = request.term;
        let prev_index = request.prev_index;
        let sent = request.entries.len() as u64;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(deadline, transport.append_entries(to, request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ReplicaError::Timeout),
            };
            let _ = tx.send(Event::AppendReply {
                peer: to,
                term,
                round,
                prev_index,
                sent,
                result,
            });
        });
    }

    /// Spawns a RequestVote round trip to `to`, posting the reply as a
    /// pump event.
    pub(crate) fn send_vote(&self, to: NodeId, request: RequestVoteRequest) {
        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        let deadline = self.config.rpc_timeout();
        let term = request.term;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(deadline, transport.request_vote(to, request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ReplicaError::Timeout),
            };
            let _ = tx.send(Event::VoteReply {
                peer: to,
                term,
                result,
            });
        });
    }

    /// Forwards a client request to the given member, completing the
    /// client future directly from the forwarding task.
    pub(crate) fn forward_client(
        &self,
        to: NodeId,
        request: ClientRequest,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    ) {
        let transport = Arc::clone(&self.transport);
        let deadline = self.config.forward_timeout();
        debug!("{} - forwarding client request to {}", self.local_id(), to);
        tokio::spawn(async move {
            let result = match tokio::time::timeout(deadline, transport.forward(to, request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ReplicaError::Timeout),
            };
            if result.is_err() {
                warn!("forwarded client request to {} failed", to);
            }
            let _ = reply.send(result);
        });
    }
}

impl std::fmt::Debug for ReplicaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaContext")
            .field("local", &self.local_id())
            .field("term", &self.term)
            .field("leader", &self.leader)
            .field("voted_for", &self.voted_for)
            .field("commit_index", &self.commit_index)
            .field("last_applied", &self.last_applied)
            .field("recovering", &self.recovering)
            .field("open", &self.open)
            .finish()
    }
}

/// Builds a context bound to the current thread for unit tests.
#[cfg(test)]
pub(crate) fn test_context(
    local: NodeId,
    members: Vec<crate::cluster::Member>,
) -> ReplicaContext {
    use crate::log::MemoryLogStore;
    use crate::transport::MemoryNetwork;

    let cluster = Cluster::new(local, members, 3).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    ReplicaContext::new(
        cluster,
        ReplicaConfig::default(),
        LogView::new(Box::new(MemoryLogStore::new())),
        Arc::new(MemoryNetwork::new().transport(local)),
        tx,
        Arc::new(AtomicBool::new(false)),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Member;
    use crate::log::MemoryLogStore;
    use crate::transport::MemoryNetwork;

    fn single_node_context() -> ReplicaContext {
        test_context(1, vec![Member::new(1, MemberKind::Active)])
    }

    #[test]
    fn test_set_term_is_monotone_and_idempotent() {
        let mut ctx = single_node_context();
        ctx.set_term(3).unwrap();
        assert_eq!(ctx.term(), 3);

        ctx.set_term(3).unwrap();
        assert_eq!(ctx.term(), 3);

        ctx.set_term(1).unwrap();
        assert_eq!(ctx.term(), 3);
    }

    #[test]
    fn test_greater_term_resets_leader_and_vote() {
        let mut ctx = single_node_context();
        ctx.set_term(1).unwrap();
        ctx.set_voted_for(Some(1)).unwrap();
        ctx.set_term(2).unwrap();
        assert_eq!(ctx.voted_for(), None);
        assert_eq!(ctx.leader(), None);
    }

    #[test]
    fn test_vote_at_most_once_per_term() {
        let mut ctx = single_node_context();
        ctx.set_term(1).unwrap();
        ctx.set_voted_for(Some(2)).unwrap();
        let err = ctx.set_voted_for(Some(3)).unwrap_err();
        assert!(matches!(err, ReplicaError::IllegalState(_)));
    }

    #[test]
    fn test_no_vote_while_leader_known() {
        let mut ctx = single_node_context();
        ctx.set_term(1).unwrap();
        ctx.set_leader(Some(2)).unwrap();
        let err = ctx.set_voted_for(Some(3)).unwrap_err();
        assert!(matches!(err, ReplicaError::IllegalState(_)));
    }

    #[test]
    fn test_finding_leader_clears_vote() {
        let mut ctx = single_node_context();
        ctx.set_term(1).unwrap();
        ctx.set_voted_for(Some(2)).unwrap();
        ctx.set_leader(Some(2)).unwrap();
        assert_eq!(ctx.voted_for(), None);
        assert_eq!(ctx.leader(), Some(2));
    }

    #[test]
    fn test_commit_index_cannot_regress() {
        let mut ctx = single_node_context();
        ctx.set_commit_index(5).unwrap();
        let err = ctx.set_commit_index(4).unwrap_err();
        assert!(matches!(err, ReplicaError::IllegalState(_)));
        assert_eq!(ctx.commit_index(), 5);
    }

    #[test]
    fn test_first_commit_index_set_once() {
        let mut ctx = single_node_context();
        ctx.set_commit_index(3).unwrap();
        assert_eq!(ctx.first_commit_index(), 3);
        ctx.set_commit_index(7).unwrap();
        assert_eq!(ctx.first_commit_index(), 3);
    }

    #[test]
    fn test_last_applied_bounded_by_commit_index() {
        let mut ctx = single_node_context();
        ctx.set_commit_index(2).unwrap();
        let err = ctx.set_last_applied(3).unwrap_err();
        assert!(matches!(err, ReplicaError::IllegalState(_)));
    }

    #[test]
    fn test_recovering_clears_at_first_commit_index() {
        let mut ctx = single_node_context();
        assert!(ctx.is_recovering());
        ctx.set_commit_index(2).unwrap();
        ctx.set_last_applied(1).unwrap();
        assert!(ctx.is_recovering());
        ctx.set_last_applied(2).unwrap();
        assert!(!ctx.is_recovering());
    }

    #[test]
    fn test_recycle_index_monotone() {
        let mut ctx = single_node_context();
        ctx.set_recycle_index(2).unwrap();
        assert!(ctx.set_recycle_index(1).is_err());
        ctx.set_recycle_index(2).unwrap();
        assert_eq!(ctx.recycle_index(), 2);
    }

    #[test]
    fn test_version_takes_maximum() {
        let mut ctx = single_node_context();
        ctx.set_version(4).unwrap();
        ctx.set_version(2).unwrap();
        assert_eq!(ctx.version(), 4);
    }

    #[test]
    fn test_apply_committed_invokes_handler() {
        let mut ctx = single_node_context();
        let applied = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&applied);
        ctx.commit_handler = Some(Box::new(move |commit| match commit {
            Commit::Apply { key, entry, .. } => {
                sink.lock().unwrap().push((key.to_vec(), entry.to_vec()));
                entry.to_vec()
            }
            Commit::Query { .. } => Vec::new(),
        }));

        ctx.log.append(1, b"a", b"1", EntryKind::Command).unwrap();
        ctx.log.append(1, &[], &[], EntryKind::NoOp).unwrap();
        ctx.log.append(1, b"b", b"2", EntryKind::Command).unwrap();

        ctx.set_commit_index(3).unwrap();
        let results = ctx.apply_committed().unwrap();

        assert_eq!(ctx.last_applied(), 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], (1, b"1".to_vec()));
        assert_eq!(results[1], (2, Vec::new()));
        assert_eq!(results[2], (3, b"2".to_vec()));
        assert_eq!(applied.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_listener_registry_add_remove() {
        let mut ctx = single_node_context();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = ctx.add_listener(Box::new(move |info| {
            sink.lock().unwrap().push(info.term);
        }));

        ctx.set_term(1).unwrap();
        ctx.set_term(2).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

        assert!(ctx.remove_listener(id));
        assert!(!ctx.remove_listener(id));
        ctx.set_term(3).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_term_info_truncates_followers() {
        let members = vec![
            Member::new(1, MemberKind::Active),
            Member::new(2, MemberKind::Active),
            Member::new(3, MemberKind::Active),
            Member::new(4, MemberKind::Active),
            Member::new(5, MemberKind::Passive),
        ];
        let cluster = Cluster::new(1, members, 3).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = ReplicaContext::new(
            cluster,
            ReplicaConfig::default(),
            LogView::new(Box::new(MemoryLogStore::new())),
            Arc::new(MemoryNetwork::new().transport(1)),
            tx,
            Arc::new(AtomicBool::new(false)),
            None,
        );

        ctx.set_term(2).unwrap();
        let info = ctx.term_info();
        assert_eq!(info.leader, None);
        assert!(info.followers.is_empty());

        ctx.set_leader(Some(3)).unwrap();
        let info = ctx.term_info();
        assert_eq!(info.term, 2);
        assert_eq!(info.leader, Some(3));
        // Replication factor 3: the leader plus two followers, in
        // configuration order, passive members excluded.
        assert_eq!(info.followers, vec![1, 2]);
    }
}
