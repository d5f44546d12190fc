//! Leader role

use std::collections::BTreeMap;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{quorum_match_index, ClientReply, RoleKind};
use crate::context::{Commit, PeerState, ReplicaContext};
use crate::error::{ReplicaError, Result};
use crate::log::EntryKind;
use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, ClientRequest, Consistency, ReadRequest,
};
use crate::{LogIndex, NodeId};

/// Upper bound on entries shipped per AppendEntries RPC.
const MAX_BATCH: u64 = 64;

/// A linearizable read waiting for a heartbeat round started after it
/// arrived to be acknowledged by a majority.
struct PendingRead {
    needs_round: u64,
    key: Vec<u8>,
    entry: Vec<u8>,
    reply: ClientReply,
}

/// The elected leader: appends client commands, replicates to peers,
/// advances the commit frontier on majority acknowledgement, and resolves
/// client waiters once entries apply.
pub(crate) struct LeaderRole {
    /// Next heartbeat deadline.
    pub(crate) heartbeat_at: Instant,
    /// Heartbeat round counter for linearizable reads.
    round: u64,
    /// Client writes waiting for their entry to commit and apply.
    waiters: BTreeMap<LogIndex, ClientReply>,
    /// Linearizable reads waiting for a quorum round.
    reads: Vec<PendingRead>,
}

impl LeaderRole {
    pub(crate) fn new() -> Self {
        Self {
            heartbeat_at: Instant::now(),
            round: 0,
            waiters: BTreeMap::new(),
            reads: Vec::new(),
        }
    }

    /// Initialises peer state, appends the term-opening no-op, and starts
    /// the heartbeat cycle.
    pub(crate) fn open(&mut self, ctx: &mut ReplicaContext) -> Result<Option<RoleKind>> {
        info!("{} - elected leader for term {}", ctx.local_id(), ctx.term());

        let last_index = ctx.log.last_index();
        let peer_ids = ctx.cluster().replication_peer_ids();
        ctx.peers.clear();
        for id in peer_ids {
            ctx.peers.insert(id, PeerState::reset(last_index));
        }
        ctx.set_leader(Some(ctx.local_id()))?;

        // The no-op lets entries from prior terms commit under this term.
        ctx.log.append(ctx.term(), &[], &[], EntryKind::NoOp)?;

        self.broadcast(ctx)?;
        self.maybe_commit(ctx)?;
        self.heartbeat_at = Instant::now() + ctx.config().heartbeat_interval;
        Ok(None)
    }

    /// Fails pending client futures; their operations may still commit
    /// under a later leader, but this replica can no longer confirm them.
    pub(crate) fn close(&mut self, _ctx: &mut ReplicaContext) -> Result<()> {
        for (_, waiter) in std::mem::take(&mut self.waiters) {
            let _ = waiter.send(Err(ReplicaError::Aborted));
        }
        for read in self.reads.drain(..) {
            let _ = read.reply.send(Err(ReplicaError::Aborted));
        }
        Ok(())
    }

    /// Heartbeat timer expiry: replicate to every peer and re-arm.
    pub(crate) fn on_heartbeat(&mut self, ctx: &mut ReplicaContext) -> Result<Option<RoleKind>> {
        self.broadcast(ctx)?;
        self.heartbeat_at = Instant::now() + ctx.config().heartbeat_interval;
        Ok(None)
    }

    /// Starts a replication round: sends AppendEntries to every peer that
    /// has no RPC outstanding, shipping any entries past its next index.
    fn broadcast(&mut self, ctx: &mut ReplicaContext) -> Result<()> {
        self.round += 1;
        let round = self.round;
        for peer in ctx.cluster().replication_peer_ids() {
            self.replicate_to(ctx, peer, round)?;
        }
        Ok(())
    }

    fn replicate_to(&mut self, ctx: &mut ReplicaContext, peer: NodeId, round: u64) -> Result<()> {
        let next_index = match ctx.peers.get(&peer) {
            Some(state) if state.in_flight => return Ok(()),
            Some(state) => state.next_index,
            None => return Ok(()),
        };

        let last_index = ctx.log.last_index();
        let prev_index = next_index.saturating_sub(1);
        let prev_term = ctx.log.term_at(prev_index);
        let entries = if next_index <= last_index {
            let to = last_index.min(next_index + MAX_BATCH - 1);
            ctx.log.entries(next_index, to)?
        } else {
            Vec::new()
        };

        let request = AppendEntriesRequest {
            term: ctx.term(),
            leader: ctx.local_id(),
            prev_index,
            prev_term,
            entries,
            commit_index: ctx.commit_index(),
        };

        if let Some(state) = ctx.peers.get_mut(&peer) {
            state.in_flight = true;
        }
        ctx.send_append(peer, request, round);
        Ok(())
    }

    /// Handles an AppendEntries reply for the current term. Higher-term
    /// step-down has already been applied by the pump.
    pub(crate) fn append_reply(
        &mut self,
        ctx: &mut ReplicaContext,
        peer: NodeId,
        round: u64,
        prev_index: LogIndex,
        sent: u64,
        result: Result<AppendEntriesResponse>,
    ) -> Result<()> {
        let outcome = match ctx.peers.get_mut(&peer) {
            Some(state) => {
                state.in_flight = false;
                match result {
                    Ok(response) => {
                        state.failures = 0;
                        state.last_contact = std::time::Instant::now();
                        Ok(response)
                    }
                    Err(e) => {
                        state.failures += 1;
                        Err((e, state.failures))
                    }
                }
            }
            None => return Ok(()),
        };
        let response = match outcome {
            Ok(response) => response,
            Err((e, failures)) => {
                // Transient failure: absorbed, retried on the next heartbeat.
                if failures == 1 {
                    warn!("{} - replication to {} failed: {}", ctx.local_id(), peer, e);
                }
                return Ok(());
            }
        };

        if response.success {
            let (catch_up, acked) = match ctx.peers.get_mut(&peer) {
                Some(state) => {
                    state.match_index = state.match_index.max(prev_index + sent);
                    state.next_index = state.match_index + 1;
                    state.acked_round = state.acked_round.max(round);
                    (state.next_index <= ctx.log.last_index(), state.acked_round)
                }
                None => return Ok(()),
            };
            debug!(
                "{} - {} acknowledged through round {}",
                ctx.local_id(),
                peer,
                acked
            );
            self.maybe_commit(ctx)?;
            self.resolve_reads(ctx);
            if catch_up {
                self.replicate_to(ctx, peer, self.round)?;
            }
        } else {
            // Log mismatch: back off using the conflict hint and retry at
            // once rather than waiting for the next heartbeat.
            if let Some(state) = ctx.peers.get_mut(&peer) {
                state.next_index = match response.conflict_index {
                    Some(conflict) => conflict.max(1),
                    None => state.next_index.saturating_sub(1).max(1),
                };
            }
            self.replicate_to(ctx, peer, self.round)?;
        }
        Ok(())
    }

    /// Advances the commit frontier to the highest index replicated on a
    /// majority, restricted to entries of the current term, then applies
    /// and resolves client waiters.
    fn maybe_commit(&mut self, ctx: &mut ReplicaContext) -> Result<()> {
        let candidate = quorum_match_index(ctx);
        if candidate > ctx.commit_index() && ctx.log.term_at(candidate) == ctx.term() {
            ctx.set_commit_index(candidate)?;
            let applied = ctx.apply_committed()?;
            for (index, result) in applied {
                if let Some(waiter) = self.waiters.remove(&index) {
                    let _ = waiter.send(Ok(result));
                }
            }
        }
        Ok(())
    }

    /// The highest heartbeat round acknowledged by a majority, counting
    /// the local replica as having acknowledged the current round.
    fn quorum_round(&self, ctx: &ReplicaContext) -> u64 {
        let mut rounds: Vec<u64> = ctx
            .cluster()
            .voting_peer_ids()
            .iter()
            .filter_map(|id| ctx.peers.get(id))
            .map(|p| p.acked_round)
            .collect();
        rounds.push(self.round);
        rounds.sort_unstable_by(|a, b| b.cmp(a));
        rounds
            .get(ctx.cluster().quorum_size() - 1)
            .copied()
            .unwrap_or(0)
    }

    fn resolve_reads(&mut self, ctx: &mut ReplicaContext) {
        if self.reads.is_empty() {
            return;
        }
        let confirmed = self.quorum_round(ctx);
        let mut i = 0;
        while i < self.reads.len() {
            if self.reads[i].needs_round <= confirmed {
                let read = self.reads.remove(i);
                let result = ctx.commit(Commit::Query {
                    key: &read.key,
                    entry: &read.entry,
                });
                let _ = read.reply.send(Ok(result));
            } else {
                i += 1;
            }
        }
    }

    /// Handles a client operation: reads apply locally (after a quorum
    /// round for linearizable reads); writes and deletes append a command
    /// entry and resolve once it commits and applies.
    pub(crate) fn client(
        &mut self,
        ctx: &mut ReplicaContext,
        request: ClientRequest,
        reply: ClientReply,
    ) -> Result<()> {
        match request {
            ClientRequest::Read(read) => self.read(ctx, read, reply),
            ClientRequest::Write(write) => self.append(ctx, write.key, write.entry, reply),
            ClientRequest::Delete(delete) => self.append(ctx, delete.key, Vec::new(), reply),
        }
    }

    fn read(&mut self, ctx: &mut ReplicaContext, read: ReadRequest, reply: ClientReply) -> Result<()> {
        match read.consistency {
            Consistency::Sequential => {
                let result = ctx.commit(Commit::Query {
                    key: &read.key,
                    entry: &read.entry,
                });
                let _ = reply.send(Ok(result));
            }
            Consistency::Linearizable => {
                if ctx.cluster().quorum_size() <= 1 {
                    let result = ctx.commit(Commit::Query {
                        key: &read.key,
                        entry: &read.entry,
                    });
                    let _ = reply.send(Ok(result));
                    return Ok(());
                }
                // Leadership must be confirmed by a round started after
                // the read arrived.
                self.reads.push(PendingRead {
                    needs_round: self.round + 1,
                    key: read.key,
                    entry: read.entry,
                    reply,
                });
                self.broadcast(ctx)?;
            }
        }
        Ok(())
    }

    fn append(
        &mut self,
        ctx: &mut ReplicaContext,
        key: Vec<u8>,
        entry: Vec<u8>,
        reply: ClientReply,
    ) -> Result<()> {
        let index = match ctx.log.append(ctx.term(), &key, &entry, EntryKind::Command) {
            Ok(index) => index,
            Err(e) => {
                let _ = reply.send(Err(ReplicaError::storage(format!(
                    "append failed: {}",
                    e
                ))));
                return Err(e);
            }
        };
        self.waiters.insert(index, reply);
        self.broadcast(ctx)?;
        self.maybe_commit(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Member, MemberKind};
    use crate::context::test_context;
    use tokio::sync::oneshot;

    fn members() -> Vec<Member> {
        vec![
            Member::new(1, MemberKind::Active),
            Member::new(2, MemberKind::Active),
            Member::new(3, MemberKind::Active),
        ]
    }

    #[tokio::test]
    async fn test_open_initialises_peers_and_appends_noop() {
        let mut ctx = test_context(1, members());
        ctx.set_term(1).unwrap();
        let mut leader = LeaderRole::new();

        leader.open(&mut ctx).unwrap();

        assert_eq!(ctx.leader(), Some(1));
        assert_eq!(ctx.log.last_index(), 1);
        assert_eq!(ctx.log.term_at(1), 1);
        assert_eq!(ctx.peers.len(), 2);
        for peer in ctx.cluster().voting_peer_ids() {
            let state = ctx.peers.get(&peer).unwrap();
            assert_eq!(state.match_index, 0);
            // next_index points past the pre-no-op log head.
            assert_eq!(state.next_index, 1);
        }
    }

    #[tokio::test]
    async fn test_commit_requires_majority() {
        let mut ctx = test_context(1, members());
        ctx.set_term(1).unwrap();
        let mut leader = LeaderRole::new();
        leader.open(&mut ctx).unwrap();

        assert_eq!(ctx.commit_index(), 0);

        // One acknowledgement (plus self) is a majority of three.
        leader
            .append_reply(
                &mut ctx,
                2,
                1,
                0,
                1,
                Ok(AppendEntriesResponse::success(1, 1)),
            )
            .unwrap();
        assert_eq!(ctx.commit_index(), 1);
        assert_eq!(ctx.last_applied(), 1);
    }

    #[tokio::test]
    async fn test_commit_skips_entries_from_older_terms() {
        let mut ctx = test_context(1, members());
        ctx.log.append(1, b"k", b"v", EntryKind::Command).unwrap();
        ctx.set_term(2).unwrap();
        let mut leader = LeaderRole::new();
        leader.open(&mut ctx).unwrap();

        // Peer 2 has replicated only the old-term entry. The quorum match
        // index lands on it, but it must not commit under term 2.
        if let Some(state) = ctx.peers.get_mut(&2) {
            state.match_index = 1;
        }
        leader.maybe_commit(&mut ctx).unwrap();
        assert_eq!(ctx.commit_index(), 0);

        // Once the no-op at the current term reaches the peer, both commit.
        if let Some(state) = ctx.peers.get_mut(&2) {
            state.match_index = 2;
        }
        leader.maybe_commit(&mut ctx).unwrap();
        assert_eq!(ctx.commit_index(), 2);
    }

    #[tokio::test]
    async fn test_conflict_hint_rewinds_next_index() {
        let mut ctx = test_context(1, members());
        ctx.set_term(3).unwrap();
        let mut leader = LeaderRole::new();
        leader.open(&mut ctx).unwrap();

        leader
            .append_reply(
                &mut ctx,
                2,
                1,
                0,
                0,
                Ok(AppendEntriesResponse::rejected(3, 5, Some(2), Some(1))),
            )
            .unwrap();
        assert_eq!(ctx.peers.get(&2).unwrap().next_index, 2);
    }

    #[tokio::test]
    async fn test_rpc_failure_counts_against_peer() {
        let mut ctx = test_context(1, members());
        ctx.set_term(1).unwrap();
        let mut leader = LeaderRole::new();
        leader.open(&mut ctx).unwrap();

        leader
            .append_reply(&mut ctx, 2, 1, 0, 1, Err(ReplicaError::Timeout))
            .unwrap();
        let state = ctx.peers.get(&2).unwrap();
        assert_eq!(state.failures, 1);
        assert!(!state.in_flight);
        assert_eq!(ctx.commit_index(), 0);
    }

    #[tokio::test]
    async fn test_write_resolves_after_majority_ack() {
        let mut ctx = test_context(1, members());
        ctx.set_term(1).unwrap();
        let mut leader = LeaderRole::new();
        leader.open(&mut ctx).unwrap();

        let (reply, mut rx) = oneshot::channel();
        leader
            .client(
                &mut ctx,
                ClientRequest::Write(crate::rpc::WriteRequest {
                    key: b"k".to_vec(),
                    entry: b"v".to_vec(),
                }),
                reply,
            )
            .unwrap();
        assert_eq!(ctx.log.last_index(), 2);
        assert!(rx.try_recv().is_err());

        // Majority acknowledges both the no-op and the write.
        leader
            .append_reply(
                &mut ctx,
                2,
                2,
                0,
                2,
                Ok(AppendEntriesResponse::success(1, 2)),
            )
            .unwrap();
        assert_eq!(ctx.commit_index(), 2);
        let result = rx.try_recv().unwrap().unwrap();
        // No handler installed: empty result buffer.
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_close_aborts_pending_writes() {
        let mut ctx = test_context(1, members());
        ctx.set_term(1).unwrap();
        let mut leader = LeaderRole::new();
        leader.open(&mut ctx).unwrap();

        let (reply, mut rx) = oneshot::channel();
        leader
            .client(
                &mut ctx,
                ClientRequest::Write(crate::rpc::WriteRequest {
                    key: b"k".to_vec(),
                    entry: b"v".to_vec(),
                }),
                reply,
            )
            .unwrap();
        leader.close(&mut ctx).unwrap();

        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, ReplicaError::Aborted));
    }

    #[tokio::test]
    async fn test_linearizable_read_waits_for_quorum_round() {
        let mut ctx = test_context(1, members());
        ctx.set_term(1).unwrap();
        let mut leader = LeaderRole::new();
        leader.open(&mut ctx).unwrap();

        let (reply, mut rx) = oneshot::channel();
        leader
            .client(
                &mut ctx,
                ClientRequest::Read(ReadRequest {
                    key: b"k".to_vec(),
                    entry: Vec::new(),
                    consistency: Consistency::Linearizable,
                }),
                reply,
            )
            .unwrap();
        assert!(rx.try_recv().is_err());

        // An acknowledgement of the round started for the read releases it.
        let round = leader.round;
        leader
            .append_reply(
                &mut ctx,
                2,
                round,
                0,
                1,
                Ok(AppendEntriesResponse::success(1, 1)),
            )
            .unwrap();
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_sequential_read_applies_immediately() {
        let mut ctx = test_context(1, members());
        ctx.set_term(1).unwrap();
        let mut leader = LeaderRole::new();
        leader.open(&mut ctx).unwrap();

        let (reply, mut rx) = oneshot::channel();
        leader
            .client(
                &mut ctx,
                ClientRequest::Read(ReadRequest {
                    key: b"k".to_vec(),
                    entry: Vec::new(),
                    consistency: Consistency::Sequential,
                }),
                reply,
            )
            .unwrap();
        assert!(rx.try_recv().unwrap().is_ok());
    }
}
