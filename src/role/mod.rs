//! Role state machine
//!
//! A replica is always in exactly one of six roles. Transitions are
//! mediated by the event pump: the outgoing role's `close` fully
//! completes before the successor's `open` begins, and no handler runs
//! during a transition. `open` may request a follow-on transition, which
//! the pump applies before processing further events.

mod candidate;
mod follower;
mod leader;
mod passive;
mod remote;
mod start;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::context::ReplicaContext;
use crate::error::{ReplicaError, Result};
use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, ClientRequest, RequestVoteRequest,
    RequestVoteResponse,
};
use crate::{LogIndex, NodeId};

pub(crate) use candidate::CandidateRole;
pub(crate) use follower::FollowerRole;
pub(crate) use leader::LeaderRole;
pub(crate) use passive::PassiveRole;
pub(crate) use remote::RemoteRole;
pub(crate) use start::StartRole;

/// Completion side of a pending client request.
pub(crate) type ClientReply = oneshot::Sender<Result<Vec<u8>>>;

/// The kind of role a replica is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleKind {
    /// Null role used during open/close transitions.
    Start,
    /// Read-only observer without a log.
    Remote,
    /// Non-voting learner.
    Passive,
    /// Voting member replicating from a leader.
    Follower,
    /// Voting member running for election.
    Candidate,
    /// The elected leader for the current term.
    Leader,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleKind::Start => write!(f, "start"),
            RoleKind::Remote => write!(f, "remote"),
            RoleKind::Passive => write!(f, "passive"),
            RoleKind::Follower => write!(f, "follower"),
            RoleKind::Candidate => write!(f, "candidate"),
            RoleKind::Leader => write!(f, "leader"),
        }
    }
}

/// The active role with its per-variant state.
pub(crate) enum Role {
    Start(StartRole),
    Remote(RemoteRole),
    Passive(PassiveRole),
    Follower(FollowerRole),
    Candidate(CandidateRole),
    Leader(LeaderRole),
}

impl Role {
    pub(crate) fn build(kind: RoleKind) -> Role {
        match kind {
            RoleKind::Start => Role::Start(StartRole),
            RoleKind::Remote => Role::Remote(RemoteRole),
            RoleKind::Passive => Role::Passive(PassiveRole),
            RoleKind::Follower => Role::Follower(FollowerRole::new()),
            RoleKind::Candidate => Role::Candidate(CandidateRole::new()),
            RoleKind::Leader => Role::Leader(LeaderRole::new()),
        }
    }

    pub(crate) fn kind(&self) -> RoleKind {
        match self {
            Role::Start(_) => RoleKind::Start,
            Role::Remote(_) => RoleKind::Remote,
            Role::Passive(_) => RoleKind::Passive,
            Role::Follower(_) => RoleKind::Follower,
            Role::Candidate(_) => RoleKind::Candidate,
            Role::Leader(_) => RoleKind::Leader,
        }
    }

    /// Arms timers and issues initial RPCs. Returns a follow-on
    /// transition when the role resolves immediately (a candidate in a
    /// single-node cluster wins at once).
    pub(crate) fn open(&mut self, ctx: &mut ReplicaContext) -> Result<Option<RoleKind>> {
        match self {
            Role::Start(_) | Role::Remote(_) | Role::Passive(_) => Ok(None),
            Role::Follower(f) => {
                f.reset_timer(ctx);
                Ok(None)
            }
            Role::Candidate(c) => c.start_election(ctx),
            Role::Leader(l) => l.open(ctx),
        }
    }

    /// Cancels timers and releases per-role state.
    pub(crate) fn close(&mut self, ctx: &mut ReplicaContext) -> Result<()> {
        match self {
            Role::Leader(l) => l.close(ctx),
            _ => Ok(()),
        }
    }

    /// The next timer deadline for the active role, if any.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            Role::Follower(f) => Some(f.deadline),
            Role::Candidate(c) => Some(c.deadline),
            Role::Leader(l) => Some(l.heartbeat_at),
            _ => None,
        }
    }

    /// Handles timer expiry. Returns the transition to apply, if any.
    pub(crate) fn on_timeout(&mut self, ctx: &mut ReplicaContext) -> Result<Option<RoleKind>> {
        match self {
            Role::Follower(_) => Ok(Some(RoleKind::Candidate)),
            Role::Candidate(c) => c.start_election(ctx),
            Role::Leader(l) => l.on_heartbeat(ctx),
            _ => Ok(None),
        }
    }

    /// Dispatches an AppendEntries RPC. Higher-term step-down has already
    /// been applied by the pump.
    pub(crate) fn append_entries(
        &mut self,
        ctx: &mut ReplicaContext,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        match self {
            Role::Start(_) => Err(ReplicaError::NotOpen),
            Role::Remote(r) => r.append_entries(ctx, request),
            Role::Passive(_) => replicate(ctx, request),
            Role::Follower(f) => f.append_entries(ctx, request),
            // A leader or lingering candidate at an equal or higher local
            // term rejects; the sender observes our term and steps down.
            Role::Candidate(_) | Role::Leader(_) => Ok(AppendEntriesResponse::rejected(
                ctx.term(),
                ctx.log.last_index(),
                None,
                None,
            )),
        }
    }

    /// Dispatches a RequestVote RPC.
    pub(crate) fn request_vote(
        &mut self,
        ctx: &mut ReplicaContext,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse> {
        match self {
            Role::Start(_) => Err(ReplicaError::NotOpen),
            Role::Remote(_) | Role::Passive(_) => {
                // Non-voting members never grant.
                Ok(RequestVoteResponse {
                    term: ctx.term(),
                    granted: false,
                })
            }
            Role::Follower(f) => f.request_vote(ctx, request),
            Role::Candidate(_) | Role::Leader(_) => {
                // Voted for self or already leading; evaluate_vote rejects.
                let (response, _) = evaluate_vote(ctx, &request)?;
                Ok(response)
            }
        }
    }

    /// Dispatches a client request. The role owns the reply channel and
    /// must complete it, now or when the operation commits.
    pub(crate) fn client(
        &mut self,
        ctx: &mut ReplicaContext,
        request: ClientRequest,
        reply: ClientReply,
    ) -> Result<()> {
        match self {
            Role::Start(_) => {
                let _ = reply.send(Err(ReplicaError::NotOpen));
                Ok(())
            }
            Role::Remote(_) | Role::Passive(_) | Role::Follower(_) | Role::Candidate(_) => {
                forward_to_leader(ctx, request, reply);
                Ok(())
            }
            Role::Leader(l) => l.client(ctx, request, reply),
        }
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Role::{}", self.kind())
    }
}

/// Forwards a client request to the known leader, or fails it with
/// `NoLeader`.
pub(crate) fn forward_to_leader(
    ctx: &ReplicaContext,
    request: ClientRequest,
    reply: ClientReply,
) {
    match ctx.leader() {
        Some(leader) if leader != ctx.local_id() => ctx.forward_client(leader, request, reply),
        _ => {
            let _ = reply.send(Err(ReplicaError::NoLeader));
        }
    }
}

/// Shared AppendEntries replication path for followers and passive
/// learners: consistency check, conflict reconciliation, append, and
/// commit-frontier advance.
pub(crate) fn replicate(
    ctx: &mut ReplicaContext,
    request: AppendEntriesRequest,
) -> Result<AppendEntriesResponse> {
    if request.term < ctx.term() {
        return Ok(AppendEntriesResponse::rejected(
            ctx.term(),
            ctx.log.last_index(),
            None,
            None,
        ));
    }
    ctx.set_term(request.term)?;
    ctx.set_leader(Some(request.leader))?;

    if request.prev_index > 0 {
        let local_term = ctx.log.term_at(request.prev_index);
        if local_term == 0 {
            // Log too short: hint one past our last entry.
            return Ok(AppendEntriesResponse::rejected(
                ctx.term(),
                ctx.log.last_index(),
                Some(ctx.log.last_index() + 1),
                None,
            ));
        }
        if local_term != request.prev_term {
            // Hint the first index of the conflicting term so the leader
            // can skip past it in one step.
            let mut conflict_index = request.prev_index;
            while conflict_index > 1 && ctx.log.term_at(conflict_index - 1) == local_term {
                conflict_index -= 1;
            }
            return Ok(AppendEntriesResponse::rejected(
                ctx.term(),
                ctx.log.last_index(),
                Some(conflict_index),
                Some(local_term),
            ));
        }
    }

    for entry in &request.entries {
        let local_term = ctx.log.term_at(entry.index);
        if local_term == entry.term && local_term != 0 {
            continue;
        }
        if local_term != 0 {
            ctx.log.truncate_suffix(entry.index)?;
        }
        let index = ctx.log.append(entry.term, &entry.key, &entry.entry, entry.kind)?;
        if index != entry.index {
            return Err(ReplicaError::illegal(format!(
                "log gap: appended at {} but leader sent {}",
                index, entry.index
            )));
        }
    }

    let new_commit = request.commit_index.min(ctx.log.last_index());
    if new_commit > ctx.commit_index() {
        ctx.set_commit_index(new_commit)?;
        ctx.apply_committed()?;
    }

    Ok(AppendEntriesResponse::success(ctx.term(), ctx.log.last_index()))
}

/// Shared vote evaluation: grant only when no vote has been cast for
/// another candidate this term, no leader is known, and the candidate's
/// log is at least as up-to-date as ours.
pub(crate) fn evaluate_vote(
    ctx: &mut ReplicaContext,
    request: &RequestVoteRequest,
) -> Result<(RequestVoteResponse, bool)> {
    let up_to_date = (request.last_term, request.last_index)
        >= (ctx.log.last_term(), ctx.log.last_index());
    let eligible = request.term >= ctx.term()
        && ctx.leader().is_none()
        && (ctx.voted_for().is_none() || ctx.voted_for() == Some(request.candidate));

    let granted = eligible && up_to_date;
    if granted && ctx.voted_for().is_none() {
        ctx.set_voted_for(Some(request.candidate))?;
    }
    Ok((
        RequestVoteResponse {
            term: ctx.term(),
            granted,
        },
        granted,
    ))
}

/// Computes the commit candidate: the quorum-th highest match index,
/// counting the local log head for the leader itself.
pub(crate) fn quorum_match_index(ctx: &ReplicaContext) -> LogIndex {
    let mut indices: Vec<LogIndex> = ctx
        .cluster()
        .voting_peer_ids()
        .iter()
        .filter_map(|id| ctx.peers.get(id))
        .map(|p| p.match_index)
        .collect();
    indices.push(ctx.log.last_index());
    indices.sort_unstable_by(|a, b| b.cmp(a));
    let quorum = ctx.cluster().quorum_size();
    indices.get(quorum - 1).copied().unwrap_or(0)
}

/// Ids of voting peers, for vote solicitation.
pub(crate) fn voting_peers(ctx: &ReplicaContext) -> Vec<NodeId> {
    ctx.cluster().voting_peer_ids()
}
