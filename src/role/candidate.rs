//! Candidate role

use std::collections::HashSet;

use tokio::time::Instant;
use tracing::{debug, info};

use super::{voting_peers, RoleKind};
use crate::context::ReplicaContext;
use crate::error::Result;
use crate::rpc::{RequestVoteRequest, RequestVoteResponse};
use crate::NodeId;

/// A voting member soliciting votes for a new term. The election restarts
/// with a fresh term each time the election timer expires.
pub(crate) struct CandidateRole {
    /// Deadline after which a new election is started.
    pub(crate) deadline: Instant,
    votes: HashSet<NodeId>,
}

impl CandidateRole {
    pub(crate) fn new() -> Self {
        Self {
            deadline: Instant::now(),
            votes: HashSet::new(),
        }
    }

    /// Advances the term, votes for self, and solicits votes from every
    /// voting peer. Wins immediately in a single-node cluster.
    pub(crate) fn start_election(
        &mut self,
        ctx: &mut ReplicaContext,
    ) -> Result<Option<RoleKind>> {
        ctx.set_term(ctx.term() + 1)?;
        ctx.set_voted_for(Some(ctx.local_id()))?;
        self.votes.clear();
        self.votes.insert(ctx.local_id());
        self.deadline = Instant::now() + ctx.config().random_election_timeout();

        info!("{} - starting election for term {}", ctx.local_id(), ctx.term());

        if self.votes.len() >= ctx.cluster().quorum_size() {
            return Ok(Some(RoleKind::Leader));
        }

        let request = RequestVoteRequest {
            term: ctx.term(),
            candidate: ctx.local_id(),
            last_index: ctx.log.last_index(),
            last_term: ctx.log.last_term(),
        };
        for peer in voting_peers(ctx) {
            ctx.send_vote(peer, request.clone());
        }
        Ok(None)
    }

    /// Records a vote response for the current term. Returns the
    /// transition to leader once a majority is reached.
    pub(crate) fn vote_reply(
        &mut self,
        ctx: &ReplicaContext,
        peer: NodeId,
        response: RequestVoteResponse,
    ) -> Option<RoleKind> {
        if !response.granted {
            debug!("{} - vote denied by {} in term {}", ctx.local_id(), peer, ctx.term());
            return None;
        }
        self.votes.insert(peer);
        debug!(
            "{} - vote granted by {} ({}/{} needed)",
            ctx.local_id(),
            peer,
            self.votes.len(),
            ctx.cluster().quorum_size()
        );
        if self.votes.len() >= ctx.cluster().quorum_size() {
            Some(RoleKind::Leader)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{Member, MemberKind};
    use crate::context::test_context;

    fn members() -> Vec<Member> {
        vec![
            Member::new(1, MemberKind::Active),
            Member::new(2, MemberKind::Active),
            Member::new(3, MemberKind::Active),
        ]
    }

    #[tokio::test]
    async fn test_election_advances_term_and_votes_for_self() {
        let mut ctx = test_context(1, members());
        let mut candidate = CandidateRole::new();

        let outcome = candidate.start_election(&mut ctx).unwrap();
        assert_eq!(outcome, None);
        assert_eq!(ctx.term(), 1);
        assert_eq!(ctx.voted_for(), Some(1));
        assert_eq!(ctx.leader(), None);
    }

    #[tokio::test]
    async fn test_restarting_election_bumps_term() {
        let mut ctx = test_context(1, members());
        let mut candidate = CandidateRole::new();

        candidate.start_election(&mut ctx).unwrap();
        candidate.start_election(&mut ctx).unwrap();
        assert_eq!(ctx.term(), 2);
        assert_eq!(ctx.voted_for(), Some(1));
    }

    #[tokio::test]
    async fn test_majority_wins_election() {
        let mut ctx = test_context(1, members());
        let mut candidate = CandidateRole::new();
        candidate.start_election(&mut ctx).unwrap();

        let granted = RequestVoteResponse {
            term: ctx.term(),
            granted: true,
        };
        let outcome = candidate.vote_reply(&ctx, 2, granted);
        assert_eq!(outcome, Some(RoleKind::Leader));
    }

    #[tokio::test]
    async fn test_denied_votes_do_not_count() {
        let mut ctx = test_context(1, members());
        let mut candidate = CandidateRole::new();
        candidate.start_election(&mut ctx).unwrap();

        let denied = RequestVoteResponse {
            term: ctx.term(),
            granted: false,
        };
        assert_eq!(candidate.vote_reply(&ctx, 2, denied.clone()), None);
        assert_eq!(candidate.vote_reply(&ctx, 3, denied), None);
    }

    #[tokio::test]
    async fn test_single_node_cluster_wins_immediately() {
        let mut ctx = test_context(1, vec![Member::new(1, MemberKind::Active)]);
        let mut candidate = CandidateRole::new();
        let outcome = candidate.start_election(&mut ctx).unwrap();
        assert_eq!(outcome, Some(RoleKind::Leader));
    }
}
