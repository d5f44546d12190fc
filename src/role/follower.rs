//! Follower role

use tokio::time::Instant;

use super::{evaluate_vote, replicate};
use crate::context::ReplicaContext;
use crate::error::Result;
use crate::rpc::{
    AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest, RequestVoteResponse,
};

/// Initial role for an active member. Replicates from the leader and
/// converts to candidate when the election timer expires.
pub(crate) struct FollowerRole {
    /// Election deadline, randomised within one to two election timeouts.
    pub(crate) deadline: Instant,
}

impl FollowerRole {
    pub(crate) fn new() -> Self {
        Self {
            deadline: Instant::now(),
        }
    }

    pub(crate) fn reset_timer(&mut self, ctx: &ReplicaContext) {
        self.deadline = Instant::now() + ctx.config().random_election_timeout();
    }

    pub(crate) fn append_entries(
        &mut self,
        ctx: &mut ReplicaContext,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let stale = request.term < ctx.term();
        let response = replicate(ctx, request)?;
        // Any append from a live leader at the current term holds off an
        // election, whether or not the consistency check passed.
        if !stale {
            self.reset_timer(ctx);
        }
        Ok(response)
    }

    pub(crate) fn request_vote(
        &mut self,
        ctx: &mut ReplicaContext,
        request: RequestVoteRequest,
    ) -> Result<RequestVoteResponse> {
        let (response, granted) = evaluate_vote(ctx, &request)?;
        if granted {
            self.reset_timer(ctx);
        }
        Ok(response)
    }
}
