//! Read-only observer role

use crate::context::ReplicaContext;
use crate::error::Result;
use crate::rpc::{AppendEntriesRequest, AppendEntriesResponse};

/// A remote member holds no log and does not participate in replication
/// or elections. It keeps just enough state (the believed leader) to
/// forward client requests; forwarding itself is handled in the role
/// dispatch.
pub(crate) struct RemoteRole;

impl RemoteRole {
    pub(crate) fn append_entries(
        &mut self,
        ctx: &mut ReplicaContext,
        request: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        // Track the leader for forwarding, but accept no entries.
        if request.term >= ctx.term() {
            ctx.set_term(request.term)?;
            ctx.set_leader(Some(request.leader))?;
        }
        Ok(AppendEntriesResponse::rejected(
            ctx.term(),
            0,
            None,
            None,
        ))
    }
}
