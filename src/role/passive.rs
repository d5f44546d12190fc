//! Non-voting learner role

/// A passive member replicates the log with follower semantics but never
/// runs for election and never grants votes. Replication is handled by
/// the shared path in the role dispatch; no election timer is armed.
pub(crate) struct PassiveRole;
