//! # Replog Consensus Engine
//!
//! A Raft-style replicated log replica core: leader election, log
//! replication, and a linearised client read/write/delete surface, with
//! storage, transport, and cluster membership injected as collaborators.
//!
//! ## Architecture
//!
//! - **Replica Context**: authoritative state (term, leadership, commit
//!   and apply frontiers) mutated only on a dedicated context thread.
//! - **Log View**: a thin adapter over the pluggable [`LogStore`].
//! - **Role State Machine**: `Start`, `Remote`, `Passive`, `Follower`,
//!   `Candidate`, and `Leader` variants driven by a single event pump.
//! - **Client Gateway**: packages read/write/delete operations, submits
//!   them to the active role, and unwraps results.
//!
//! Incoming RPCs arrive through [`ReplicaHandle`]; outgoing RPCs go
//! through the [`Transport`] collaborator. The [`TermProvider`] surface
//! advertises election outcomes to upstream partition managers.

#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]
#![deny(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod log;
pub mod replica;
pub mod rpc;
pub mod term;
pub mod transport;

mod context;
mod gateway;
mod role;

pub use cluster::{Cluster, Member, MemberKind};
pub use config::ReplicaConfig;
pub use context::{Commit, CommitHandler, ExecutionContext, TermListener};
pub use error::{ReplicaError, Result};
pub use log::{EntryKind, LogEntry, LogStore, LogView, MemoryLogStore};
pub use replica::{Replica, ReplicaBuilder, ReplicaHandle, ReplicaStatus};
pub use role::RoleKind;
pub use rpc::{
    AppendEntriesRequest, AppendEntriesResponse, ClientRequest, Consistency, DeleteRequest,
    ReadRequest, RequestVoteRequest, RequestVoteResponse, WriteRequest,
};
pub use term::{ListenerId, TermInfo, TermProvider};
pub use transport::{MemoryNetwork, MemoryTransport, Transport};

/// Unique identifier of a cluster member. Zero is never a valid id.
pub type NodeId = u64;

/// Election epoch. Monotone non-decreasing; at most one leader per term.
pub type Term = u64;

/// Position in the replicated log (1-based, no gaps).
pub type LogIndex = u64;
