//! Protocol and client RPC message definitions

use serde::{Deserialize, Serialize};

use crate::log::LogEntry;
use crate::{LogIndex, NodeId, Term};

/// AppendEntries RPC, used for log replication and heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    /// Leader's term.
    pub term: Term,
    /// Leader id, so followers can redirect clients.
    pub leader: NodeId,
    /// Index of the log entry immediately preceding the new ones.
    pub prev_index: LogIndex,
    /// Term of the entry at `prev_index`.
    pub prev_term: Term,
    /// Entries to store (empty for a heartbeat).
    pub entries: Vec<LogEntry>,
    /// Leader's commit index.
    pub commit_index: LogIndex,
}

impl AppendEntriesRequest {
    /// Creates a heartbeat (an append with no entries).
    pub fn heartbeat(
        term: Term,
        leader: NodeId,
        prev_index: LogIndex,
        prev_term: Term,
        commit_index: LogIndex,
    ) -> Self {
        Self {
            term,
            leader,
            prev_index,
            prev_term,
            entries: Vec::new(),
            commit_index,
        }
    }

    /// Whether this request carries no entries.
    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Response to [`AppendEntriesRequest`]. Always carries the responder's
/// current term so the sender can observe higher terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    /// Responder's current term.
    pub term: Term,
    /// Whether the entries were accepted.
    pub success: bool,
    /// Responder's last log index.
    pub last_index: LogIndex,
    /// On failure, the first index of the conflicting term, or one past
    /// the responder's last index when its log is short.
    pub conflict_index: Option<LogIndex>,
    /// Term of the conflicting entry, if any.
    pub conflict_term: Option<Term>,
}

impl AppendEntriesResponse {
    /// Builds a success response.
    pub fn success(term: Term, last_index: LogIndex) -> Self {
        Self {
            term,
            success: true,
            last_index,
            conflict_index: None,
            conflict_term: None,
        }
    }

    /// Builds a rejection response.
    pub fn rejected(
        term: Term,
        last_index: LogIndex,
        conflict_index: Option<LogIndex>,
        conflict_term: Option<Term>,
    ) -> Self {
        Self {
            term,
            success: false,
            last_index,
            conflict_index,
            conflict_term,
        }
    }
}

/// RequestVote RPC, invoked by candidates to gather votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    /// Candidate's term.
    pub term: Term,
    /// Candidate requesting the vote.
    pub candidate: NodeId,
    /// Index of the candidate's last log entry.
    pub last_index: LogIndex,
    /// Term of the candidate's last log entry.
    pub last_term: Term,
}

/// Response to [`RequestVoteRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    /// Responder's current term.
    pub term: Term,
    /// Whether the vote was granted.
    pub granted: bool,
}

/// Read consistency levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    /// Apply on local state once the local state machine has caught up
    /// with the commit frontier observed at request time.
    Sequential,
    /// Confirm leadership with a majority heartbeat round before applying.
    Linearizable,
}

/// Client read request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Key to read.
    pub key: Vec<u8>,
    /// Query payload handed to the commit handler.
    pub entry: Vec<u8>,
    /// Requested consistency level.
    pub consistency: Consistency,
}

/// Client write request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Key to write.
    pub key: Vec<u8>,
    /// Entry payload.
    pub entry: Vec<u8>,
}

/// Client delete request. Logged as a command entry with an empty
/// payload; the commit handler treats the empty payload as a tombstone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Key to delete.
    pub key: Vec<u8>,
}

/// A client operation submitted through the gateway or forwarded from a
/// non-leader member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Read operation.
    Read(ReadRequest),
    /// Write operation.
    Write(WriteRequest),
    /// Delete operation.
    Delete(DeleteRequest),
}
