//! Error types for the consensus engine

use thiserror::Error;

/// Errors produced by the replica and its collaborators.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// Operation attempted before `open()` or after `close()`.
    #[error("replica is not open")]
    NotOpen,

    /// Client request on a node with no known leader and no forwarding target.
    #[error("no known leader")]
    NoLeader,

    /// An invariant violation was attempted. These are bugs and are never
    /// recovered internally.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// An RPC did not complete within its deadline.
    #[error("request timed out")]
    Timeout,

    /// Underlying network failure; recovered by retry on the next heartbeat.
    #[error("transport error: {0}")]
    Transport(String),

    /// Log I/O failure; fatal to the active role but not to the process.
    #[error("storage error: {0}")]
    Storage(String),

    /// Request superseded by step-down or close.
    #[error("request aborted")]
    Aborted,

    /// Invalid configuration supplied at construction.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReplicaError {
    /// Builds an `IllegalState` error.
    pub fn illegal<S: Into<String>>(message: S) -> Self {
        Self::IllegalState(message.into())
    }

    /// Builds a `Storage` error.
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage(message.into())
    }

    /// Builds a `Transport` error.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Builds a `Config` error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for replica operations.
pub type Result<T> = std::result::Result<T, ReplicaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(ReplicaError::NotOpen.to_string(), "replica is not open");
        assert_eq!(
            ReplicaError::illegal("already voted").to_string(),
            "illegal state: already voted"
        );
        assert_eq!(
            ReplicaError::storage("segment missing").to_string(),
            "storage error: segment missing"
        );
    }
}
