//! Replica configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReplicaError, Result};

/// Timing configuration for elections and replication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Base election timeout. Actual timeouts are randomised within
    /// `[election_timeout, 2 * election_timeout)`.
    pub election_timeout: Duration,

    /// Interval between leader heartbeats. Must be strictly less than the
    /// election timeout.
    pub heartbeat_interval: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            election_timeout: Duration::from_millis(250),
            heartbeat_interval: Duration::from_millis(50),
        }
    }
}

impl ReplicaConfig {
    /// Creates a configuration with the given timings.
    pub fn new(election_timeout: Duration, heartbeat_interval: Duration) -> Self {
        Self {
            election_timeout,
            heartbeat_interval,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.election_timeout.is_zero() {
            return Err(ReplicaError::config("election_timeout must be positive"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ReplicaError::config("heartbeat_interval must be positive"));
        }
        if self.heartbeat_interval >= self.election_timeout {
            return Err(ReplicaError::config(
                "heartbeat_interval must be less than election_timeout",
            ));
        }
        Ok(())
    }

    /// Returns a randomised election timeout in `[timeout, 2 * timeout)`.
    pub(crate) fn random_election_timeout(&self) -> Duration {
        let base = self.election_timeout.as_millis() as u64;
        let jitter = rand::random::<u64>() % base.max(1);
        Duration::from_millis(base + jitter)
    }

    /// Deadline applied to each outbound protocol RPC.
    pub(crate) fn rpc_timeout(&self) -> Duration {
        self.election_timeout / 2
    }

    /// Deadline applied to client requests forwarded to the leader.
    pub(crate) fn forward_timeout(&self) -> Duration {
        self.election_timeout * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ReplicaConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_random_election_timeout_range() {
        let config = ReplicaConfig::default();
        for _ in 0..32 {
            let timeout = config.random_election_timeout();
            assert!(timeout >= config.election_timeout);
            assert!(timeout < config.election_timeout * 2);
        }
    }

    #[test]
    fn test_heartbeat_must_be_less_than_election() {
        let config = ReplicaConfig::new(Duration::from_millis(50), Duration::from_millis(50));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_durations_rejected() {
        let config = ReplicaConfig::new(Duration::ZERO, Duration::from_millis(10));
        assert!(config.validate().is_err());

        let config = ReplicaConfig::new(Duration::from_millis(100), Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
