//! Timing and sizing knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-reactor timing parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactorConfig {
    /// How often to re-broadcast our own attestation while waiting for quorum.
    pub retransmit_frequency: Duration,
    /// How long to keep collecting signatures after quorum before finalizing.
    pub quorum_grace_period: Duration,
    /// Give up if no new attestation arrived for this long after we observed.
    pub quorum_timeout: Duration,
    /// Give up if we never observed locally within this long of first hearing
    /// about the digest.
    pub unobserved_timeout: Duration,
    /// How long to wait for the signer to produce our attestation. A signer
    /// that misses the deadline degrades the node to a relay for that round.
    pub signing_deadline: Duration,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            retransmit_frequency: Duration::from_secs(5 * 60),
            quorum_grace_period: Duration::from_secs(2 * 60),
            quorum_timeout: Duration::from_secs(24 * 60 * 60),
            unobserved_timeout: Duration::from_secs(24 * 60 * 60),
            signing_deadline: Duration::from_secs(5),
        }
    }
}

impl ReactorConfig {
    /// Polling period for timeout checks: half the shortest configured
    /// timeout, so no deadline is overshot by more than half its length.
    pub fn tick_interval(&self) -> Duration {
        let shortest = self
            .retransmit_frequency
            .min(self.quorum_grace_period)
            .min(self.quorum_timeout)
            .min(self.unobserved_timeout);
        (shortest / 2).max(Duration::from_millis(1))
    }
}

/// Manager-level sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Number of worker tasks draining the shared work queue.
    pub workers: usize,
    /// Capacity of the shared work queue. Submissions beyond it are dropped.
    pub queue_capacity: usize,
    /// Timing applied to every reactor this manager creates.
    pub reactor: ReactorConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_capacity: 1024,
            reactor: ReactorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_is_half_the_shortest_timeout() {
        let config = ReactorConfig {
            retransmit_frequency: Duration::from_millis(300),
            quorum_grace_period: Duration::from_millis(100),
            quorum_timeout: Duration::from_secs(10),
            unobserved_timeout: Duration::from_secs(10),
            signing_deadline: Duration::from_secs(5),
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
    }

    #[test]
    fn tick_interval_never_zero() {
        let config = ReactorConfig {
            retransmit_frequency: Duration::from_millis(1),
            quorum_grace_period: Duration::from_millis(1),
            quorum_timeout: Duration::from_millis(1),
            unobserved_timeout: Duration::from_millis(1),
            signing_deadline: Duration::from_secs(5),
        };
        assert!(config.tick_interval() >= Duration::from_millis(1));
    }

    #[test]
    fn defaults_round_trip_through_serde() {
        let config = ReactorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<ReactorConfig>(&json).unwrap(), config);
    }
}
