//! Timestamp type used throughout the engine.
//!
//! Timestamps are Unix epoch milliseconds (UTC). All pure state-machine code
//! takes `now: Timestamp` as a parameter instead of reading the wall clock,
//! which keeps the consensus logic deterministic under test.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A Unix timestamp in milliseconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64;
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> Duration {
        Duration::from_millis(now.0.saturating_sub(self.0))
    }

    /// Whether this timestamp + duration has passed relative to `now`.
    /// The boundary itself has not expired (strict inequality), so a timeout
    /// of `d` fires on the first instant strictly after `self + d`.
    pub fn has_expired(&self, duration: Duration, now: Timestamp) -> bool {
        now.0 > self.0.saturating_add(duration.as_millis() as u64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_since_saturates() {
        let early = Timestamp::from_millis(100);
        let late = Timestamp::from_millis(250);
        assert_eq!(early.elapsed_since(late), Duration::from_millis(150));
        assert_eq!(late.elapsed_since(early), Duration::ZERO);
    }

    #[test]
    fn expiry_is_strict() {
        let t = Timestamp::from_millis(1_000);
        let d = Duration::from_millis(500);
        assert!(!t.has_expired(d, Timestamp::from_millis(1_500)));
        assert!(t.has_expired(d, Timestamp::from_millis(1_501)));
    }
}
