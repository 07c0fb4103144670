use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for one unit's archive transaction.
///
/// ## What
///
/// Controls per-unit retry with:
/// - `max_attempts`: total attempts, the first one included
/// - `delay`: fixed pause between attempts
///
/// ## How
///
/// ```rust
/// use std::time::Duration;
/// use workflow_archiver::policy::RetryPolicy;
///
/// // Default: 3 attempts, 5 seconds apart
/// let policy = RetryPolicy::default();
/// assert!(policy.should_retry(2));
/// assert!(!policy.should_retry(3));
///
/// // Custom: 5 attempts with no delay
/// let policy = RetryPolicy { max_attempts: 5, delay: Duration::ZERO };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1 = no retry)
    pub max_attempts: u32,
    /// Delay between a rolled-back attempt and the next one
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.retry_delay(),
        }
    }

    /// Check if another attempt is allowed after `attempts` failed ones.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Run-wide count of abandoned units.
///
/// Once `spent` reaches `limit` the run stops attempting further units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    limit: u32,
    spent: u32,
}

impl ErrorBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, spent: 0 }
    }

    /// Record one abandoned unit. Returns true when the budget is now exhausted.
    pub fn record_failure(&mut self) -> bool {
        self.spent = self.spent.saturating_add(1);
        self.exhausted()
    }

    pub fn exhausted(&self) -> bool {
        self.spent >= self.limit
    }
}
