//! Worker tuning constants (spec.md §4.6, §10.3).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Fixed upper bound on simultaneous HTTP fetches, shared across all
    /// active items (spec.md §4.6 "small constant, e.g. 4-8").
    pub concurrency: usize,
    /// Per-task retry budget before a transient failure escalates.
    pub retry_budget: u32,
    /// Per-HTTP-request timeout.
    pub request_timeout: Duration,
    /// Sent as the `User-Agent` header on every outbound GET
    /// (spec.md §6 `playkit-dtg/<platform>-<version>`).
    pub user_agent: String,
    /// Floor of the exponential backoff applied between retries.
    pub backoff_base: Duration,
    /// Ceiling the exponential backoff never exceeds.
    pub backoff_max: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            retry_budget: 5,
            request_timeout: Duration::from_secs(30),
            user_agent: format!("playkit-dtg/{}-{}", std::env::consts::OS, env!("CARGO_PKG_VERSION")),
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(8),
        }
    }
}

impl WorkerConfig {
    /// Exponential backoff delay for the given zero-based retry attempt.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.backoff_base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        scaled.min(self.backoff_max)
    }
}

impl From<&crate::config::WorkerSettings> for WorkerConfig {
    fn from(settings: &crate::config::WorkerSettings) -> Self {
        Self {
            concurrency: settings.concurrency,
            retry_budget: settings.retry_budget,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_format() {
        let config = WorkerConfig::default();
        assert!(config.user_agent.starts_with("playkit-dtg/"));
    }

    #[test]
    fn test_backoff_grows_then_caps() {
        let config = WorkerConfig::default();
        assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(250));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(500));
        assert!(config.backoff_for_attempt(10) <= config.backoff_max);
    }
}
