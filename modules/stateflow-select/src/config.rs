use std::env;
use std::time::Duration;

/// Selector-engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SelectConfig {
    /// How long a pending keyed-memoization entry may stay unsettled before
    /// it is rejected and evicted.
    pub selector_timeout: Duration,
}

impl SelectConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let ms: u64 = env::var("STATEFLOW_SELECTOR_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .expect("STATEFLOW_SELECTOR_TIMEOUT_MS must be a number");
        Self {
            selector_timeout: Duration::from_millis(ms),
        }
    }
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            selector_timeout: Duration::from_millis(5000),
        }
    }
}
