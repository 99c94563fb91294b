use std::env;

/// Engine configuration loaded from environment variables. Every variable
/// is optional; defaults keep the engine quiet.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Log every dispatched action at debug level.
    pub trace_actions: bool,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            trace_actions: env::var("STATEFLOW_TRACE_ACTIONS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace_actions: false,
        }
    }
}
