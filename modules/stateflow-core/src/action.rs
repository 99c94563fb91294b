//! Actions — tagged, immutable descriptions of intended state changes.
//!
//! The `type` string is the sole dispatch key. Types starting with
//! [`LIFECYCLE_PREFIX`] are emitted by the store itself (init, reducer
//! replacement, composition probes); reducers must treat them like any other
//! unknown type and return the current state.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Reserved prefix for action types the store emits on its own behalf.
pub const LIFECYCLE_PREFIX: &str = "@@store/";

/// A tagged, immutable description of an intended state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Dispatch key. Must be non-empty; unknown types pass through reducers
    /// unchanged.
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Action {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: None,
            meta: None,
        }
    }

    pub fn with_payload(action_type: impl Into<String>, payload: Value) -> Self {
        Self {
            action_type: action_type.into(),
            payload: Some(payload),
            meta: None,
        }
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Whether this is a store-emitted lifecycle action.
    pub fn is_lifecycle(&self) -> bool {
        self.action_type.starts_with(LIFECYCLE_PREFIX)
    }

    /// Reject malformed actions at the dispatch boundary.
    pub fn validate(&self) -> StoreResult<()> {
        if self.action_type.is_empty() {
            return Err(StoreError::InvalidAction(
                "action type must be a non-empty string".into(),
            ));
        }
        Ok(())
    }
}

// The init/replace types carry one random nonce per process so application
// reducers cannot match on them by accident. Probe types get a fresh nonce
// per call.

fn init_type() -> &'static str {
    static TYPE: OnceLock<String> = OnceLock::new();
    TYPE.get_or_init(|| format!("{LIFECYCLE_PREFIX}INIT.{}", Uuid::new_v4().simple()))
}

fn replace_type() -> &'static str {
    static TYPE: OnceLock<String> = OnceLock::new();
    TYPE.get_or_init(|| format!("{LIFECYCLE_PREFIX}REPLACE.{}", Uuid::new_v4().simple()))
}

/// The action run through the pipeline when a store initializes.
pub fn init_action() -> Action {
    Action::new(init_type())
}

/// The action run through the pipeline after a root-reducer replacement.
pub fn replace_action() -> Action {
    Action::new(replace_type())
}

/// A random unknown-type action used to probe reducers at composition time.
pub fn probe_unknown_action() -> Action {
    Action::new(format!(
        "{LIFECYCLE_PREFIX}PROBE_UNKNOWN_ACTION.{}",
        Uuid::new_v4().simple()
    ))
}
