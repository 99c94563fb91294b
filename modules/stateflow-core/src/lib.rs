//! Shared primitives for the stateflow store engine.
//!
//! Actions, the error taxonomy, the ordered whole-state model, the async
//! value subject (multicast current-value cell), the cancellable side-effect
//! handle, and env-driven configuration.

pub mod action;
pub mod config;
pub mod effect;
pub mod error;
pub mod state;
pub mod subject;

pub use action::{init_action, probe_unknown_action, replace_action, Action, LIFECYCLE_PREFIX};
pub use config::EngineConfig;
pub use effect::{EffectHandle, SideEffect};
pub use error::{StoreError, StoreResult};
pub use state::{AppState, SliceState};
pub use subject::{Observer, ObserverHandle, SubjectEvent, Subscription, ValueSubject};
