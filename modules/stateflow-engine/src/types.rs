//! Module descriptors and the reducer contract.

use std::fmt;
use std::sync::Arc;

use stateflow_core::{Action, SideEffect, SliceState};

use crate::pipeline::Stage;

/// Pure slice update. `prev` is `None` while the slice has not materialized.
///
/// Contract: never return `None` — for an unrecognized action return the
/// initial value (when `prev` is `None`) or the *same* `Arc` (cloned), which
/// is how "unchanged" is signalled to change detection.
pub type Reducer =
    Arc<dyn Fn(Option<&Arc<SliceState>>, &Action) -> Option<Arc<SliceState>> + Send + Sync>;

/// Wrap a closure as a [`Reducer`].
pub fn reducer_fn<F>(f: F) -> Reducer
where
    F: Fn(Option<&Arc<SliceState>>, &Action) -> Option<Arc<SliceState>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A pluggable bundle of slice state, reducer, and effects. Identity is
/// `slice`; loading the same slice twice is a no-op.
#[derive(Clone)]
pub struct FeatureModule {
    pub slice: String,
    /// Initial slice value, used as the previous value the first time the
    /// composed reducer visits this slice.
    pub state: Arc<SliceState>,
    pub reducer: Reducer,
    pub effects: Vec<SideEffect>,
}

impl FeatureModule {
    pub fn new(slice: impl Into<String>, state: SliceState, reducer: Reducer) -> Self {
        Self {
            slice: slice.into(),
            state: Arc::new(state),
            reducer,
            effects: Vec::new(),
        }
    }

    pub fn with_effects(mut self, effects: Vec<SideEffect>) -> Self {
        self.effects = effects;
        self
    }
}

impl fmt::Debug for FeatureModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureModule")
            .field("slice", &self.slice)
            .field("effects", &self.effects.len())
            .finish()
    }
}

/// Root configuration supplied once at store construction. Transformer and
/// processor stages come only from here; reducers and effects also come from
/// loaded feature modules.
#[derive(Clone, Default)]
pub struct MainModule {
    pub transformers: Vec<Stage>,
    pub processors: Vec<Stage>,
    pub reducers: Vec<(String, Reducer)>,
    pub effects: Vec<SideEffect>,
}

impl MainModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transformer(mut self, stage: Stage) -> Self {
        self.transformers.push(stage);
        self
    }

    pub fn processor(mut self, stage: Stage) -> Self {
        self.processors.push(stage);
        self
    }

    pub fn reducer(mut self, name: impl Into<String>, reducer: Reducer) -> Self {
        self.reducers.push((name.into(), reducer));
        self
    }

    pub fn effect(mut self, effect: SideEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

impl fmt::Debug for MainModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainModule")
            .field("transformers", &self.transformers.len())
            .field("processors", &self.processors.len())
            .field(
                "reducers",
                &self.reducers.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .field("effects", &self.effects.len())
            .finish()
    }
}
