//! Reducer composition: slice reducers → one whole-state reducer, with
//! change detection and composition-time probe validation.

use std::sync::Arc;

use tracing::warn;

use stateflow_core::{
    init_action, probe_unknown_action, Action, AppState, SliceState, StoreError, StoreResult,
};

use crate::types::{FeatureModule, MainModule, Reducer};

/// The composed whole-state reducer.
pub type RootReducer =
    Arc<dyn Fn(&Arc<AppState>, &Action) -> StoreResult<Arc<AppState>> + Send + Sync>;

/// One slot in the composed reducer walk.
#[derive(Clone)]
pub struct ReducerEntry {
    pub key: String,
    pub reducer: Reducer,
    /// Previous value to use while the slice is absent from the whole state.
    pub initial: Option<Arc<SliceState>>,
}

impl ReducerEntry {
    pub fn named(key: impl Into<String>, reducer: Reducer) -> Self {
        Self {
            key: key.into(),
            reducer,
            initial: None,
        }
    }

    pub fn for_module(module: &FeatureModule) -> Self {
        Self {
            key: module.slice.clone(),
            reducer: module.reducer.clone(),
            initial: Some(module.state.clone()),
        }
    }
}

/// Probe every reducer with the init action and a random unknown type.
/// A `None` from either is a contract violation: reducers must return state
/// for any action, known or not.
fn assert_reducer_shape(entries: &[ReducerEntry]) -> StoreResult<()> {
    for entry in entries {
        if (entry.reducer)(None, &init_action()).is_none() {
            warn!(key = %entry.key, "Reducer failed the initialization probe");
            return Err(StoreError::ReducerContract {
                key: entry.key.clone(),
                detail: "returned no state for the initialization probe; return the initial \
                         value when the previous state is absent"
                    .into(),
            });
        }
        if (entry.reducer)(None, &probe_unknown_action()).is_none() {
            warn!(key = %entry.key, "Reducer failed the unknown-type probe");
            return Err(StoreError::ReducerContract {
                key: entry.key.clone(),
                detail: "returned no state when probed with a random unknown type; return the \
                         current state for any unrecognized action"
                    .into(),
            });
        }
    }
    Ok(())
}

/// Combine slice reducers into one whole-state reducer. Probes every entry
/// up front; a failing probe aborts composition before any action runs.
pub fn combine_reducers(entries: Vec<ReducerEntry>) -> StoreResult<RootReducer> {
    for (i, entry) in entries.iter().enumerate() {
        if entries[..i].iter().any(|e| e.key == entry.key) {
            return Err(StoreError::ReducerContract {
                key: entry.key.clone(),
                detail: "duplicate reducer key".into(),
            });
        }
    }
    assert_reducer_shape(&entries)?;

    Ok(Arc::new(move |state: &Arc<AppState>, action: &Action| {
        let mut next_entries: Vec<(String, Arc<SliceState>)> = Vec::with_capacity(entries.len());
        let mut changed = false;

        for entry in &entries {
            let prev = state.get(&entry.key).or(entry.initial.as_ref());
            let next = (entry.reducer)(prev, action).ok_or_else(|| StoreError::ReducerContract {
                key: entry.key.clone(),
                detail: format!("returned no state for action \"{}\"", action.action_type),
            })?;
            let unchanged = prev.is_some_and(|p| Arc::ptr_eq(p, &next));
            next_entries.push((entry.key.clone(), next));
            if !unchanged {
                changed = true;
                // The walk stops at the first changed slice; entries after it
                // are not consulted for this action and do not appear in the
                // produced state.
                break;
            }
        }

        if !changed && entries.len() == state.len() {
            return Ok(state.clone());
        }
        Ok(Arc::new(AppState::from_entries(next_entries)))
    }))
}

/// Probe one module's reducer before it joins a composition, so a bad
/// module is rejected at the call site rather than inside the drain loop.
pub fn validate_module(module: &FeatureModule) -> StoreResult<()> {
    let entry = ReducerEntry::for_module(module);
    assert_reducer_shape(std::slice::from_ref(&entry))
}

/// Build the composed reducer for the current configuration: main-module
/// reducers in declaration order, then one entry per loaded feature module
/// in load order.
pub fn setup_reducer(main: &MainModule, modules: &[FeatureModule]) -> StoreResult<RootReducer> {
    let mut entries = Vec::with_capacity(main.reducers.len() + modules.len());
    for (key, reducer) in &main.reducers {
        entries.push(ReducerEntry::named(key.clone(), reducer.clone()));
    }
    for module in modules {
        entries.push(ReducerEntry::for_module(module));
    }
    combine_reducers(entries)
}
