//! Module and effect registries.
//!
//! [`StoreState`] is the registry snapshot: the module list and the pipeline
//! functions composed from it. Load/unload produce a whole new snapshot; the
//! drain loop is the only writer, so readers of a prior snapshot always see
//! a consistent configuration.

use tracing::info;

use stateflow_core::{SideEffect, StoreResult};

use crate::combine::{setup_reducer, RootReducer};
use crate::pipeline::{compose_stages, Next, StageContext};
use crate::types::{FeatureModule, MainModule};

/// The current pipeline configuration and the modules it was built from.
#[derive(Clone)]
pub struct StoreState {
    pub main: MainModule,
    pub modules: Vec<FeatureModule>,
    pub transformers: Next,
    pub processors: Next,
    pub reducer: RootReducer,
    pub effects: Vec<SideEffect>,
}

impl StoreState {
    /// Initial snapshot: identity chains, main-module reducers only, no
    /// effects registered yet. Fails if a main reducer flunks its probes.
    pub fn new(main: MainModule, ctx: &StageContext) -> StoreResult<Self> {
        let reducer = setup_reducer(&main, &[])?;
        Ok(Self {
            reducer,
            modules: Vec::new(),
            transformers: compose_stages(&[], ctx),
            processors: compose_stages(&[], ctx),
            effects: Vec::new(),
            main,
        })
    }

    pub fn module_slices(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.slice.clone()).collect()
    }
}

/// Add a feature module: append it, recompose the whole-state reducer from
/// the updated list, and append its effects. Idempotent by `slice`.
pub fn load_module(prev: &StoreState, module: FeatureModule) -> StoreResult<StoreState> {
    if prev.modules.iter().any(|m| m.slice == module.slice) {
        info!(slice = %module.slice, "Module already loaded, ignoring");
        return Ok(prev.clone());
    }

    let mut modules = prev.modules.clone();
    modules.push(module.clone());

    let reducer = setup_reducer(&prev.main, &modules)?;

    let mut effects = prev.effects.clone();
    effects.extend(module.effects.iter().cloned());

    info!(slice = %module.slice, modules = modules.len(), "Feature module loaded");
    Ok(StoreState {
        main: prev.main.clone(),
        modules,
        transformers: prev.transformers.clone(),
        processors: prev.processors.clone(),
        reducer,
        effects,
    })
}

/// Remove a feature module by `slice`, recompose the reducer, and drop
/// exactly the effect instances it contributed.
pub fn unload_module(prev: &StoreState, module: &FeatureModule) -> StoreResult<StoreState> {
    let modules: Vec<FeatureModule> = prev
        .modules
        .iter()
        .filter(|m| m.slice != module.slice)
        .cloned()
        .collect();
    if modules.len() == prev.modules.len() {
        info!(slice = %module.slice, "Module not loaded, ignoring unload");
        return Ok(prev.clone());
    }

    let reducer = setup_reducer(&prev.main, &modules)?;
    let effects = unregister_effects(&prev.effects, module);

    info!(slice = %module.slice, modules = modules.len(), "Feature module unloaded");
    Ok(StoreState {
        main: prev.main.clone(),
        modules,
        transformers: prev.transformers.clone(),
        processors: prev.processors.clone(),
        reducer,
        effects,
    })
}

/// The full effect list: main-module effects, then every loaded module's
/// effects in load order.
pub fn register_effects(main: &MainModule, modules: &[FeatureModule]) -> Vec<SideEffect> {
    let mut effects = main.effects.clone();
    for module in modules {
        effects.extend(module.effects.iter().cloned());
    }
    effects
}

/// Filter out exactly the effect instances belonging to `module`, by
/// identity. Structurally identical effects owned by other modules survive.
pub fn unregister_effects(current: &[SideEffect], module: &FeatureModule) -> Vec<SideEffect> {
    current
        .iter()
        .filter(|effect| !module.effects.contains(effect))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::reducer_fn;
    use futures::channel::mpsc::unbounded;
    use serde_json::json;
    use stateflow_core::{AppState, ValueSubject};
    use std::sync::Arc;

    fn test_ctx() -> StageContext {
        let (tx, _rx) = unbounded();
        StageContext::new(ValueSubject::new(Arc::new(AppState::empty())), tx)
    }

    fn idle_module(slice: &str) -> FeatureModule {
        FeatureModule::new(
            slice,
            json!(null),
            reducer_fn(|prev, _| Some(prev.cloned().unwrap_or_else(|| Arc::new(json!(null))))),
        )
    }

    #[test]
    fn load_is_idempotent_by_slice() {
        let ctx = test_ctx();
        let state = StoreState::new(MainModule::new(), &ctx).unwrap();

        let module = idle_module("a").with_effects(vec![SideEffect::new("a.poll", || async {})]);
        let loaded = load_module(&state, module.clone()).unwrap();
        assert_eq!(loaded.module_slices(), vec!["a"]);
        assert_eq!(loaded.effects.len(), 1);

        let again = load_module(&loaded, module).unwrap();
        assert_eq!(again.module_slices(), vec!["a"]);
        assert_eq!(again.effects.len(), 1);
    }

    #[test]
    fn unload_removes_only_the_modules_own_effects() {
        let ctx = test_ctx();
        let state = StoreState::new(MainModule::new(), &ctx).unwrap();

        // Two modules with structurally identical effects: identity decides.
        let a = idle_module("a").with_effects(vec![SideEffect::new("poll", || async {})]);
        let b = idle_module("b").with_effects(vec![SideEffect::new("poll", || async {})]);

        let state = load_module(&state, a.clone()).unwrap();
        let state = load_module(&state, b.clone()).unwrap();
        assert_eq!(state.effects.len(), 2);

        let state = unload_module(&state, &a).unwrap();
        assert_eq!(state.module_slices(), vec!["b"]);
        assert_eq!(state.effects, b.effects);
    }

    #[test]
    fn effect_list_keeps_main_then_load_order() {
        let ctx = test_ctx();
        let main_effect = SideEffect::new("main.sync", || async {});
        let main = MainModule::new().effect(main_effect.clone());
        let state = StoreState::new(main.clone(), &ctx).unwrap();

        let a = idle_module("a").with_effects(vec![SideEffect::new("a.poll", || async {})]);
        let b = idle_module("b").with_effects(vec![SideEffect::new("b.poll", || async {})]);
        let state = load_module(&state, a.clone()).unwrap();
        let state = load_module(&state, b.clone()).unwrap();

        let effects = register_effects(&state.main, &state.modules);
        let labels: Vec<&str> = effects.iter().map(|e| e.label()).collect();
        assert_eq!(labels, vec!["main.sync", "a.poll", "b.poll"]);
    }
}
