//! Integration tests for the store: dispatch ordering, pipeline stages,
//! module lifecycle, reducer replacement.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use serde_json::json;

use stateflow_core::{Action, SideEffect, StoreError, SubjectEvent};
use stateflow_engine::{
    reducer_fn, stage, FeatureModule, MainModule, Reducer, Stage, Store,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn counter_reducer() -> Reducer {
    reducer_fn(|prev, action| {
        let current = match prev {
            Some(value) => value.clone(),
            None => Arc::new(json!(0)),
        };
        match action.action_type.as_str() {
            "INC" => Some(Arc::new(json!(current.as_i64().unwrap_or(0) + 1))),
            _ => Some(current),
        }
    })
}

fn counter_module() -> FeatureModule {
    FeatureModule::new("counter", json!(0), counter_reducer())
}

/// Barrier: resolves once every previously dispatched item has finished its
/// full pipeline run. Rides the channel as an empty thunk.
async fn settle(store: &Store) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    store
        .dispatch_thunk(move || {
            let _ = tx.send(());
            futures::stream::empty()
        })
        .unwrap();
    rx.await.unwrap();
}

// =========================================================================
// Dispatch and ordering
// =========================================================================

#[tokio::test]
async fn subscribers_observe_updates_in_dispatch_order() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new().reducer("counter", counter_reducer()))?;
    settle(&store).await;

    let mut sub = store.subscribe();
    let replay = sub.next_value().await.unwrap();
    assert_eq!(**replay.get("counter").unwrap(), json!(0));

    store.dispatch(Action::new("INC"))?;
    store.dispatch(Action::new("INC"))?;
    store.dispatch(Action::new("INC"))?;

    for expected in 1..=3 {
        let state = sub.next_value().await.unwrap();
        assert_eq!(**state.get("counter").unwrap(), json!(expected));
    }
    Ok(())
}

#[tokio::test]
async fn malformed_actions_fail_synchronously() {
    init_tracing();
    let store = Store::new(MainModule::new()).unwrap();

    match store.dispatch(Action::new("")) {
        Err(StoreError::InvalidAction(_)) => {}
        other => panic!("expected invalid action, got {other:?}"),
    }
}

#[tokio::test]
async fn thunk_actions_reduce_in_production_order() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new().reducer("counter", counter_reducer()))?;

    store.dispatch(Action::new("INC"))?;
    store.dispatch_thunk(|| futures::stream::iter(vec![Action::new("INC"), Action::new("INC")]))?;
    settle(&store).await;

    assert_eq!(**store.state().get("counter").unwrap(), json!(3));
    Ok(())
}

#[tokio::test]
async fn unknown_actions_keep_state_reference_identical() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new().reducer("counter", counter_reducer()))?;
    store.dispatch(Action::new("INC"))?;
    settle(&store).await;

    let before = store.state();
    store.dispatch(Action::new("NOBODY_HANDLES_THIS"))?;
    settle(&store).await;

    assert!(Arc::ptr_eq(&before, &store.state()));
    Ok(())
}

// =========================================================================
// Pipeline stages
// =========================================================================

#[tokio::test]
async fn transformers_normalize_actions_before_reduction() -> Result<()> {
    init_tracing();
    let normalize: Stage = stage(|_ctx, next| {
        Arc::new(move |mut action: Action| {
            action.action_type = action.action_type.to_uppercase();
            next(action)
        })
    });
    let main = MainModule::new()
        .transformer(normalize)
        .reducer("counter", counter_reducer());
    let store = Store::new(main)?;

    store.dispatch(Action::new("inc"))?;
    store.dispatch(Action::new("inc"))?;
    settle(&store).await;

    assert_eq!(**store.state().get("counter").unwrap(), json!(2));
    Ok(())
}

#[tokio::test]
async fn processors_can_gate_actions_off_the_reduction_path() -> Result<()> {
    init_tracing();
    let gate: Stage = stage(|_ctx, next| {
        Arc::new(move |action: Action| {
            if action.action_type == "BLOCKED" {
                futures::stream::empty().boxed()
            } else {
                next(action)
            }
        })
    });
    let main = MainModule::new()
        .processor(gate)
        .reducer("counter", counter_reducer());
    let store = Store::new(main)?;

    store.dispatch(Action::new("INC"))?;
    store.dispatch(Action::new("BLOCKED"))?;
    store.dispatch(Action::new("INC"))?;
    settle(&store).await;

    assert_eq!(**store.state().get("counter").unwrap(), json!(2));
    Ok(())
}

// =========================================================================
// Module lifecycle
// =========================================================================

#[tokio::test]
async fn counter_module_end_to_end() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new())?;
    let module =
        counter_module().with_effects(vec![SideEffect::new("counter.sync", || async {})]);

    store.load_module(module.clone())?;
    store.dispatch(Action::new("INC"))?;
    store.dispatch(Action::new("INC"))?;
    settle(&store).await;

    assert_eq!(**store.state().get("counter").unwrap(), json!(2));
    assert_eq!(store.module_slices(), vec!["counter"]);
    assert_eq!(store.effects().len(), 1);

    store.unload_module(module.clone())?;
    store.dispatch(Action::new("INC"))?;
    settle(&store).await;

    // Effects gone, composition no longer includes the slice.
    assert!(store.effects().is_empty());
    assert!(store.module_slices().is_empty());
    assert!(store.state().get("counter").is_none());
    Ok(())
}

#[tokio::test]
async fn loading_a_duplicate_slice_is_a_no_op() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new())?;

    let first =
        counter_module().with_effects(vec![SideEffect::new("counter.sync", || async {})]);
    let duplicate =
        counter_module().with_effects(vec![SideEffect::new("counter.sync", || async {})]);

    store.load_module(first.clone())?;
    store.load_module(duplicate)?;
    settle(&store).await;

    assert_eq!(store.module_slices(), vec!["counter"]);
    assert_eq!(store.effects(), first.effects);
    Ok(())
}

#[tokio::test]
async fn module_load_applies_before_later_dispatches() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new())?;

    // Load and the action behind it ride the same queue; the INC must see
    // the module's reducer.
    store.load_module(counter_module())?;
    store.dispatch(Action::new("INC"))?;
    settle(&store).await;

    assert_eq!(**store.state().get("counter").unwrap(), json!(1));
    Ok(())
}

#[tokio::test]
async fn unload_keeps_structurally_identical_effects_of_other_modules() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new())?;

    let a = FeatureModule::new("a", json!(null), counter_reducer())
        .with_effects(vec![SideEffect::new("poll", || async {})]);
    let b = FeatureModule::new("b", json!(null), counter_reducer())
        .with_effects(vec![SideEffect::new("poll", || async {})]);

    store.load_module(a.clone())?;
    store.load_module(b.clone())?;
    store.unload_module(a)?;
    settle(&store).await;

    assert_eq!(store.effects(), b.effects);
    Ok(())
}

// =========================================================================
// Reducer replacement and failure propagation
// =========================================================================

#[tokio::test]
async fn replace_reducer_recomputes_state_for_subscribers() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new().reducer("counter", counter_reducer()))?;
    store.dispatch(Action::new("INC"))?;
    settle(&store).await;

    let frozen = Arc::new(stateflow_core::AppState::from_value(json!({"frozen": true})));
    store.replace_reducer(Arc::new(move |_state, _action| Ok(frozen.clone())))?;
    settle(&store).await;

    assert_eq!(store.state().to_value(), json!({"frozen": true}));
    Ok(())
}

#[tokio::test]
async fn probe_failure_at_build_time_names_the_offending_key() {
    init_tracing();
    let main = MainModule::new()
        .reducer("ok", counter_reducer())
        .reducer("broken", reducer_fn(|_prev, _action| None));

    match Store::new(main) {
        Err(StoreError::ReducerContract { key, .. }) => assert_eq!(key, "broken"),
        Err(other) => panic!("expected contract error, got {other:?}"),
        Ok(_) => panic!("store built from a broken reducer map"),
    }
}

#[tokio::test]
async fn loading_a_broken_module_fails_synchronously() {
    init_tracing();
    let store = Store::new(MainModule::new()).unwrap();
    let broken = FeatureModule::new("broken", json!(null), reducer_fn(|_prev, _action| None));

    match store.load_module(broken) {
        Err(StoreError::ReducerContract { key, .. }) => assert_eq!(key, "broken"),
        other => panic!("expected contract error, got {other:?}"),
    }
}

#[tokio::test]
async fn runtime_reducer_violation_reaches_subscribers_and_store_survives() -> Result<()> {
    init_tracing();
    let exploding = reducer_fn(|prev, action| {
        if action.action_type == "EXPLODE" {
            None
        } else {
            Some(prev.cloned().unwrap_or_else(|| Arc::new(json!(0))))
        }
    });
    let store = Store::new(MainModule::new().reducer("bomb", exploding))?;
    settle(&store).await;

    let mut sub = store.subscribe();
    sub.next_value().await;

    store.dispatch(Action::new("EXPLODE"))?;
    match sub.next_event().await {
        Some(SubjectEvent::Error(StoreError::ReducerContract { key, .. })) => {
            assert_eq!(key, "bomb")
        }
        other => panic!("expected broadcast contract error, got {other:?}"),
    }

    // The channel continues with subsequent items.
    store.dispatch(Action::new("PING"))?;
    assert!(sub.next_value().await.is_some());
    Ok(())
}

// =========================================================================
// Build surface
// =========================================================================

#[tokio::test]
async fn a_single_enhancer_rewrites_the_main_module() -> Result<()> {
    init_tracing();
    let store = Store::builder(MainModule::new())
        .enhancer(Box::new(|main| main.reducer("counter", counter_reducer())))
        .build()?;

    store.dispatch(Action::new("INC"))?;
    settle(&store).await;
    assert_eq!(**store.state().get("counter").unwrap(), json!(1));
    Ok(())
}

#[tokio::test]
async fn several_enhancers_are_rejected() {
    init_tracing();
    let result = Store::builder(MainModule::new())
        .enhancer(Box::new(|main| main))
        .enhancer(Box::new(|main| main))
        .build();

    match result {
        Err(StoreError::InvalidEnhancer(_)) => {}
        Err(other) => panic!("expected enhancer error, got {other:?}"),
        Ok(_) => panic!("store built with two enhancers"),
    }
}

#[tokio::test]
async fn preloaded_state_seeds_the_covered_slices() -> Result<()> {
    init_tracing();
    let store = Store::builder(MainModule::new().reducer("counter", counter_reducer()))
        .preloaded_state(json!({"counter": 5}))
        .build()?;
    settle(&store).await;

    let mut sub = store.subscribe();
    let state = sub.next_value().await.unwrap();
    assert_eq!(**state.get("counter").unwrap(), json!(5));

    store.dispatch(Action::new("INC"))?;
    settle(&store).await;
    assert_eq!(**store.state().get("counter").unwrap(), json!(6));
    Ok(())
}

#[tokio::test]
async fn pipe_derives_a_stream_without_mutating_the_store() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new().reducer("counter", counter_reducer()))?;
    settle(&store).await;

    let mut counters = store.pipe(|states| {
        states
            .map(|state| {
                state
                    .get("counter")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0)
            })
            .boxed()
    });

    assert_eq!(counters.next().await, Some(0));
    store.dispatch(Action::new("INC"))?;
    assert_eq!(counters.next().await, Some(1));
    Ok(())
}

#[tokio::test]
async fn close_completes_the_state_stream() -> Result<()> {
    init_tracing();
    let store = Store::new(MainModule::new())?;
    settle(&store).await;

    let mut sub = store.subscribe();
    store.close();

    // Replayed value, then completion once the queue drains.
    assert!(sub.next_value().await.is_some());
    assert!(sub.next_value().await.is_none());
    assert_eq!(store.dispatch(Action::new("LATE")), Err(StoreError::Closed));
    Ok(())
}
