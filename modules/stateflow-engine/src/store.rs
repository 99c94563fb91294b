//! The store: dispatch/subscribe surface and the drain loop.
//!
//! Exactly one task drains the action channel. Each queued item runs its
//! full pipeline (transform → process → reduce → publish) before the next
//! item starts, so ordering is structural — no lock is involved and the
//! `is_dispatching` flag is an observability marker only. Registry changes
//! (module load/unload, chain rebuilds, reducer replacement) are engine
//! actions on the same channel, intercepted before regular pipeline
//! processing: they can never interleave with a reduction and complete
//! before any later-dispatched action is processed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use stateflow_core::{
    init_action, replace_action, Action, AppState, EngineConfig, Observer, ObserverHandle,
    SideEffect, StoreError, StoreResult, SubjectEvent, Subscription, ValueSubject,
};

use crate::combine::RootReducer;
use crate::pipeline::{compose_stages, StageContext, Thunk};
use crate::registry::{self, StoreState};
use crate::types::{FeatureModule, MainModule};

// Tagged action types fed through the pipeline after each registry change,
// so reducers and subscribers observe module/pipeline lifecycle as ordinary
// (unknown) actions.
pub const LOAD_MODULE: &str = "LOAD_MODULE";
pub const UNLOAD_MODULE: &str = "UNLOAD_MODULE";
pub const ENABLE_TRANSFORMERS: &str = "ENABLE_TRANSFORMERS";
pub const SETUP_PROCESSORS: &str = "SETUP_PROCESSORS";
pub const REGISTER_EFFECTS: &str = "REGISTER_EFFECTS";
pub const UNREGISTER_EFFECTS: &str = "UNREGISTER_EFFECTS";

/// One queued channel item.
pub(crate) enum Dispatched {
    Action(Action),
    Thunk(Thunk),
    Engine(EngineAction),
}

/// Internal engine actions. A closed set, handled by exhaustive match in the
/// drain loop; application actions stay open string types.
pub(crate) enum EngineAction {
    Init,
    ReplaceReducer(RootReducer),
    LoadModule(FeatureModule),
    UnloadModule(FeatureModule),
    EnableTransformers,
    SetupProcessors,
    RegisterEffects,
    UnregisterEffects(FeatureModule),
}

/// Rewrites the main module before composition. At most one per store.
pub type Enhancer = Box<dyn FnOnce(MainModule) -> MainModule + Send>;

/// Store factory. Owns configuration until `build`; there is no implicit
/// process-wide store.
pub struct StoreBuilder {
    main: MainModule,
    preloaded: Option<Value>,
    enhancers: Vec<Enhancer>,
    config: EngineConfig,
}

impl StoreBuilder {
    pub fn new(main: MainModule) -> Self {
        Self {
            main,
            preloaded: None,
            enhancers: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn preloaded_state(mut self, state: Value) -> Self {
        self.preloaded = Some(state);
        self
    }

    pub fn enhancer(mut self, enhancer: Enhancer) -> Self {
        self.enhancers.push(enhancer);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Compose and start the store. Reducer probe failures surface here,
    /// synchronously — no partial store is returned.
    pub fn build(self) -> StoreResult<Store> {
        let mut enhancers = self.enhancers;
        if enhancers.len() > 1 {
            return Err(StoreError::InvalidEnhancer(
                "several store enhancers are not supported; compose them into one".into(),
            ));
        }
        let main = match enhancers.pop() {
            Some(enhance) => enhance(self.main),
            None => self.main,
        };

        let initial = self
            .preloaded
            .map(AppState::from_value)
            .unwrap_or_default();
        let subject = ValueSubject::new(Arc::new(initial));
        let (tx, rx) = unbounded();
        let ctx = StageContext::new(subject.clone(), tx.clone());

        let state = StoreState::new(main, &ctx)?;
        let cell = Arc::new(RwLock::new(state));
        let is_dispatching = Arc::new(AtomicBool::new(false));

        let drain = tokio::spawn(drain_loop(
            rx,
            cell.clone(),
            subject.clone(),
            ctx,
            is_dispatching.clone(),
            self.config,
        ));

        let store = Store {
            tx,
            subject,
            cell,
            is_dispatching,
            drain,
        };

        // Construction runs the same lifecycle sequence a freshly supervised
        // store dispatches: init, both chain setups, effect registration.
        store.send(Dispatched::Engine(EngineAction::Init))?;
        store.send(Dispatched::Engine(EngineAction::EnableTransformers))?;
        store.send(Dispatched::Engine(EngineAction::SetupProcessors))?;
        store.send(Dispatched::Engine(EngineAction::RegisterEffects))?;
        Ok(store)
    }
}

/// The aggregate root: dispatch, subscribe, and module management over one
/// action channel and one current-state subject.
pub struct Store {
    tx: UnboundedSender<Dispatched>,
    subject: ValueSubject<Arc<AppState>>,
    cell: Arc<RwLock<StoreState>>,
    is_dispatching: Arc<AtomicBool>,
    drain: JoinHandle<()>,
}

impl Store {
    pub fn builder(main: MainModule) -> StoreBuilder {
        StoreBuilder::new(main)
    }

    pub fn new(main: MainModule) -> StoreResult<Self> {
        Self::builder(main).build()
    }

    fn send(&self, item: Dispatched) -> StoreResult<()> {
        self.tx.unbounded_send(item).map_err(|_| StoreError::Closed)
    }

    fn read_cell(&self) -> RwLockReadGuard<'_, StoreState> {
        read_state(&self.cell)
    }

    /// Dispatch a tagged action. Fails synchronously on malformed input or a
    /// closed store; processing itself is asynchronous and strictly ordered.
    pub fn dispatch(&self, action: Action) -> StoreResult<()> {
        action.validate()?;
        self.send(Dispatched::Action(action))
    }

    /// Dispatch a zero-argument procedure producing a deferred sequence of
    /// actions. The sequence is resolved when its turn in the channel comes,
    /// and its actions run the pipeline in production order.
    pub fn dispatch_thunk<F, S>(&self, thunk: F) -> StoreResult<()>
    where
        F: FnOnce() -> S + Send + 'static,
        S: Stream<Item = Action> + Send + 'static,
    {
        self.send(Dispatched::Thunk(Box::new(move || thunk().boxed())))
    }

    /// The current whole-state snapshot.
    pub fn state(&self) -> Arc<AppState> {
        self.subject.value()
    }

    /// Subscribe to state: the current value replays immediately, then every
    /// update streams in dispatch order.
    pub fn subscribe(&self) -> Subscription<Arc<AppState>> {
        self.subject.subscribe()
    }

    /// Callback-style subscription.
    pub fn observe<O>(&self, observer: O) -> ObserverHandle
    where
        O: Observer<Arc<AppState>> + 'static,
    {
        self.subject.observe(observer)
    }

    /// The state stream without error/completion framing, for operator
    /// composition.
    pub fn state_stream(&self) -> BoxStream<'static, Arc<AppState>> {
        self.subject
            .subscribe()
            .filter_map(|event| async move {
                match event {
                    SubjectEvent::Next(state) => Some(state),
                    _ => None,
                }
            })
            .boxed()
    }

    /// Apply a stream operator to the state stream, returning the derived
    /// stream. Does not mutate the store.
    pub fn pipe<F, S>(&self, operator: F) -> S
    where
        F: FnOnce(BoxStream<'static, Arc<AppState>>) -> S,
    {
        operator(self.state_stream())
    }

    /// Swap the whole-state reducer, then run the replace lifecycle action
    /// so subscribers observe a recomputation.
    pub fn replace_reducer(&self, reducer: RootReducer) -> StoreResult<()> {
        self.send(Dispatched::Engine(EngineAction::ReplaceReducer(reducer)))
    }

    /// Load a feature module. The module's reducer is probed here,
    /// synchronously; the swap completes before any later-dispatched action
    /// is processed. Loading an already-present slice is a no-op.
    pub fn load_module(&self, module: FeatureModule) -> StoreResult<()> {
        crate::combine::validate_module(&module)?;
        self.send(Dispatched::Engine(EngineAction::LoadModule(module)))
    }

    /// Unload a feature module by slice, removing exactly its effects.
    pub fn unload_module(&self, module: FeatureModule) -> StoreResult<()> {
        self.send(Dispatched::Engine(EngineAction::UnloadModule(module)))
    }

    /// Rebuild the transformer chain from the main module.
    pub fn enable_transformers(&self) -> StoreResult<()> {
        self.send(Dispatched::Engine(EngineAction::EnableTransformers))
    }

    /// Rebuild the processor chain from the main module.
    pub fn setup_processors(&self) -> StoreResult<()> {
        self.send(Dispatched::Engine(EngineAction::SetupProcessors))
    }

    /// Rebuild the effect list from the main module and every loaded module.
    pub fn register_effects(&self) -> StoreResult<()> {
        self.send(Dispatched::Engine(EngineAction::RegisterEffects))
    }

    /// Drop a module's effects from the active list without unloading it.
    pub fn unregister_effects(&self, module: FeatureModule) -> StoreResult<()> {
        self.send(Dispatched::Engine(EngineAction::UnregisterEffects(module)))
    }

    /// Slices of the currently loaded modules, in load order.
    pub fn module_slices(&self) -> Vec<String> {
        self.read_cell().module_slices()
    }

    /// The active effect list as of the last registry change.
    pub fn effects(&self) -> Vec<SideEffect> {
        self.read_cell().effects.clone()
    }

    /// Observability marker: whether the drain loop is inside a reduction.
    /// Not a lock; ordering is structural.
    pub fn is_dispatching(&self) -> bool {
        self.is_dispatching.load(Ordering::Relaxed)
    }

    /// Stop accepting dispatches. Queued items still drain, then the state
    /// stream completes.
    pub fn close(&self) {
        self.tx.close_channel();
    }

    /// Close and wait for the drain task to finish.
    pub async fn join(self) {
        self.close();
        let _ = self.drain.await;
    }
}

fn read_state(cell: &Arc<RwLock<StoreState>>) -> RwLockReadGuard<'_, StoreState> {
    cell.read().unwrap_or_else(|e| e.into_inner())
}

fn write_state(cell: &Arc<RwLock<StoreState>>) -> RwLockWriteGuard<'_, StoreState> {
    cell.write().unwrap_or_else(|e| e.into_inner())
}

/// The dispatch loop. One item at a time: an engine action swaps the
/// registry snapshot and feeds its lifecycle action through the pipeline; a
/// thunk resolves into actions that each run the pipeline; a tagged action
/// runs the pipeline directly.
async fn drain_loop(
    mut rx: UnboundedReceiver<Dispatched>,
    cell: Arc<RwLock<StoreState>>,
    subject: ValueSubject<Arc<AppState>>,
    ctx: StageContext,
    is_dispatching: Arc<AtomicBool>,
    config: EngineConfig,
) {
    while let Some(item) = rx.next().await {
        match item {
            Dispatched::Engine(engine_action) => {
                if let Some(follow_up) = handle_engine_action(engine_action, &cell, &subject, &ctx)
                {
                    run_pipeline(follow_up, &cell, &subject, &is_dispatching, &config).await;
                }
            }
            Dispatched::Action(action) => {
                run_pipeline(action, &cell, &subject, &is_dispatching, &config).await;
            }
            Dispatched::Thunk(thunk) => {
                let mut actions = thunk();
                while let Some(action) = actions.next().await {
                    run_pipeline(action, &cell, &subject, &is_dispatching, &config).await;
                }
            }
        }
    }
    subject.complete();
}

/// Swap the registry snapshot for an engine action and return the lifecycle
/// action to feed through the pipeline.
fn handle_engine_action(
    engine_action: EngineAction,
    cell: &Arc<RwLock<StoreState>>,
    subject: &ValueSubject<Arc<AppState>>,
    ctx: &StageContext,
) -> Option<Action> {
    match engine_action {
        EngineAction::Init => Some(init_action()),
        EngineAction::ReplaceReducer(reducer) => {
            write_state(cell).reducer = reducer;
            info!("Root reducer replaced");
            Some(replace_action())
        }
        EngineAction::LoadModule(module) => {
            let slice = module.slice.clone();
            let next = {
                let current = read_state(cell);
                registry::load_module(&current, module)
            };
            match next {
                Ok(next) => {
                    *write_state(cell) = next;
                    Some(Action::with_payload(LOAD_MODULE, json!({ "slice": slice })))
                }
                Err(e) => {
                    error!(error = %e, slice = %slice, "Module load failed");
                    subject.error(e);
                    None
                }
            }
        }
        EngineAction::UnloadModule(module) => {
            let slice = module.slice.clone();
            let next = {
                let current = read_state(cell);
                registry::unload_module(&current, &module)
            };
            match next {
                Ok(next) => {
                    *write_state(cell) = next;
                    Some(Action::with_payload(
                        UNLOAD_MODULE,
                        json!({ "slice": slice }),
                    ))
                }
                Err(e) => {
                    error!(error = %e, slice = %slice, "Module unload failed");
                    subject.error(e);
                    None
                }
            }
        }
        EngineAction::EnableTransformers => {
            let chain = {
                let current = read_state(cell);
                compose_stages(&current.main.transformers, ctx)
            };
            write_state(cell).transformers = chain;
            debug!("Transformer chain rebuilt");
            Some(Action::new(ENABLE_TRANSFORMERS))
        }
        EngineAction::SetupProcessors => {
            let chain = {
                let current = read_state(cell);
                compose_stages(&current.main.processors, ctx)
            };
            write_state(cell).processors = chain;
            debug!("Processor chain rebuilt");
            Some(Action::new(SETUP_PROCESSORS))
        }
        EngineAction::RegisterEffects => {
            let effects = {
                let current = read_state(cell);
                registry::register_effects(&current.main, &current.modules)
            };
            debug!(count = effects.len(), "Effects registered");
            write_state(cell).effects = effects;
            Some(Action::new(REGISTER_EFFECTS))
        }
        EngineAction::UnregisterEffects(module) => {
            let effects = {
                let current = read_state(cell);
                registry::unregister_effects(&current.effects, &module)
            };
            write_state(cell).effects = effects;
            Some(Action::with_payload(
                UNREGISTER_EFFECTS,
                json!({ "slice": module.slice }),
            ))
        }
    }
}

/// One action's full pipeline run: transformer chain, then for each produced
/// action the processor chain, then a synchronous reduction published to the
/// subject before the next produced action is pulled.
async fn run_pipeline(
    action: Action,
    cell: &Arc<RwLock<StoreState>>,
    subject: &ValueSubject<Arc<AppState>>,
    is_dispatching: &AtomicBool,
    config: &EngineConfig,
) {
    if config.trace_actions {
        debug!(action = %action.action_type, "Dispatching");
    }

    let (transformers, processors) = {
        let current = read_state(cell);
        (current.transformers.clone(), current.processors.clone())
    };

    let mut transformed = transformers(action);
    while let Some(action) = transformed.next().await {
        let mut processed = processors(action);
        while let Some(action) = processed.next().await {
            // Re-read per reduction so a replacement queued by a stage
            // applies to the actions behind it.
            let reducer = read_state(cell).reducer.clone();

            is_dispatching.store(true, Ordering::Relaxed);
            let prev = subject.value();
            match reducer(&prev, &action) {
                Ok(next) => subject.next(next),
                Err(e) => {
                    error!(error = %e, action = %action.action_type, "Reduction failed");
                    subject.error(e);
                }
            }
            is_dispatching.store(false, Ordering::Relaxed);
        }
    }
}
