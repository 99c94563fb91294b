//! Composable memoized selectors: N input selectors behind keyed caches,
//! one projector behind a single-slot cache, released as a unit.

use std::future::Future;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::config::SelectConfig;
use crate::error::SelectResult;
use crate::memo::{ArgsFn, KeyedMemo, Memoized, PassthroughMemo, SingleSlotMemo};

/// An input selector: `(state, props) -> value`, possibly asynchronous.
pub type SelectorFn =
    Arc<dyn Fn(Value, Value) -> BoxFuture<'static, SelectResult<Value>> + Send + Sync>;

/// The projector: settled input values positionally, `props` last.
pub type ProjectorFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Wrap a synchronous selector closure.
pub fn selector_fn<F>(f: F) -> SelectorFn
where
    F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
{
    Arc::new(move |state, props| {
        let value = f(&state, &props);
        async move { Ok(value) }.boxed()
    })
}

/// Wrap an async selector closure.
pub fn async_selector_fn<F, Fut>(f: F) -> SelectorFn
where
    F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SelectResult<Value>> + Send + 'static,
{
    Arc::new(move |state, props| f(state, props).boxed())
}

/// Wrap a projector closure.
pub fn projector_fn<F>(f: F) -> ProjectorFn
where
    F: Fn(&[Value]) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-layer memoization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoStrategy {
    /// Unbounded cache keyed by the joined argument list, with a pending
    /// timeout. The input-selector default.
    Keyed,
    /// Only the most recent argument list and result. The projector default.
    LastCall,
    /// No caching.
    Passthrough,
}

/// Options for [`create_selector`]. For strategies beyond these three,
/// implement [`Memoized`] and assemble via [`MemoizedSelector::from_parts`].
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    pub memoize_selectors: MemoStrategy,
    pub memoize_projector: MemoStrategy,
    pub config: SelectConfig,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            memoize_selectors: MemoStrategy::Keyed,
            memoize_projector: MemoStrategy::LastCall,
            config: SelectConfig::default(),
        }
    }
}

fn memoize(strategy: MemoStrategy, func: ArgsFn, config: &SelectConfig) -> Arc<dyn Memoized> {
    match strategy {
        MemoStrategy::Keyed => Arc::new(KeyedMemo::with_timeout(func, config.selector_timeout)),
        MemoStrategy::LastCall => Arc::new(SingleSlotMemo::new(func)),
        MemoStrategy::Passthrough => Arc::new(PassthroughMemo::new(func)),
    }
}

fn selector_args_fn(selector: SelectorFn) -> ArgsFn {
    Arc::new(move |mut args: Vec<Value>| {
        let props = args.pop().unwrap_or(Value::Null);
        let state = args.pop().unwrap_or(Value::Null);
        selector(state, props)
    })
}

fn projector_args_fn(projector: ProjectorFn) -> ArgsFn {
    Arc::new(move |args: Vec<Value>| {
        let value = projector(&args);
        async move { Ok(value) }.boxed()
    })
}

/// A derived-value computation behind two cache layers, with a cascading
/// cache-clear operation.
pub struct MemoizedSelector {
    inputs: Vec<Arc<dyn Memoized>>,
    projector: Arc<dyn Memoized>,
}

impl MemoizedSelector {
    /// Assemble from pre-memoized parts (custom strategies plug in here).
    pub fn from_parts(inputs: Vec<Arc<dyn Memoized>>, projector: Arc<dyn Memoized>) -> Self {
        Self { inputs, projector }
    }

    /// Evaluate against `(state, props)`. Input selectors run concurrently
    /// and all settle before projection; a failed slot projects as `Null`
    /// without aborting its siblings.
    pub async fn select(&self, state: &Value, props: Option<&Value>) -> SelectResult<Value> {
        let props = props.cloned().unwrap_or(Value::Null);
        let calls = self
            .inputs
            .iter()
            .map(|input| input.call(vec![state.clone(), props.clone()]));
        let settled = join_all(calls).await;

        let mut args: Vec<Value> = settled
            .into_iter()
            .map(|outcome| match outcome {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "Input selector failed; projecting null");
                    Value::Null
                }
            })
            .collect();
        args.push(props);

        self.projector.call(args).await
    }

    /// Clear every nested cache: each input selector and the projector.
    pub fn release(&self) {
        for input in &self.inputs {
            input.release();
        }
        self.projector.release();
    }
}

/// Build a memoized selector from input selectors and a projector.
pub fn create_selector(
    selectors: Vec<SelectorFn>,
    projector: ProjectorFn,
    options: SelectorOptions,
) -> MemoizedSelector {
    let inputs = selectors
        .into_iter()
        .map(|selector| {
            memoize(
                options.memoize_selectors,
                selector_args_fn(selector),
                &options.config,
            )
        })
        .collect();
    let projector = memoize(
        options.memoize_projector,
        projector_args_fn(projector),
        &options.config,
    );
    MemoizedSelector { inputs, projector }
}
