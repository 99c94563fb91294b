//! Pipeline stages and onion composition.
//!
//! A stage wraps a `next` continuation: it may inspect or rewrite the
//! action, emit several, or short-circuit by never calling `next`. Stages
//! always produce an action stream, so the original "coerce a bare action
//! into a one-item observable" step is structural here — [`once`] is the
//! coercion.

use std::sync::Arc;

use futures::channel::mpsc::UnboundedSender;
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use stateflow_core::{Action, AppState, StoreError, StoreResult, ValueSubject};

use crate::store::Dispatched;

/// An ordered, possibly asynchronous sequence of actions.
pub type ActionStream = BoxStream<'static, Action>;

/// The continuation a stage wraps.
pub type Next = Arc<dyn Fn(Action) -> ActionStream + Send + Sync>;

/// A transformer or processor stage: `(context, next) -> next'`.
pub type Stage = Arc<dyn Fn(StageContext, Next) -> Next + Send + Sync>;

/// A zero-argument deferred action sequence, resolved at the head of the
/// transformer stage.
pub type Thunk = Box<dyn FnOnce() -> ActionStream + Send>;

/// Wrap a closure as a [`Stage`].
pub fn stage<F>(f: F) -> Stage
where
    F: Fn(StageContext, Next) -> Next + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A one-item action stream.
pub fn once(action: Action) -> ActionStream {
    stream::once(async move { action }).boxed()
}

fn identity() -> Next {
    Arc::new(once)
}

/// What a stage sees of the store: the current state snapshot and re-entrant
/// dispatch back into the action channel.
#[derive(Clone)]
pub struct StageContext {
    state: ValueSubject<Arc<AppState>>,
    sender: UnboundedSender<Dispatched>,
}

impl StageContext {
    pub(crate) fn new(
        state: ValueSubject<Arc<AppState>>,
        sender: UnboundedSender<Dispatched>,
    ) -> Self {
        Self { state, sender }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.value()
    }

    /// Enqueue another action. It runs after the current item's pipeline
    /// completes; ordering with respect to other dispatches is preserved.
    pub fn dispatch(&self, action: Action) -> StoreResult<()> {
        action.validate()?;
        self.sender
            .unbounded_send(Dispatched::Action(action))
            .map_err(|_| StoreError::Closed)
    }
}

/// Fold an ordered stage list into one continuation. The first-listed stage
/// runs outermost and decides whether/when to invoke the rest; the innermost
/// continuation is the one-item identity stream.
pub fn compose_stages(stages: &[Stage], ctx: &StageContext) -> Next {
    let mut next = identity();
    for stage in stages.iter().rev() {
        next = stage(ctx.clone(), next);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc::unbounded;
    use serde_json::json;

    fn test_ctx() -> StageContext {
        let (tx, _rx) = unbounded();
        StageContext::new(ValueSubject::new(Arc::new(AppState::empty())), tx)
    }

    fn tagging_stage(tag: &'static str) -> Stage {
        stage(move |_ctx, next| {
            Arc::new(move |mut action: Action| {
                let trail = match action.meta.take() {
                    Some(serde_json::Value::String(prev)) => format!("{prev}.{tag}"),
                    _ => tag.to_string(),
                };
                next(action.meta(json!(trail)))
            })
        })
    }

    #[tokio::test]
    async fn first_listed_stage_runs_outermost() {
        let stages = vec![tagging_stage("a"), tagging_stage("b"), tagging_stage("c")];
        let chain = compose_stages(&stages, &test_ctx());

        let out: Vec<Action> = chain(Action::new("X")).collect().await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].meta, Some(json!("a.b.c")));
    }

    #[tokio::test]
    async fn empty_stage_list_is_identity() {
        let chain = compose_stages(&[], &test_ctx());
        let out: Vec<Action> = chain(Action::new("X")).collect().await;
        assert_eq!(out, vec![Action::new("X")]);
    }

    #[tokio::test]
    async fn a_stage_can_short_circuit() {
        let gate: Stage = stage(|_ctx, next| {
            Arc::new(move |action: Action| {
                if action.action_type == "BLOCKED" {
                    stream::empty().boxed()
                } else {
                    next(action)
                }
            })
        });
        let chain = compose_stages(&[gate], &test_ctx());

        let blocked: Vec<Action> = chain(Action::new("BLOCKED")).collect().await;
        assert!(blocked.is_empty());
        let passed: Vec<Action> = chain(Action::new("OK")).collect().await;
        assert_eq!(passed.len(), 1);
    }

    #[tokio::test]
    async fn a_stage_can_fan_out() {
        let splitter: Stage = stage(|_ctx, next| {
            Arc::new(move |action: Action| {
                let followup = Action::new(format!("{}_DONE", action.action_type));
                next(action).chain(next(followup)).boxed()
            })
        });
        let chain = compose_stages(&[splitter], &test_ctx());

        let out: Vec<Action> = chain(Action::new("SAVE")).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].action_type, "SAVE_DONE");
    }
}
