//! Side effects — named, identity-carrying factories of cancellable
//! background tasks.
//!
//! The engine only tracks which effects are active; running and supervising
//! them is the effect runtime's concern. Identity matters: unloading a
//! module removes exactly the effect instances it contributed, even when two
//! modules register structurally identical effects. Clones share identity.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::debug;

static NEXT_EFFECT_ID: AtomicU64 = AtomicU64::new(1);

/// A long-running background process attached to the pipeline.
#[derive(Clone)]
pub struct SideEffect {
    id: u64,
    label: Arc<str>,
    factory: Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>,
}

impl SideEffect {
    /// Wrap a zero-argument async procedure as a spawnable effect.
    pub fn new<F, Fut>(label: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            id: NEXT_EFFECT_ID.fetch_add(1, Ordering::Relaxed),
            label: Arc::from(label.into()),
            factory: Arc::new(move || factory().boxed()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Start the effect on a background task.
    pub fn spawn(&self) -> EffectHandle {
        debug!(effect = %self.label, id = self.id, "Spawning effect");
        EffectHandle {
            label: self.label.clone(),
            task: tokio::spawn((self.factory)()),
        }
    }
}

impl PartialEq for SideEffect {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SideEffect {}

impl fmt::Debug for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideEffect")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

/// A running effect: task handle plus cancellation.
pub struct EffectHandle {
    label: Arc<str>,
    task: JoinHandle<()>,
}

impl EffectHandle {
    /// Cancel the running task. In-flight reductions are unaffected; effects
    /// own their cancellation points.
    pub fn cancel(&self) {
        debug!(effect = %self.label, "Cancelling effect");
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to finish or be cancelled.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}
