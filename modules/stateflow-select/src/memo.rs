//! Memoization strategies.
//!
//! Keyed memoization retains unboundedly many entries under a joined-
//! argument key and shares in-flight computations; a pending entry that does
//! not settle within the timeout window is rejected and evicted. Single-slot
//! memoization retains only the most recent argument list and result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::config::SelectConfig;
use crate::error::{SelectError, SelectResult};

/// An async computation over a JSON argument list.
pub type ArgsFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, SelectResult<Value>> + Send + Sync>;

/// A memoized computation with an explicit cache-clear operation.
#[async_trait]
pub trait Memoized: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> SelectResult<Value>;

    /// Drop every cached entry.
    fn release(&self);
}

fn render_arg(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_arg)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// The keyed-memoization cache key: a naive join of loosely-rendered
/// arguments. Distinct tuples can render identically (`["1,2"]` and
/// `["1","2"]` both key as `1,2`) and then share an entry; that is the
/// contract, not structural hashing.
pub fn memo_key(args: &[Value]) -> String {
    args.iter().map(render_arg).collect::<Vec<_>>().join(":")
}

type SharedOutcome = Shared<BoxFuture<'static, SelectResult<Value>>>;

/// Unbounded keyed cache with a pending-computation timeout. Settled
/// outcomes — including rejections — stay cached until [`Memoized::release`];
/// only timeouts are evicted.
pub struct KeyedMemo {
    func: ArgsFn,
    timeout: Duration,
    cache: Mutex<HashMap<String, SharedOutcome>>,
}

impl KeyedMemo {
    pub fn new(func: ArgsFn) -> Self {
        Self::with_timeout(func, SelectConfig::default().selector_timeout)
    }

    pub fn with_timeout(func: ArgsFn, timeout: Duration) -> Self {
        Self {
            func,
            timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedOutcome>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Memoized for KeyedMemo {
    async fn call(&self, args: Vec<Value>) -> SelectResult<Value> {
        let key = memo_key(&args);

        let shared = {
            let mut cache = self.lock();
            match cache.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let fut = (self.func)(args);
                    let timeout = self.timeout;
                    let timeout_key = key.clone();
                    let wrapped: BoxFuture<'static, SelectResult<Value>> = async move {
                        match tokio::time::timeout(timeout, fut).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(SelectError::Timeout { key: timeout_key }),
                        }
                    }
                    .boxed();
                    let shared = wrapped.shared();
                    cache.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };

        let outcome = shared.clone().await;
        if matches!(outcome, Err(SelectError::Timeout { .. })) {
            // Evict so the next identical call recomputes, but never a fresh
            // entry another caller already replaced this one with.
            let mut cache = self.lock();
            if cache.get(&key).is_some_and(|current| current.ptr_eq(&shared)) {
                debug!(key = %key, "Evicting timed-out selector entry");
                cache.remove(&key);
            }
        }
        outcome
    }

    fn release(&self) {
        self.lock().clear();
    }
}

/// Most-recent-call cache: a hit requires the same arity and pairwise equal
/// arguments. Failures are not cached.
pub struct SingleSlotMemo {
    func: ArgsFn,
    slot: Mutex<Option<(Vec<Value>, Value)>>,
}

impl SingleSlotMemo {
    pub fn new(func: ArgsFn) -> Self {
        Self {
            func,
            slot: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<(Vec<Value>, Value)>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Memoized for SingleSlotMemo {
    async fn call(&self, args: Vec<Value>) -> SelectResult<Value> {
        {
            let slot = self.lock();
            if let Some((last_args, last_result)) = slot.as_ref() {
                if *last_args == args {
                    return Ok(last_result.clone());
                }
            }
        }

        let result = (self.func)(args.clone()).await?;
        *self.lock() = Some((args, result.clone()));
        Ok(result)
    }

    fn release(&self) {
        *self.lock() = None;
    }
}

/// No caching at all; `release` is a no-op.
pub struct PassthroughMemo {
    func: ArgsFn,
}

impl PassthroughMemo {
    pub fn new(func: ArgsFn) -> Self {
        Self { func }
    }
}

#[async_trait]
impl Memoized for PassthroughMemo {
    async fn call(&self, args: Vec<Value>) -> SelectResult<Value> {
        (self.func)(args).await
    }

    fn release(&self) {}
}
