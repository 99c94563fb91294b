//! Async value subject — a single mutable "latest value" cell with
//! multicast notification.
//!
//! New subscribers get the current value replayed immediately, then stream
//! every subsequent update in publication order. Errors are broadcast
//! without completing the stream; only [`ValueSubject::complete`] ends it.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::error::StoreError;

/// One notification delivered to a subscriber.
#[derive(Debug, Clone)]
pub enum SubjectEvent<T> {
    Next(T),
    Error(StoreError),
    Complete,
}

struct SubjectInner<T> {
    value: T,
    next_id: u64,
    closed: bool,
    subscribers: Vec<(u64, UnboundedSender<SubjectEvent<T>>)>,
}

/// A multicast current-value cell.
pub struct ValueSubject<T> {
    inner: Arc<Mutex<SubjectInner<T>>>,
}

impl<T> Clone for ValueSubject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ValueSubject<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubjectInner {
                value: initial,
                next_id: 0,
                closed: false,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SubjectInner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The current value.
    pub fn value(&self) -> T {
        self.lock().value.clone()
    }

    /// Set a new value and notify every subscriber. No-op once completed.
    pub fn next(&self, value: T) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.value = value.clone();
        inner
            .subscribers
            .retain(|(_, tx)| tx.unbounded_send(SubjectEvent::Next(value.clone())).is_ok());
    }

    /// Broadcast an error without ending the stream.
    pub fn error(&self, err: StoreError) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner
            .subscribers
            .retain(|(_, tx)| tx.unbounded_send(SubjectEvent::Error(err.clone())).is_ok());
    }

    /// End the stream for every subscriber.
    pub fn complete(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        for (_, tx) in inner.subscribers.drain(..) {
            let _ = tx.unbounded_send(SubjectEvent::Complete);
        }
    }

    /// Subscribe: the current value is replayed first, then updates stream
    /// in publication order.
    pub fn subscribe(&self) -> Subscription<T> {
        let mut inner = self.lock();
        let (tx, rx) = unbounded();
        let id = inner.next_id;
        inner.next_id += 1;
        let _ = tx.unbounded_send(SubjectEvent::Next(inner.value.clone()));
        if inner.closed {
            let _ = tx.unbounded_send(SubjectEvent::Complete);
        } else {
            inner.subscribers.push((id, tx));
        }
        Subscription {
            id,
            rx,
            subject: Arc::downgrade(&self.inner),
        }
    }

    /// Callback-style subscription: pumps events into an [`Observer`] on a
    /// background task until completion or unsubscribe.
    pub fn observe<O>(&self, mut observer: O) -> ObserverHandle
    where
        O: Observer<T> + 'static,
    {
        let mut subscription = self.subscribe();
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next_event().await {
                match event {
                    SubjectEvent::Next(value) => observer.next(value).await,
                    SubjectEvent::Error(err) => observer.error(err).await,
                    SubjectEvent::Complete => {
                        observer.complete().await;
                        break;
                    }
                }
            }
        });
        ObserverHandle { task }
    }
}

/// Async observer callbacks. `error` and `complete` default to no-ops.
#[async_trait]
pub trait Observer<T: Send + 'static>: Send {
    async fn next(&mut self, value: T);

    async fn error(&mut self, _err: StoreError) {}

    async fn complete(&mut self) {}
}

/// Handle for a callback-style subscription.
pub struct ObserverHandle {
    task: JoinHandle<()>,
}

impl ObserverHandle {
    /// Stop delivering events to the observer.
    pub fn unsubscribe(&self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

/// A live subscription. Dropping it (or calling [`Subscription::unsubscribe`])
/// deregisters from the subject.
pub struct Subscription<T> {
    id: u64,
    rx: UnboundedReceiver<SubjectEvent<T>>,
    subject: Weak<Mutex<SubjectInner<T>>>,
}

impl<T> Subscription<T> {
    pub fn unsubscribe(self) {}

    /// Next raw event, including errors and completion.
    pub async fn next_event(&mut self) -> Option<SubjectEvent<T>> {
        self.next().await
    }

    /// Next state value, skipping over broadcast errors. `None` once the
    /// subject completes.
    pub async fn next_value(&mut self) -> Option<T> {
        while let Some(event) = self.next().await {
            match event {
                SubjectEvent::Next(value) => return Some(value),
                SubjectEvent::Error(_) => continue,
                SubjectEvent::Complete => return None,
            }
        }
        None
    }
}

impl<T> Stream for Subscription<T> {
    type Item = SubjectEvent<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.subject.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
