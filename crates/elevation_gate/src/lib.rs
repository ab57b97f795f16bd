//! Pending-request ledger for step-up authentication.
//!
//! When a request fails because the caller's session lacks a fresh elevated
//! proof, the request is not failed back to the caller: its descriptor is
//! parked here and the caller keeps awaiting the same future. Subscribers are
//! told once per outage (on the empty→non-empty edge, never per request), and
//! a later [`Gate::resolve_all`] or [`Gate::reject_all`] settles every parked
//! operation in one sweep.
//!
//! The gate is a pure coordination primitive: it knows nothing about HTTP,
//! verification flows, or UI. Settlement is a one-shot channel carrying
//! `Result<T, E>`; consuming the sender is what makes settlement at-most-once.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Settlement channel closed before the operation was settled.
///
/// This only happens when a whole [`Gate`] is torn down while requests are
/// still parked; it exists so waiters observe an error instead of hanging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pending request abandoned before settlement")]
pub struct Abandoned;

/// One parked operation: the immutable descriptor plus its settle channel.
struct Pending<D, T, E> {
    descriptor: D,
    settle: oneshot::Sender<Result<T, E>>,
}

struct Subscriber {
    id: u64,
    notify: Arc<dyn Fn() + Send + Sync>,
}

struct Inner<D, T, E> {
    pending: Vec<Pending<D, T, E>>,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
}

/// Pending-request ledger plus its notification mechanism.
///
/// Cloning yields another handle to the same ledger. `D` is the opaque
/// request descriptor, `T` the success value, `E` the error callers await.
pub struct Gate<D, T, E> {
    inner: Arc<Mutex<Inner<D, T, E>>>,
}

impl<D, T, E> Clone for Gate<D, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D, T, E> Default for Gate<D, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, T, E> std::fmt::Debug for Gate<D, T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self
            .inner
            .lock()
            .map(|inner| inner.pending.len())
            .unwrap_or_else(|err| err.into_inner().pending.len());
        f.debug_struct("Gate").field("pending", &pending).finish()
    }
}

impl<D, T, E> Gate<D, T, E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pending: Vec::new(),
                subscribers: Vec::new(),
                next_subscriber_id: 0,
            })),
        }
    }
}

impl<D, T, E> Gate<D, T, E>
where
    D: Send + 'static,
    T: Send + 'static,
    E: Clone + From<Abandoned> + Send + 'static,
{
    /// Park an operation and return the future its caller keeps awaiting.
    ///
    /// Never suspends and never refuses: the ledger is unbounded. If this
    /// call moves the ledger from empty to non-empty, every registered
    /// subscriber is notified synchronously; further enqueues into an already
    /// non-empty ledger stay silent so one outage opens one verification
    /// flow, not one per request.
    pub fn enqueue(&self, descriptor: D) -> PendingRequest<T, E> {
        let (settle, receiver) = oneshot::channel();
        let listeners = {
            let mut inner = self.lock();
            let was_empty = inner.pending.is_empty();
            inner.pending.push(Pending { descriptor, settle });
            debug!(pending = inner.pending.len(), "parked request");
            if was_empty {
                inner
                    .subscribers
                    .iter()
                    .map(|subscriber| Arc::clone(&subscriber.notify))
                    .collect()
            } else {
                Vec::new()
            }
        };

        // Listeners run outside the lock; a panicking listener must not
        // poison the ledger or starve the remaining listeners.
        for notify in listeners {
            if catch_unwind(AssertUnwindSafe(|| notify())).is_err() {
                warn!("gate subscriber panicked during notification");
            }
        }

        PendingRequest { receiver }
    }

    /// True iff at least one operation is parked.
    ///
    /// A notification without a non-empty ledger at observation time is
    /// legal; subscribers use this query to ignore it quietly.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Number of parked operations, in insertion order.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Register a notification callback for the empty→non-empty edge.
    ///
    /// Subscribing does not retroactively fire for an already non-empty
    /// ledger; late subscribers call [`Gate::has_pending`] to catch up.
    /// Dropping the returned [`Subscription`] deregisters the listener.
    #[must_use]
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_subscriber_id;
            inner.next_subscriber_id += 1;
            inner.subscribers.push(Subscriber {
                id,
                notify: Arc::new(listener),
            });
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || unsubscribe(&weak, id))),
        }
    }

    /// Snapshot and empty the ledger, then replay every snapshotted
    /// descriptor and settle its caller with the replay outcome.
    ///
    /// `replay` is invoked once per parked operation, in insertion order;
    /// the returned futures are driven as independent tasks, so one replay's
    /// failure neither cancels nor taints the others and each caller gets
    /// its own outcome. The call itself does not wait for the replays:
    /// a replay may legally park its descriptor again (the elevation was
    /// already consumed by a race), and that re-parked operation belongs to
    /// the next verification cycle, not this sweep. Operations enqueued
    /// while replays are in flight likewise land in the fresh ledger and
    /// re-trigger the empty→non-empty notification.
    ///
    /// Must be called from within a tokio runtime.
    pub fn resolve_all<F, Fut>(&self, replay: F)
    where
        F: Fn(D) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let drained = {
            let mut inner = self.lock();
            std::mem::take(&mut inner.pending)
        };
        if drained.is_empty() {
            return;
        }
        debug!(count = drained.len(), "replaying parked requests");

        for Pending { descriptor, settle } in drained {
            let outcome = replay(descriptor);
            tokio::spawn(async move {
                // Send fails only if the caller stopped waiting.
                let _ = settle.send(outcome.await);
            });
        }
    }

    /// Snapshot and empty the ledger, settling every parked operation with a
    /// clone of the shared reason.
    pub fn reject_all(&self, reason: E) {
        let drained = {
            let mut inner = self.lock();
            std::mem::take(&mut inner.pending)
        };
        if drained.is_empty() {
            return;
        }
        debug!(count = drained.len(), "rejecting parked requests");
        for parked in drained {
            let _ = parked.settle.send(Err(reason.clone()));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<D, T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unsubscribe<D, T, E>(weak: &Weak<Mutex<Inner<D, T, E>>>, id: u64) {
    if let Some(inner) = weak.upgrade() {
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.retain(|subscriber| subscriber.id != id);
    }
}

/// Registration guard returned by [`Gate::subscribe`].
///
/// The listener stays registered until this guard is dropped or
/// [`Subscription::unsubscribe`] is called.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Deregister the listener now instead of at drop time.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Future returned by [`Gate::enqueue`]; resolves when the parked operation
/// is settled by `resolve_all` or `reject_all`.
pub struct PendingRequest<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Future for PendingRequest<T, E>
where
    E: From<Abandoned>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let receiver = &mut self.get_mut().receiver;
        match Pin::new(receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(E::from(Abandoned))),
            Poll::Pending => Poll::Pending,
        }
    }
}
