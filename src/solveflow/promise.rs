//! Deferred execution handles for agent operations.
//!
//! Every suspending agent operation comes in two flavors: the plain `async`
//! method (the synchronous path: it runs on the caller's frame and returns
//! the final value) and a `*_deferred` variant that schedules the
//! computation on the tokio worker pool and hands back a [`Promise`].
//!
//! A promise delivers its value at most once. An optional on-delivery
//! callback runs exactly once with the resolved value, on the worker, and
//! never runs if the promise was cancelled first. Cancellation aborts the
//! computation at its next suspension point and releases whatever the
//! computation acquired; awaiting a cancelled promise yields
//! [`AgentError::CancellationRequested`].
//!
//! Promises are not re-entrant-safe across threads; callers that share one
//! synchronize externally.
//!
//! # Example
//!
//! ```rust,no_run
//! use solveflow::promise::Promise;
//!
//! # async fn demo() -> Result<(), solveflow::error::AgentError> {
//! let promise = Promise::spawn(async { Ok(21 * 2) });
//! assert_eq!(promise.value().await?, 42);
//! # Ok(())
//! # }
//! ```

use crate::solveflow::error::AgentError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Callback invoked with the resolved value when a promise delivers.
pub type DeliveryCallback<T> = Box<dyn FnOnce(&T) + Send>;

/// Handle to a computation running on the worker pool.
///
/// Holds either a still-running computation or a delivered value waiting to
/// be claimed through [`Promise::value`].
pub struct Promise<T> {
    receiver: oneshot::Receiver<Result<T, AgentError>>,
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl<T: Send + 'static> Promise<T> {
    /// Schedule `computation` on the worker pool with no delivery callback.
    pub fn spawn<F>(computation: F) -> Self
    where
        F: Future<Output = Result<T, AgentError>> + Send + 'static,
    {
        Self::spawn_with_callback(computation, None)
    }

    /// Schedule `computation` on the worker pool. When it resolves
    /// successfully, `on_delivery` (if provided) runs exactly once with a
    /// reference to the value, before the value becomes claimable.
    pub fn spawn_with_callback<F>(computation: F, on_delivery: Option<DeliveryCallback<T>>) -> Self
    where
        F: Future<Output = Result<T, AgentError>> + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let (sender, receiver) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let result = computation.await;

            // A cancel that raced with completion wins: no callback, no
            // delivery. The receiver observes a dropped sender.
            if flag.load(Ordering::SeqCst) {
                return;
            }
            if let Ok(value) = &result {
                if let Some(callback) = on_delivery {
                    callback(value);
                }
            }
            let _ = sender.send(result);
        });

        Self {
            receiver,
            cancelled,
            handle,
        }
    }

    /// Await delivery and claim the value.
    ///
    /// Returns [`AgentError::CancellationRequested`] when the promise was
    /// cancelled before delivery.
    pub async fn value(self) -> Result<T, AgentError> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(AgentError::CancellationRequested),
        }
    }

    /// Cancel the promise: the delivery callback will not fire, awaiting
    /// yields `CancellationRequested`, and the computation is aborted at its
    /// next suspension point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.handle.abort();
    }

    /// True once [`Promise::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<T: Send + 'static> Promise<Promise<T>> {
    /// Resolve a promise whose value is itself a promise, unwrapping one
    /// level.
    pub async fn flatten(self) -> Result<T, AgentError> {
        self.value().await?.value().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_value() {
        let promise = Promise::spawn(async { Ok("done".to_string()) });
        assert_eq!(promise.value().await.unwrap(), "done");
    }

    #[tokio::test]
    async fn callback_runs_exactly_once_before_claim() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let promise = Promise::spawn_with_callback(
            async { Ok(7usize) },
            Some(Box::new(move |_: &usize| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        assert_eq!(promise.value().await.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_skips_callback_and_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let promise = Promise::spawn_with_callback(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1usize)
            },
            Some(Box::new(move |_: &usize| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        promise.cancel();
        assert!(promise.is_cancelled());
        assert!(matches!(
            promise.value().await,
            Err(AgentError::CancellationRequested)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn flatten_unwraps_one_level() {
        let inner = Promise::spawn(async { Ok(5i64) });
        let outer = Promise::spawn(async move { Ok(inner) });
        assert_eq!(outer.flatten().await.unwrap(), 5);
    }
}
