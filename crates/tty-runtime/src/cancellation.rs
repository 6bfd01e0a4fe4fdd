//! Cancellation utilities for interruptible port operations
//!
//! Provides a cloneable cancel token and a helper for racing futures against
//! it, so a blocking attach can be interrupted promptly.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cancellation signal shared between a waiter and whoever may interrupt it.
///
/// Once cancelled, a token stays cancelled.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every current waiter
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Completes when the token is cancelled.
    ///
    /// The waiter is registered before the flag is checked, so a `cancel`
    /// racing with this call is never missed.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Races a future against cancellation, returns None if cancelled
///
/// # Example
/// ```ignore
/// match race_with_cancellation(wait_for_link(), &cancel).await {
///     Some(Ok(())) => println!("Connected"),
///     Some(Err(e)) => println!("Error: {}", e),
///     None => println!("Cancelled by user"),
/// }
/// ```
pub async fn race_with_cancellation<T, F>(fut: F, cancel: &CancelToken) -> Option<T>
where
    F: Future<Output = T>,
{
    use futures::future::{select, Either};

    if cancel.is_cancelled() {
        return None;
    }

    let cancel_fut = cancel.cancelled();

    match select(Box::pin(fut), Box::pin(cancel_fut)).await {
        Either::Left((result, _)) => Some(result),
        Either::Right(_) => None,
    }
}
