//! Per-call cancellation and deadline signal.
//!
//! Every pipeline call takes a [`Context`] by reference. Policies, transports,
//! pagers and pollers check it before each blocking point and abort with
//! [`RuntimeError::Cancelled`] or [`RuntimeError::DeadlineExceeded`].

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Result, RuntimeError};

/// Cancellation and deadline carried through a call.
///
/// Cheap to clone. Derived contexts share the parent's cancellation signal
/// and can only tighten its deadline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels every [`Context`] derived from [`Context::with_cancel`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the associated contexts. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a cancellable context.
    ///
    /// The derived context is done when either its own handle or any
    /// ancestor's handle cancels.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut cancel = self.cancel.clone();
        cancel.push(rx);
        let ctx = Self {
            cancel,
            deadline: self.deadline,
        };
        (ctx, CancelHandle { tx })
    }

    /// Derive a context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context that expires at `deadline` (or earlier if `self` does).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.iter().any(|rx| *rx.borrow())
    }

    /// The context's error, if it is already done.
    pub fn err(&self) -> Option<RuntimeError> {
        if self.is_cancelled() {
            return Some(RuntimeError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(RuntimeError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fail fast if the context is done.
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolve with the context's error once it is cancelled or expires.
    ///
    /// Never resolves for a background context.
    pub async fn done(&self) -> RuntimeError {
        let cancelled = async {
            if self.cancel.is_empty() {
                std::future::pending::<()>().await;
            }
            let waits = self.cancel.iter().cloned().map(|mut rx| {
                Box::pin(async move {
                    // A dropped handle can no longer cancel.
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                })
            });
            futures::future::select_all(waits).await;
        };
        let expired = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancelled => RuntimeError::Cancelled,
            _ = expired => RuntimeError::DeadlineExceeded,
        }
    }

    /// Sleep for `duration` unless the context finishes first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            err = self.done() => Err(err),
        }
    }

    /// Run `fut` unless the context finishes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            result = fut => result,
            err = self.done() => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_done() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_cancel_marks_context_done() {
        let (ctx, handle) = Context::background().with_cancel();
        assert!(ctx.check().is_ok());

        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(matches!(ctx.check(), Err(RuntimeError::Cancelled)));

        // Clones share the signal.
        let clone = ctx.clone();
        assert!(matches!(clone.err(), Some(RuntimeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let err = ctx.done().await;
        assert!(matches!(err, RuntimeError::DeadlineExceeded));
        assert!(matches!(ctx.check(), Err(RuntimeError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_deadline_only_tightens() {
        let outer = Context::background().with_timeout(Duration::from_millis(50));
        let inner = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(inner.deadline(), outer.deadline());
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_cancel() {
        let (ctx, handle) = Context::background().with_cancel();
        let sleeper = tokio::spawn(async move { ctx.sleep(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let result = sleeper.await.unwrap();
        assert!(matches!(result, Err(RuntimeError::Cancelled)));
    }

    #[test]
    fn test_parent_cancel_reaches_child() {
        let (parent, parent_handle) = Context::background().with_cancel();
        let (child, _child_handle) = parent.with_cancel();
        let timed = child.with_timeout(Duration::from_secs(60));

        parent_handle.cancel();
        assert!(matches!(child.check(), Err(RuntimeError::Cancelled)));
        assert!(matches!(timed.check(), Err(RuntimeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::background().with_cancel();
        drop(handle);
        let result = ctx.sleep(Duration::from_millis(10)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_completes_before_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
