//! Request context: cancellation, deadline and logging scope
//!
//! A [`Context`] is created once per top-level request and passed by
//! reference through every resource operation, storage call and field
//! handler. Derived contexts inherit every cancellation signal of their
//! parent and can only shorten its deadline.
//!
//! ```rust,ignore
//! let (ctx, handle) = Context::new()
//!     .with_timeout(Duration::from_secs(2))
//!     .with_cancel();
//! tokio::spawn(async move { client_gone.await; handle.cancel() });
//! let item = host.get(&ctx, &["users", "u1"], None).await?;
//! ```

use crate::core::error::{GraphError, GraphResult};
use futures::FutureExt;
use futures::future::{BoxFuture, select_all};
use std::future::{Future, pending};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, Span};

/// Cancellation signal and deadline shared by one request
#[derive(Debug, Clone)]
pub struct Context {
    signals: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
    span: Span,
}

/// Handle firing the cancellation signal of a context
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self {
            signals: Vec::new(),
            deadline: None,
            span: Span::current(),
        }
    }

    /// Derive a context that can additionally be cancelled through the handle
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let mut ctx = self.clone();
        ctx.signals.push(receiver);
        (ctx, CancelHandle { sender })
    }

    /// Derive a context expiring after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context expiring at `deadline` (never later than the parent's)
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        ctx
    }

    /// Derive a context logging under `span`
    pub fn with_span(&self, span: Span) -> Context {
        let mut ctx = self.clone();
        ctx.span = span;
        ctx
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The error this context currently reports, if it is done
    pub fn err(&self) -> Option<GraphError> {
        if self.signals.iter().any(|rx| *rx.borrow()) {
            return Some(GraphError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(GraphError::Timeout);
        }
        None
    }

    /// Resolve once the context is cancelled or expired.
    ///
    /// Never resolves for a context with neither signal nor deadline.
    pub async fn done(&self) -> GraphError {
        let cancelled = async {
            if self.signals.is_empty() {
                return pending::<()>().await;
            }
            let waits: Vec<BoxFuture<'static, ()>> = self
                .signals
                .iter()
                .cloned()
                .map(|mut rx| {
                    async move {
                        // A dropped handle can no longer cancel
                        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                            pending::<()>().await;
                        }
                    }
                    .boxed()
                })
                .collect();
            select_all(waits).await;
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = cancelled => GraphError::Cancelled,
            _ = expired => GraphError::Timeout,
        }
    }

    /// Run `fut` under this context.
    ///
    /// The future is dropped as soon as the context is done, and the
    /// context error is returned instead of its result.
    pub async fn run<T, F>(&self, fut: F) -> GraphResult<T>
    where
        F: Future<Output = GraphResult<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut.instrument(self.span.clone()) => result,
        }
    }
}
