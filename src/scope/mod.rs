//! Cancellation hierarchy
//!
//! Every long-lived object on the client side lives inside a [`Scope`]:
//!
//! ```text
//! Connection scope
//!   ├─> Client scope
//!   │     ├─> Stream scope
//!   │     └─> Stream scope
//!   └─> Client scope
//! ```
//!
//! Cancelling a scope cancels all of its descendants (via
//! [`CancellationToken::child_token`]) and nothing else. `close()` cancels and
//! then waits until every task spawned in the scope, and in every descendant
//! scope, has finished.
//!
//! Starting work on a scope that is already cancelled fails immediately with
//! [`ScopeError::AlreadyClosed`] instead of parking forever.

use std::fmt;
use std::future::Future;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::trace;

use crate::Result;
use crate::ScopeError;

/// Level of a scope in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Connection,
    Client,
    Stream,
}

impl fmt::Display for ScopeKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ScopeKind::Connection => "connection",
            ScopeKind::Client => "client",
            ScopeKind::Stream => "stream",
        };
        f.write_str(name)
    }
}

/// A cancellable unit of work.
///
/// Dropping a scope cancels it.
#[derive(Debug)]
pub struct Scope {
    kind: ScopeKind,
    token: CancellationToken,
    tracker: TaskTracker,
    closed: OnceCell<()>,
}

impl Scope {
    /// Creates a scope with no parent.
    pub fn root(kind: ScopeKind) -> Self {
        Self::with_token(kind, CancellationToken::new())
    }

    fn with_token(
        kind: ScopeKind,
        token: CancellationToken,
    ) -> Self {
        Self {
            kind,
            token,
            tracker: TaskTracker::new(),
            closed: OnceCell::new(),
        }
    }

    /// Creates a scope nested in this one.
    ///
    /// The parent's `close()` waits for the child's tasks as well.
    pub fn child(
        &self,
        kind: ScopeKind,
    ) -> Result<Scope> {
        if self.token.is_cancelled() {
            return Err(ScopeError::AlreadyClosed { scope: self.kind }.into());
        }

        let child = Self::with_token(kind, self.token.child_token());

        let child_token = child.token.clone();
        let child_tracker = child.tracker.clone();
        self.tracker.spawn(async move {
            child_token.cancelled().await;
            child_tracker.close();
            child_tracker.wait().await;
        });

        Ok(child)
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Cancels this scope and all descendants. Idempotent.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            trace!(scope = %self.kind, "scope cancelled");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns a token that fires when this scope is cancelled.
    ///
    /// Fails if the scope is already cancelled or closed.
    pub fn cancellation_token(&self) -> Result<CancellationToken> {
        if self.token.is_cancelled() {
            return Err(ScopeError::AlreadyClosed { scope: self.kind }.into());
        }
        Ok(self.token.clone())
    }

    /// Future that resolves once the scope is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Cancels the scope and waits for its tasks (and its descendants'
    /// tasks) to finish.
    ///
    /// Safe to call any number of times from any number of callers; every
    /// caller returns once teardown has completed.
    pub async fn close(&self) {
        self.closed
            .get_or_init(|| async {
                self.cancel();
                self.tracker.close();
                self.tracker.wait().await;
                trace!(scope = %self.kind, "scope closed");
            })
            .await;
    }

    /// Spawns a task bound to this scope.
    ///
    /// The task is aborted at its next suspension point once the scope is
    /// cancelled, in which case the handle yields `None`.
    pub fn spawn<F>(
        &self,
        task: F,
    ) -> Result<JoinHandle<Option<F::Output>>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.token.is_cancelled() {
            return Err(ScopeError::AlreadyClosed { scope: self.kind }.into());
        }

        let token = self.token.clone();
        Ok(self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                output = task => Some(output),
            }
        }))
    }

    /// Runs `operation` unless the scope is (or becomes) cancelled first.
    pub async fn run<F>(
        &self,
        operation: &'static str,
        future: F,
    ) -> Result<F::Output>
    where
        F: Future,
    {
        if self.token.is_cancelled() {
            return Err(ScopeError::AlreadyClosed { scope: self.kind }.into());
        }

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ScopeError::Cancelled {
                scope: self.kind,
                operation,
            }
            .into()),
            output = future => Ok(output),
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod scope_test;
