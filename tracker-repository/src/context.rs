//! Cancellation and deadlines for repository calls
//!
//! Every repository operation takes a [`QueryContext`]. The in-flight store
//! call is raced against the context; when the context is cancelled or its
//! deadline passes the store future is dropped and the operation returns a
//! cancellation error.
//!
//! ```rust
//! use std::time::Duration;
//! use tracker_repository::context::QueryContext;
//!
//! let ctx = QueryContext::background().with_timeout(Duration::from_secs(5));
//! let request = ctx.child();
//! ctx.cancel();
//! assert!(request.is_cancelled());
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RepositoryConfig;
use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

/// Cancellation signal plus optional deadline carried into repository calls
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Context driven by an existing cancellation token
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Context with the configured default query timeout, if any
    pub fn from_config(config: &RepositoryConfig) -> Self {
        match config.query_timeout() {
            Some(timeout) => Self::background().with_timeout(timeout),
            None => Self::background(),
        }
    }

    /// Expire after `timeout`, keeping any earlier deadline
    ///
    /// A timeout too large to represent as an instant leaves the context without
    /// a new deadline.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Expire at `deadline`, keeping any earlier deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derived context, cancelled whenever this one is
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail fast when the context is already done
    pub fn check(&self, operation: RepositoryOperation) -> RepositoryResult<()> {
        if self.token.is_cancelled() {
            return Err(RepositoryError::cancelled(operation));
        }
        if self.deadline_passed() {
            return Err(RepositoryError::timeout(operation, "Deadline exceeded"));
        }
        Ok(())
    }

    /// Resolves with the matching error once the context is cancelled or expired
    pub async fn done(&self, operation: RepositoryOperation) -> RepositoryError {
        tokio::select! {
            biased;
            () = self.token.cancelled() => RepositoryError::cancelled(operation),
            () = expired(self.deadline) => RepositoryError::timeout(operation, "Deadline exceeded"),
        }
    }

    /// Run `work` unless the context finishes first
    pub async fn run<F, T>(&self, operation: RepositoryOperation, work: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        self.check(operation)?;
        tokio::select! {
            biased;
            error = self.done(operation) => Err(error),
            result = work => result,
        }
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
