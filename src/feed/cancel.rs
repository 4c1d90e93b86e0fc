use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::fetcher::FetchError;

/// Cancellation and deadline shared by every task in a batch.
///
/// Cloning is cheap and all clones observe the same cancellation. A child
/// created with [`Cancellation::child`] is cancelled with its parent but can
/// also be cancelled on its own, which is how a batch tears down its workers
/// without affecting the caller's token.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A token with no deadline that only fires when cancelled explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that expires `timeout` from now.
    ///
    /// A `timeout` too large to represent as an instant leaves the token
    /// without a deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// Narrows the deadline to at most `timeout` from now.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Time budget counted from the call. Values past the
    ///   clock's range are treated as unbounded and leave the current
    ///   deadline unchanged.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            tracing::debug!(?timeout, "Timeout out of range, ignoring deadline");
            return self;
        };
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// The instant this token expires, or `None` if it only fires when
    /// cancelled explicitly.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Derives a token that inherits this one's cancellation and deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Fires this token, its clones and every child derived from it.
    ///
    /// Parents are unaffected. Calling it more than once is a no-op.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels this token when the returned guard is dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Returns the reason this token has fired, if it has.
    ///
    /// Explicit cancellation wins over an expired deadline.
    pub fn error(&self) -> Option<FetchError> {
        if self.token.is_cancelled() {
            return Some(FetchError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(FetchError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns `true` once the token was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// Waits until the token fires and returns the reason.
    pub async fn done(&self) -> FetchError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => FetchError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => FetchError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                FetchError::Cancelled
            }
        }
    }
}
