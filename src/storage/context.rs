//! Request scoped context for storage calls
//!
//! Carries an optional deadline and a cancellation token. Backends that can abort a call wrap
//! their work in [`Context::run`], the in-memory backend ignores the context altogether.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::Error;
use super::Result;

/// Deadline and cancellation for a single unit of work
#[derive(Clone, Debug, Default)]
pub struct Context {
    /// Moment after which work is abandoned
    deadline: Option<Instant>,

    /// Signals that the caller is no longer interested in the result
    cancellation: CancellationToken,
}

impl Context {
    /// A context without deadline, only cancelled explicitly
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now
    ///
    /// A timeout too large to be represented means no deadline at all
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::background(),
        }
    }

    /// A context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancellation: CancellationToken::new(),
        }
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel all work running under this context (and its clones)
    #[cfg(test)]
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Is the context cancelled or past its deadline?
    pub fn is_done(&self) -> bool {
        self.cancellation.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| deadline <= Instant::now())
    }

    /// Run `work`, abandoning it when the context is cancelled or the deadline passes
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] when the context got cancelled first
    /// - [`Error::DeadlineExceeded`] when the deadline passed first
    /// - whatever `work` itself returns otherwise
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_done() {
            return Err(if self.cancellation.is_cancelled() {
                Error::Cancelled
            } else {
                Error::DeadlineExceeded
            });
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;

            () = self.cancellation.cancelled() => Err(Error::Cancelled),
            () = deadline => Err(Error::DeadlineExceeded),
            result = work => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn slow() -> Result<u8> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(1)
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::background();

        let value = ctx.run(async { Ok(42) }).await.unwrap();
        assert_eq!(42, value);
        assert!(!ctx.is_done());
    }

    #[tokio::test]
    async fn test_run_passes_errors_through() {
        let ctx = Context::with_timeout(Duration::from_secs(30));

        let result = ctx.run(async { Err::<(), _>(Error::NotFound) }).await;
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[tokio::test]
    async fn test_run_after_cancel() {
        let ctx = Context::background();
        ctx.cancel();

        let result = ctx.run(async { Ok(1) }).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn test_cancel_while_running() {
        let ctx = Context::background();
        let canceller = ctx.clone();

        let handle = tokio::spawn(async move { ctx.run(slow()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout() {
        let ctx = Context::with_timeout(Duration::from_secs(u64::MAX / 2));
        assert!(ctx.deadline().is_none());

        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(7, value);
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let ctx = Context::with_timeout(Duration::from_millis(20));

        let result = ctx.run(slow()).await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
        assert!(ctx.is_done());
    }
}
