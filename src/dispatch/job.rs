// src/dispatch/job.rs — Per-job cancellation and deadline
//
// A job is done when its token is cancelled (user command, session stop,
// shutdown) or its deadline passes. Both end the backend call through the
// same select.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::infra::errors::{GenBotError, Result};

#[derive(Debug, Clone)]
pub struct JobContext {
    token: CancellationToken,
    deadline: Instant,
}

impl JobContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Instant::now() + timeout,
        }
    }

    /// Handle that cancels this job. Registered with the session registry.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Resolves with the reason the job ended.
    pub async fn done(&self) -> GenBotError {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => GenBotError::Canceled,
            _ = tokio::time::sleep_until(self.deadline) => GenBotError::DeadlineExceeded,
        }
    }

    /// Non-blocking form of [`JobContext::done`].
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(GenBotError::Canceled);
        }
        if Instant::now() >= self.deadline {
            return Err(GenBotError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` unless the job ends first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }

    /// Sleep between polls; wakes early with an error if the job ends.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
