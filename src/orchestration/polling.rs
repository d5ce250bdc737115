//! # Polling
//!
//! Sleep-then-poll primitive for waiting on server-side state that offers no
//! push notification. Interval and timeout are explicit, and cancellation is
//! checked on every iteration and raced against every sleep.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{AgJoinError, Result};

/// Interval and overall budget of one wait loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Tracks one wait loop against its policy
#[derive(Debug)]
pub struct PollTimer<'a> {
    policy: PollPolicy,
    started: Instant,
    cancel: &'a CancellationToken,
    operation: String,
    polls: u64,
}

impl<'a> PollTimer<'a> {
    pub fn start(
        policy: PollPolicy,
        cancel: &'a CancellationToken,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            started: Instant::now(),
            cancel,
            operation: operation.into(),
            polls: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.policy.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.policy.timeout
    }

    /// Fail if the caller cancelled
    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AgJoinError::cancelled(self.operation.clone()));
        }
        Ok(())
    }

    /// Sleep one interval, or less if that would overrun the budget.
    /// Returns early with `Cancelled` if the token fires.
    pub async fn tick(&mut self) -> Result<()> {
        self.polls += 1;
        let remaining = self.policy.timeout.saturating_sub(self.elapsed());
        let nap = self.policy.interval.min(remaining);

        trace!(operation = %self.operation, poll = self.polls, nap_ms = nap.as_millis() as u64, "Polling");

        tokio::select! {
            _ = self.cancel.cancelled() => Err(AgJoinError::cancelled(self.operation.clone())),
            _ = tokio::time::sleep(nap) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_timeout() {
        let cancel = CancellationToken::new();
        let mut timer = PollTimer::start(
            PollPolicy::new(Duration::from_millis(100), Duration::from_secs(1)),
            &cancel,
            "waiting for test",
        );

        let mut ticks = 0;
        while !timer.expired() {
            timer.tick().await.unwrap();
            ticks += 1;
        }
        assert_eq!(ticks, 10);
        assert!(timer.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_tick_is_clamped_to_budget() {
        let cancel = CancellationToken::new();
        let mut timer = PollTimer::start(
            PollPolicy::new(Duration::from_millis(300), Duration::from_millis(500)),
            &cancel,
            "waiting for test",
        );
        timer.tick().await.unwrap();
        timer.tick().await.unwrap();
        assert!(timer.expired());
        assert_eq!(timer.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let mut timer = PollTimer::start(
            PollPolicy::new(Duration::from_secs(3600), Duration::from_secs(86_400)),
            &cancel,
            "waiting for test",
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let err = timer.tick().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(timer.elapsed() < Duration::from_secs(3600));
        assert!(timer.ensure_not_cancelled().is_err());
    }
}
