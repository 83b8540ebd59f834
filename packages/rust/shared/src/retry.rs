//! Fixed-delay retry for flaky remote calls.
//!
//! Every remote stage (search, details, embeddings) runs through a
//! [`RetryPolicy`]: a fixed number of trials separated by a fixed sleep.
//! When the ceiling is hit the caller gets
//! [`ConceptLinkError::RetriesExhausted`] and is expected to degrade to
//! "no result" rather than abort the batch.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::AppConfig;
use crate::error::{ConceptLinkError, Result};

/// Trial ceiling and fixed backoff between trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one. Zero is treated as one.
    pub max_trials: u32,
    /// Sleep between two consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_trials: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl From<&AppConfig> for RetryPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_trials: config.retry.max_trials,
            delay: Duration::from_millis(config.retry.delay_ms),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_trials: u32, delay: Duration) -> Self {
        Self { max_trials, delay }
    }

    /// Run `attempt` until it succeeds or the trial ceiling is reached.
    ///
    /// `attempt` receives the 1-based trial number. There is no sleep after
    /// the final failed trial.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let trials = self.max_trials.max(1);
        let mut last_error = String::new();

        for trial in 1..=trials {
            match attempt(trial).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(operation, trial, max_trials = trials, error = %e, "remote call failed");
                    last_error = e.to_string();
                    if trial < trials && !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        Err(ConceptLinkError::RetriesExhausted {
            operation: operation.to_string(),
            trials,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let value = policy
            .run("flaky", |trial| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if trial < 3 {
                        Err(ConceptLinkError::Network("HTTP 503".into()))
                    } else {
                        Ok(trial)
                    }
                }
            })
            .await
            .expect("third trial succeeds");

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result: Result<()> = policy
            .run("wikidata search", |trial| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(ConceptLinkError::Network(format!("HTTP 500 on trial {trial}"))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ConceptLinkError::RetriesExhausted {
                operation,
                trials,
                last_error,
            }) => {
                assert_eq!(operation, "wikidata search");
                assert_eq!(trials, 3);
                assert!(last_error.contains("trial 3"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_success_makes_one_call() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let value = policy
            .run("ok", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("done") }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_trials_still_attempts_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let _: Result<()> = policy
            .run("never", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ConceptLinkError::Network("down".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn policy_from_config() {
        let mut config = AppConfig::default();
        config.retry.delay_ms = 250;
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_trials, 3);
        assert_eq!(policy.delay, Duration::from_millis(250));
    }
}
