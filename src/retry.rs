//! Bounded retry for mutating statements under lock contention.
//!
//! Other ingestion processes may hold the database lock while we write.
//! [`RetryingExecutor`] retries a statement only when the store reports it
//! as busy or locked, waiting `attempt * backoff_step` between attempts
//! (0.5s, 1.0s, 1.5s, ... with the default step). Any other error, or the
//! last busy error once attempts run out, is returned to the caller.
//!
//! Retrying an `INSERT` is safe because SQLite applies each statement
//! atomically: a statement rejected with `SQLITE_BUSY` wrote nothing.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::StoreError;
use crate::store::{Execution, RowSet, SqlBackend, SqlParam};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step: Duration::from_millis(500),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_step: config.backoff_step(),
        }
    }
}

impl RetryPolicy {
    /// Wait before retrying after failed attempt number `attempt` (1-based).
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }
}

/// Run one mutating statement, retrying while the store is busy.
pub async fn execute_with_retry<B: SqlBackend + ?Sized>(
    backend: &B,
    sql: &str,
    params: &[SqlParam],
    policy: &RetryPolicy,
) -> Result<Execution, StoreError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match backend.execute(sql, params).await {
            Ok(exec) => return Ok(exec),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let wait = policy.backoff(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "database locked, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A [`SqlBackend`] whose `execute` goes through [`execute_with_retry`].
///
/// Reads are passed straight through.
pub struct RetryingExecutor<'a, B: SqlBackend + ?Sized> {
    inner: &'a B,
    policy: RetryPolicy,
}

impl<'a, B: SqlBackend + ?Sized> RetryingExecutor<'a, B> {
    pub fn new(inner: &'a B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<'a, B: SqlBackend + ?Sized> SqlBackend for RetryingExecutor<'a, B> {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Execution, StoreError> {
        execute_with_retry(self.inner, sql, params, &self.policy).await
    }

    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet, StoreError> {
        self.inner.query(sql, params).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::ScriptedBackend;
    use super::*;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_step: Duration::ZERO,
        }
    }

    fn busy() -> StoreError {
        StoreError::Busy("database is locked".into())
    }

    #[tokio::test]
    async fn always_locked_uses_every_attempt() {
        let backend = ScriptedBackend::failing_with((0..10).map(|_| busy()).collect());
        let err = execute_with_retry(&backend, "INSERT", &[], &instant(5))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(backend.calls(), 5);
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let backend = ScriptedBackend::failing_with(vec![busy(), busy()]);
        execute_with_retry(&backend, "INSERT", &[], &instant(5))
            .await
            .unwrap();

        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let backend = ScriptedBackend::failing_with(vec![StoreError::Database(
            "UNIQUE constraint failed".into(),
        )]);
        let err = execute_with_retry(&backend, "INSERT", &[], &instant(5))
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn single_attempt_policy_never_retries() {
        let backend = ScriptedBackend::failing_with(vec![busy()]);
        assert!(execute_with_retry(&backend, "INSERT", &[], &instant(1))
            .await
            .is_err());
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn backoff_grows_linearly_with_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(4), Duration::from_millis(2000));
    }

    #[test]
    fn huge_backoff_step_saturates() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_step: Duration::from_millis(u64::MAX),
        };
        assert_eq!(policy.backoff(4), Duration::MAX);
        assert_eq!(policy.backoff(1), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn wrapper_retries_execute() {
        let backend = ScriptedBackend::failing_with(vec![busy()]);
        let exec = RetryingExecutor::new(&backend, instant(3));
        exec.execute("INSERT", &[]).await.unwrap();
        assert_eq!(backend.calls(), 2);
    }
}
