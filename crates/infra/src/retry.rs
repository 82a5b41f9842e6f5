//! Bounded retry for idempotent reads.
//!
//! Only `StoreError::Transient` is retried. Mutations never go through here.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::store::StoreResult;

/// Hard ceiling on extra attempts, whatever the configuration says.
pub const MAX_READ_RETRIES: u32 = 2;

const BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRetry {
    retries: u32,
}

impl ReadRetry {
    pub fn new(retries: u32) -> Self {
        Self {
            retries: retries.min(MAX_READ_RETRIES),
        }
    }

    pub fn none() -> Self {
        Self { retries: 0 }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut tries = 0;
        loop {
            match attempt().await {
                Err(err) if err.is_transient() && tries < self.retries => {
                    tries += 1;
                    warn!(operation, attempt = tries, error = %err, "retrying read after transient store error");
                    tokio::time::sleep(BACKOFF * tries).await;
                }
                other => return other,
            }
        }
    }
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::store::StoreError;

    async fn flaky(calls: &AtomicU32, failures: u32) -> StoreResult<u32> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(StoreError::Transient("connection reset".to_string()))
        } else {
            Ok(n)
        }
    }

    #[tokio::test]
    async fn recovers_from_one_transient_failure() {
        let calls = AtomicU32::new(0);
        let out = ReadRetry::new(1).run("test", || flaky(&calls, 1)).await;
        assert_eq!(out, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_the_budget() {
        let calls = AtomicU32::new(0);
        let out = ReadRetry::new(10).run("test", || flaky(&calls, 5)).await;
        assert!(matches!(out, Err(StoreError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1 + MAX_READ_RETRIES);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let out: StoreResult<()> = ReadRetry::new(2)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::Backend("syntax error".to_string())) }
            })
            .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
