//! Retry-with-backoff decorator

use std::cmp;
use std::future::Future;
use std::time::Duration;

use collect_core_types::{CollectError, Stage};
use tracing::{debug, warn};

use crate::classifier::Classifier;
use crate::verdict::{RecoveryAction, RecoveryVerdict};

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Terminal failure of a retried operation: the last error, the verdict
/// that stopped the retrying, and how many attempts were spent.
#[derive(Clone, Debug)]
pub struct RetryFailure {
    pub error: CollectError,
    pub verdict: RecoveryVerdict,
    pub attempts: u32,
}

/// Run `op`, retrying only while the classifier says `Retry` and attempts
/// remain. The delay before attempt `n+1` is
/// `max(base_delay * 2^(n-1), verdict.backoff)`. Any non-retry verdict
/// short-circuits immediately and is handed to the caller to route.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    stage: Stage,
    policy: &RetryPolicy,
    classifier: &dyn Classifier,
    mut op: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollectError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                let verdict = classifier.classify(&error, stage);
                if verdict.action != RecoveryAction::Retry || attempt >= policy.max_attempts {
                    return Err(RetryFailure {
                        error,
                        verdict,
                        attempts: attempt,
                    });
                }
                let exponential = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                let delay = cmp::max(exponential, verdict.backoff);
                warn!(label, attempt, %error, ?delay, "attempt failed, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
