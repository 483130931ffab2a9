//! Compare-and-swap with bounded retry.

use std::future::Future;

use common::{RetryPolicy, retry_if};

use crate::error::{DomainError, Result};

/// Runs one read-modify-conditional-write attempt per call of `attempt`,
/// retrying with backoff only while the attempt reports
/// [`DomainError::ConcurrentModification`].
///
/// Each attempt must re-read the current state; nothing read by a losing
/// attempt may leak into the next one. Any other error, or a lost race once
/// the policy is exhausted, is returned as is.
pub async fn with_optimistic_retry<F, Fut, T>(
    policy: &RetryPolicy,
    entity: &'static str,
    attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let result = retry_if(policy, attempt, |e: &DomainError| {
        let conflict = e.is_concurrent_modification();
        if conflict {
            metrics::counter!("optimistic_conflicts_total", "entity" => entity).increment(1);
        }
        conflict
    })
    .await;

    if let Err(e) = &result
        && e.is_concurrent_modification()
    {
        tracing::warn!(
            entity,
            attempts = policy.total_attempts(),
            error = %e,
            "optimistic concurrency retries exhausted"
        );
    }
    result
}
