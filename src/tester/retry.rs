//! Bounded retry for provider calls.

use crate::llm::{Completion, CompletionRequest, LLMClient, LLMError};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.min(16)))
    }
}

/// Calls the client until it succeeds, fails permanently, or retries run out.
///
/// Returns the final result and the number of attempts made.
pub async fn complete_with_retry(
    client: &dyn LLMClient,
    request: &CompletionRequest,
    policy: RetryPolicy,
) -> (Result<Completion, LLMError>, u32) {
    let mut attempt = 0;
    loop {
        let result = client.complete(request).await;
        attempt += 1;
        match result {
            Err(e) if e.is_retryable() && attempt <= policy.max_retries => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    "Attempt {} of {} failed: {}. Retrying in {:?}",
                    attempt,
                    policy.max_retries.saturating_add(1),
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            other => return (other, attempt),
        }
    }
}
