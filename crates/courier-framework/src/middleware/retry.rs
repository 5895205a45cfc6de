//! Retries with exponential backoff for idempotent requests.

use std::time::Duration;

use courier_core::{
    CallContext, DispatchError, DispatchResult, Middleware, Next, Reply, async_trait,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Marker capability for requests that are safe to re-run.
pub trait Idempotent: Send + Sync {}

/// Re-runs the rest of the chain when a handler fails.
///
/// Only [`DispatchError::Handler`] failures are retried; resolution errors,
/// timeouts and cancellation are returned immediately. The backoff sleep
/// ends early with [`DispatchError::Cancelled`] if the call is cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryMiddleware {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound for any delay.
    pub max_delay_ms: u64,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryMiddleware {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryMiddleware {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

#[async_trait]
impl Middleware<dyn Idempotent> for RetryMiddleware {
    async fn handle(
        &self,
        _request: &dyn Idempotent,
        ctx: &CallContext,
        next: Next<'_>,
    ) -> DispatchResult<Reply> {
        let mut attempt = 0;
        loop {
            match next.run().await {
                Err(DispatchError::Handler(error)) if attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        message_type = ctx.message_name(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "Handler failed, retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = ctx.cancelled() => return Err(DispatchError::Cancelled),
                    }
                }
                outcome => return outcome,
            }
        }
    }
}
