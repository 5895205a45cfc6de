//! Per-request time limits.

use std::time::Duration;

use courier_core::{
    AnyMessage, CallContext, DispatchError, DispatchResult, Middleware, Next, Reply, async_trait,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fails a request with [`DispatchError::TimedOut`] if the rest of the chain
/// does not finish within `timeout_ms`.
///
/// The inner future is dropped on expiry; handlers that must clean up should
/// also observe the call's cancellation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutMiddleware {
    /// Limit in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TimeoutMiddleware {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl TimeoutMiddleware {
    /// Creates the middleware with the given limit.
    pub fn new(limit: Duration) -> Self {
        Self {
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The configured limit.
    pub fn limit(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[async_trait]
impl Middleware<AnyMessage> for TimeoutMiddleware {
    async fn handle(
        &self,
        _request: &AnyMessage,
        ctx: &CallContext,
        next: Next<'_>,
    ) -> DispatchResult<Reply> {
        let limit = self.limit();
        match tokio::time::timeout(limit, next.run()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    message_type = ctx.message_name(),
                    timeout_ms = self.timeout_ms,
                    "Request timed out"
                );
                Err(DispatchError::TimedOut {
                    message: ctx.message_name(),
                    elapsed: limit,
                })
            }
        }
    }
}
