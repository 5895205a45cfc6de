//! Structured logging for all three pipelines.

use std::time::{Duration, Instant};

use courier_core::{
    AnyMessage, CallContext, DispatchError, DispatchResult, ItemStream, Middleware, Next,
    NotificationMiddleware, NotificationNext, Reply, StreamMiddleware, StreamNext, async_trait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::stream::{StreamEnd, guarded};

/// Logs every dispatch with its outcome and duration.
///
/// Calls slower than `slow_threshold_ms` are logged at `WARN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingMiddleware {
    /// Threshold above which a successful call is reported as slow.
    pub slow_threshold_ms: u64,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 1000,
        }
    }
}

impl LoggingMiddleware {
    /// Creates the middleware with the given slow-call threshold.
    pub fn with_slow_threshold(threshold: Duration) -> Self {
        Self {
            slow_threshold_ms: millis(threshold),
        }
    }

    fn record(&self, kind: &str, message: &str, elapsed: Duration, error: Option<&DispatchError>) {
        let elapsed_ms = millis(elapsed);
        match error {
            None if elapsed_ms >= self.slow_threshold_ms => {
                warn!(kind, message_type = message, elapsed_ms, "Slow dispatch")
            }
            None => debug!(kind, message_type = message, elapsed_ms, "Dispatch completed"),
            Some(error) if error.is_cancelled() => {
                info!(kind, message_type = message, elapsed_ms, "Dispatch cancelled")
            }
            Some(error) => {
                warn!(kind, message_type = message, elapsed_ms, error = %error, "Dispatch failed")
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl Middleware<AnyMessage> for LoggingMiddleware {
    async fn handle(
        &self,
        request: &AnyMessage,
        _ctx: &CallContext,
        next: Next<'_>,
    ) -> DispatchResult<Reply> {
        let started = Instant::now();
        debug!(message_type = request.message_name(), "Handling request");
        let result = next.run().await;
        self.record(
            "request",
            request.message_name(),
            started.elapsed(),
            result.as_ref().err(),
        );
        result
    }
}

#[async_trait]
impl NotificationMiddleware<AnyMessage> for LoggingMiddleware {
    async fn handle(
        &self,
        notification: &AnyMessage,
        _ctx: &CallContext,
        next: NotificationNext<'_>,
    ) -> DispatchResult<()> {
        let started = Instant::now();
        debug!(message_type = notification.message_name(), "Publishing notification");
        let result = next.run().await;
        self.record(
            "notification",
            notification.message_name(),
            started.elapsed(),
            result.as_ref().err(),
        );
        result
    }
}

impl StreamMiddleware<AnyMessage> for LoggingMiddleware {
    fn handle(&self, request: &AnyMessage, _ctx: &CallContext, next: StreamNext) -> ItemStream {
        let message = request.message_name();
        let started = Instant::now();
        debug!(message_type = message, "Opening stream");

        guarded(next.run(), move |end| {
            let elapsed_ms = millis(started.elapsed());
            match end {
                StreamEnd::Completed { items } => {
                    debug!(message_type = message, items, elapsed_ms, "Stream completed")
                }
                StreamEnd::Abandoned { items } => {
                    info!(message_type = message, items, elapsed_ms, "Stream abandoned by consumer")
                }
            }
        })
    }
}
