//! Validation of messages that declare the [`Validate`] capability.

use courier_core::{
    CallContext, DispatchError, DispatchResult, Middleware, Next, NotificationMiddleware,
    NotificationNext, Reply, async_trait,
};
use thiserror::Error;
use tracing::debug;

/// Capability for messages that can check their own invariants.
///
/// Declare it on a message with
/// `Capabilities::new().with::<dyn Validate>(|message| message)` or the
/// `capabilities(dyn Validate)` derive attribute.
pub trait Validate: Send + Sync {
    /// Returns every violated rule.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// One or more violated rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", .violations.join("; "))]
pub struct ValidationError {
    /// Human-readable descriptions of each violation.
    pub violations: Vec<String>,
}

impl ValidationError {
    /// A single violation.
    pub fn new(violation: impl Into<String>) -> Self {
        Self {
            violations: vec![violation.into()],
        }
    }

    /// `Ok` when `violations` is empty.
    pub fn check(violations: Vec<String>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self { violations })
        }
    }
}

/// Rejects invalid messages before they reach later stages.
///
/// The rejection is a [`DispatchError::Handler`] wrapping the
/// [`ValidationError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationMiddleware;

#[async_trait]
impl Middleware<dyn Validate> for ValidationMiddleware {
    async fn handle(
        &self,
        request: &dyn Validate,
        ctx: &CallContext,
        next: Next<'_>,
    ) -> DispatchResult<Reply> {
        if let Err(error) = request.validate() {
            debug!(message_type = ctx.message_name(), %error, "Request rejected");
            return Err(DispatchError::handler(error));
        }
        next.run().await
    }
}

#[async_trait]
impl NotificationMiddleware<dyn Validate> for ValidationMiddleware {
    async fn handle(
        &self,
        notification: &dyn Validate,
        ctx: &CallContext,
        next: NotificationNext<'_>,
    ) -> DispatchResult<()> {
        if let Err(error) = notification.validate() {
            debug!(message_type = ctx.message_name(), %error, "Notification rejected");
            return Err(DispatchError::handler(error));
        }
        next.run().await
    }
}
