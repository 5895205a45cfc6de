//! Terminal consumers: request, notification, broadcast and stream handlers.
//!
//! Handlers return `Result<_, BoxError>` so application code can use `?` on
//! any error type. The dispatcher wraps failures in
//! [`DispatchError::Handler`](crate::DispatchError::Handler), except for a
//! boxed `DispatchError` which is passed through as-is.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BoxError;
use crate::foundation::context::CallContext;
use crate::foundation::message::{AnyMessage, Notification, Request, StreamRequest};

/// Handles one request type. Exactly one must be resolvable per type.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    /// Produces the response for `request`.
    async fn handle(&self, request: &R, ctx: &CallContext) -> Result<R::Response, BoxError>;

    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Consumes one notification type.
///
/// Used both for handlers resolved through the
/// [`HandlerResolver`](crate::HandlerResolver) and for typed subscribers.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync + 'static {
    /// Consumes the notification.
    async fn handle(&self, notification: &N, ctx: &CallContext) -> Result<(), BoxError>;

    /// Name used in logs and failure reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Subscriber that receives every published notification.
#[async_trait]
pub trait BroadcastHandler: Send + Sync + 'static {
    /// Consumes any notification.
    async fn handle(&self, notification: &AnyMessage, ctx: &CallContext) -> Result<(), BoxError>;

    /// Name used in logs and failure reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Produces the item stream for one stream request type.
///
/// The handler receives an owned request and context because the returned
/// stream outlives the call that created it. Cleanup placed in `Drop`
/// implementations of the stream's state runs when the caller abandons the
/// stream; `ctx.cancelled()` also fires in that case.
pub trait StreamHandler<R: StreamRequest>: Send + Sync + 'static {
    /// Returns a lazy stream of items.
    fn handle(&self, request: Arc<R>, ctx: CallContext)
    -> BoxStream<'static, Result<R::Item, BoxError>>;

    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
