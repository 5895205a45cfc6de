//! Message traits.
//!
//! Every `Any + Send + Sync` type is a [`Message`]. The three dispatch kinds
//! build on it:
//!
//! | Trait | Consumers | Result |
//! |-------|-----------|--------|
//! | [`Request`] | exactly one handler | `Request::Response` |
//! | [`Notification`] | zero or more handlers and subscribers | `()` |
//! | [`StreamRequest`] | exactly one stream handler | lazy sequence of `StreamRequest::Item` |
//!
//! Each kind declares its [`Capabilities`], the set of views that
//! type-constrained middleware may use. Implementations are usually derived:
//!
//! ```rust,ignore
//! #[derive(Request)]
//! #[request(response = OrderId, capabilities(dyn Validate))]
//! struct CreateOrder {
//!     sku: String,
//!     quantity: u32,
//! }
//! ```

use std::any::Any;

use crate::foundation::capability::Capabilities;

/// Base trait for anything that travels through the mediator.
///
/// Blanket-implemented; user code never implements it by hand.
pub trait Message: Any + Send + Sync {
    /// Returns the fully qualified type name of the message.
    fn message_name(&self) -> &'static str;

    /// Returns the message as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> Message for T {
    fn message_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The universal capability: every message can be viewed as `AnyMessage`.
///
/// Middleware written against `AnyMessage` applies to every request,
/// notification and stream request.
pub type AnyMessage = dyn Message;

impl dyn Message {
    /// Returns `true` if the message is of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Attempts to downcast the message to a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// A message routed to exactly one handler.
pub trait Request: Message + Sized {
    /// The handler's response. Use `()` for commands without a result.
    type Response: Send + 'static;

    /// Declares the capability views of this request type.
    fn capabilities() -> Capabilities<Self> {
        Capabilities::new()
    }
}

/// A message broadcast to zero or more consumers.
pub trait Notification: Message + Sized {
    /// Declares the capability views of this notification type.
    fn capabilities() -> Capabilities<Self> {
        Capabilities::new()
    }
}

/// A message answered by a lazy, finite sequence of items.
pub trait StreamRequest: Message + Sized {
    /// Item type produced by the stream handler.
    type Item: Send + 'static;

    /// Declares the capability views of this stream request type.
    fn capabilities() -> Capabilities<Self> {
        Capabilities::new()
    }
}
