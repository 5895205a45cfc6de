//! # Courier Core
//!
//! Contracts shared by every part of the Courier mediator.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Messages**: [`Request`], [`Notification`], [`StreamRequest`], and the
//!   universal [`AnyMessage`] view
//! - **Capabilities**: per-type [`Capabilities`] tables that decide which
//!   type-constrained middleware apply to a message
//! - **Call context**: [`CallContext`] with the call's cancellation token and
//!   stage-to-stage state
//! - **Replies**: type-erased responses ([`Reply`])
//!
//! ### Framework Layer
//!
//! - **Handlers**: [`RequestHandler`], [`NotificationHandler`],
//!   [`BroadcastHandler`], [`StreamHandler`]
//! - **Middleware**: [`Middleware`], [`NotificationMiddleware`],
//!   [`StreamMiddleware`] and their chain cursors
//!
//! ### Integration Layer
//!
//! - **Handler resolution**: the [`HandlerResolver`] boundary and the
//!   in-memory [`HandlerRegistry`]
//!
//! The dispatch engine that ties these together lives in `courier-framework`.

pub mod error;
pub mod foundation;
pub mod framework;
pub mod integration;

pub use error::{BoxError, ConsumerFailure, ConsumerOrigin, DispatchError, DispatchResult};
pub use foundation::capability::{Capabilities, CapabilityBinder, CapabilityId};
pub use foundation::context::CallContext;
pub use foundation::message::{AnyMessage, Message, Notification, Request, StreamRequest};
pub use foundation::reply::Reply;
pub use framework::handler::{BroadcastHandler, NotificationHandler, RequestHandler, StreamHandler};
pub use framework::middleware::{
    Chain, ErasedSlot, ItemStream, Middleware, Next, NotificationChain, NotificationMiddleware,
    NotificationNext, NotificationSlot, RequestSlot, RequestStage, StreamChain, StreamMiddleware,
    StreamNext, StreamSlot, StreamStage,
};
pub use integration::resolver::{
    ErasedHandler, HandlerKey, HandlerKind, HandlerRegistry, HandlerResolver, erase_notification,
    erase_request, erase_stream, resolve_notification, resolve_request, resolve_stream,
};

// Re-exports used by middleware and handler implementations.
pub use async_trait::async_trait;
pub use futures::future::BoxFuture;
pub use futures::stream::BoxStream;
pub use tokio_util::sync::CancellationToken;
