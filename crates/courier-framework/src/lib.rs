//! # Courier Framework
//!
//! The dispatch engine of the Courier mediator.
//!
//! - [`Mediator`] sends requests to exactly one handler, publishes
//!   notifications to every handler and subscriber, and opens lazy,
//!   cancellable streams.
//! - Middleware are registered through descriptors on a [`MediatorBuilder`].
//!   Request and stream chains are ordered by `(order, registration)`,
//!   filtered by the capabilities each message type declares, and cached per
//!   type on first use.
//! - Notification middleware check capabilities per publish and forward
//!   unmodified when they do not apply.
//! - [`PipelineReport`]s explain which middleware run for a type and why the
//!   others do not.
//!
//! Nothing here spawns tasks: all work happens on the caller's task.

pub mod error;
pub mod mediator;
pub mod middleware;
pub mod notification;
pub mod pipeline;
mod request;
pub mod service;
pub mod stream;

pub use error::{BuildError, BuildResult};
pub use mediator::{Mediator, MediatorBuilder};
pub use middleware::{
    Idempotent, LoggingMiddleware, RetryMiddleware, TimeoutMiddleware, Validate, ValidationError,
    ValidationMiddleware,
};
pub use notification::{
    FailurePolicy, PublishOptions, PublishStrategy, SubscriptionId, SubscriptionInfo,
    SubscriptionRegistry,
};
pub use pipeline::{
    Excluded, Exclusion, MiddlewareDescriptor, MiddlewareInfo, MiddlewareKind,
    MiddlewareOverride, MiddlewareOverrides, NotificationMiddlewareDescriptor, PipelineReport,
    StreamMiddlewareDescriptor,
};
pub use service::{PublishService, RequestService};
pub use stream::{ResponseStream, StreamEnd, guarded};
