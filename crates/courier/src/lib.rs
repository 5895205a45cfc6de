//! # Courier
//!
//! An in-process mediator: callers send typed messages, the mediator finds
//! the handlers and runs them behind an ordered, type-aware middleware
//! pipeline.
//!
//! ## Architecture
//!
//! ```text
//!  send(R) ──▶ ┌──────────┐   ┌────────────┬────────────┬─────┐   ┌───────────────┐
//!              │ Mediator │──▶│ middleware │ middleware │ ... │──▶│ one handler   │
//!              └──────────┘   └────────────┴────────────┴─────┘   └───────────────┘
//!  publish(N) ──▶ notification middleware ──▶ handlers ▶ typed subscribers ▶ broadcast
//!  send_stream(R) ──▶ stream middleware ──▶ lazy, cancellable item stream
//! ```
//!
//! - **Requests** have exactly one handler; zero or several is an error
//!   raised before any middleware runs.
//! - **Middleware** are ordered by `order`, then registration. A middleware
//!   written against a capability (`dyn Validate`, a concrete type, or
//!   [`AnyMessage`](core::AnyMessage)) only joins chains of messages that
//!   declare it. Chains are built once per message type and cached.
//! - **Notifications** fan out to resolved handlers, then typed subscribers,
//!   then broadcast subscribers. Subscriptions can change at any time.
//! - **Streams** are lazy; dropping one cancels the producer and runs its
//!   cleanup.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(Debug, Request)]
//! #[request(response = u64, capabilities(dyn Validate))]
//! struct CreateOrder {
//!     quantity: u32,
//! }
//!
//! impl Validate for CreateOrder {
//!     fn validate(&self) -> Result<(), ValidationError> {
//!         if self.quantity == 0 {
//!             return Err(ValidationError::new("quantity must be positive"));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! struct CreateOrderHandler;
//!
//! #[async_trait]
//! impl RequestHandler<CreateOrder> for CreateOrderHandler {
//!     async fn handle(&self, request: &CreateOrder, _ctx: &CallContext) -> Result<u64, BoxError> {
//!         Ok(1000 + u64::from(request.quantity))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = CourierRuntime::builder()
//!         .handlers(HandlerRegistry::new().request(CreateOrderHandler))
//!         .configure(|mediator| {
//!             mediator
//!                 .middleware(MiddlewareDescriptor::<AnyMessage>::new(LoggingMiddleware::default()))
//!                 .middleware(MiddlewareDescriptor::<dyn Validate>::new(ValidationMiddleware))
//!         })
//!         .build()?;
//!
//!     let id = runtime.mediator().send(CreateOrder { quantity: 2 }).await?;
//!     assert_eq!(id, 1002);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `macros`: `Request`, `Notification` and `StreamRequest` derives (default)
//! - `toml-config`: `courier.toml` configuration files (default)
//! - `yaml-config`: `courier.yaml` configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
#[cfg(feature = "macros")]
pub use courier_macros as macros;
pub use courier_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{CourierRuntime, RuntimeBuilder};

    // Dispatch surface
    pub use courier_framework::{Mediator, MediatorBuilder, ResponseStream};

    // Messages and handlers
    pub use courier_core::{
        AnyMessage, BoxError, BroadcastHandler, CallContext, Capabilities, DispatchError,
        DispatchResult, HandlerRegistry, Notification, NotificationHandler, Request,
        RequestHandler, StreamHandler, StreamRequest, async_trait,
    };

    // Middleware authoring
    pub use courier_core::{
        ItemStream, Middleware, Next, NotificationMiddleware, NotificationNext, Reply,
        StreamMiddleware, StreamNext,
    };
    pub use courier_framework::{
        MiddlewareDescriptor, MiddlewareOverride, NotificationMiddlewareDescriptor,
        StreamMiddlewareDescriptor,
    };

    // Built-in middleware and their capabilities
    pub use courier_framework::{
        Idempotent, LoggingMiddleware, RetryMiddleware, TimeoutMiddleware, Validate,
        ValidationError, ValidationMiddleware,
    };

    // Delivery options
    pub use courier_framework::{FailurePolicy, PublishStrategy};

    #[cfg(feature = "macros")]
    pub use courier_macros::{Notification, Request, StreamRequest};
}
