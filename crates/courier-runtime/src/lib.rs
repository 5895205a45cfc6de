//! # Courier Runtime
//!
//! Host bootstrap for the Courier mediator.
//!
//! - [`config`]: layered configuration (defaults, files, `COURIER_*`
//!   environment variables, programmatic overrides) and validation
//! - [`logging`]: `tracing-subscriber` setup with rolling file output
//! - [`CourierRuntime`]: freezes the configuration into a [`Mediator`]
//!   and owns its shutdown signal
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! let runtime = CourierRuntime::builder()
//!     .profile("production")
//!     .handlers(handlers)
//!     .build()?;
//!
//! runtime.mediator().publish(OrderShipped { id }).await?;
//! runtime.run_until_shutdown().await?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, CourierConfig, Profile, load_config,
    load_config_from_file, validate_config,
};
pub use courier_framework::Mediator;
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingError, LoggingGuard, SpanEvents};
pub use runtime::{CourierRuntime, RuntimeBuilder};
