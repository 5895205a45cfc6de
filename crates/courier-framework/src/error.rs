//! Error types for building a mediator.

use courier_core::BoxError;
use thiserror::Error;

/// Errors raised while freezing a [`MediatorBuilder`](crate::MediatorBuilder).
#[derive(Debug, Error)]
pub enum BuildError {
    /// `build` was called without a handler resolver.
    #[error("no handler resolver configured")]
    MissingResolver,

    /// A middleware could not be constructed from its configuration.
    #[error("invalid configuration for middleware `{name}`: {source}")]
    InvalidMiddlewareConfig {
        /// Name of the middleware.
        name: String,
        /// The underlying deserialization or construction error.
        #[source]
        source: BoxError,
    },
}

/// Result type for mediator construction.
pub type BuildResult<T> = Result<T, BuildError>;
