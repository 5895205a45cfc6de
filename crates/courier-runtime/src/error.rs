//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::logging::LoggingError;

/// Errors that can occur while assembling or running a [`CourierRuntime`](crate::CourierRuntime).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The mediator could not be built.
    #[error("Failed to build mediator: {0}")]
    Build(#[from] courier_framework::BuildError),

    /// Logging could not be installed.
    #[error(transparent)]
    Logging(#[from] LoggingError),

    /// Listening for shutdown signals failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
