//! Layered configuration for hosts embedding the mediator.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CourierConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, NotificationConfig,
    PipelineConfig, SpanEventConfig,
};
pub use validation::validate_config;
