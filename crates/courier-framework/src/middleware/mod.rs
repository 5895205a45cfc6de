//! Built-in middleware.
//!
//! | Middleware | Pipelines | Capability |
//! |------------|-----------|------------|
//! | [`LoggingMiddleware`] | request, notification, stream | any message |
//! | [`ValidationMiddleware`] | request, notification | [`Validate`] |
//! | [`TimeoutMiddleware`] | request | any message |
//! | [`RetryMiddleware`] | request | [`Idempotent`] |

mod logging;
mod retry;
mod timeout;
mod validation;

pub use logging::LoggingMiddleware;
pub use retry::{Idempotent, RetryMiddleware};
pub use timeout::TimeoutMiddleware;
pub use validation::{Validate, ValidationError, ValidationMiddleware};
