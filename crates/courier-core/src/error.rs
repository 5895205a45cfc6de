//! Unified error types for the Courier dispatch engine.
//!
//! Every public dispatch operation returns [`DispatchResult`]. Cancellation is
//! its own variant in every API so callers can tell a cooperative abort from
//! an ordinary failure via [`DispatchError::is_cancelled`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed error type returned by handlers and subscribers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

// =============================================================================
// DispatchError
// =============================================================================

/// Errors produced while dispatching requests, notifications and streams.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the request type.
    #[error("no handler registered for `{message}`")]
    HandlerNotFound {
        /// Type name of the request.
        message: &'static str,
    },

    /// More than one handler is registered for the request type.
    #[error("{count} handlers registered for `{message}`, expected exactly one")]
    AmbiguousHandler {
        /// Type name of the request.
        message: &'static str,
        /// Number of handlers the resolver returned.
        count: usize,
    },

    /// The resolver returned an entry that is not a handler for the key.
    #[error("resolver entry #{position} for `{message}` is not an `{expected}`")]
    InvalidHandler {
        /// Type name of the message.
        message: &'static str,
        /// The handler shape the key requires.
        expected: &'static str,
        /// Position of the entry in the resolver's result.
        position: usize,
    },

    /// The call's cancellation token was triggered.
    #[error("operation was cancelled")]
    Cancelled,

    /// A notification consumer failed and the fail-fast policy aborted the call.
    #[error("consumer `{}` of `{notification}` failed: {}", .failure.consumer, .failure.error)]
    ConsumerFailed {
        /// Type name of the notification.
        notification: &'static str,
        /// The failing consumer.
        failure: ConsumerFailure,
    },

    /// One or more consumers failed under the aggregate policy.
    #[error("{} consumer(s) of `{notification}` failed", .failures.len())]
    ConsumersFailed {
        /// Type name of the notification.
        notification: &'static str,
        /// Failures in consumer order.
        failures: Vec<ConsumerFailure>,
    },

    /// A middleware short-circuited with a reply of the wrong type.
    #[error("expected a `{expected}` response but the pipeline produced `{actual}`")]
    ResponseTypeMismatch {
        /// The response type the caller expects.
        expected: &'static str,
        /// The type actually carried by the reply.
        actual: &'static str,
    },

    /// A timeout middleware gave up waiting for the rest of the chain.
    #[error("`{message}` did not complete within {elapsed:?}")]
    TimedOut {
        /// Type name of the message.
        message: &'static str,
        /// The configured limit.
        elapsed: Duration,
    },

    /// A handler, subscriber or middleware raised an application error.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),
}

impl DispatchError {
    /// Wraps an application error.
    pub fn handler(error: impl Into<BoxError>) -> Self {
        Self::Handler(error.into())
    }

    /// Converts an error returned by user code.
    ///
    /// A boxed `DispatchError` is unwrapped instead of nested, so a handler
    /// that bails out with [`DispatchError::Cancelled`] is still reported as
    /// a cancellation.
    pub fn from_boxed(error: BoxError) -> Self {
        match error.downcast::<DispatchError>() {
            Ok(inner) => *inner,
            Err(other) => Self::Handler(other),
        }
    }

    /// Returns `true` if this error is a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` for resolution failures raised before any middleware ran.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::HandlerNotFound { .. }
                | Self::AmbiguousHandler { .. }
                | Self::InvalidHandler { .. }
        )
    }

    /// Returns the application error carried by [`DispatchError::Handler`].
    pub fn as_handler_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Handler(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

// =============================================================================
// Consumer failures
// =============================================================================

/// Which delivery population a notification consumer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerOrigin {
    /// Resolved from the handler resolver.
    Handler,
    /// Subscribed for one notification type.
    Subscriber,
    /// Subscribed to every notification.
    Broadcast,
}

impl fmt::Display for ConsumerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Handler => "handler",
            Self::Subscriber => "subscriber",
            Self::Broadcast => "broadcast subscriber",
        })
    }
}

/// A single failed notification consumer.
#[derive(Debug)]
pub struct ConsumerFailure {
    /// Type name of the consumer.
    pub consumer: &'static str,
    /// Population the consumer was delivered from.
    pub origin: ConsumerOrigin,
    /// Position of the consumer in the delivery order.
    pub position: usize,
    /// The error it raised.
    pub error: BoxError,
}

impl fmt::Display for ConsumerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} `{}` (#{}) failed: {}",
            self.origin, self.consumer, self.position, self.error
        )
    }
}
