//! Per-call context.
//!
//! One [`CallContext`] is created for every `send`, `publish` or stream call
//! and shared by every stage of that call. It carries the single
//! cancellation signal for the call and a small `TypeId`-keyed state map
//! that middleware use to hand values to later stages or to the handler.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::{DispatchError, DispatchResult};

struct ContextInner {
    message: &'static str,
    token: CancellationToken,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

/// Context shared by all stages of one dispatch call.
///
/// Cloning is cheap and clones share cancellation and state.
///
/// # Example
///
/// ```rust,ignore
/// async fn handle(&self, request: &AnyMessage, ctx: &CallContext, next: Next<'_>) -> DispatchResult<Reply> {
///     ctx.check_cancelled()?;
///     ctx.set_state(RequestId::generate());
///     next.run().await
/// }
/// ```
#[derive(Clone)]
pub struct CallContext {
    inner: Arc<ContextInner>,
}

impl CallContext {
    /// Creates a context for one call of `message`.
    pub fn new(message: &'static str, token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                message,
                token,
                state: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Type name of the message being dispatched.
    pub fn message_name(&self) -> &'static str {
        self.inner.message
    }

    // ─── Cancellation ─────────────────────────────────────────────────────────

    /// Returns the call's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Fails with [`DispatchError::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self) -> DispatchResult<()> {
        if self.is_cancelled() {
            Err(DispatchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when cancellation is requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    // ─── State ────────────────────────────────────────────────────────────────

    /// Stores a value, replacing any previous value of the same type.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.inner
            .state
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a clone of the stored value of type `T`.
    pub fn get_state<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner
            .state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Returns `true` if a value of type `T` is stored.
    pub fn has_state<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.state.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns the stored value of type `T`.
    pub fn take_state<T: Send + Sync + 'static>(&self) -> Option<T> {
        self.inner
            .state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    /// Applies `f` to the stored value of type `T`, if present.
    pub fn update_state<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R>
    where
        T: Send + Sync + 'static,
    {
        self.inner
            .state
            .lock()
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
            .map(f)
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("message", &self.inner.message)
            .field("is_cancelled", &self.is_cancelled())
            .field("state_entries", &self.inner.state.lock().len())
            .finish()
    }
}
