//! Handler resolution boundary.
//!
//! The engine never owns handlers. It asks a [`HandlerResolver`] for the
//! handlers registered under a [`HandlerKey`] on every call, so lifetimes and
//! scoping stay with the host (a DI container, a plugin manager, or the
//! in-memory [`HandlerRegistry`] shipped here).
//!
//! Resolvers return type-erased handlers. Each erased value must be the
//! typed trait object wrapped in an `Arc`, e.g. an
//! `Arc<dyn RequestHandler<R>>` stored inside the outer
//! `Arc<dyn Any + Send + Sync>`. The `erase_*` helpers produce exactly that.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{DispatchError, DispatchResult};
use crate::foundation::message::{Notification, Request, StreamRequest};
use crate::framework::handler::{NotificationHandler, RequestHandler, StreamHandler};

/// A handler erased to `Any`; see the module docs for its expected shape.
pub type ErasedHandler = Arc<dyn Any + Send + Sync>;

// =============================================================================
// HandlerKey
// =============================================================================

/// The dispatch kind a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// [`RequestHandler`]
    Request,
    /// [`NotificationHandler`]
    Notification,
    /// [`StreamHandler`]
    Stream,
}

/// Lookup key for handler resolution: dispatch kind plus message type.
#[derive(Clone, Copy)]
pub struct HandlerKey {
    kind: HandlerKind,
    message: TypeId,
    name: &'static str,
}

impl HandlerKey {
    fn of<M: 'static>(kind: HandlerKind) -> Self {
        Self {
            kind,
            message: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }

    /// Key for the handler of request type `R`.
    pub fn request<R: Request>() -> Self {
        Self::of::<R>(HandlerKind::Request)
    }

    /// Key for the handlers of notification type `N`.
    pub fn notification<N: Notification>() -> Self {
        Self::of::<N>(HandlerKind::Notification)
    }

    /// Key for the handler of stream request type `R`.
    pub fn stream<R: StreamRequest>() -> Self {
        Self::of::<R>(HandlerKind::Stream)
    }

    /// The dispatch kind.
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// The message's `TypeId`.
    pub fn message_type(&self) -> TypeId {
        self.message
    }

    /// The message's type name.
    pub fn message_name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for HandlerKey {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl Eq for HandlerKey {}

impl Hash for HandlerKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.message.hash(state);
    }
}

impl fmt::Debug for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.name)
    }
}

// =============================================================================
// HandlerResolver
// =============================================================================

/// Returns zero, one or many handlers for a key, in resolution order.
pub trait HandlerResolver: Send + Sync + 'static {
    /// Resolves every handler registered under `key`.
    fn resolve(&self, key: &HandlerKey) -> Vec<ErasedHandler>;
}

impl<F> HandlerResolver for F
where
    F: Fn(&HandlerKey) -> Vec<ErasedHandler> + Send + Sync + 'static,
{
    fn resolve(&self, key: &HandlerKey) -> Vec<ErasedHandler> {
        self(key)
    }
}

/// Erases a request handler for return from a resolver.
pub fn erase_request<R: Request>(handler: Arc<dyn RequestHandler<R>>) -> ErasedHandler {
    Arc::new(handler)
}

/// Erases a notification handler for return from a resolver.
pub fn erase_notification<N: Notification>(
    handler: Arc<dyn NotificationHandler<N>>,
) -> ErasedHandler {
    Arc::new(handler)
}

/// Erases a stream handler for return from a resolver.
pub fn erase_stream<R: StreamRequest>(handler: Arc<dyn StreamHandler<R>>) -> ErasedHandler {
    Arc::new(handler)
}

/// Recovers the typed handlers. Every entry counts: one of the wrong shape
/// fails the whole resolution rather than being skipped.
fn downcast_all<T: ?Sized + 'static>(
    key: &HandlerKey,
    erased: Vec<ErasedHandler>,
) -> DispatchResult<Vec<Arc<T>>> {
    erased
        .into_iter()
        .enumerate()
        .map(|(position, handler)| {
            handler
                .downcast_ref::<Arc<T>>()
                .cloned()
                .ok_or(DispatchError::InvalidHandler {
                    message: key.message_name(),
                    expected: std::any::type_name::<Arc<T>>(),
                    position,
                })
        })
        .collect()
}

/// Resolves the typed request handlers for `R`.
pub fn resolve_request<R: Request>(
    resolver: &dyn HandlerResolver,
) -> DispatchResult<Vec<Arc<dyn RequestHandler<R>>>> {
    let key = HandlerKey::request::<R>();
    downcast_all(&key, resolver.resolve(&key))
}

/// Resolves the typed notification handlers for `N`.
pub fn resolve_notification<N: Notification>(
    resolver: &dyn HandlerResolver,
) -> DispatchResult<Vec<Arc<dyn NotificationHandler<N>>>> {
    let key = HandlerKey::notification::<N>();
    downcast_all(&key, resolver.resolve(&key))
}

/// Resolves the typed stream handlers for `R`.
pub fn resolve_stream<R: StreamRequest>(
    resolver: &dyn HandlerResolver,
) -> DispatchResult<Vec<Arc<dyn StreamHandler<R>>>> {
    let key = HandlerKey::stream::<R>();
    downcast_all(&key, resolver.resolve(&key))
}

// =============================================================================
// HandlerRegistry
// =============================================================================

/// In-memory resolver keeping handlers in registration order.
///
/// Built at startup and then shared immutably:
///
/// ```rust,ignore
/// let handlers = HandlerRegistry::new()
///     .request(CreateOrderHandler::new(store.clone()))
///     .notification(SendConfirmationEmail)
///     .notification(UpdateInventory)
///     .stream(ListOrdersHandler::new(store));
/// ```
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Vec<ErasedHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request handler.
    ///
    /// Registering a second handler for the same request type is allowed;
    /// dispatch then fails with `AmbiguousHandler`.
    pub fn request<R, H>(mut self, handler: H) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        let handler: Arc<dyn RequestHandler<R>> = Arc::new(handler);
        self.insert(HandlerKey::request::<R>(), erase_request(handler));
        self
    }

    /// Registers a notification handler.
    pub fn notification<N, H>(mut self, handler: H) -> Self
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        let handler: Arc<dyn NotificationHandler<N>> = Arc::new(handler);
        self.insert(HandlerKey::notification::<N>(), erase_notification(handler));
        self
    }

    /// Registers a stream handler.
    pub fn stream<R, H>(mut self, handler: H) -> Self
    where
        R: StreamRequest,
        H: StreamHandler<R>,
    {
        let handler: Arc<dyn StreamHandler<R>> = Arc::new(handler);
        self.insert(HandlerKey::stream::<R>(), erase_stream(handler));
        self
    }

    /// Appends an already erased handler under `key`.
    pub fn insert(&mut self, key: HandlerKey, handler: ErasedHandler) -> &mut Self {
        self.handlers.entry(key).or_default().push(handler);
        self
    }

    /// Number of handlers registered under `key`.
    pub fn count(&self, key: &HandlerKey) -> usize {
        self.handlers.get(key).map_or(0, Vec::len)
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, key: &HandlerKey) -> Vec<ErasedHandler> {
        self.handlers.get(key).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(key, list)| (key, list.len())))
            .finish()
    }
}
