//! Middleware contracts and chain cursors.
//!
//! A pipeline is an index-driven array of stages ending in a terminal
//! handler. Instead of allocating a closure per stage per call, each stage
//! receives a small cursor (`Next`, `NotificationNext`, `StreamNext`) that
//! points at the position of the following stage. Calling `run` on the
//! cursor continues the chain; not calling it short-circuits.
//!
//! ```text
//!  send ──▶ stage 0 ──▶ stage 1 ──▶ ... ──▶ terminal handler
//!  reply ◀── post 0 ◀── post 1 ◀── ... ◀──┘
//! ```
//!
//! Middleware are written against a capability type `C` and only see the
//! message through that view. Because they cannot name the concrete response
//! type, request middleware pass results around as a [`Reply`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::DispatchResult;
use crate::foundation::context::CallContext;
use crate::foundation::reply::Reply;

/// Stream of type-erased items flowing through a stream pipeline.
pub type ItemStream = BoxStream<'static, DispatchResult<Reply>>;

/// Type-erased middleware slot, downcast by a capability binder.
pub type ErasedSlot = Arc<dyn Any + Send + Sync>;

// =============================================================================
// Chains and cursors
// =============================================================================

/// A request chain positioned by index.
pub trait Chain: Send + Sync {
    /// Runs the chain starting at stage `index`.
    fn run_from(&self, index: usize) -> BoxFuture<'_, DispatchResult<Reply>>;
}

/// Continuation handed to request middleware.
///
/// `Next` is `Copy`, so a middleware may run the rest of the chain more than
/// once (retries) or not at all (short-circuit).
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a dyn Chain,
    index: usize,
}

impl<'a> Next<'a> {
    /// Creates a cursor pointing at stage `index` of `chain`.
    pub fn new(chain: &'a dyn Chain, index: usize) -> Self {
        Self { chain, index }
    }

    /// Runs the remainder of the chain.
    pub fn run(self) -> BoxFuture<'a, DispatchResult<Reply>> {
        self.chain.run_from(self.index)
    }

    /// Index of the stage this cursor continues with.
    pub fn position(&self) -> usize {
        self.index
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// A notification chain positioned by index.
pub trait NotificationChain: Send + Sync {
    /// Runs the chain starting at stage `index`.
    fn run_from(&self, index: usize) -> BoxFuture<'_, DispatchResult<()>>;
}

/// Continuation handed to notification middleware.
#[derive(Clone, Copy)]
pub struct NotificationNext<'a> {
    chain: &'a dyn NotificationChain,
    index: usize,
}

impl<'a> NotificationNext<'a> {
    /// Creates a cursor pointing at stage `index` of `chain`.
    pub fn new(chain: &'a dyn NotificationChain, index: usize) -> Self {
        Self { chain, index }
    }

    /// Runs the remaining stages and then the fan-out.
    pub fn run(self) -> BoxFuture<'a, DispatchResult<()>> {
        self.chain.run_from(self.index)
    }

    /// Index of the stage this cursor continues with.
    pub fn position(&self) -> usize {
        self.index
    }
}

impl fmt::Debug for NotificationNext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationNext")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// A stream chain that owns its request, so the streams it produces are
/// `'static` and can outlive the call that created them.
pub trait StreamChain: Send + Sync {
    /// Builds the item stream starting at stage `index`.
    fn run_from(self: Arc<Self>, index: usize) -> ItemStream;
}

/// Continuation handed to stream middleware.
#[derive(Clone)]
pub struct StreamNext {
    chain: Arc<dyn StreamChain>,
    index: usize,
}

impl StreamNext {
    /// Creates a cursor pointing at stage `index` of `chain`.
    pub fn new(chain: Arc<dyn StreamChain>, index: usize) -> Self {
        Self { chain, index }
    }

    /// Builds the inner item stream.
    pub fn run(self) -> ItemStream {
        self.chain.run_from(self.index)
    }

    /// Index of the stage this cursor continues with.
    pub fn position(&self) -> usize {
        self.index
    }
}

impl fmt::Debug for StreamNext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamNext")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Middleware traits
// =============================================================================

/// Request middleware constrained to capability `C`.
///
/// # Example
///
/// ```rust,ignore
/// struct Stopwatch;
///
/// #[async_trait]
/// impl Middleware<AnyMessage> for Stopwatch {
///     async fn handle(&self, request: &AnyMessage, ctx: &CallContext, next: Next<'_>) -> DispatchResult<Reply> {
///         let started = Instant::now();
///         let reply = next.run().await;
///         debug!(message = request.message_name(), elapsed = ?started.elapsed());
///         reply
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware<C: ?Sized + Sync>: Send + Sync + 'static {
    /// Processes the request and usually continues with `next`.
    async fn handle(&self, request: &C, ctx: &CallContext, next: Next<'_>)
    -> DispatchResult<Reply>;
}

/// Notification middleware constrained to capability `C`.
///
/// The terminal stage of the notification chain is the whole fan-out, so
/// code after `next.run().await` observes every consumer's completion.
#[async_trait]
pub trait NotificationMiddleware<C: ?Sized + Sync>: Send + Sync + 'static {
    /// Processes the notification and usually continues with `next`.
    async fn handle(
        &self,
        notification: &C,
        ctx: &CallContext,
        next: NotificationNext<'_>,
    ) -> DispatchResult<()>;
}

/// Stream middleware constrained to capability `C`.
///
/// `handle` runs when the stream is first polled. It performs setup, calls
/// `next.run()` to obtain the inner stream, and returns a stream that may
/// transform, count or filter items. Teardown is usually attached with a
/// drop-aware wrapper so it also runs when the caller abandons the stream.
pub trait StreamMiddleware<C: ?Sized + Sync>: Send + Sync + 'static {
    /// Wraps the inner stream.
    fn handle(&self, request: &C, ctx: &CallContext, next: StreamNext) -> ItemStream;
}

// =============================================================================
// Slots
// =============================================================================

macro_rules! define_slot {
    ($(#[$meta:meta])* $name:ident, $middleware:ident) => {
        $(#[$meta])*
        pub struct $name<C: ?Sized + Sync + 'static> {
            pub(crate) middleware: Arc<dyn $middleware<C>>,
            predicate: Option<Arc<dyn Fn(&C) -> bool + Send + Sync>>,
        }

        impl<C: ?Sized + Sync + 'static> $name<C> {
            /// Creates a slot with an optional per-call predicate.
            pub fn new(
                middleware: Arc<dyn $middleware<C>>,
                predicate: Option<Arc<dyn Fn(&C) -> bool + Send + Sync>>,
            ) -> Self {
                Self { middleware, predicate }
            }

            /// Evaluates the predicate; unconditional slots always apply.
            pub fn applies(&self, view: &C) -> bool {
                self.predicate.as_ref().is_none_or(|predicate| predicate(view))
            }

            /// Returns `true` if the slot carries a predicate.
            pub fn is_conditional(&self) -> bool {
                self.predicate.is_some()
            }
        }
    };
}

define_slot!(
    /// A request middleware instance together with its predicate.
    RequestSlot,
    Middleware
);
define_slot!(
    /// A notification middleware instance together with its predicate.
    NotificationSlot,
    NotificationMiddleware
);
define_slot!(
    /// A stream middleware instance together with its predicate.
    StreamSlot,
    StreamMiddleware
);

// =============================================================================
// Stages bound to a concrete message type
// =============================================================================

/// A request middleware bound to message type `M`.
pub trait RequestStage<M>: Send + Sync {
    /// Evaluates the stage's predicate against the request.
    fn applies(&self, request: &M) -> bool;

    /// Invokes the middleware.
    fn invoke<'a>(
        &'a self,
        request: &'a M,
        ctx: &'a CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResult<Reply>>;
}

/// A stream middleware bound to message type `M`.
pub trait StreamStage<M>: Send + Sync {
    /// Evaluates the stage's predicate against the request.
    fn applies(&self, request: &M) -> bool;

    /// Invokes the middleware.
    fn invoke(&self, request: &M, ctx: &CallContext, next: StreamNext) -> ItemStream;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::message::AnyMessage;
    use futures::FutureExt;
    use tokio_util::sync::CancellationToken;

    struct Terminal;

    impl Chain for Terminal {
        fn run_from(&self, index: usize) -> BoxFuture<'_, DispatchResult<Reply>> {
            async move { Ok(Reply::new(index)) }.boxed()
        }
    }

    struct AddOne;

    #[async_trait]
    impl Middleware<AnyMessage> for AddOne {
        async fn handle(
            &self,
            _request: &AnyMessage,
            _ctx: &CallContext,
            next: Next<'_>,
        ) -> DispatchResult<Reply> {
            let reply = next.run().await?;
            let value = reply.downcast::<usize>().unwrap_or_default();
            Ok(Reply::new(value + 1))
        }
    }

    #[test]
    fn test_next_is_reusable() {
        let chain = Terminal;
        let next = Next::new(&chain, 3);
        let first = tokio_test::block_on(next.run());
        let second = tokio_test::block_on(next.run());
        assert_eq!(first.ok().and_then(|r| r.downcast::<usize>().ok()), Some(3));
        assert_eq!(second.ok().and_then(|r| r.downcast::<usize>().ok()), Some(3));
        assert_eq!(next.position(), 3);
    }

    #[test]
    fn test_slot_predicate_gates_application() {
        let slot: RequestSlot<AnyMessage> = RequestSlot::new(
            Arc::new(AddOne),
            Some(Arc::new(|message: &AnyMessage| message.is::<u8>())),
        );
        assert!(slot.is_conditional());
        assert!(slot.applies(&1u8));
        assert!(!slot.applies(&"text"));

        let unconditional: RequestSlot<AnyMessage> = RequestSlot::new(Arc::new(AddOne), None);
        assert!(unconditional.applies(&"text"));
    }

    #[tokio::test]
    async fn test_middleware_wraps_next() {
        let chain = Terminal;
        let ctx = CallContext::new("u8", CancellationToken::new());
        let reply = Middleware::<AnyMessage>::handle(&AddOne, &7u8, &ctx, Next::new(&chain, 1)).await;
        assert_eq!(reply.ok().and_then(|r| r.downcast::<usize>().ok()), Some(2));
    }
}
