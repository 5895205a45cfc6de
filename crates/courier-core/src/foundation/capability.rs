//! Capability tables.
//!
//! A capability is a view a message type explicitly declares: itself,
//! [`AnyMessage`], or a trait object such as `dyn Validate`. Middleware are
//! written against one capability type `C`, and apply only to messages whose
//! table contains `C`.
//!
//! Membership is a `TypeId` hash lookup. Each entry also keeps the caster
//! (`fn(&M) -> &C`) needed to hand the message to middleware through that
//! view, and knows how to bind type-erased middleware slots to the concrete
//! message type. This is where the request pipeline builder answers "does
//! this middleware's constraint match this type" exactly once per type.
//!
//! # Example
//!
//! ```rust,ignore
//! pub trait Validate: Send + Sync {
//!     fn validate(&self) -> Result<(), ValidationError>;
//! }
//!
//! impl Request for CreateOrder {
//!     type Response = OrderId;
//!
//!     fn capabilities() -> Capabilities<Self> {
//!         Capabilities::new().with::<dyn Validate>(|order| order)
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::DispatchResult;
use crate::foundation::context::CallContext;
use crate::foundation::message::{AnyMessage, Message};
use crate::foundation::reply::Reply;
use crate::framework::middleware::{
    ErasedSlot, ItemStream, Next, NotificationNext, NotificationSlot, RequestSlot, RequestStage,
    StreamNext, StreamSlot, StreamStage,
};

// =============================================================================
// CapabilityId
// =============================================================================

/// Identity of a capability type, compared by `TypeId`.
#[derive(Clone, Copy)]
pub struct CapabilityId {
    id: TypeId,
    name: &'static str,
}

impl CapabilityId {
    /// Returns the identity of capability type `C`.
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    /// Returns the `TypeId` of the capability type.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns the capability's type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for CapabilityId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CapabilityId {}

impl Hash for CapabilityId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// CapabilityBinder
// =============================================================================

/// Connects type-erased middleware slots to message type `M`.
///
/// Implemented by the caster stored for each declared capability, the only
/// place where both the message type and the capability type are known.
pub trait CapabilityBinder<M>: Send + Sync {
    /// The capability this binder views `M` as.
    fn capability(&self) -> CapabilityId;

    /// Binds a request middleware slot into a stage for `M`.
    ///
    /// Returns `None` if the slot was not built for this capability.
    fn bind_request(&self, slot: &ErasedSlot) -> Option<Arc<dyn RequestStage<M>>>;

    /// Binds a stream middleware slot into a stage for `M`.
    fn bind_stream(&self, slot: &ErasedSlot) -> Option<Arc<dyn StreamStage<M>>>;

    /// Runs a notification middleware slot against `notification`.
    ///
    /// Returns `None` when the slot does not belong to this capability or its
    /// predicate declines the notification; the caller then forwards the
    /// notification unmodified.
    fn invoke_notification<'a>(
        &self,
        slot: &'a (dyn Any + Send + Sync),
        notification: &'a M,
        ctx: &'a CallContext,
        next: NotificationNext<'a>,
    ) -> Option<BoxFuture<'a, DispatchResult<()>>>;

    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;
}

struct Caster<M, C: ?Sized> {
    cast: fn(&M) -> &C,
    id: CapabilityId,
}

impl<M, C> CapabilityBinder<M> for Caster<M, C>
where
    M: Send + Sync + 'static,
    C: ?Sized + Sync + 'static,
{
    fn capability(&self) -> CapabilityId {
        self.id
    }

    fn bind_request(&self, slot: &ErasedSlot) -> Option<Arc<dyn RequestStage<M>>> {
        let slot = Arc::clone(slot).downcast::<RequestSlot<C>>().ok()?;
        Some(Arc::new(BoundRequestStage {
            cast: self.cast,
            slot,
        }))
    }

    fn bind_stream(&self, slot: &ErasedSlot) -> Option<Arc<dyn StreamStage<M>>> {
        let slot = Arc::clone(slot).downcast::<StreamSlot<C>>().ok()?;
        Some(Arc::new(BoundStreamStage {
            cast: self.cast,
            slot,
        }))
    }

    fn invoke_notification<'a>(
        &self,
        slot: &'a (dyn Any + Send + Sync),
        notification: &'a M,
        ctx: &'a CallContext,
        next: NotificationNext<'a>,
    ) -> Option<BoxFuture<'a, DispatchResult<()>>> {
        let slot = slot.downcast_ref::<NotificationSlot<C>>()?;
        let view = (self.cast)(notification);
        if !slot.applies(view) {
            return None;
        }
        Some(slot.middleware.handle(view, ctx, next))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ─── Bound stages ────────────────────────────────────────────────────────────

struct BoundRequestStage<M, C: ?Sized + Sync + 'static> {
    cast: fn(&M) -> &C,
    slot: Arc<RequestSlot<C>>,
}

impl<M, C> RequestStage<M> for BoundRequestStage<M, C>
where
    M: Send + Sync + 'static,
    C: ?Sized + Sync + 'static,
{
    fn applies(&self, request: &M) -> bool {
        self.slot.applies((self.cast)(request))
    }

    fn invoke<'a>(
        &'a self,
        request: &'a M,
        ctx: &'a CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, DispatchResult<Reply>> {
        self.slot.middleware.handle((self.cast)(request), ctx, next)
    }
}

struct BoundStreamStage<M, C: ?Sized + Sync + 'static> {
    cast: fn(&M) -> &C,
    slot: Arc<StreamSlot<C>>,
}

impl<M, C> StreamStage<M> for BoundStreamStage<M, C>
where
    M: Send + Sync + 'static,
    C: ?Sized + Sync + 'static,
{
    fn applies(&self, request: &M) -> bool {
        self.slot.applies((self.cast)(request))
    }

    fn invoke(&self, request: &M, ctx: &CallContext, next: StreamNext) -> ItemStream {
        self.slot.middleware.handle((self.cast)(request), ctx, next)
    }
}

// =============================================================================
// Capabilities
// =============================================================================

fn as_any_message<M: Message>(message: &M) -> &AnyMessage {
    message
}

fn as_itself<M>(message: &M) -> &M {
    message
}

/// The declared capability table of message type `M`.
///
/// Every table starts with [`AnyMessage`] and `M` itself.
pub struct Capabilities<M> {
    binders: HashMap<TypeId, Arc<dyn CapabilityBinder<M>>>,
    declared: Vec<CapabilityId>,
}

impl<M: Message> Capabilities<M> {
    /// Creates a table holding the two implicit capabilities.
    pub fn new() -> Self {
        Self {
            binders: HashMap::new(),
            declared: Vec::new(),
        }
        .with::<AnyMessage>(as_any_message::<M>)
        .with::<M>(as_itself::<M>)
    }

    /// Declares that `M` can be viewed as `C`.
    ///
    /// For trait objects the caster is usually the identity closure
    /// `|message| message`, which coerces `&M` into `&dyn Trait`.
    pub fn with<C: ?Sized + Sync + 'static>(mut self, cast: fn(&M) -> &C) -> Self {
        let id = CapabilityId::of::<C>();
        if self
            .binders
            .insert(id.type_id(), Arc::new(Caster { cast, id }))
            .is_none()
        {
            self.declared.push(id);
        }
        self
    }

    /// Returns `true` if `C` is a declared capability.
    pub fn contains<C: ?Sized + 'static>(&self) -> bool {
        self.binders.contains_key(&TypeId::of::<C>())
    }

    /// Returns `true` if the capability is declared.
    pub fn supports(&self, capability: CapabilityId) -> bool {
        self.binders.contains_key(&capability.type_id())
    }

    /// Returns the binder for a capability, if declared.
    pub fn binder(&self, capability: CapabilityId) -> Option<&dyn CapabilityBinder<M>> {
        self.binders
            .get(&capability.type_id())
            .map(|binder| binder.as_ref())
    }

    /// Views `message` through capability `C`.
    pub fn view<'m, C: ?Sized + Sync + 'static>(&self, message: &'m M) -> Option<&'m C> {
        let binder = self.binders.get(&TypeId::of::<C>())?;
        // `Message::as_any` would also match the `Arc` itself.
        let caster = CapabilityBinder::as_any(binder.as_ref()).downcast_ref::<Caster<M, C>>()?;
        Some((caster.cast)(message))
    }

    /// Iterates over capabilities in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = CapabilityId> + '_ {
        self.declared.iter().copied()
    }

    /// Returns the number of declared capabilities, implicit ones included.
    pub fn len(&self) -> usize {
        self.declared.len()
    }

    /// Always `false`: every table holds the implicit capabilities.
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

impl<M: Message> Default for Capabilities<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for Capabilities<M> {
    fn clone(&self) -> Self {
        Self {
            binders: self.binders.clone(),
            declared: self.declared.clone(),
        }
    }
}

impl<M> fmt::Debug for Capabilities<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.declared.iter()).finish()
    }
}
