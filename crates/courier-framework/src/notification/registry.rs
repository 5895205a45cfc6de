//! Runtime subscriptions to notifications.
//!
//! The registry is copy-on-write: writers clone the entry list under a short
//! write lock while publishers take a cheap snapshot and iterate it without
//! holding any lock. A publish in flight keeps delivering to the consumers
//! that were present when it started.

use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use courier_core::{
    BroadcastHandler, ErasedHandler, Notification, NotificationHandler, erase_notification,
};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

/// Handle returned by `subscribe`, usable to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A registered subscription as reported by diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    /// Subscription handle.
    pub id: SubscriptionId,
    /// Name of the subscriber.
    pub subscriber: &'static str,
    /// Notification type, or `None` for broadcast subscriptions.
    pub notification: Option<&'static str>,
}

#[derive(Clone)]
enum Consumer {
    /// Holds an `Arc<dyn NotificationHandler<N>>` for the target type.
    Typed(ErasedHandler),
    Broadcast(Arc<dyn BroadcastHandler>),
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    target: Option<TypeId>,
    notification: Option<&'static str>,
    identity: usize,
    name: &'static str,
    consumer: Consumer,
}

/// Subscriber identity is the address of its shared allocation.
fn identity_of<S: ?Sized>(subscriber: &Arc<S>) -> usize {
    Arc::as_ptr(subscriber).cast::<()>() as usize
}

/// Concurrency-safe registry of typed and broadcast subscribers.
pub struct SubscriptionRegistry {
    entries: RwLock<Arc<Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribes `subscriber` to notifications of type `N`.
    ///
    /// Subscribing the same instance twice registers two deliveries.
    pub fn subscribe<N, S>(&self, subscriber: Arc<S>) -> SubscriptionId
    where
        N: Notification,
        S: NotificationHandler<N>,
    {
        let identity = identity_of(&subscriber);
        let name = NotificationHandler::<N>::name(subscriber.as_ref());
        let typed: Arc<dyn NotificationHandler<N>> = subscriber;
        self.push(|id| Subscription {
            id,
            target: Some(TypeId::of::<N>()),
            notification: Some(type_name::<N>()),
            identity,
            name,
            consumer: Consumer::Typed(erase_notification(typed)),
        })
    }

    /// Subscribes `subscriber` to every published notification.
    pub fn subscribe_broadcast<S: BroadcastHandler>(&self, subscriber: Arc<S>) -> SubscriptionId {
        let identity = identity_of(&subscriber);
        let name = subscriber.name();
        self.push(|id| Subscription {
            id,
            target: None,
            notification: None,
            identity,
            name,
            consumer: Consumer::Broadcast(subscriber),
        })
    }

    /// Removes the earliest subscription of this instance to `N`.
    ///
    /// Returns `false` if the instance was not subscribed.
    pub fn unsubscribe<N, S>(&self, subscriber: &Arc<S>) -> bool
    where
        N: Notification,
        S: NotificationHandler<N>,
    {
        let identity = identity_of(subscriber);
        let target = Some(TypeId::of::<N>());
        self.remove_first(|entry| entry.target == target && entry.identity == identity)
    }

    /// Removes the earliest broadcast subscription of this instance.
    pub fn unsubscribe_broadcast<S: BroadcastHandler>(&self, subscriber: &Arc<S>) -> bool {
        let identity = identity_of(subscriber);
        self.remove_first(|entry| entry.target.is_none() && entry.identity == identity)
    }

    /// Removes the subscription with the given handle.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        self.remove_first(|entry| entry.id == id)
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lists subscriptions in registration order.
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        self.snapshot()
            .entries
            .iter()
            .map(|entry| SubscriptionInfo {
                id: entry.id,
                subscriber: entry.name,
                notification: entry.notification,
            })
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: Arc::clone(&self.entries.read()),
        }
    }

    fn push(&self, build: impl FnOnce(SubscriptionId) -> Subscription) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = build(id);
        debug!(
            subscription = %id,
            subscriber = subscription.name,
            notification = subscription.notification.unwrap_or("*"),
            "Subscribed"
        );
        Arc::make_mut(&mut self.entries.write()).push(subscription);
        id
    }

    fn remove_first(&self, matches: impl Fn(&Subscription) -> bool) -> bool {
        let mut entries = self.entries.write();
        let Some(position) = entries.iter().position(matches) else {
            return false;
        };
        let removed = Arc::make_mut(&mut entries).remove(position);
        debug!(subscription = %removed.id, subscriber = removed.name, "Unsubscribed");
        true
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}

/// Point-in-time view of the registry used by one publish.
#[derive(Clone)]
pub(crate) struct Snapshot {
    entries: Arc<Vec<Subscription>>,
}

impl Snapshot {
    /// Typed subscribers of `N`, in registration order.
    pub(crate) fn typed<N: Notification>(
        &self,
    ) -> impl Iterator<Item = Arc<dyn NotificationHandler<N>>> + '_ {
        let target = Some(TypeId::of::<N>());
        self.entries
            .iter()
            .filter(move |entry| entry.target == target)
            .filter_map(|entry| match &entry.consumer {
                Consumer::Typed(erased) => erased
                    .downcast_ref::<Arc<dyn NotificationHandler<N>>>()
                    .cloned(),
                Consumer::Broadcast(_) => None,
            })
    }

    /// Broadcast subscribers, in registration order.
    pub(crate) fn broadcast(&self) -> impl Iterator<Item = &Arc<dyn BroadcastHandler>> + '_ {
        self.entries.iter().filter_map(|entry| match &entry.consumer {
            Consumer::Broadcast(subscriber) => Some(subscriber),
            Consumer::Typed(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use courier_core::{AnyMessage, BoxError, CallContext, async_trait};

    use super::*;

    struct Shipped;
    struct Returned;

    impl Notification for Shipped {}
    impl Notification for Returned {}

    struct Counter;

    #[async_trait]
    impl NotificationHandler<Shipped> for Counter {
        async fn handle(&self, _: &Shipped, _: &CallContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[async_trait]
    impl NotificationHandler<Returned> for Counter {
        async fn handle(&self, _: &Returned, _: &CallContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[async_trait]
    impl BroadcastHandler for Counter {
        async fn handle(&self, _: &AnyMessage, _: &CallContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[test]
    fn test_unsubscribe_removes_one_entry_per_call() {
        let registry = SubscriptionRegistry::new();
        let counter = Arc::new(Counter);

        registry.subscribe::<Shipped, _>(Arc::clone(&counter));
        registry.subscribe::<Shipped, _>(Arc::clone(&counter));
        assert_eq!(registry.snapshot().typed::<Shipped>().count(), 2);

        assert!(registry.unsubscribe::<Shipped, _>(&counter));
        assert_eq!(registry.snapshot().typed::<Shipped>().count(), 1);
        assert!(registry.unsubscribe::<Shipped, _>(&counter));
        assert!(!registry.unsubscribe::<Shipped, _>(&counter));
    }

    #[test]
    fn test_identity_distinguishes_instances_and_types() {
        let registry = SubscriptionRegistry::new();
        let first = Arc::new(Counter);
        let second = Arc::new(Counter);

        registry.subscribe::<Shipped, _>(Arc::clone(&first));
        registry.subscribe::<Returned, _>(Arc::clone(&first));
        registry.subscribe_broadcast(Arc::clone(&first));

        assert!(!registry.unsubscribe::<Shipped, _>(&second));
        assert!(registry.unsubscribe::<Shipped, _>(&first));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.typed::<Shipped>().count(), 0);
        assert_eq!(snapshot.typed::<Returned>().count(), 1);
        assert_eq!(snapshot.broadcast().count(), 1);
    }

    #[test]
    fn test_unsubscribe_broadcast_leaves_typed_entries() {
        let registry = SubscriptionRegistry::new();
        let counter = Arc::new(Counter);

        registry.subscribe_broadcast(Arc::clone(&counter));
        registry.subscribe_broadcast(Arc::clone(&counter));
        registry.subscribe::<Shipped, _>(Arc::clone(&counter));

        assert!(registry.unsubscribe_broadcast(&counter));
        assert_eq!(registry.snapshot().broadcast().count(), 1);

        assert!(registry.unsubscribe_broadcast(&counter));
        assert!(!registry.unsubscribe_broadcast(&counter));
        assert_eq!(registry.snapshot().typed::<Shipped>().count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshots_are_isolated_from_later_changes() {
        let registry = SubscriptionRegistry::new();
        let counter = Arc::new(Counter);
        let id = registry.subscribe::<Shipped, _>(Arc::clone(&counter));

        let before = registry.snapshot();
        assert!(registry.remove(id));

        assert_eq!(before.typed::<Shipped>().count(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_reports_registration_order() {
        let registry = SubscriptionRegistry::new();
        let counter = Arc::new(Counter);
        let typed = registry.subscribe::<Shipped, _>(Arc::clone(&counter));
        let broadcast = registry.subscribe_broadcast(counter);

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, typed);
        assert!(listed[0].notification.is_some_and(|name| name.ends_with("Shipped")));
        assert_eq!(listed[1].id, broadcast);
        assert_eq!(listed[1].notification, None);
    }

    #[test]
    fn test_concurrent_subscribe_and_unsubscribe() {
        let registry = SubscriptionRegistry::new();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let counter = Arc::new(Counter);
                        registry.subscribe::<Shipped, _>(Arc::clone(&counter));
                        let _ = registry.snapshot().typed::<Shipped>().count();
                        assert!(registry.unsubscribe::<Shipped, _>(&counter));
                    }
                });
            }
        });

        assert!(registry.is_empty());
    }
}
