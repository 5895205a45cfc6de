//! Middleware descriptors and configuration overrides.
//!
//! A descriptor is what a user hands to the builder: the middleware (or a
//! way to construct it from configuration), its capability constraint, an
//! order, an optional predicate and static configuration. At build time each
//! descriptor is frozen into an erased slot with overrides applied.

use std::any::type_name;
use std::collections::BTreeMap;
use std::sync::Arc;

use courier_core::{
    BoxError, CapabilityId, ErasedSlot, Middleware, NotificationMiddleware, NotificationSlot,
    RequestSlot, StreamMiddleware, StreamSlot,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::diagnostics::MiddlewareKind;

/// Per-name adjustments applied when the mediator is built.
///
/// Loaded from the `pipeline.middleware.<name>` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiddlewareOverride {
    /// Replaces the registered order.
    pub order: Option<i32>,
    /// Enables or disables the middleware.
    pub enabled: Option<bool>,
    /// Merged over the registered configuration, key by key.
    pub config: Option<Value>,
}

impl MiddlewareOverride {
    /// An override that only disables the middleware.
    pub fn disabled() -> Self {
        Self {
            enabled: Some(false),
            ..Self::default()
        }
    }

    /// An override that only moves the middleware.
    pub fn reorder(order: i32) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }
}

/// Shallow-merges `patch` into `base`. Non-object values replace.
pub(crate) fn merge_config(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

type SlotFactory = Arc<dyn Fn(&Value) -> Result<ErasedSlot, BoxError> + Send + Sync>;

/// A descriptor with its middleware and capability types erased.
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) kind: MiddlewareKind,
    pub(crate) name: String,
    pub(crate) order: i32,
    pub(crate) config: Value,
    pub(crate) capability: CapabilityId,
    pub(crate) conditional: bool,
    pub(crate) factory: SlotFactory,
}

macro_rules! define_descriptor {
    (
        $(#[$meta:meta])*
        $name:ident, $middleware:ident, $slot:ident, $kind:expr
    ) => {
        $(#[$meta])*
        pub struct $name<C: ?Sized + Sync + 'static> {
            name: String,
            order: i32,
            config: Value,
            factory: Arc<dyn Fn(&Value) -> Result<Arc<dyn $middleware<C>>, BoxError> + Send + Sync>,
            predicate: Option<Arc<dyn Fn(&C) -> bool + Send + Sync>>,
        }

        impl<C: ?Sized + Sync + 'static> $name<C> {
            /// Wraps an existing instance. Configuration is recorded for
            /// diagnostics but not used to construct the instance.
            pub fn new<M: $middleware<C>>(middleware: M) -> Self {
                let middleware: Arc<dyn $middleware<C>> = Arc::new(middleware);
                Self::from_factory(short_type_name::<M>(), move |_| Ok(Arc::clone(&middleware)))
            }

            /// Constructs the middleware at build time by deserializing its
            /// effective configuration.
            pub fn configured<M>() -> Self
            where
                M: $middleware<C> + DeserializeOwned,
            {
                Self::from_factory(short_type_name::<M>(), |config| {
                    let middleware: M = serde_json::from_value(config.clone())?;
                    Ok(Arc::new(middleware) as Arc<dyn $middleware<C>>)
                })
            }

            fn from_factory<F>(name: &str, factory: F) -> Self
            where
                F: Fn(&Value) -> Result<Arc<dyn $middleware<C>>, BoxError> + Send + Sync + 'static,
            {
                Self {
                    name: name.to_string(),
                    order: 0,
                    config: Value::Object(Map::new()),
                    factory: Arc::new(factory),
                    predicate: None,
                }
            }

            /// Sets the order. Lower values run first (outermost).
            pub fn order(mut self, order: i32) -> Self {
                self.order = order;
                self
            }

            /// Overrides the name used for configuration and diagnostics.
            pub fn named(mut self, name: impl Into<String>) -> Self {
                self.name = name.into();
                self
            }

            /// Sets the static configuration.
            pub fn config(mut self, config: Value) -> Self {
                self.config = config;
                self
            }

            /// Makes participation conditional on a predicate evaluated per
            /// call against the capability view of the message.
            pub fn when<F>(mut self, predicate: F) -> Self
            where
                F: Fn(&C) -> bool + Send + Sync + 'static,
            {
                self.predicate = Some(Arc::new(predicate));
                self
            }

            /// The configured name.
            pub fn name(&self) -> &str {
                &self.name
            }

            pub(crate) fn into_registration(self) -> Registration {
                let Self {
                    name,
                    order,
                    config,
                    factory,
                    predicate,
                } = self;
                let conditional = predicate.is_some();
                Registration {
                    kind: $kind,
                    name,
                    order,
                    config,
                    capability: CapabilityId::of::<C>(),
                    conditional,
                    factory: Arc::new(move |config: &Value| -> Result<ErasedSlot, BoxError> {
                        let middleware = factory(config)?;
                        Ok(Arc::new($slot::new(middleware, predicate.clone())) as ErasedSlot)
                    }),
                }
            }
        }

        impl<C: ?Sized + Sync + 'static> Clone for $name<C> {
            fn clone(&self) -> Self {
                Self {
                    name: self.name.clone(),
                    order: self.order,
                    config: self.config.clone(),
                    factory: Arc::clone(&self.factory),
                    predicate: self.predicate.clone(),
                }
            }
        }

        impl<C: ?Sized + Sync + 'static> std::fmt::Debug for $name<C> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("name", &self.name)
                    .field("capability", &type_name::<C>())
                    .field("order", &self.order)
                    .field("conditional", &self.predicate.is_some())
                    .field("config", &self.config)
                    .finish()
            }
        }
    };
}

define_descriptor!(
    /// Describes a request middleware constrained to capability `C`.
    ///
    /// ```ignore
    /// MiddlewareDescriptor::<dyn Validate>::new(ValidationMiddleware).order(100)
    /// ```
    MiddlewareDescriptor,
    Middleware,
    RequestSlot,
    MiddlewareKind::Request
);

define_descriptor!(
    /// Describes a notification middleware constrained to capability `C`.
    NotificationMiddlewareDescriptor,
    NotificationMiddleware,
    NotificationSlot,
    MiddlewareKind::Notification
);

define_descriptor!(
    /// Describes a stream middleware constrained to capability `C`.
    StreamMiddlewareDescriptor,
    StreamMiddleware,
    StreamSlot,
    MiddlewareKind::Stream
);

/// Overrides keyed by middleware name.
pub type MiddlewareOverrides = BTreeMap<String, MiddlewareOverride>;
