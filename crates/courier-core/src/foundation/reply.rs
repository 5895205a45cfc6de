//! Type-erased responses.

use std::any::Any;
use std::fmt;

/// A response travelling back through a request pipeline.
///
/// Middleware constrained to a capability cannot name the concrete response
/// type, so the chain carries it as a `Reply`. The dispatcher downcasts the
/// final reply to the request's declared response type.
pub struct Reply {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Reply {
    /// Wraps a response value.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the reply holds a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrows the value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Mutably borrows the value as `T`.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }

    /// Takes the value out as `T`, handing the reply back on mismatch.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| Self { value, type_name })
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}
