//! Middleware registration, ordering, filtering and caching.

pub(crate) mod builder;
pub(crate) mod cache;
pub mod descriptor;
pub mod diagnostics;

pub use descriptor::{
    MiddlewareDescriptor, MiddlewareOverride, MiddlewareOverrides,
    NotificationMiddlewareDescriptor, StreamMiddlewareDescriptor,
};
pub use diagnostics::{Excluded, Exclusion, MiddlewareInfo, MiddlewareKind, PipelineReport};
