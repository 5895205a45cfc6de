//! Notification publishing: subscriptions, middleware and fan-out.

pub(crate) mod pipeline;
pub mod publisher;
pub mod registry;

pub use publisher::{FailurePolicy, PublishOptions, PublishStrategy};
pub use registry::{SubscriptionId, SubscriptionInfo, SubscriptionRegistry};
