//! Notification middleware pipeline.
//!
//! Unlike request pipelines, notification stages are not filtered per type
//! when the pipeline is built. Each stage checks, per publish, whether the
//! notification declares its capability. If the capability is absent or the
//! stage's predicate declines, the notification is forwarded unmodified to
//! the next stage.

use std::any::type_name;
use std::sync::Arc;

use courier_core::{
    BoxFuture, CallContext, Capabilities, CapabilityId, DispatchResult, ErasedSlot, Notification,
    NotificationChain, NotificationNext,
};
use tracing::trace;

use super::publisher::FanOut;
use crate::pipeline::builder::FrozenMiddleware;
use crate::pipeline::cache::{PipelineCache, PipelineKey};
use crate::pipeline::{Excluded, Exclusion, MiddlewareInfo, PipelineReport};

struct NotificationStage {
    info: MiddlewareInfo,
    capability: CapabilityId,
    slot: ErasedSlot,
}

/// Ordered notification middleware shared by every notification type.
pub(crate) struct NotificationPipeline {
    stages: Vec<NotificationStage>,
    disabled: Vec<MiddlewareInfo>,
    capabilities: PipelineCache,
}

impl NotificationPipeline {
    pub(crate) fn new(frozen: Vec<FrozenMiddleware>) -> Self {
        let mut stages = Vec::new();
        let mut disabled = Vec::new();

        for entry in frozen {
            match entry.slot {
                Some(slot) => stages.push(NotificationStage {
                    info: entry.info,
                    capability: entry.capability,
                    slot,
                }),
                None => disabled.push(entry.info),
            }
        }
        stages.sort_by_key(|stage| (stage.info.order, stage.info.registration));

        Self {
            stages,
            disabled,
            capabilities: PipelineCache::default(),
        }
    }

    fn capabilities<N: Notification>(&self) -> Arc<Capabilities<N>> {
        self.capabilities
            .get_or_build(PipelineKey::of::<N, ()>(), N::capabilities)
    }

    /// Runs `notification` through every stage and then `fan_out`.
    pub(crate) async fn run<N: Notification>(
        &self,
        notification: &N,
        ctx: &CallContext,
        fan_out: &FanOut<N>,
    ) -> DispatchResult<()> {
        let capabilities = self.capabilities::<N>();
        let invocation = NotificationInvocation {
            stages: &self.stages,
            capabilities: &capabilities,
            notification,
            ctx,
            fan_out,
        };
        invocation.run_from(0).await
    }

    /// Every enabled stage in execution order.
    pub(crate) fn report(&self) -> PipelineReport {
        PipelineReport {
            message: "*",
            output: "()",
            stages: self.stages.iter().map(|stage| stage.info.clone()).collect(),
            excluded: self.disabled_entries(),
        }
    }

    /// The stages that would act on `N`. Stages whose capability `N` does
    /// not declare are reported as forwarded.
    pub(crate) fn report_for<N: Notification>(&self) -> PipelineReport {
        let capabilities = self.capabilities::<N>();
        let mut stages = Vec::new();
        let mut excluded = self.disabled_entries();

        for stage in &self.stages {
            if capabilities.supports(stage.capability) {
                stages.push(stage.info.clone());
            } else {
                excluded.push(Excluded {
                    middleware: stage.info.clone(),
                    reason: Exclusion::ConstraintMismatch {
                        capability: stage.capability.name(),
                    },
                });
            }
        }

        PipelineReport {
            message: type_name::<N>(),
            output: "()",
            stages,
            excluded,
        }
    }

    /// Every registration, enabled or not, in registration order.
    pub(crate) fn registrations(&self) -> Vec<MiddlewareInfo> {
        let mut all: Vec<_> = self
            .stages
            .iter()
            .map(|stage| stage.info.clone())
            .chain(self.disabled.iter().cloned())
            .collect();
        all.sort_by_key(|info| info.registration);
        all
    }

    fn disabled_entries(&self) -> Vec<Excluded> {
        self.disabled
            .iter()
            .map(|info| Excluded {
                middleware: info.clone(),
                reason: Exclusion::Disabled,
            })
            .collect()
    }
}

struct NotificationInvocation<'a, N: Notification> {
    stages: &'a [NotificationStage],
    capabilities: &'a Capabilities<N>,
    notification: &'a N,
    ctx: &'a CallContext,
    fan_out: &'a FanOut<N>,
}

impl<N: Notification> NotificationChain for NotificationInvocation<'_, N> {
    fn run_from(&self, index: usize) -> BoxFuture<'_, DispatchResult<()>> {
        Box::pin(async move {
            self.ctx.check_cancelled()?;

            let Some(stage) = self.stages.get(index) else {
                return self.fan_out.deliver(self.notification, self.ctx).await;
            };

            let next = NotificationNext::new(self, index + 1);
            let invoked = self.capabilities.binder(stage.capability).and_then(|binder| {
                binder.invoke_notification(&*stage.slot, self.notification, self.ctx, next)
            });

            match invoked {
                Some(running) => running.await,
                None => {
                    trace!(
                        middleware = %stage.info.name,
                        "Forwarding notification past middleware"
                    );
                    self.run_from(index + 1).await
                }
            }
        })
    }
}
