//! Freezing registrations and resolving per-type chains.

use std::sync::Arc;

use courier_core::{CapabilityBinder, CapabilityId, Capabilities, ErasedSlot, Message};
use tracing::{debug, trace};

use super::descriptor::{MiddlewareOverrides, Registration, merge_config};
use super::diagnostics::{Excluded, Exclusion, MiddlewareInfo, PipelineReport};
use crate::error::{BuildError, BuildResult};

/// A registration with overrides applied and, if enabled, its slot built.
#[derive(Clone)]
pub(crate) struct FrozenMiddleware {
    pub(crate) info: MiddlewareInfo,
    pub(crate) capability: CapabilityId,
    pub(crate) slot: Option<ErasedSlot>,
}

/// Applies overrides and materializes the slots of one pipeline kind.
///
/// Registration indices are positions in `registrations`.
pub(crate) fn freeze(
    registrations: Vec<Registration>,
    overrides: &MiddlewareOverrides,
) -> BuildResult<Vec<FrozenMiddleware>> {
    registrations
        .into_iter()
        .enumerate()
        .map(|(index, registration)| {
            let mut info = MiddlewareInfo {
                name: registration.name.clone(),
                kind: registration.kind,
                capability: registration.capability.name(),
                order: registration.order,
                registration: index,
                conditional: registration.conditional,
                enabled: true,
                config: registration.config.clone(),
            };

            if let Some(adjust) = overrides.get(&registration.name) {
                if let Some(order) = adjust.order {
                    info.order = order;
                }
                if let Some(enabled) = adjust.enabled {
                    info.enabled = enabled;
                }
                if let Some(patch) = &adjust.config {
                    merge_config(&mut info.config, patch);
                }
                debug!(
                    middleware = %info.name,
                    order = info.order,
                    enabled = info.enabled,
                    "Applied middleware override"
                );
            }

            let slot = if info.enabled {
                let slot = (registration.factory)(&info.config).map_err(|source| {
                    BuildError::InvalidMiddlewareConfig {
                        name: info.name.clone(),
                        source,
                    }
                })?;
                Some(slot)
            } else {
                None
            };

            Ok(FrozenMiddleware {
                info,
                capability: registration.capability,
                slot,
            })
        })
        .collect()
}

/// Sorts by `(order, registration)`.
pub(crate) fn sort_stages<T>(entries: &mut [(&FrozenMiddleware, T)]) {
    entries.sort_by_key(|(entry, _)| (entry.info.order, entry.info.registration));
}

/// A chain resolved for one message type.
pub(crate) struct Resolved<S: ?Sized> {
    pub(crate) stages: Vec<Arc<S>>,
    pub(crate) report: PipelineReport,
}

/// Filters `frozen` by the capabilities of `M`, orders the survivors and
/// binds them into stages.
pub(crate) fn resolve_chain<M, S, B>(
    frozen: &[FrozenMiddleware],
    capabilities: &Capabilities<M>,
    output: &'static str,
    bind: B,
) -> Resolved<S>
where
    M: Message,
    S: ?Sized,
    B: Fn(&dyn CapabilityBinder<M>, &ErasedSlot) -> Option<Arc<S>>,
{
    let message = std::any::type_name::<M>();
    let mut included = Vec::new();
    let mut excluded = Vec::new();

    for entry in frozen {
        let Some(slot) = &entry.slot else {
            excluded.push(Excluded {
                middleware: entry.info.clone(),
                reason: Exclusion::Disabled,
            });
            continue;
        };

        match capabilities
            .binder(entry.capability)
            .and_then(|binder| bind(binder, slot))
        {
            Some(stage) => included.push((entry, stage)),
            None => {
                trace!(
                    middleware = %entry.info.name,
                    capability = entry.capability.name(),
                    message,
                    "Middleware not applicable"
                );
                excluded.push(Excluded {
                    middleware: entry.info.clone(),
                    reason: Exclusion::ConstraintMismatch {
                        capability: entry.capability.name(),
                    },
                });
            }
        }
    }

    sort_stages(&mut included);

    let report = PipelineReport {
        message,
        output,
        stages: included.iter().map(|(entry, _)| entry.info.clone()).collect(),
        excluded,
    };
    debug!(
        message,
        stages = report.stages.len(),
        excluded = report.excluded.len(),
        "Resolved pipeline"
    );

    Resolved {
        stages: included.into_iter().map(|(_, stage)| stage).collect(),
        report,
    }
}
