//! Read-only views of registered and resolved pipelines.
//!
//! A [`PipelineReport`] describes the chain actually resolved for one
//! message type, in execution order, together with the registered
//! middleware that were left out and why. It is distinct from the raw
//! registration list returned by
//! [`Mediator::registrations`](crate::Mediator::registrations).

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Which pipeline a middleware belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareKind {
    /// Request pipeline.
    Request,
    /// Notification pipeline.
    Notification,
    /// Stream pipeline.
    Stream,
}

/// A registered middleware after configuration overrides were applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiddlewareInfo {
    /// Name used for configuration overrides and logs.
    pub name: String,
    /// Pipeline the middleware belongs to.
    pub kind: MiddlewareKind,
    /// Type name of the capability the middleware is constrained to.
    pub capability: &'static str,
    /// Effective order (lower runs first).
    pub order: i32,
    /// Position in the registration list of its pipeline kind.
    pub registration: usize,
    /// Whether a per-call predicate decides participation.
    pub conditional: bool,
    /// Whether the middleware is enabled.
    pub enabled: bool,
    /// Effective static configuration.
    pub config: Value,
}

/// Why a registered middleware is not part of a resolved chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    /// The message type does not declare the middleware's capability.
    ConstraintMismatch {
        /// The missing capability.
        capability: &'static str,
    },
    /// Disabled through configuration.
    Disabled,
}

/// A registered middleware left out of a resolved chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Excluded {
    /// The middleware.
    #[serde(flatten)]
    pub middleware: MiddlewareInfo,
    /// Why it was left out.
    pub reason: Exclusion,
}

/// The resolved chain for one message type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Type name of the message.
    pub message: &'static str,
    /// Response, item, or `()` for notifications.
    pub output: &'static str,
    /// Stages in execution order.
    pub stages: Vec<MiddlewareInfo>,
    /// Registered middleware not in the chain.
    pub excluded: Vec<Excluded>,
}

impl PipelineReport {
    /// Names of the resolved stages, in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }

    /// Returns the exclusion reason for `name`, if it was left out.
    pub fn exclusion(&self, name: &str) -> Option<Exclusion> {
        self.excluded
            .iter()
            .find(|entry| entry.middleware.name == name)
            .map(|entry| entry.reason)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} -> {}", self.message, self.output)?;
        for (position, stage) in self.stages.iter().enumerate() {
            writeln!(
                f,
                "  {position}. {} (order {}, #{}){}",
                stage.name,
                stage.order,
                stage.registration,
                if stage.conditional { " [conditional]" } else { "" }
            )?;
        }
        for entry in &self.excluded {
            match entry.reason {
                Exclusion::ConstraintMismatch { capability } => writeln!(
                    f,
                    "  -  {} not applicable: requires {capability}",
                    entry.middleware.name
                )?,
                Exclusion::Disabled => writeln!(f, "  -  {} disabled", entry.middleware.name)?,
            }
        }
        Ok(())
    }
}
