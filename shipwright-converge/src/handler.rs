//! The seam between the engine and whatever actually changes the system.

use crate::error::ApplyError;
use crate::resource::{Action, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// System state changed; the resource's notifications fire.
    Updated,
    /// Already in the desired state.
    Unchanged,
}

/// Applies one action of one resource. Implementations must be idempotent:
/// applying the same action against converged state reports `Unchanged`
/// (commands with no observable state, like `execute`, are the exception and
/// are expected to carry a guard).
pub trait ResourceHandler {
    fn apply(&self, resource: &Resource, action: Action) -> Result<ApplyOutcome, ApplyError>;
}
