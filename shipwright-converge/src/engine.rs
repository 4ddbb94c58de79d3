//! Convergence engine: apply in declaration order, then settle deferred
//! notifications.
//!
//! ## Run protocol
//!
//! 1. Validate notification targets (configuration error, nothing applied).
//! 2. For each resource in declaration order: skip `nothing` actions,
//!    evaluate the guard, apply through the [`ResourceHandler`].
//! 3. When a resource reports [`ApplyOutcome::Updated`], queue its
//!    notifications into the pending set keyed by `(target, action)`.
//! 4. Fire each pending notification exactly once, in the order it was
//!    first queued.
//!
//! The first failure aborts the run. Already-applied resources stay as they
//! are; re-running is safe because every handler is idempotent.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::ConvergeError;
use crate::guard::GuardEvaluator;
use crate::handler::{ApplyOutcome, ResourceHandler};
use crate::registry::ResourceRegistry;
use crate::resource::{Action, Notification, ResourceId};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Updated,
    Unchanged,
    /// The guard said the action is not needed.
    Skipped,
    /// Declared with action `nothing`; only reachable through notifications.
    Idle,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceResult {
    pub id: ResourceId,
    pub action: Action,
    pub status: ResourceStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvergeReport {
    pub resources: Vec<ResourceResult>,
    /// Notifications fired during the settle phase, in firing order.
    pub notifications: Vec<Notification>,
}

impl ConvergeReport {
    pub fn count(&self, status: ResourceStatus) -> usize {
        self.resources.iter().filter(|r| r.status == status).count()
    }

    pub fn updated(&self) -> usize {
        self.count(ResourceStatus::Updated)
    }

    pub fn status_of(&self, id: &ResourceId) -> Option<ResourceStatus> {
        self.resources.iter().find(|r| &r.id == id).map(|r| r.status)
    }
}

// ---------------------------------------------------------------------------
// Pending notifications
// ---------------------------------------------------------------------------

/// Deferred actions keyed by `(target, action)`; insertion order is kept and
/// duplicates collapse.
#[derive(Debug, Default)]
pub struct PendingNotifications {
    order: Vec<Notification>,
    seen: HashSet<(ResourceId, Action)>,
}

impl PendingNotifications {
    /// Returns `false` when the pair was already queued.
    pub fn queue(&mut self, notification: &Notification) -> bool {
        let key = (notification.target.clone(), notification.action);
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push(notification.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn drain(self) -> impl Iterator<Item = Notification> {
        self.order.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ConvergenceEngine<'a> {
    handler: &'a dyn ResourceHandler,
    guards: GuardEvaluator<'a>,
}

impl<'a> ConvergenceEngine<'a> {
    pub fn new(handler: &'a dyn ResourceHandler, guards: GuardEvaluator<'a>) -> Self {
        Self { handler, guards }
    }

    pub fn run(&self, registry: &ResourceRegistry) -> Result<ConvergeReport, ConvergeError> {
        registry.validate()?;

        let mut report = ConvergeReport::default();
        let mut pending = PendingNotifications::default();

        for resource in registry.iter() {
            let status = if resource.action == Action::Nothing {
                ResourceStatus::Idle
            } else if !self.guards.should_apply(resource)? {
                tracing::debug!(resource = %resource.id, "skipped by guard");
                ResourceStatus::Skipped
            } else {
                let outcome = self
                    .handler
                    .apply(resource, resource.action)
                    .map_err(|source| ConvergeError::ResourceApply {
                        resource: resource.id.clone(),
                        source,
                    })?;
                match outcome {
                    ApplyOutcome::Updated => {
                        tracing::info!(resource = %resource.id, action = %resource.action, "updated");
                        for n in &resource.notifies {
                            if pending.queue(n) {
                                tracing::debug!(
                                    notifier = %resource.id,
                                    target = %n.target,
                                    action = %n.action,
                                    "queued notification"
                                );
                            }
                        }
                        ResourceStatus::Updated
                    }
                    ApplyOutcome::Unchanged => ResourceStatus::Unchanged,
                }
            };
            report.resources.push(ResourceResult {
                id: resource.id.clone(),
                action: resource.action,
                status,
            });
        }

        for n in pending.drain() {
            // Targets were validated above.
            let Some(target) = registry.get(&n.target) else {
                continue;
            };
            tracing::info!(target = %n.target, action = %n.action, "firing notification");
            self.handler
                .apply(target, n.action)
                .map_err(|source| ConvergeError::ResourceApply {
                    resource: n.target.clone(),
                    source,
                })?;
            report.notifications.push(n);
        }

        tracing::info!(
            updated = report.updated(),
            unchanged = report.count(ResourceStatus::Unchanged),
            skipped = report.count(ResourceStatus::Skipped),
            notifications = report.notifications.len(),
            "convergence complete"
        );
        Ok(report)
    }
}
