//! `DeployStateMachine`: one deploy attempt, step by step.
//!
//! ```text
//! Fetching → Linking → PreRestartHooks → Activating → Restarting
//!          → PostRestartHooks → Verifying → Succeeded
//! ```
//!
//! Any step may end the run. Before `Activating` nothing live has changed.
//! From `Activating` on, a failed restart (or a cancellation) points
//! `current` back at the previous release and restarts it before the run
//! ends. Post-restart hook failures are warnings; a failed verification is
//! reported without rolling back.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use shipwright_core::{ApplicationDescriptor, CommandRunner, HostSettings};

use crate::error::ProbeError;
use crate::history::ReleaseStatus;
use crate::hooks::{self, Hook};
use crate::probe::VersionProbe;
use crate::release::{Release, ReleaseManager};

// ---------------------------------------------------------------------------
// Steps, outcomes, events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStep {
    Fetching,
    Linking,
    PreRestartHooks,
    Activating,
    Restarting,
    PostRestartHooks,
    Verifying,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployStep::Fetching => "fetch",
            DeployStep::Linking => "link",
            DeployStep::PreRestartHooks => "pre_restart",
            DeployStep::Activating => "activate",
            DeployStep::Restarting => "restart",
            DeployStep::PostRestartHooks => "post_restart",
            DeployStep::Verifying => "verify",
        };
        f.write_str(s)
    }
}

/// Result of putting the previous release back after activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Rollback {
    /// There was no earlier release to return to.
    Unavailable,
    Restored { to: String },
    Failed { to: String, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeployFailure {
    Fetch { detail: String },
    Link { detail: String },
    Hook { hook: String, detail: String },
    /// `rollback` is set when `current` had already moved to the new
    /// release and had to be put back.
    Activate {
        detail: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rollback: Option<Rollback>,
    },
    Restart { detail: String, rollback: Rollback },
    VersionMismatch { expected: String, observed: String, trace: String },
    ProbeUnreachable { detail: String, trace: String },
}

impl fmt::Display for DeployFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployFailure::Fetch { detail }
            | DeployFailure::Link { detail }
            | DeployFailure::Activate { detail, .. } => f.write_str(detail),
            DeployFailure::Hook { hook, detail } => write!(f, "hook `{hook}`: {detail}"),
            DeployFailure::Restart { detail, .. } => f.write_str(detail),
            DeployFailure::VersionMismatch {
                expected, observed, ..
            } => write!(f, "deployed {expected}, but {observed:?} was returned"),
            DeployFailure::ProbeUnreachable { detail, .. } => f.write_str(detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeployOutcome {
    Succeeded,
    Failed {
        step: DeployStep,
        failure: DeployFailure,
    },
    /// Restart failed; the previous release is live and restarted again.
    RolledBack { restored: String, cause: String },
    Cancelled {
        step: DeployStep,
        rollback: Option<Rollback>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeployEvent {
    Entered { step: DeployStep },
    HookPassed { hook: String },
    Warning { message: String },
    RollbackStarted { to: String },
    RollbackFinished { rollback: Rollback },
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub release: Option<String>,
    pub commit: Option<String>,
    pub previous: Option<String>,
    pub events: Vec<DeployEvent>,
    pub outcome: DeployOutcome,
}

impl DeployReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == DeployOutcome::Succeeded
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            DeployEvent::Warning { message } => Some(message.as_str()),
            _ => None,
        })
    }

    /// Whether a rollback was attempted, and how it ended.
    pub fn rollback(&self) -> Option<&Rollback> {
        self.events.iter().rev().find_map(|e| match e {
            DeployEvent::RollbackFinished { rollback } => Some(rollback),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

pub struct DeployStateMachine<'a> {
    releases: &'a ReleaseManager<'a>,
    runner: &'a dyn CommandRunner,
    probe: &'a dyn VersionProbe,
    cancel: CancelFlag,
    timeout: Option<Duration>,
    verify: bool,
}

/// How a run stopped short of success.
struct Stop {
    step: DeployStep,
    kind: StopKind,
}

enum StopKind {
    Failed(DeployFailure),
    Cancelled,
}

impl<'a> DeployStateMachine<'a> {
    pub fn new(
        releases: &'a ReleaseManager<'a>,
        runner: &'a dyn CommandRunner,
        probe: &'a dyn VersionProbe,
    ) -> Self {
        Self {
            releases,
            runner,
            probe,
            cancel: CancelFlag::new(),
            timeout: None,
            verify: true,
        }
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    fn enter(&self, events: &mut Vec<DeployEvent>, step: DeployStep) -> Result<(), Stop> {
        if self.cancel.is_cancelled() {
            tracing::warn!(%step, "deploy cancelled");
            return Err(Stop {
                step,
                kind: StopKind::Cancelled,
            });
        }
        tracing::info!(%step, "entering step");
        events.push(DeployEvent::Entered { step });
        Ok(())
    }

    fn fail(step: DeployStep, failure: DeployFailure) -> Stop {
        tracing::error!(%step, %failure, "deploy step failed");
        Stop {
            step,
            kind: StopKind::Failed(failure),
        }
    }

    /// Run one deploy attempt. Never retries.
    pub fn run(&self, descriptor: &ApplicationDescriptor, settings: &HostSettings) -> DeployReport {
        let mut events = Vec::new();
        let restart = hooks::restart(settings, &descriptor.app_name());

        let fetched = self
            .enter(&mut events, DeployStep::Fetching)
            .and_then(|()| {
                self.releases.fetch(descriptor).map_err(|e| {
                    Self::fail(
                        DeployStep::Fetching,
                        DeployFailure::Fetch {
                            detail: e.to_string(),
                        },
                    )
                })
            });
        let release = match fetched {
            Ok(r) => r,
            Err(stop) => return self.finish(events, None, None, &restart, stop),
        };

        let mut previous = None;
        match self.advance(&mut events, &mut previous, &release, &restart, descriptor, settings) {
            Ok(()) => {
                tracing::info!(release = %release.id, "deploy succeeded");
                DeployReport {
                    release: Some(release.id.clone()),
                    commit: Some(release.commit.clone()),
                    previous,
                    events,
                    outcome: DeployOutcome::Succeeded,
                }
            }
            Err(stop) => self.finish(events, Some(&release), previous, &restart, stop),
        }
    }

    fn advance(
        &self,
        events: &mut Vec<DeployEvent>,
        previous: &mut Option<String>,
        release: &Release,
        restart: &Hook,
        descriptor: &ApplicationDescriptor,
        settings: &HostSettings,
    ) -> Result<(), Stop> {
        self.enter(events, DeployStep::Linking)?;
        self.releases.link_shared(release).map_err(|e| {
            Self::fail(
                DeployStep::Linking,
                DeployFailure::Link {
                    detail: e.to_string(),
                },
            )
        })?;

        self.enter(events, DeployStep::PreRestartHooks)?;
        for hook in hooks::before_restart(descriptor, settings, &release.path) {
            if self.cancel.is_cancelled() {
                return Err(Stop {
                    step: DeployStep::PreRestartHooks,
                    kind: StopKind::Cancelled,
                });
            }
            self.run_hook(events, &hook).map_err(|detail| {
                Self::fail(
                    DeployStep::PreRestartHooks,
                    DeployFailure::Hook {
                        hook: hook.name.clone(),
                        detail,
                    },
                )
            })?;
        }
        if let Err(e) = self.releases.set_status(&release.id, ReleaseStatus::Migrated) {
            tracing::warn!(error = %e, "could not record release status");
        }

        self.enter(events, DeployStep::Activating)?;
        *previous = self.releases.current().filter(|id| *id != release.id);
        if let Err(e) = self.releases.activate(release) {
            let rollback = (self.releases.current().as_deref() == Some(release.id.as_str()))
                .then(|| self.roll_back(events, previous.as_deref(), release, restart));
            return Err(Self::fail(
                DeployStep::Activating,
                DeployFailure::Activate {
                    detail: e.to_string(),
                    rollback,
                },
            ));
        }

        self.enter(events, DeployStep::Restarting)?;
        if let Err(detail) = self.run_hook(events, restart) {
            let rollback = self.roll_back(events, previous.as_deref(), release, restart);
            return Err(Self::fail(
                DeployStep::Restarting,
                DeployFailure::Restart { detail, rollback },
            ));
        }

        self.enter(events, DeployStep::PostRestartHooks)?;
        for hook in hooks::after_restart(descriptor, settings) {
            if let Err(detail) = self.run_hook(events, &hook) {
                let message = format!("post-restart hook `{}` failed: {detail}", hook.name);
                tracing::warn!("{message}");
                events.push(DeployEvent::Warning { message });
            }
        }

        if !self.verify {
            return Ok(());
        }
        self.enter(events, DeployStep::Verifying)?;
        let server = descriptor.primary_server_name().unwrap_or_default();
        self.probe
            .verify(server, descriptor.ssl_enabled, &release.commit)
            .map_err(|e| {
                let failure = match e {
                    ProbeError::Mismatch {
                        expected,
                        observed,
                        trace,
                    } => DeployFailure::VersionMismatch {
                        expected,
                        observed,
                        trace,
                    },
                    ProbeError::Unreachable { url, reason, trace } => {
                        DeployFailure::ProbeUnreachable {
                            detail: format!("{url}: {reason}"),
                            trace,
                        }
                    }
                };
                Self::fail(DeployStep::Verifying, failure)
            })
    }

    fn run_hook(&self, events: &mut Vec<DeployEvent>, hook: &Hook) -> Result<(), String> {
        hook.run(self.runner, self.timeout).map_err(|e| e.to_string())?;
        events.push(DeployEvent::HookPassed {
            hook: hook.name.clone(),
        });
        Ok(())
    }

    fn mark_failed(&self, release: &Release) {
        if let Err(e) = self.releases.set_status(&release.id, ReleaseStatus::Failed) {
            tracing::warn!(error = %e, "could not record release status");
        }
    }

    /// Point `current` back at `previous` and restart it.
    fn roll_back(
        &self,
        events: &mut Vec<DeployEvent>,
        previous: Option<&str>,
        release: &Release,
        restart: &Hook,
    ) -> Rollback {
        let rollback = match previous.filter(|p| *p != release.id) {
            None => {
                tracing::error!("no previous release to roll back to");
                self.mark_failed(release);
                Rollback::Unavailable
            }
            Some(to) => {
                tracing::warn!(to, "rolling back");
                events.push(DeployEvent::RollbackStarted { to: to.to_string() });
                let restored = self
                    .releases
                    .rollback_to(to)
                    .map_err(|e| e.to_string())
                    .and_then(|()| restart.run(self.runner, self.timeout).map_err(|e| e.to_string()));
                self.mark_failed(release);
                match restored {
                    Ok(()) => Rollback::Restored { to: to.to_string() },
                    Err(detail) => Rollback::Failed {
                        to: to.to_string(),
                        detail,
                    },
                }
            }
        };
        events.push(DeployEvent::RollbackFinished {
            rollback: rollback.clone(),
        });
        rollback
    }

    fn finish(
        &self,
        mut events: Vec<DeployEvent>,
        release: Option<&Release>,
        previous: Option<String>,
        restart: &Hook,
        stop: Stop,
    ) -> DeployReport {
        let outcome = match stop.kind {
            StopKind::Failed(DeployFailure::Restart {
                detail,
                rollback: Rollback::Restored { to },
            }) => DeployOutcome::RolledBack {
                restored: to,
                cause: detail,
            },
            StopKind::Failed(failure) => {
                // Once live, a release keeps its status; verification
                // failures leave it serving.
                if let Some(r) = release.filter(|_| stop.step <= DeployStep::Activating) {
                    self.mark_failed(r);
                }
                DeployOutcome::Failed {
                    step: stop.step,
                    failure,
                }
            }
            StopKind::Cancelled => {
                let rollback = match release {
                    Some(r) if stop.step > DeployStep::Activating => {
                        Some(self.roll_back(&mut events, previous.as_deref(), r, restart))
                    }
                    Some(r) => {
                        self.mark_failed(r);
                        None
                    }
                    None => None,
                };
                DeployOutcome::Cancelled {
                    step: stop.step,
                    rollback,
                }
            }
        };
        DeployReport {
            release: release.map(|r| r.id.clone()),
            commit: release.map(|r| r.commit.clone()),
            previous,
            events,
            outcome,
        }
    }
}
