//! Process exit codes, one per failure kind, for operator tooling.

use shipwright_converge::ConvergeError;
use shipwright_core::ConfigError;
use shipwright_deploy::{DeployError, DeployFailure, DeployOutcome, ReleaseError};
use shipwright_renderer::RenderError;

pub const SUCCESS: u8 = 0;
pub const UNEXPECTED: u8 = 1;
pub const CONFIG: u8 = 2;
pub const CONVERGE: u8 = 3;
pub const FETCH: u8 = 10;
pub const LINK: u8 = 11;
pub const PRE_RESTART_HOOK: u8 = 12;
pub const ACTIVATE: u8 = 13;
/// Restart failed and the previous release could not be brought back.
pub const RESTART: u8 = 14;
/// Restart failed; the previous release is live again.
pub const ROLLED_BACK: u8 = 15;
pub const VERSION_MISMATCH: u8 = 16;
pub const PROBE_UNREACHABLE: u8 = 17;
pub const CANCELLED: u8 = 18;
pub const LOCKED: u8 = 19;

pub fn for_outcome(outcome: &DeployOutcome) -> u8 {
    match outcome {
        DeployOutcome::Succeeded => SUCCESS,
        DeployOutcome::RolledBack { .. } => ROLLED_BACK,
        DeployOutcome::Cancelled { .. } => CANCELLED,
        DeployOutcome::Failed { failure, .. } => match failure {
            DeployFailure::Fetch { .. } => FETCH,
            DeployFailure::Link { .. } => LINK,
            DeployFailure::Hook { .. } => PRE_RESTART_HOOK,
            DeployFailure::Activate { .. } => ACTIVATE,
            DeployFailure::Restart { .. } => RESTART,
            DeployFailure::VersionMismatch { .. } => VERSION_MISMATCH,
            DeployFailure::ProbeUnreachable { .. } => PROBE_UNREACHABLE,
        },
    }
}

fn for_converge(e: &ConvergeError) -> u8 {
    if e.is_configuration() {
        CONFIG
    } else {
        CONVERGE
    }
}

fn for_release(e: &ReleaseError) -> u8 {
    match e {
        ReleaseError::UnknownRelease { .. } | ReleaseError::NoPreviousRelease => CONFIG,
        ReleaseError::Fetch { .. } => FETCH,
        ReleaseError::Link { .. } => LINK,
        _ => ACTIVATE,
    }
}

/// Errors that ended a command before any deploy outcome existed.
pub fn for_error(e: &anyhow::Error) -> u8 {
    if let Some(e) = e.downcast_ref::<DeployError>() {
        return match e {
            DeployError::Config(_) | DeployError::Render(_) => CONFIG,
            DeployError::Converge(e) => for_converge(e),
            DeployError::Release(e) => for_release(e),
            DeployError::Restart(_) => RESTART,
        };
    }
    if let Some(e) = e.downcast_ref::<ConvergeError>() {
        return for_converge(e);
    }
    if let Some(e) = e.downcast_ref::<ReleaseError>() {
        return for_release(e);
    }
    if e.downcast_ref::<ConfigError>().is_some() || e.downcast_ref::<RenderError>().is_some() {
        return CONFIG;
    }
    UNEXPECTED
}
