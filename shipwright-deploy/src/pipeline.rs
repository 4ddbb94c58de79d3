//! Converge, then deploy.
//!
//! ```text
//! app_plan ──► ConvergenceEngine ──► DeployStateMachine
//!   (registry)    (SystemHandler)      (fetch … verify)
//! ```

use shipwright_converge::{
    app_plan, ConvergeReport, ConvergenceEngine, GuardEvaluator, ResourceHandler, SystemHandler,
};
use shipwright_core::{ApplicationDescriptor, CommandRunner, HostSettings};
use shipwright_renderer::Renderer;

use crate::error::{DeployError, ReleaseError};
use crate::fetch::{Fetcher, GitFetcher};
use crate::hooks;
use crate::machine::{CancelFlag, DeployReport, DeployStateMachine};
use crate::probe::VersionProbe;
use crate::release::ReleaseManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Run the deploy state machine after converging.
    pub deploy: bool,
    /// Probe `/version` once the service is restarted.
    pub verify: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            deploy: true,
            verify: true,
        }
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub converge: ConvergeReport,
    /// `None` when deploying was switched off.
    pub deploy: Option<DeployReport>,
}

/// The git fetcher configured for `descriptor`'s app user and deploy key.
pub fn git_fetcher<'a>(
    settings: &HostSettings,
    descriptor: &ApplicationDescriptor,
    runner: &'a dyn CommandRunner,
) -> GitFetcher<'a> {
    GitFetcher::new(runner)
        .user(descriptor.app_name().as_str())
        .ssh_wrapper(settings.ssh_wrapper())
        .timeout(settings.command_timeout())
}

pub struct Pipeline<'a> {
    settings: &'a HostSettings,
    runner: &'a dyn CommandRunner,
    fetcher: &'a dyn Fetcher,
    probe: &'a dyn VersionProbe,
    /// Replaces the [`SystemHandler`] when set.
    handler: Option<&'a dyn ResourceHandler>,
    options: PipelineOptions,
    cancel: CancelFlag,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        settings: &'a HostSettings,
        runner: &'a dyn CommandRunner,
        fetcher: &'a dyn Fetcher,
        probe: &'a dyn VersionProbe,
    ) -> Self {
        Self {
            settings,
            runner,
            fetcher,
            probe,
            handler: None,
            options: PipelineOptions::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn handler(mut self, handler: &'a dyn ResourceHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn release_manager(&self, descriptor: &ApplicationDescriptor) -> ReleaseManager<'a> {
        let app = descriptor.app_name();
        ReleaseManager::new(self.settings.deploy_to(&app), self.fetcher)
            .purge_before_symlink(self.settings.purge_before_symlink.clone())
            .owner(app.as_str(), self.runner)
            .timeout(self.settings.command_timeout())
    }

    /// Bring the app's system resources to their declared state.
    pub fn converge(&self, descriptor: &ApplicationDescriptor) -> Result<ConvergeReport, DeployError> {
        let renderer = Renderer::new(self.settings.template_dir.as_deref())?;
        let registry = app_plan(descriptor, self.settings, &renderer)?;
        tracing::info!(app = %descriptor.app_name(), resources = registry.len(), "converging");

        let timeout = Some(self.settings.command_timeout());
        let system = SystemHandler::new(self.runner, timeout);
        let handler: &dyn ResourceHandler = match self.handler {
            Some(h) => h,
            None => &system,
        };
        let guards = GuardEvaluator::new(self.runner, timeout);
        let report = ConvergenceEngine::new(handler, guards).run(&registry)?;
        tracing::info!(
            app = %descriptor.app_name(),
            updated = report.updated(),
            notifications = report.notifications.len(),
            "converged"
        );
        Ok(report)
    }

    /// Converge, then (unless switched off) run one deploy attempt.
    ///
    /// `Err` means the run stopped before the deploy state machine could
    /// report; deploy failures are carried in the report's outcome.
    pub fn run(&self, descriptor: &ApplicationDescriptor) -> Result<PipelineReport, DeployError> {
        descriptor.validate()?;
        let converge = self.converge(descriptor)?;
        if !self.options.deploy {
            return Ok(PipelineReport {
                converge,
                deploy: None,
            });
        }

        let releases = self.release_manager(descriptor);
        let machine = DeployStateMachine::new(&releases, self.runner, self.probe)
            .cancel_flag(self.cancel.clone())
            .timeout(Some(self.settings.command_timeout()))
            .verify(self.options.verify);
        let deploy = machine.run(descriptor, self.settings);
        Ok(PipelineReport {
            converge,
            deploy: Some(deploy),
        })
    }

    /// Operator rollback: repoint `current` at `to` (or the most recent
    /// superseded release) and restart. Returns the release now live.
    pub fn rollback(
        &self,
        descriptor: &ApplicationDescriptor,
        to: Option<&str>,
    ) -> Result<String, DeployError> {
        let releases = self.release_manager(descriptor);
        let target = match to {
            Some(id) => id.to_string(),
            None => {
                let history = releases.history()?;
                let current = releases.current();
                history
                    .previous(current.as_deref())
                    .map(|r| r.id.clone())
                    .ok_or(ReleaseError::NoPreviousRelease)?
            }
        };
        releases.rollback_to(&target)?;
        hooks::restart(self.settings, &descriptor.app_name())
            .run(self.runner, Some(self.settings.command_timeout()))
            .map_err(DeployError::Restart)?;
        tracing::info!(app = %descriptor.app_name(), release = %target, "rollback complete");
        Ok(target)
    }
}
