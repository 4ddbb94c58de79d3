//! Deploy hooks: external commands run at fixed points of a deploy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shipwright_core::{
    shell_quote, AppName, ApplicationDescriptor, CommandRunner, CommandSpec, HostSettings,
};

use crate::error::HookError;
use crate::paths::bundle_dir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub name: String,
    pub command: String,
    pub user: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl Hook {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            user: None,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    fn as_user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    fn in_dir(mut self, cwd: &Path) -> Self {
        self.cwd = Some(cwd.to_path_buf());
        self
    }

    fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env = env.clone();
        self
    }

    /// Run to completion; non-zero exit or a runner failure is a
    /// [`HookError`].
    pub fn run(&self, runner: &dyn CommandRunner, timeout: Option<Duration>) -> Result<(), HookError> {
        let mut spec = CommandSpec::new(&self.command)
            .user_opt(self.user.as_deref())
            .envs(&self.env);
        if let Some(cwd) = self.cwd.as_ref() {
            spec = spec.cwd(cwd);
        }
        if let Some(t) = timeout {
            spec = spec.timeout(t);
        }
        tracing::info!(hook = %self.name, "running hook");
        let output = runner.run(&spec).map_err(|source| HookError::Runner {
            hook: self.name.clone(),
            source,
        })?;
        if !output.success() {
            return Err(HookError::Failed {
                hook: self.name.clone(),
                code: output.code,
                output: output.combined(),
            });
        }
        Ok(())
    }
}

/// Environment for commands run inside `release`: the `chef` log
/// environment, `RAILS_ENV`, and a Gemfile inside the release itself since
/// `current` still points at the old code while these run.
pub fn release_environment(
    descriptor: &ApplicationDescriptor,
    settings: &HostSettings,
    release: &Path,
) -> BTreeMap<String, String> {
    let mut env = settings.app_environment(descriptor, "chef");
    env.insert(
        "BUNDLE_GEMFILE".to_string(),
        release.join("Gemfile").display().to_string(),
    );
    env.insert("RAILS_ENV".to_string(), descriptor.environment.clone());
    env
}

/// Dependency install, asset build and schema migration, in order.
pub fn before_restart(
    descriptor: &ApplicationDescriptor,
    settings: &HostSettings,
    release: &Path,
) -> Vec<Hook> {
    let app = descriptor.app_name();
    let user = app.as_str();
    let env = release_environment(descriptor, settings, release);
    let gem = settings
        .ruby_home(&descriptor.ruby_version)
        .join("bin")
        .join("gem");
    let gem = shell_quote(&gem.display().to_string());
    let rails_env = shell_quote(&descriptor.environment);
    let bundle_path = bundle_dir(&settings.deploy_to(&app));

    vec![
        Hook::new(
            "install bundler",
            format!("{gem} list -i bundler >/dev/null || {gem} install bundler"),
        )
        .with_env(&env),
        Hook::new(
            "bundle install",
            format!(
                "bundle install --path {} --deployment --without development test",
                shell_quote(&bundle_path.display().to_string())
            ),
        )
        .as_user(user)
        .in_dir(release)
        .with_env(&env),
        Hook::new(
            "assets precompile",
            format!(
                "bundle exec rake RAILS_ENV={rails_env} RAILS_GROUPS=assets assets:precompile:primary"
            ),
        )
        .as_user(user)
        .in_dir(release)
        .with_env(&env),
        Hook::new(
            "migrate",
            format!("bundle exec rake RAILS_ENV={rails_env} db:migrate db:seed --trace"),
        )
        .as_user(user)
        .in_dir(release)
        .with_env(&env),
    ]
}

pub fn restart(settings: &HostSettings, app: &AppName) -> Hook {
    let script = settings.init_script(app);
    Hook::new(
        "restart",
        format!("{} restart", shell_quote(&script.display().to_string())),
    )
}

/// Worker supervisor reload and worker recycling; empty without
/// delayed_job. Worker `i` is killed by its process name so the supervisor
/// respawns it on the new code.
pub fn after_restart(descriptor: &ApplicationDescriptor, settings: &HostSettings) -> Vec<Hook> {
    if !descriptor.delayed_job {
        return Vec::new();
    }
    let mut hooks = vec![Hook::new("monit reload", "monit reload && monit")];
    for i in 0..settings.delayed_job_worker_count {
        hooks.push(Hook::new(
            format!("recycle worker {i}"),
            format!("pidof delayed_job.{i} | xargs --no-run-if-empty kill"),
        ));
    }
    hooks
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::ScriptedRunner;

    fn descriptor(delayed_job: bool) -> ApplicationDescriptor {
        ApplicationDescriptor {
            id: "blog".into(),
            environment: "prod".into(),
            repository: "repo".into(),
            revision: "r42".into(),
            ruby_version: "2.0.0".into(),
            ssl_enabled: false,
            delayed_job,
            server_names: vec!["blog.example.com".into()],
            environment_variables: BTreeMap::from([("SECRET".into(), "x".into())]),
        }
    }

    #[test]
    fn before_restart_runs_in_release_as_app_user() {
        let release = Path::new("/var/www/blog-prod/releases/20240101000000");
        let hooks = before_restart(&descriptor(false), &HostSettings::default(), release);
        let names: Vec<_> = hooks.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["install bundler", "bundle install", "assets precompile", "migrate"]);

        let bundle = &hooks[1];
        assert_eq!(bundle.user.as_deref(), Some("blog-prod"));
        assert_eq!(bundle.cwd.as_deref(), Some(release));
        assert!(bundle
            .command
            .contains("--path '/var/www/blog-prod/shared/bundle' --deployment"));
        assert_eq!(bundle.env["RAILS_ENV"], "prod");
        assert_eq!(bundle.env["SECRET"], "x");
        assert_eq!(bundle.env["LOG_FILE"], "/var/log/www/blog-prod.chef.log");
        assert_eq!(
            bundle.env["BUNDLE_GEMFILE"],
            "/var/www/blog-prod/releases/20240101000000/Gemfile"
        );
        assert!(hooks[3].command.contains("db:migrate db:seed"));
    }

    #[test]
    fn after_restart_recycles_each_worker() {
        let settings = HostSettings {
            delayed_job_worker_count: 2,
            ..HostSettings::default()
        };
        assert!(after_restart(&descriptor(false), &settings).is_empty());
        let hooks = after_restart(&descriptor(true), &settings);
        let commands: Vec<_> = hooks.iter().map(|h| h.command.as_str()).collect();
        assert_eq!(
            commands,
            vec![
                "monit reload && monit",
                "pidof delayed_job.0 | xargs --no-run-if-empty kill",
                "pidof delayed_job.1 | xargs --no-run-if-empty kill",
            ]
        );
    }

    #[test]
    fn restart_uses_init_script() {
        let hook = restart(&HostSettings::default(), &AppName::from("blog-prod"));
        assert_eq!(hook.command, "'/etc/init.d/blog-prod' restart");
    }

    #[test]
    fn failing_hook_reports_name_and_output() {
        let runner = ScriptedRunner::new().fail("db:migrate", 1, "PG::ConnectionBad");
        let hook = Hook::new("migrate", "bundle exec rake db:migrate");
        let err = hook.run(&runner, None).unwrap_err();
        assert_eq!(err.hook(), "migrate");
        assert!(err.to_string().contains("PG::ConnectionBad"));
    }

    #[test]
    fn timed_out_hook_is_a_hook_error() {
        let runner = ScriptedRunner::new().time_out("assets");
        let hook = Hook::new("assets precompile", "rake assets");
        let err = hook.run(&runner, Some(Duration::from_secs(1))).unwrap_err();
        assert!(matches!(err, HookError::Runner { .. }));
        assert_eq!(runner.calls()[0].timeout, Some(Duration::from_secs(1)));
    }
}
