//! Host-wide settings read from `<root>/host.yaml`.
//!
//! Every field has a default, so a missing file yields a usable
//! configuration for a conventional Debian-style host.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{AppName, ApplicationDescriptor};

pub const HOST_FILE: &str = "host.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub www_root: PathBuf,
    pub log_root: PathBuf,
    pub home_root: PathBuf,
    pub init_dir: PathBuf,
    pub nginx_dir: PathBuf,
    pub monit_conf_dir: PathBuf,
    pub cron_dir: PathBuf,
    pub ruby_base_path: PathBuf,
    pub deploy_key_dir: PathBuf,
    pub lock_dir: PathBuf,
    /// Static files copied onto the host (ssh keys, backup scripts).
    /// Relative paths resolve against the config root.
    pub files_dir: PathBuf,
    /// Directory of `.tera` files overriding the built-in templates.
    pub template_dir: Option<PathBuf>,
    pub delayed_job_worker_count: u32,
    pub command_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// Host the version probe connects to; the primary server name is sent
    /// as the `Host` header.
    pub probe_host: String,
    /// Release-relative paths removed from a fresh checkout before the
    /// shared directories are linked over them.
    pub purge_before_symlink: Vec<PathBuf>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            www_root: PathBuf::from("/var/www"),
            log_root: PathBuf::from("/var/log/www"),
            home_root: PathBuf::from("/home"),
            init_dir: PathBuf::from("/etc/init.d"),
            nginx_dir: PathBuf::from("/etc/nginx"),
            monit_conf_dir: PathBuf::from("/etc/monit/conf.d"),
            cron_dir: PathBuf::from("/etc/cron.d"),
            ruby_base_path: PathBuf::from("/usr/local/ruby"),
            deploy_key_dir: PathBuf::from("/tmp/private_code"),
            lock_dir: PathBuf::from("/var/lock/shipwright"),
            files_dir: PathBuf::from("files"),
            template_dir: None,
            delayed_job_worker_count: 1,
            command_timeout_secs: 900,
            probe_timeout_secs: 30,
            probe_host: "localhost".to_string(),
            purge_before_symlink: vec![
                PathBuf::from("log"),
                PathBuf::from("tmp/pids"),
                PathBuf::from("public/system"),
            ],
        }
    }
}

impl HostSettings {
    /// `<www_root>/<app_name>`: the deploy root holding `releases/`,
    /// `shared/` and `current`.
    pub fn deploy_to(&self, app: &AppName) -> PathBuf {
        self.www_root.join(app.as_str())
    }

    pub fn home_dir(&self, app: &AppName) -> PathBuf {
        self.home_root.join(app.as_str())
    }

    pub fn ruby_home(&self, ruby_version: &str) -> PathBuf {
        self.ruby_base_path.join(ruby_version)
    }

    /// `<log_root>/<app_name>.<purpose>.log`
    pub fn log_file(&self, app: &AppName, purpose: &str) -> PathBuf {
        self.log_root.join(format!("{}.{purpose}.log", app.as_str()))
    }

    pub fn init_script(&self, app: &AppName) -> PathBuf {
        self.init_dir.join(app.as_str())
    }

    pub fn ssh_wrapper(&self) -> PathBuf {
        self.deploy_key_dir.join("deploy-ssh-wrapper.sh")
    }

    pub fn lock_path(&self, app: &AppName) -> PathBuf {
        self.lock_dir.join(format!("{}.lock", app.as_str()))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Descriptor variables merged with the runtime paths every process of
    /// the app needs. `purpose` selects the log file (`application`,
    /// `delayed_job`, `chef`).
    pub fn app_environment(
        &self,
        descriptor: &ApplicationDescriptor,
        purpose: &str,
    ) -> BTreeMap<String, String> {
        let app = descriptor.app_name();
        let ruby_bin = self.ruby_home(&descriptor.ruby_version).join("bin");
        let mut env = descriptor.environment_variables.clone();
        env.insert(
            "BUNDLE_GEMFILE".to_string(),
            self.deploy_to(&app)
                .join("current")
                .join("Gemfile")
                .display()
                .to_string(),
        );
        env.insert(
            "LOG_FILE".to_string(),
            self.log_file(&app, purpose).display().to_string(),
        );
        env.insert(
            "PATH".to_string(),
            format!("{}:/usr/local/bin:/usr/bin:/bin", ruby_bin.display()),
        );
        env
    }

    fn resolve_relative(mut self, root: &Path) -> Self {
        if self.files_dir.is_relative() {
            self.files_dir = root.join(&self.files_dir);
        }
        if let Some(dir) = self.template_dir.as_mut() {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
        self
    }
}

/// Load `<root>/host.yaml`, falling back to defaults when it is absent.
pub fn load_at(root: &Path) -> Result<HostSettings, ConfigError> {
    let path = root.join(HOST_FILE);
    if !path.exists() {
        tracing::debug!("no {} under {}, using defaults", HOST_FILE, root.display());
        return Ok(HostSettings::default().resolve_relative(root));
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let settings: HostSettings =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    Ok(settings.resolve_relative(root))
}
