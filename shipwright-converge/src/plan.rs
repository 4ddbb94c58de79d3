//! The resources converged for one application before it is deployed.
//!
//! Declaration order matters: it is the apply order, and it decides the
//! order in which deferred notifications settle.

use std::path::{Path, PathBuf};

use shipwright_core::{shell_quote, AppName, ApplicationDescriptor, HostSettings};
use shipwright_renderer::{Renderer, TemplateKind};

use crate::error::ConvergeError;
use crate::registry::ResourceRegistry;
use crate::resource::{Action, Content, Ownership, Resource, ResourceId, ResourceSpec};

/// Log files every app gets; `delayed_job` is added when workers are enabled.
pub const LOG_PURPOSES: &[&str] = &["chef", "application", "stdout", "stderr"];

/// Subdirectories of `shared/` that outlive releases.
pub const SHARED_DIRS: &[&str] = &["assets", "bundle", "pids", "sockets", "log", "system", "config"];

const AWS_CLI: &str = "/usr/bin/aws";
const AWS_SECRET: &str = "/root/.awssecret";
const BACKUP_SCRIPT: &str = "/usr/local/bin/backup-postgres";
const BACKUP_RETENTION_DAYS: u32 = 365;

/// Build the registry for `descriptor`.
pub fn app_plan(
    descriptor: &ApplicationDescriptor,
    settings: &HostSettings,
    renderer: &Renderer,
) -> Result<ResourceRegistry, ConvergeError> {
    let app = descriptor.app_name();
    let mut plan = PlanBuilder {
        reg: ResourceRegistry::new(),
        descriptor,
        settings,
        renderer,
        app: &app,
    };
    plan.user()?;
    plan.app_directories()?;
    plan.init_script()?;
    plan.nginx_site()?;
    plan.database()?;
    plan.database_backup()?;
    plan.deploy_key()?;
    if descriptor.delayed_job {
        plan.delayed_job()?;
    }
    plan.shared_state()?;
    Ok(plan.reg)
}

struct PlanBuilder<'a> {
    reg: ResourceRegistry,
    descriptor: &'a ApplicationDescriptor,
    settings: &'a HostSettings,
    renderer: &'a Renderer,
    app: &'a AppName,
}

impl PlanBuilder<'_> {
    fn declare(&mut self, resource: Resource) -> Result<(), ConvergeError> {
        self.reg.declare(resource)
    }

    fn owned(&self) -> Ownership {
        Ownership::of(self.app.as_str())
    }

    fn source(&self, name: &str) -> Option<Content> {
        Some(Content::Source(self.settings.files_dir.join(name)))
    }

    fn template(&self, kind: TemplateKind, ownership: Ownership) -> Result<Resource, ConvergeError> {
        let rendered = self.renderer.render(self.descriptor, self.settings, kind)?;
        Ok(Resource::template(
            kind.output_path(self.settings, self.app),
            ownership,
            kind.template_name(),
            rendered,
        ))
    }

    fn user(&mut self) -> Result<(), ConvergeError> {
        let app = self.app;
        let name = app.as_str();
        let home = self.settings.home_dir(app);
        self.declare(Resource::new(name, ResourceSpec::Group))?;
        self.declare(Resource::new(
            name,
            ResourceSpec::User {
                gid: Some(name.to_string()),
                home: home.clone(),
                shell: "/bin/bash".to_string(),
                manage_home: true,
            },
        ))?;
        let ssh = home.join(".ssh");
        self.declare(Resource::directory(&ssh, self.owned().mode(0o700)))?;
        self.declare(Resource::file(
            ssh.join("known_hosts"),
            self.owned().mode(0o600),
            self.source("ssh/known_hosts"),
        ))
    }

    fn app_directories(&mut self) -> Result<(), ConvergeError> {
        let deploy_to = self.settings.deploy_to(self.app);
        self.declare(Resource::directory(deploy_to, self.owned()).recursive())?;
        self.declare(Resource::directory(&self.settings.log_root, Ownership::new()))?;

        let mut purposes: Vec<&str> = LOG_PURPOSES.to_vec();
        if self.descriptor.delayed_job {
            purposes.push("delayed_job");
        }
        for purpose in purposes {
            self.declare(
                Resource::file(self.settings.log_file(self.app, purpose), self.owned(), None)
                    .with_action(Action::CreateIfMissing),
            )?;
        }
        Ok(())
    }

    fn init_script(&mut self) -> Result<(), ConvergeError> {
        let script = self.template(TemplateKind::InitScript, Ownership::of("root").mode(0o700))?;
        self.declare(script)?;
        self.declare(Resource::service(self.app.as_str()).with_action(Action::Enable))
    }

    fn nginx_site(&mut self) -> Result<(), ConvergeError> {
        let nginx = ResourceId::service("nginx");
        self.declare(Resource::service("nginx"))?;

        let site = self
            .template(TemplateKind::NginxSite, Ownership::new().mode(0o644))?
            .notifies(Action::Reload, nginx.clone());
        let available = PathBuf::from(&site.id.key);
        self.declare(site)?;

        let enabled = self.settings.nginx_dir.join("sites-enabled");
        self.declare(
            Resource::link(enabled.join(self.app.as_str()), available)
                .notifies(Action::Reload, nginx.clone()),
        )?;
        self.declare(
            Resource::link(
                enabled.join("default"),
                self.settings.nginx_dir.join("sites-available").join("default"),
            )
            .with_action(Action::Delete)
            .notifies(Action::Reload, nginx),
        )
    }

    fn database(&mut self) -> Result<(), ConvergeError> {
        let creds = self.descriptor.database_credentials()?;
        self.declare(Resource::new(
            &creds.username,
            ResourceSpec::DatabaseUser {
                username: creds.username.clone(),
                password: creds.password.clone(),
            },
        ))?;
        self.declare(
            Resource::new(
                &creds.name,
                ResourceSpec::Database {
                    name: creds.name.clone(),
                    owner: creds.username.clone(),
                },
            )
            .not_if(format!("psql --list | grep -q {}", creds.name), Some("postgres")),
        )
    }

    fn database_backup(&mut self) -> Result<(), ConvergeError> {
        let creds = self.descriptor.database_credentials()?;
        self.declare(Resource::file(AWS_CLI, Ownership::new().mode(0o755), self.source("aws")))?;
        self.declare(Resource::file(
            AWS_SECRET,
            Ownership::new().mode(0o600),
            self.source("awssecret"),
        ))?;
        self.declare(Resource::file(
            BACKUP_SCRIPT,
            Ownership::new().mode(0o755),
            self.source("backup-postgres"),
        ))?;

        let primary = self.descriptor.primary_server_name().unwrap_or_default();
        let command = format!(
            "{BACKUP_SCRIPT} -f {}.dump -d {} -u {} -w {} -t {} -k {BACKUP_RETENTION_DAYS}",
            self.app,
            shell_quote(&creds.name),
            shell_quote(&creds.username),
            shell_quote(&creds.password),
            shell_quote(primary),
        );
        self.declare(Resource::new(
            "database backup",
            ResourceSpec::Cron {
                file: self
                    .settings
                    .cron_dir
                    .join(format!("{}-database-backup", self.app)),
                minute: "0".to_string(),
                hour: "0".to_string(),
                user: "root".to_string(),
                command,
            },
        ))
    }

    fn deploy_key(&mut self) -> Result<(), ConvergeError> {
        let settings = self.settings;
        let owner = Ownership::new().owner(self.app.as_str());
        let key_dir: &Path = &settings.deploy_key_dir;
        self.declare(Resource::directory(key_dir.join(".ssh"), owner.clone()).recursive())?;
        self.declare(Resource::file(
            settings.ssh_wrapper(),
            owner.clone().mode(0o700),
            self.source("ssh/deploy-ssh-wrapper.sh"),
        ))?;
        self.declare(Resource::file(
            key_dir.join(".ssh").join("id_deploy"),
            owner.mode(0o600),
            self.source("ssh/id_deploy"),
        ))
    }

    fn delayed_job(&mut self) -> Result<(), ConvergeError> {
        let monit = ResourceId::service("monit");
        self.declare(Resource::service("monit"))?;
        let conf = self
            .template(TemplateKind::DelayedJobMonit, Ownership::of("root").mode(0o644))?
            .notifies(Action::Restart, monit);
        self.declare(conf)
    }

    fn shared_state(&mut self) -> Result<(), ConvergeError> {
        let deploy_to = self.settings.deploy_to(self.app);
        self.declare(Resource::directory(deploy_to.join("releases"), self.owned()))?;
        let shared = deploy_to.join("shared");
        self.declare(Resource::directory(&shared, self.owned()))?;
        for dir in SHARED_DIRS {
            self.declare(Resource::directory(shared.join(dir), self.owned()))?;
        }
        let unicorn = self.template(TemplateKind::UnicornConfig, self.owned())?;
        self.declare(unicorn)
    }
}
