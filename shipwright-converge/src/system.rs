//! `SystemHandler`: the production [`ResourceHandler`].
//!
//! Filesystem resources (directory, file, template, link, cron) are applied
//! directly with atomic hash-gated writes. Accounts, services and database
//! objects go through the [`CommandRunner`] so they can be scripted in tests.
//! Every branch inspects current state first and reports
//! [`ApplyOutcome::Unchanged`] when nothing needs to change.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shipwright_core::{shell_quote, CommandOutput, CommandRunner, CommandSpec};

use crate::error::{io_err, ApplyError};
use crate::handler::{ApplyOutcome, ResourceHandler};
use crate::resource::{Action, Content, Ownership, Resource, ResourceSpec, ResourceType};
use crate::writer::{write_atomic, write_if_changed};

/// Directory scanned for SysV start links when checking `enable`.
const RC_DIR: &str = "/etc/rc2.d";

pub struct SystemHandler<'a> {
    runner: &'a dyn CommandRunner,
    timeout: Option<Duration>,
}

impl<'a> SystemHandler<'a> {
    pub fn new(runner: &'a dyn CommandRunner, timeout: Option<Duration>) -> Self {
        Self { runner, timeout }
    }

    fn spec(&self, command: impl Into<String>) -> CommandSpec {
        let spec = CommandSpec::new(command);
        match self.timeout {
            Some(t) => spec.timeout(t),
            None => spec,
        }
    }

    /// Run and return the output whatever the exit code.
    fn probe(&self, spec: CommandSpec) -> Result<CommandOutput, ApplyError> {
        Ok(self.runner.run(&spec)?)
    }

    /// Run and require exit 0.
    fn exec(&self, spec: CommandSpec) -> Result<CommandOutput, ApplyError> {
        let output = self.runner.run(&spec)?;
        if !output.success() {
            return Err(ApplyError::Command {
                command: spec.command,
                code: output.code,
                output: output.combined(),
            });
        }
        Ok(output)
    }

    // -- ownership ----------------------------------------------------------

    fn ensure_ownership(&self, path: &Path, ownership: &Ownership) -> Result<bool, ApplyError> {
        let mut changed = false;

        if let Some(mode) = ownership.mode {
            let meta = std::fs::metadata(path).map_err(|e| io_err(path, e))?;
            if meta.permissions().mode() & 0o7777 != mode {
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| io_err(path, e))?;
                changed = true;
            }
        }

        if ownership.owner.is_none() && ownership.group.is_none() {
            return Ok(changed);
        }
        let quoted = shell_quote(&path.display().to_string());
        let current = self.exec(self.spec(format!("stat -c %U:%G {quoted}")))?;
        let current = current.stdout.trim();
        let (cur_owner, cur_group) = current.split_once(':').unwrap_or((current, ""));
        let owner = ownership.owner.as_deref().unwrap_or(cur_owner);
        let group = ownership.group.as_deref().unwrap_or(cur_group);
        if owner != cur_owner || group != cur_group {
            self.exec(self.spec(format!("chown {owner}:{group} {quoted}")))?;
            changed = true;
        }
        Ok(changed)
    }

    // -- per type -----------------------------------------------------------

    fn apply_directory(
        &self,
        path: &Path,
        ownership: &Ownership,
        recursive: bool,
        action: Action,
    ) -> Result<ApplyOutcome, ApplyError> {
        match action {
            Action::Create => {
                let mut changed = false;
                if !path.is_dir() {
                    let result = if recursive {
                        std::fs::create_dir_all(path)
                    } else {
                        std::fs::create_dir(path)
                    };
                    result.map_err(|e| io_err(path, e))?;
                    changed = true;
                }
                changed |= self.ensure_ownership(path, ownership)?;
                Ok(outcome(changed))
            }
            Action::Delete => {
                if !path.exists() {
                    return Ok(ApplyOutcome::Unchanged);
                }
                std::fs::remove_dir_all(path).map_err(|e| io_err(path, e))?;
                Ok(ApplyOutcome::Updated)
            }
            other => Err(ApplyError::Unsupported {
                kind: ResourceType::Directory,
                action: other,
            }),
        }
    }

    fn apply_file(
        &self,
        path: &Path,
        ownership: &Ownership,
        content: Option<Vec<u8>>,
        action: Action,
    ) -> Result<ApplyOutcome, ApplyError> {
        match action {
            Action::Create | Action::CreateIfMissing => {
                let exists = path.exists();
                let mut changed = false;
                match content {
                    _ if exists && action == Action::CreateIfMissing => {}
                    Some(bytes) => {
                        changed = write_if_changed(path, &bytes, ownership.mode)?.changed();
                    }
                    None if !exists => {
                        write_atomic(path, b"", ownership.mode)?;
                        changed = true;
                    }
                    None => {}
                }
                changed |= self.ensure_ownership(path, ownership)?;
                Ok(outcome(changed))
            }
            Action::Delete => remove_file(path),
            other => Err(ApplyError::Unsupported {
                kind: ResourceType::File,
                action: other,
            }),
        }
    }

    fn apply_link(&self, path: &Path, to: &Path, action: Action) -> Result<ApplyOutcome, ApplyError> {
        let existing = std::fs::symlink_metadata(path).ok();
        match action {
            Action::Create => {
                if let Some(meta) = existing.as_ref() {
                    if !meta.file_type().is_symlink() {
                        return Err(ApplyError::Conflict {
                            path: path.to_path_buf(),
                            reason: "exists and is not a symlink".to_string(),
                        });
                    }
                    let current = std::fs::read_link(path).map_err(|e| io_err(path, e))?;
                    if current.as_path() == to {
                        return Ok(ApplyOutcome::Unchanged);
                    }
                }
                replace_symlink(path, to)?;
                Ok(ApplyOutcome::Updated)
            }
            Action::Delete => match existing {
                None => Ok(ApplyOutcome::Unchanged),
                Some(meta) if meta.file_type().is_symlink() => {
                    std::fs::remove_file(path).map_err(|e| io_err(path, e))?;
                    Ok(ApplyOutcome::Updated)
                }
                Some(_) => Err(ApplyError::Conflict {
                    path: path.to_path_buf(),
                    reason: "is not a symlink".to_string(),
                }),
            },
            other => Err(ApplyError::Unsupported {
                kind: ResourceType::Link,
                action: other,
            }),
        }
    }

    fn apply_service(&self, name: &str, action: Action) -> Result<ApplyOutcome, ApplyError> {
        let enabled_check = format!("ls {RC_DIR}/S[0-9][0-9]{name} >/dev/null 2>&1");
        match action {
            Action::Nothing => Ok(ApplyOutcome::Unchanged),
            Action::Enable => {
                if self.probe(self.spec(&enabled_check))?.success() {
                    return Ok(ApplyOutcome::Unchanged);
                }
                self.exec(self.spec(format!("update-rc.d {name} defaults")))?;
                Ok(ApplyOutcome::Updated)
            }
            Action::Disable => {
                if !self.probe(self.spec(&enabled_check))?.success() {
                    return Ok(ApplyOutcome::Unchanged);
                }
                self.exec(self.spec(format!("update-rc.d -f {name} remove")))?;
                Ok(ApplyOutcome::Updated)
            }
            Action::Start | Action::Stop | Action::Restart | Action::Reload => {
                self.exec(self.spec(format!("service {name} {action}")))?;
                Ok(ApplyOutcome::Updated)
            }
            other => Err(ApplyError::Unsupported {
                kind: ResourceType::Service,
                action: other,
            }),
        }
    }

    fn apply_account(
        &self,
        resource: &Resource,
        action: Action,
    ) -> Result<ApplyOutcome, ApplyError> {
        let name = resource.id.key.as_str();
        let (exists_cmd, create_cmd, delete_cmd) = match &resource.spec {
            ResourceSpec::Group => (
                format!("getent group {name}"),
                format!("groupadd {name}"),
                format!("groupdel {name}"),
            ),
            ResourceSpec::User {
                gid,
                home,
                shell,
                manage_home,
            } => {
                let mut create = String::from("useradd");
                if let Some(gid) = gid {
                    create.push_str(&format!(" -g {gid}"));
                }
                create.push_str(&format!(
                    " -d {} -s {}",
                    shell_quote(&home.display().to_string()),
                    shell_quote(shell)
                ));
                if *manage_home {
                    create.push_str(" -m");
                }
                create.push_str(&format!(" {name}"));
                (format!("id -u {name}"), create, format!("userdel {name}"))
            }
            _ => unreachable_kind(resource, action)?,
        };
        let exists = self.probe(self.spec(exists_cmd))?.success();
        match action {
            Action::Create if exists => Ok(ApplyOutcome::Unchanged),
            Action::Create => {
                self.exec(self.spec(create_cmd))?;
                Ok(ApplyOutcome::Updated)
            }
            Action::Delete if !exists => Ok(ApplyOutcome::Unchanged),
            Action::Delete => {
                self.exec(self.spec(delete_cmd))?;
                Ok(ApplyOutcome::Updated)
            }
            other => Err(ApplyError::Unsupported {
                kind: resource.id.kind,
                action: other,
            }),
        }
    }

    fn apply_cron(&self, resource: &Resource, action: Action) -> Result<ApplyOutcome, ApplyError> {
        let ResourceSpec::Cron {
            file,
            minute,
            hour,
            user,
            command,
        } = &resource.spec
        else {
            return unreachable_kind(resource, action);
        };
        match action {
            Action::Create => {
                let entry = format!(
                    "# shipwright: {}\n{minute} {hour} * * * {user} {command}\n",
                    resource.id.key
                );
                let written = write_if_changed(file, entry.as_bytes(), Some(0o644))?;
                Ok(outcome(written.changed()))
            }
            Action::Delete => remove_file(file),
            other => Err(ApplyError::Unsupported {
                kind: resource.id.kind,
                action: other,
            }),
        }
    }

    fn apply_execute(
        &self,
        command: &str,
        user: Option<&str>,
        cwd: Option<&Path>,
        env: &BTreeMap<String, String>,
        action: Action,
    ) -> Result<ApplyOutcome, ApplyError> {
        if action != Action::Run {
            return Err(ApplyError::Unsupported {
                kind: ResourceType::Execute,
                action,
            });
        }
        let mut spec = self.spec(command).user_opt(user).envs(env);
        if let Some(cwd) = cwd {
            spec = spec.cwd(cwd);
        }
        self.exec(spec)?;
        Ok(ApplyOutcome::Updated)
    }

    /// Create the role when missing; reset its password only when the
    /// desired one does not authenticate.
    fn apply_database_user(
        &self,
        username: &str,
        password: &str,
        action: Action,
    ) -> Result<ApplyOutcome, ApplyError> {
        if action != Action::Create {
            return Err(ApplyError::Unsupported {
                kind: ResourceType::DatabaseUser,
                action,
            });
        }
        let role_query = format!("SELECT 1 FROM pg_roles WHERE rolname='{username}'");
        let exists = self
            .probe(
                self.spec(format!("psql -tAc {} | grep -q 1", shell_quote(&role_query)))
                    .user("postgres"),
            )?
            .success();
        let alter = format!(
            "psql postgres -tAc {}",
            shell_quote(&format!(
                "ALTER USER \"{username}\" WITH PASSWORD '{}'",
                password.replace('\'', "''")
            ))
        );

        if !exists {
            self.exec(
                self.spec(format!("createuser -U postgres -SDRw {username}"))
                    .user("postgres"),
            )?;
            self.exec(self.spec(alter).user("postgres"))?;
            return Ok(ApplyOutcome::Updated);
        }

        let authenticates = self
            .probe(
                self.spec(format!(
                    "psql -h localhost -U {username} -d postgres -tAc 'SELECT 1'"
                ))
                .env("PGPASSWORD", password),
            )?
            .success();
        if authenticates {
            return Ok(ApplyOutcome::Unchanged);
        }
        self.exec(self.spec(alter).user("postgres"))?;
        Ok(ApplyOutcome::Updated)
    }

    fn apply_database(&self, name: &str, owner: &str, action: Action) -> Result<ApplyOutcome, ApplyError> {
        if action != Action::Create {
            return Err(ApplyError::Unsupported {
                kind: ResourceType::Database,
                action,
            });
        }
        self.exec(
            self.spec(format!(
                "createdb -U postgres -O {owner} -E utf8 -l 'en_US.utf8' -T template0 {name}"
            ))
            .user("postgres"),
        )?;
        Ok(ApplyOutcome::Updated)
    }
}

impl ResourceHandler for SystemHandler<'_> {
    fn apply(&self, resource: &Resource, action: Action) -> Result<ApplyOutcome, ApplyError> {
        let path = PathBuf::from(&resource.id.key);
        match &resource.spec {
            ResourceSpec::User { .. } | ResourceSpec::Group => self.apply_account(resource, action),
            ResourceSpec::Directory {
                ownership,
                recursive,
            } => self.apply_directory(&path, ownership, *recursive, action),
            ResourceSpec::File { ownership, content } => {
                let bytes = match content {
                    None => None,
                    Some(Content::Inline(text)) => Some(text.clone().into_bytes()),
                    Some(Content::Source(src)) => {
                        Some(std::fs::read(src).map_err(|e| io_err(src, e))?)
                    }
                };
                self.apply_file(&path, ownership, bytes, action)
            }
            ResourceSpec::Template {
                ownership,
                rendered,
                ..
            } => self.apply_file(&path, ownership, Some(rendered.clone().into_bytes()), action),
            ResourceSpec::Link { to } => self.apply_link(&path, to, action),
            ResourceSpec::Service => self.apply_service(&resource.id.key, action),
            ResourceSpec::Cron { .. } => self.apply_cron(resource, action),
            ResourceSpec::Execute {
                command,
                user,
                cwd,
                env,
            } => self.apply_execute(command, user.as_deref(), cwd.as_deref(), env, action),
            ResourceSpec::DatabaseUser { username, password } => {
                self.apply_database_user(username, password, action)
            }
            ResourceSpec::Database { name, owner } => self.apply_database(name, owner, action),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn outcome(changed: bool) -> ApplyOutcome {
    if changed {
        ApplyOutcome::Updated
    } else {
        ApplyOutcome::Unchanged
    }
}

fn unreachable_kind<T>(resource: &Resource, action: Action) -> Result<T, ApplyError> {
    Err(ApplyError::Unsupported {
        kind: resource.id.kind,
        action,
    })
}

fn remove_file(path: &Path) -> Result<ApplyOutcome, ApplyError> {
    if std::fs::symlink_metadata(path).is_err() {
        return Ok(ApplyOutcome::Unchanged);
    }
    std::fs::remove_file(path).map_err(|e| io_err(path, e))?;
    Ok(ApplyOutcome::Updated)
}

/// Point `path` at `to` without a window where `path` is missing.
pub fn replace_symlink(path: &Path, to: &Path) -> Result<(), ApplyError> {
    let tmp = PathBuf::from(format!("{}.shipwright.tmp", path.display()));
    let _ = std::fs::remove_file(&tmp);
    std::os::unix::fs::symlink(to, &tmp).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::ScriptedRunner;
    use std::fs;
    use tempfile::TempDir;

    fn handler(runner: &ScriptedRunner) -> SystemHandler<'_> {
        SystemHandler::new(runner, None)
    }

    fn apply(runner: &ScriptedRunner, r: &Resource) -> Result<ApplyOutcome, ApplyError> {
        handler(runner).apply(r, r.action)
    }

    #[test]
    fn directory_created_then_unchanged() {
        let tmp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let r = Resource::directory(tmp.path().join("shared"), Ownership::new().mode(0o750));
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);
        let mode = fs::metadata(tmp.path().join("shared")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn non_recursive_directory_needs_parent() {
        let tmp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let r = Resource::directory(tmp.path().join("a/b"), Ownership::new());
        assert!(matches!(apply(&runner, &r), Err(ApplyError::Io { .. })));
        let r = r.recursive();
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
    }

    #[test]
    fn ownership_is_fixed_only_when_different() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("app");
        fs::create_dir(&dir).unwrap();
        let r = Resource::directory(&dir, Ownership::of("blog-prod"));

        let runner = ScriptedRunner::new().succeed("stat -c", "root:root\n");
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(runner.count("chown blog-prod:blog-prod"), 1);

        let runner = ScriptedRunner::new().succeed("stat -c", "blog-prod:blog-prod\n");
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(runner.count("chown"), 0);
    }

    #[test]
    fn create_if_missing_keeps_existing_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.log");
        fs::write(&path, "existing lines").unwrap();
        let runner = ScriptedRunner::new();
        let r = Resource::file(&path, Ownership::new(), None).with_action(Action::CreateIfMissing);
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), "existing lines");
    }

    #[test]
    fn file_from_source_is_copied() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("known_hosts.src");
        fs::write(&src, "github.com ssh-rsa AAAA").unwrap();
        let dest = tmp.path().join("known_hosts");
        let runner = ScriptedRunner::new();
        let r = Resource::file(&dest, Ownership::new().mode(0o600), Some(Content::Source(src)));
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "github.com ssh-rsa AAAA");
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new();
        let r = Resource::file(
            tmp.path().join("aws"),
            Ownership::new(),
            Some(Content::Source(tmp.path().join("no-such-file"))),
        );
        assert!(matches!(apply(&runner, &r), Err(ApplyError::Io { .. })));
    }

    #[test]
    fn link_is_created_repointed_and_protects_real_files() {
        let tmp = TempDir::new().unwrap();
        let link = tmp.path().join("site");
        let runner = ScriptedRunner::new();

        let r = Resource::link(&link, "/etc/nginx/sites-available/a");
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);

        let r = Resource::link(&link, "/etc/nginx/sites-available/b");
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("/etc/nginx/sites-available/b"));

        let real = tmp.path().join("real");
        fs::write(&real, "content").unwrap();
        let r = Resource::link(&real, "/elsewhere");
        assert!(matches!(apply(&runner, &r), Err(ApplyError::Conflict { .. })));
        assert_eq!(fs::read_to_string(&real).unwrap(), "content");
    }

    #[test]
    fn link_delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let link = tmp.path().join("default");
        std::os::unix::fs::symlink("/nowhere", &link).unwrap();
        let runner = ScriptedRunner::new();
        let r = Resource::link(&link, "/nowhere").with_action(Action::Delete);
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);
    }

    #[test]
    fn service_enable_checks_rc_links() {
        let r = Resource::service("blog-prod").with_action(Action::Enable);

        let runner = ScriptedRunner::new();
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(runner.count("update-rc.d"), 0);

        let runner = ScriptedRunner::new().fail("/etc/rc2.d", 2, "");
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(runner.count("update-rc.d blog-prod defaults"), 1);
    }

    #[test]
    fn service_restart_failure_carries_output() {
        let runner = ScriptedRunner::new().fail("service monit restart", 1, "monit: not running");
        let err = handler(&runner)
            .apply(&Resource::service("monit"), Action::Restart)
            .unwrap_err();
        match err {
            ApplyError::Command { code, output, .. } => {
                assert_eq!(code, Some(1));
                assert!(output.contains("not running"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn user_is_created_only_when_missing() {
        let r = Resource::new(
            "blog-prod",
            ResourceSpec::User {
                gid: Some("blog-prod".into()),
                home: PathBuf::from("/home/blog-prod"),
                shell: "/bin/bash".into(),
                manage_home: true,
            },
        );
        let runner = ScriptedRunner::new().fail("id -u blog-prod", 1, "no such user");
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(
            runner.commands()[1],
            "useradd -g blog-prod -d '/home/blog-prod' -s '/bin/bash' -m blog-prod"
        );

        let runner = ScriptedRunner::new();
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(runner.count("useradd"), 0);
    }

    #[test]
    fn database_user_password_reset_only_when_it_fails_to_authenticate() {
        let r = Resource::new(
            "blog",
            ResourceSpec::DatabaseUser {
                username: "blog".into(),
                password: "s3cret".into(),
            },
        );

        let runner = ScriptedRunner::new();
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(runner.count("ALTER USER"), 0);
        let login = runner
            .calls()
            .into_iter()
            .find(|c| c.command.contains("-h localhost"))
            .unwrap();
        assert_eq!(login.env["PGPASSWORD"], "s3cret");
        assert!(!login.command.contains("s3cret"));

        let runner = ScriptedRunner::new().fail("-h localhost", 2, "password authentication failed");
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(runner.count("ALTER USER"), 1);
        assert_eq!(runner.count("createuser"), 0);

        let runner = ScriptedRunner::new().fail("pg_roles", 1, "");
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(runner.count("createuser -U postgres -SDRw blog"), 1);
        assert_eq!(runner.count("ALTER USER"), 1);
    }

    #[test]
    fn cron_file_is_hash_gated() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("blog-prod-backup");
        let r = Resource::new(
            "database backup",
            ResourceSpec::Cron {
                file: file.clone(),
                minute: "0".into(),
                hour: "0".into(),
                user: "root".into(),
                command: "/usr/local/bin/backup-postgres -k 365".into(),
            },
        );
        let runner = ScriptedRunner::new();
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Unchanged);
        let body = fs::read_to_string(&file).unwrap();
        assert!(body.contains("0 0 * * * root /usr/local/bin/backup-postgres -k 365"));
    }

    #[test]
    fn execute_runs_with_user_env_and_cwd() {
        let mut env = BTreeMap::new();
        env.insert("RAILS_ENV".to_string(), "prod".to_string());
        let r = Resource::new(
            "migrate",
            ResourceSpec::Execute {
                command: "bundle exec rake db:migrate".into(),
                user: Some("blog-prod".into()),
                cwd: Some(PathBuf::from("/var/www/blog-prod/current")),
                env,
            },
        );
        let runner = ScriptedRunner::new();
        assert_eq!(apply(&runner, &r).unwrap(), ApplyOutcome::Updated);
        let call = &runner.calls()[0];
        assert_eq!(call.user.as_deref(), Some("blog-prod"));
        assert_eq!(call.env["RAILS_ENV"], "prod");
        assert_eq!(call.cwd, Some(PathBuf::from("/var/www/blog-prod/current")));
    }

    #[test]
    fn unsupported_action_is_reported() {
        let runner = ScriptedRunner::new();
        let r = Resource::service("nginx");
        let err = handler(&runner).apply(&r, Action::Run).unwrap_err();
        assert!(matches!(err, ApplyError::Unsupported { .. }));
    }
}
