//! Materialising application source into a release directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use shipwright_core::{shell_quote, CommandRunner, CommandSpec};

use crate::error::ReleaseError;

/// Puts the tree for `revision` of `repository` at `dest` (which does not
/// exist yet) and returns the resolved commit.
pub trait Fetcher {
    fn fetch(&self, repository: &str, revision: &str, dest: &Path) -> Result<String, ReleaseError>;
}

/// Shallow git fetch run as the app user, authenticating through the deploy
/// key wrapper.
pub struct GitFetcher<'a> {
    runner: &'a dyn CommandRunner,
    user: Option<String>,
    ssh_wrapper: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl<'a> GitFetcher<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            user: None,
            ssh_wrapper: None,
            timeout: None,
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn ssh_wrapper(mut self, wrapper: impl Into<PathBuf>) -> Self {
        self.ssh_wrapper = Some(wrapper.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn git(&self, command: String, revision: &str) -> Result<String, ReleaseError> {
        let mut spec = CommandSpec::new(command).user_opt(self.user.as_deref());
        if let Some(wrapper) = self.ssh_wrapper.as_ref() {
            spec = spec.env("GIT_SSH", wrapper.display().to_string());
        }
        if let Some(t) = self.timeout {
            spec = spec.timeout(t);
        }
        let fetch_err = |reason: String| ReleaseError::Fetch {
            revision: revision.to_string(),
            reason,
        };
        let output = self
            .runner
            .run(&spec)
            .map_err(|e| fetch_err(e.to_string()))?;
        if !output.success() {
            return Err(fetch_err(output.combined()));
        }
        Ok(output.stdout)
    }
}

impl Fetcher for GitFetcher<'_> {
    fn fetch(&self, repository: &str, revision: &str, dest: &Path) -> Result<String, ReleaseError> {
        let dest_q = shell_quote(&dest.display().to_string());
        tracing::info!(repository, revision, dest = %dest.display(), "fetching");
        self.git(
            format!(
                "git init -q {dest_q} && cd {dest_q} && git remote add origin {} \
                 && git fetch -q --depth 1 origin {} && git checkout -q --detach FETCH_HEAD",
                shell_quote(repository),
                shell_quote(revision),
            ),
            revision,
        )?;
        let commit = self.git(format!("git -C {dest_q} rev-parse HEAD"), revision)?;
        let commit = commit.trim().to_string();
        if commit.is_empty() {
            return Err(ReleaseError::Fetch {
                revision: revision.to_string(),
                reason: "git rev-parse returned nothing".to_string(),
            });
        }
        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::ScriptedRunner;

    #[test]
    fn fetch_runs_as_user_with_ssh_wrapper() {
        let runner = ScriptedRunner::new().succeed("rev-parse", "abc123\n");
        let fetcher = GitFetcher::new(&runner)
            .user("blog-prod")
            .ssh_wrapper("/tmp/private_code/deploy-ssh-wrapper.sh");
        let commit = fetcher
            .fetch("git@example.com:blog.git", "r42", Path::new("/var/www/blog-prod/releases/1"))
            .unwrap();
        assert_eq!(commit, "abc123");

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].command.contains("git fetch -q --depth 1 origin 'r42'"));
        assert!(calls[0].command.contains("'git@example.com:blog.git'"));
        assert_eq!(calls[0].user.as_deref(), Some("blog-prod"));
        assert_eq!(calls[0].env["GIT_SSH"], "/tmp/private_code/deploy-ssh-wrapper.sh");
    }

    #[test]
    fn unknown_revision_is_a_fetch_error() {
        let runner = ScriptedRunner::new().fail(
            "git fetch",
            128,
            "fatal: couldn't find remote ref nope",
        );
        let err = GitFetcher::new(&runner)
            .fetch("repo", "nope", Path::new("/tmp/x"))
            .unwrap_err();
        match err {
            ReleaseError::Fetch { revision, reason } => {
                assert_eq!(revision, "nope");
                assert!(reason.contains("couldn't find remote ref"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.count("rev-parse"), 0);
    }

    #[test]
    fn timeout_is_a_fetch_error() {
        let runner = ScriptedRunner::new().time_out("git init");
        let err = GitFetcher::new(&runner)
            .timeout(Duration::from_secs(1))
            .fetch("repo", "main", Path::new("/tmp/x"))
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Fetch { .. }));
    }
}
