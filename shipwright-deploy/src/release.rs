//! `ReleaseManager`: release directories and the `current` pointer.
//!
//! The manager is the only writer of `<deploy_to>/current`. Every repoint
//! goes through a temporary symlink renamed over the old one, so `current`
//! is never missing and never points at two releases.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;

use shipwright_converge::system::replace_symlink;
use shipwright_core::{shell_quote, ApplicationDescriptor, CommandRunner, CommandSpec};

use crate::error::{io_err, ReleaseError};
use crate::fetch::Fetcher;
use crate::history::{self, ReleaseHistory, ReleaseRecord, ReleaseStatus};
use crate::paths::{
    current_link, release_dir, releases_dir, shared_dir, REVISION_FILE, SHARED_LINKS,
};

/// Id of the release `<deploy_to>/current` points at, if any.
pub fn current_release(deploy_to: &Path) -> Option<String> {
    let target = std::fs::read_link(current_link(deploy_to)).ok()?;
    target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// A release directory created by this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub id: String,
    pub path: PathBuf,
    pub revision: String,
    /// Resolved commit; the token the version probe looks for.
    pub commit: String,
}

pub struct ReleaseManager<'a> {
    deploy_to: PathBuf,
    fetcher: &'a dyn Fetcher,
    purge_before_symlink: Vec<PathBuf>,
    /// When set, the linked release is handed to this user.
    owner: Option<(String, &'a dyn CommandRunner)>,
    timeout: Option<Duration>,
}

impl<'a> ReleaseManager<'a> {
    pub fn new(deploy_to: impl Into<PathBuf>, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            deploy_to: deploy_to.into(),
            fetcher,
            purge_before_symlink: Vec::new(),
            owner: None,
            timeout: None,
        }
    }

    pub fn purge_before_symlink(mut self, paths: Vec<PathBuf>) -> Self {
        self.purge_before_symlink = paths;
        self
    }

    pub fn owner(mut self, user: impl Into<String>, runner: &'a dyn CommandRunner) -> Self {
        self.owner = Some((user.into(), runner));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn deploy_to(&self) -> &Path {
        &self.deploy_to
    }

    pub fn history(&self) -> Result<ReleaseHistory, ReleaseError> {
        history::load_at(&self.deploy_to)
    }

    fn update(&self, f: impl FnOnce(&mut ReleaseHistory)) -> Result<(), ReleaseError> {
        let mut h = self.history()?;
        f(&mut h);
        history::save_at(&self.deploy_to, &h)
    }

    pub fn set_status(&self, id: &str, status: ReleaseStatus) -> Result<(), ReleaseError> {
        tracing::debug!(release = id, %status, "release status");
        self.update(|h| h.set_status(id, status))
    }

    /// Id of the release `current` points at, if any.
    pub fn current(&self) -> Option<String> {
        current_release(&self.deploy_to)
    }

    pub fn list(&self) -> Result<Vec<ReleaseRecord>, ReleaseError> {
        Ok(self.history()?.releases)
    }

    fn next_id(&self) -> String {
        let base = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let mut id = base.clone();
        let mut n = 1;
        while release_dir(&self.deploy_to, &id).exists() {
            id = format!("{base}-{n}");
            n += 1;
        }
        id
    }

    /// Create a new release directory holding `descriptor.revision`.
    pub fn fetch(&self, descriptor: &ApplicationDescriptor) -> Result<Release, ReleaseError> {
        let root = releases_dir(&self.deploy_to);
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        let id = self.next_id();
        let path = release_dir(&self.deploy_to, &id);

        let commit = match self
            .fetcher
            .fetch(&descriptor.repository, &descriptor.revision, &path)
        {
            Ok(commit) => commit,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&path);
                return Err(e);
            }
        };
        let revision_file = path.join(REVISION_FILE);
        std::fs::write(&revision_file, format!("{commit}\n"))
            .map_err(|e| io_err(&revision_file, e))?;

        let record = ReleaseRecord {
            id: id.clone(),
            revision: descriptor.revision.clone(),
            commit: commit.clone(),
            created_at: Utc::now(),
            status: ReleaseStatus::Fetched,
        };
        self.update(|h| h.releases.push(record))?;
        tracing::info!(release = %id, commit = %commit, "fetched");

        Ok(Release {
            id,
            path,
            revision: descriptor.revision.clone(),
            commit,
        })
    }

    /// Link shared state into `release`. Paths listed in
    /// `purge_before_symlink` are removed from the checkout first; any other
    /// real file or directory in the way is an error.
    pub fn link_shared(&self, release: &Release) -> Result<(), ReleaseError> {
        let result = self.link_shared_inner(release);
        let status = if result.is_ok() {
            ReleaseStatus::Linked
        } else {
            ReleaseStatus::Failed
        };
        self.set_status(&release.id, status)?;
        result
    }

    fn link_shared_inner(&self, release: &Release) -> Result<(), ReleaseError> {
        for rel in &self.purge_before_symlink {
            let path = release.path.join(rel);
            match std::fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => {
                    std::fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?
                }
                Ok(_) => std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?,
                Err(_) => {}
            }
        }

        let shared = shared_dir(&self.deploy_to);
        for (from, to) in SHARED_LINKS {
            let link = release.path.join(to);
            let target = shared.join(from);
            if let Ok(meta) = std::fs::symlink_metadata(&link) {
                if !meta.file_type().is_symlink() {
                    return Err(ReleaseError::Link {
                        path: link,
                        reason: "exists in the checkout and is not a symlink".to_string(),
                    });
                }
            }
            if let Some(parent) = link.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            replace_symlink(&link, &target).map_err(|e| ReleaseError::Link {
                path: link.clone(),
                reason: e.to_string(),
            })?;
            tracing::debug!(link = %link.display(), target = %target.display(), "linked");
        }

        if let Some((user, runner)) = self.owner.as_ref() {
            let mut spec = CommandSpec::new(format!(
                "chown -R -h {user}:{user} {}",
                shell_quote(&release.path.display().to_string())
            ));
            if let Some(t) = self.timeout {
                spec = spec.timeout(t);
            }
            let out = runner.run(&spec).map_err(|e| ReleaseError::Link {
                path: release.path.clone(),
                reason: e.to_string(),
            })?;
            if !out.success() {
                return Err(ReleaseError::Link {
                    path: release.path.clone(),
                    reason: out.combined(),
                });
            }
        }
        Ok(())
    }

    /// Atomically point `current` at `release`. Returns the id it pointed at
    /// before, if any.
    pub fn activate(&self, release: &Release) -> Result<Option<String>, ReleaseError> {
        let previous = self.current();
        self.repoint(&release.id)?;
        tracing::info!(release = %release.id, previous = ?previous, "activated");
        Ok(previous)
    }

    /// Atomically point `current` back at an existing release. The release
    /// it moves away from becomes superseded.
    pub fn rollback_to(&self, id: &str) -> Result<(), ReleaseError> {
        self.repoint(id)?;
        tracing::warn!(release = id, "rolled back");
        Ok(())
    }

    /// History is saved before the symlink moves, so an error always means
    /// `current` is where it was.
    fn repoint(&self, id: &str) -> Result<(), ReleaseError> {
        let dir = release_dir(&self.deploy_to, id);
        if !dir.is_dir() {
            return Err(ReleaseError::UnknownRelease { id: id.to_string() });
        }
        let before = self.history()?;
        let mut after = before.clone();
        after.mark_active(id);
        history::save_at(&self.deploy_to, &after)?;

        if let Err(e) = replace_symlink(&current_link(&self.deploy_to), &dir) {
            if let Err(restore) = history::save_at(&self.deploy_to, &before) {
                tracing::warn!(error = %restore, "could not restore release history");
            }
            return Err(ReleaseError::Activate {
                release: id.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }
}
