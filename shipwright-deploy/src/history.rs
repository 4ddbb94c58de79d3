//! Release history: `<deploy_to>/releases.json`.
//!
//! Records every release in creation order with its requested revision,
//! resolved commit and status. Writes use the atomic `.tmp` + rename pattern.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, ReleaseError};
use crate::paths::history_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Fetched,
    Linked,
    Migrated,
    Active,
    Superseded,
    Failed,
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleaseStatus::Fetched => "fetched",
            ReleaseStatus::Linked => "linked",
            ReleaseStatus::Migrated => "migrated",
            ReleaseStatus::Active => "active",
            ReleaseStatus::Superseded => "superseded",
            ReleaseStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub id: String,
    /// Revision as requested by the descriptor (tag, branch or SHA).
    pub revision: String,
    /// Commit the revision resolved to.
    pub commit: String,
    pub created_at: DateTime<Utc>,
    pub status: ReleaseStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseHistory {
    pub releases: Vec<ReleaseRecord>,
}

impl ReleaseHistory {
    pub fn get(&self, id: &str) -> Option<&ReleaseRecord> {
        self.releases.iter().find(|r| r.id == id)
    }

    pub fn active(&self) -> Option<&ReleaseRecord> {
        self.releases
            .iter()
            .rev()
            .find(|r| r.status == ReleaseStatus::Active)
    }

    /// Most recent superseded release created before `before` (or before
    /// the end of history when `None`).
    pub fn previous(&self, before: Option<&str>) -> Option<&ReleaseRecord> {
        let end = before
            .and_then(|id| self.releases.iter().position(|r| r.id == id))
            .unwrap_or(self.releases.len());
        self.releases[..end]
            .iter()
            .rev()
            .find(|r| r.status == ReleaseStatus::Superseded)
    }

    pub fn set_status(&mut self, id: &str, status: ReleaseStatus) {
        if let Some(r) = self.releases.iter_mut().find(|r| r.id == id) {
            r.status = status;
        }
    }

    /// Make `id` the only active release; the previous one becomes
    /// superseded.
    pub fn mark_active(&mut self, id: &str) {
        for r in &mut self.releases {
            if r.id == id {
                r.status = ReleaseStatus::Active;
            } else if r.status == ReleaseStatus::Active {
                r.status = ReleaseStatus::Superseded;
            }
        }
    }
}

/// Load the history, or an empty one when the file does not exist yet.
pub fn load_at(deploy_to: &Path) -> Result<ReleaseHistory, ReleaseError> {
    let path = history_path(deploy_to);
    if !path.exists() {
        return Ok(ReleaseHistory::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_json::from_str(&contents).map_err(|source| ReleaseError::History { path, source })
}

pub fn save_at(deploy_to: &Path, history: &ReleaseHistory) -> Result<(), ReleaseError> {
    let path = history_path(deploy_to);
    std::fs::create_dir_all(deploy_to).map_err(|e| io_err(deploy_to, e))?;
    let json = serde_json::to_string_pretty(history).map_err(|source| ReleaseError::History {
        path: path.clone(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn record(id: &str, status: ReleaseStatus) -> ReleaseRecord {
        ReleaseRecord {
            id: id.to_string(),
            revision: "main".to_string(),
            commit: format!("commit-{id}"),
            created_at: Utc::now(),
            status,
        }
    }

    #[test]
    fn empty_history_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(load_at(tmp.path()).unwrap().releases.is_empty());
    }

    #[test]
    fn save_then_load_keeps_order_and_cleans_tmp() {
        let tmp = TempDir::new().unwrap();
        let history = ReleaseHistory {
            releases: vec![record("1", ReleaseStatus::Superseded), record("2", ReleaseStatus::Active)],
        };
        save_at(tmp.path(), &history).unwrap();
        assert_eq!(load_at(tmp.path()).unwrap(), history);
        assert!(!history_path(tmp.path()).with_extension("json.tmp").exists());
    }

    #[test]
    fn malformed_history_names_the_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(history_path(tmp.path()), "{not json").unwrap();
        let err = load_at(tmp.path()).unwrap_err();
        assert!(matches!(err, ReleaseError::History { .. }));
        assert!(err.to_string().contains("releases.json"));
    }

    #[test]
    fn mark_active_supersedes_the_previous_release() {
        let mut h = ReleaseHistory {
            releases: vec![record("1", ReleaseStatus::Active), record("2", ReleaseStatus::Migrated)],
        };
        h.mark_active("2");
        assert_eq!(h.get("1").unwrap().status, ReleaseStatus::Superseded);
        assert_eq!(h.active().unwrap().id, "2");
        assert_eq!(
            h.releases.iter().filter(|r| r.status == ReleaseStatus::Active).count(),
            1
        );
    }

    #[rstest]
    #[case(None, Some("1"))]
    #[case(Some("3"), Some("1"))]
    #[case(Some("2"), Some("1"))]
    #[case(Some("1"), None)]
    #[case(Some("unknown"), Some("1"))]
    fn previous_skips_failed_releases(#[case] before: Option<&str>, #[case] expected: Option<&str>) {
        let h = ReleaseHistory {
            releases: vec![
                record("1", ReleaseStatus::Superseded),
                record("2", ReleaseStatus::Failed),
                record("3", ReleaseStatus::Active),
            ],
        };
        assert_eq!(h.previous(before).map(|r| r.id.as_str()), expected);
    }
}
