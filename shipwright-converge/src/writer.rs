//! Hash-gated atomic writes.
//!
//! 1. SHA-256 the desired content.
//! 2. SHA-256 what is on disk (if anything) and skip when identical.
//! 3. Write `<path>.shipwright.tmp`, apply the mode to the temp file.
//! 4. Rename over the final path (atomic on POSIX); remove the temp file on
//!    failure so a half-written file is never observed.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{io_err, ApplyError};

/// Outcome of [`write_if_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    Written { path: PathBuf },
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn changed(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }
}

pub fn digest(content: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(content);
    hex::encode(h.finalize())
}

fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.shipwright.tmp", path.display()))
}

/// Write `content` to `path` unless the file already holds exactly that
/// content. The parent directory must exist.
pub fn write_if_changed(
    path: &Path,
    content: &[u8],
    mode: Option<u32>,
) -> Result<WriteResult, ApplyError> {
    if path.is_file() {
        let current = std::fs::read(path).map_err(|e| io_err(path, e))?;
        if digest(&current) == digest(content) {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
    }
    write_atomic(path, content, mode)?;
    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// Unconditional `.tmp` + rename write.
pub fn write_atomic(path: &Path, content: &[u8], mode: Option<u32>) -> Result<(), ApplyError> {
    write_atomic_with_tmp(path, content, mode, &tmp_path(path))
}

fn write_atomic_with_tmp(
    path: &Path,
    content: &[u8],
    mode: Option<u32>,
    tmp: &Path,
) -> Result<(), ApplyError> {
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;
    if let Some(mode) = mode {
        if let Err(e) = std::fs::set_permissions(tmp, std::fs::Permissions::from_mode(mode)) {
            let _ = std::fs::remove_file(tmp);
            return Err(io_err(tmp, e));
        }
    }
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
