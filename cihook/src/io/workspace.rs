//! Per-repository, per-branch workspace directories.
//!
//! The filesystem is the only durable state: paths are derived fresh on every
//! run and directories are created lazily or removed by clean directives.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::slug::slug_hash;

/// Directory under the workspace root holding branch lock files.
pub const LOCKS_DIR: &str = ".locks";

/// Derived workspace locations for one repository and branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub workspace_root: PathBuf,
    /// `<root>/<slug_hash(last segment of repo)>`
    pub project_path: PathBuf,
    /// `<project_path>/<slug_hash(branch)>`
    pub branch_path: PathBuf,
}

impl WorkspacePaths {
    pub fn resolve(workspace_root: &Path, repository: &str, branch: &str) -> Self {
        let project_path = workspace_root.join(slug_hash(last_segment(repository)));
        let branch_path = project_path.join(slug_hash(branch));
        Self {
            workspace_root: workspace_root.to_path_buf(),
            project_path,
            branch_path,
        }
    }

    /// Lock file serializing runs on this branch workspace.
    ///
    /// Kept outside `project_path` so cleans never remove a held lock.
    pub fn lock_path(&self) -> PathBuf {
        let mut path = self.workspace_root.join(LOCKS_DIR);
        if let Some(project) = self.project_path.file_name() {
            path.push(project);
        }
        if let Some(branch) = self.branch_path.file_name() {
            let mut name = branch.to_os_string();
            name.push(".lock");
            path.push(name);
        }
        path
    }

    /// Create the project directory. The branch directory is left to `clone`.
    pub fn ensure_project_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.project_path)
            .with_context(|| format!("create project dir {}", self.project_path.display()))
    }

    /// Remove the project directory and every branch workspace in it.
    pub fn clean_project(&self) -> Result<()> {
        info!(path = %self.project_path.display(), "cleaning project workspace");
        remove_dir_if_exists(&self.project_path)
    }

    pub fn clean_branch(&self) -> Result<()> {
        info!(path = %self.branch_path.display(), "cleaning branch workspace");
        remove_dir_if_exists(&self.branch_path)
    }
}

/// Human-readable part of a repository locator: text after the final `/`.
///
/// Trailing separators are ignored and `\` counts as a separator.
pub fn last_segment(repository: &str) -> &str {
    let trimmed = repository.trim_end_matches(['/', '\\']);
    match trimmed.rfind(['/', '\\']) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Remove every project workspace under `workspace_root`.
///
/// The root itself and the lock directory are kept. Returns how many project
/// directories were removed.
pub fn clean_workspace(workspace_root: &Path) -> Result<usize> {
    let entries = match fs::read_dir(workspace_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => {
            return Err(err).with_context(|| format!("read {}", workspace_root.display()));
        }
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry.context("read entry")?;
        if entry.file_name() == LOCKS_DIR {
            continue;
        }
        let path = entry.path();
        if entry.file_type().context("read file type")?.is_dir() {
            remove_dir_if_exists(&path)?;
            removed += 1;
        }
    }
    info!(removed, root = %workspace_root.display(), "cleaned workspace");
    Ok(removed)
}

/// Recursive delete; a missing path is not an error.
fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "nothing to clean");
            Ok(())
        }
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}
