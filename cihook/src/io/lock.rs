//! Exclusive advisory lock per branch workspace.
//!
//! Two pushes to the same branch would otherwise race on clone/pull and run
//! their pipelines in the same directory. The second run blocks until the
//! first releases the lock; runs on other branches are unaffected.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::{debug, info};

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct BranchLock {
    file: File,
    path: PathBuf,
}

impl BranchLock {
    /// Block until the lock at `path` is acquired, creating it if needed.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        if file.try_lock_exclusive().is_err() {
            info!(path = %path.display(), "waiting for another run on this branch");
            file.lock_exclusive()
                .with_context(|| format!("lock {}", path.display()))?;
        }
        debug!(path = %path.display(), "branch lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Acquire without blocking; `None` if another run holds the lock.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for BranchLock {
    fn drop(&mut self) {
        if FileExt::unlock(&self.file).is_ok() {
            debug!(path = %self.path.display(), "branch lock released");
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create lock dir {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .with_context(|| format!("open lock file {}", path.display()))
}
