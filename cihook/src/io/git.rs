//! Git adapter for the hook runner.
//!
//! Git is the state-synchronization mechanism: the pipeline script is read
//! straight from the object store and workspaces are plain clones. We keep a
//! small, explicit wrapper around `git` subprocess calls instead of touching
//! repository internals.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::error::CihookError;
use crate::io::process::{CommandOutput, Stream, run_command_with_timeout};

/// Wrapper for executing git commands in a directory (bare repos included).
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    timeout: Option<Duration>,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: None,
        }
    }

    /// Bound every git call made through this wrapper.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Read the exact bytes of `file` as of the tip of `branch` without a
    /// checkout.
    ///
    /// Returns `None` when the branch or the file does not exist.
    #[instrument(skip_all, fields(branch = %branch, file = %file))]
    pub fn show_file(&self, branch: &str, file: &str) -> Result<Option<Vec<u8>>> {
        let spec = format!("{branch}:{file}");
        if !self.object_exists(&spec)? {
            debug!(%spec, "object not found");
            return Ok(None);
        }
        let output = self.run_checked(&["show", &spec])?;
        Ok(Some(output.stdout))
    }

    /// True if `spec` resolves to an object in this repository.
    pub fn object_exists(&self, spec: &str) -> Result<bool> {
        let output = self.run(&["rev-parse", "--verify", "--quiet", spec])?;
        Ok(output.success())
    }

    /// Clone `repository` at `branch` into `dest`, running from this workdir.
    #[instrument(skip_all, fields(branch = %branch))]
    pub fn clone_branch(&self, repository: &str, branch: &str, dest: &Path) -> Result<()> {
        info!(repository, dest = %dest.display(), "cloning");
        let dest = dest.to_string_lossy();
        self.run_checked(&["clone", "--branch", branch, repository, dest.as_ref()])?;
        Ok(())
    }

    /// Bring an existing clone to the tip of `branch` on `origin`.
    ///
    /// Local changes left behind by an earlier pipeline run are discarded, and a
    /// force-pushed branch converges instead of failing a fast-forward.
    #[instrument(skip_all, fields(branch = %branch))]
    pub fn update_branch(&self, branch: &str) -> Result<()> {
        info!(workdir = %self.workdir.display(), "updating clone");
        let remote_ref = format!("origin/{branch}");
        self.run_checked(&["fetch", "origin", branch])?;
        self.run_checked(&["checkout", branch])?;
        self.run_checked(&["reset", "--hard", &remote_ref])?;
        Ok(())
    }

    /// Current `HEAD` commit id.
    pub fn head(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(output.stdout_lossy())
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(args)?;
        if !output.success() {
            let stderr = output.stderr_lossy();
            let err = CihookError::Execution {
                command: format!("git {}", args.join(" ")),
                exit_code: output.status.code(),
                timed_out: output.timed_out,
            };
            return Err(anyhow::Error::new(err).context(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        run_command_with_timeout(cmd, Stream::Capture, Stream::Capture, self.timeout)
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
