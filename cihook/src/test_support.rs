//! Test-only helpers: a scratch bare repository plus workspace root.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::io::config::Settings;

pub const PIPELINE_FILE: &str = "cihook.lua";

/// A bare repository (what a git server hosts) fed from a scratch clone.
///
/// Layout under one temp dir:
/// - `src/`: working clone used to author commits
/// - `origin.git/`: bare repository the hook runs against
/// - `workspace/`: workspace root for runs
pub struct TestRepo {
    temp: TempDir,
}

impl TestRepo {
    /// Create a repository whose `branch` holds a README and, optionally, a
    /// pipeline script.
    pub fn new(branch: &str, pipeline: Option<&str>) -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let repo = Self { temp };
        let src = repo.src_path();
        fs::create_dir_all(&src).with_context(|| format!("create {}", src.display()))?;

        run_git(&src, &["init"])?;
        run_git(&src, &["config", "user.name", "Cihook Test"])?;
        run_git(&src, &["config", "user.email", "cihook-test@local.invalid"])?;
        run_git(&src, &["config", "commit.gpgsign", "false"])?;
        run_git(&src, &["checkout", "-b", branch])?;

        fs::write(src.join("README.txt"), "seed\n").context("write README.txt")?;
        if let Some(script) = pipeline {
            fs::write(src.join(PIPELINE_FILE), script).context("write pipeline")?;
        }
        run_git(&src, &["add", "."])?;
        run_git(&src, &["commit", "-m", "chore: seed"])?;

        let bare = repo.bare_path();
        let bare_arg = bare.to_string_lossy().to_string();
        run_git(repo.temp.path(), &["clone", "--bare", "src", &bare_arg])?;
        run_git(&src, &["remote", "add", "origin", &bare_arg])?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn src_path(&self) -> PathBuf {
        self.temp.path().join("src")
    }

    pub fn bare_path(&self) -> PathBuf {
        self.temp.path().join("origin.git")
    }

    /// Repository locator as the hook receives it.
    pub fn locator(&self) -> String {
        self.bare_path().to_string_lossy().to_string()
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.temp.path().join("workspace")
    }

    /// Settings pointing at this repo's workspace root.
    pub fn settings(&self) -> Settings {
        Settings {
            workspace: self.workspace_root(),
            ..Settings::default()
        }
    }

    /// Commit `contents` to `path` on `branch` and push it to the bare repo.
    ///
    /// The branch is created from the current `HEAD` if it does not exist.
    pub fn commit_file(&self, branch: &str, path: &str, contents: &str) -> Result<()> {
        self.commit_bytes(branch, path, contents.as_bytes())
    }

    /// Like [`TestRepo::commit_file`] for arbitrary bytes.
    pub fn commit_bytes(&self, branch: &str, path: &str, contents: &[u8]) -> Result<()> {
        let src = self.src_path();
        let exists = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", branch])
            .current_dir(&src)
            .output()
            .context("git rev-parse")?
            .status
            .success();
        if exists {
            run_git(&src, &["checkout", branch])?;
        } else {
            run_git(&src, &["checkout", "-b", branch])?;
        }
        let file = src.join(path);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&file, contents).with_context(|| format!("write {}", file.display()))?;
        run_git(&src, &["add", "."])?;
        run_git(&src, &["commit", "-m", &format!("update {path}")])?;
        run_git(&src, &["push", "origin", branch])?;
        Ok(())
    }

    /// Tip commit of `branch` in the bare repo.
    pub fn tip(&self, branch: &str) -> Result<String> {
        Ok(run_git(&self.bare_path(), &["rev-parse", branch])?
            .trim()
            .to_string())
    }
}

fn run_git(root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("run git {:?}", args))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {:?} failed: {}", args, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
