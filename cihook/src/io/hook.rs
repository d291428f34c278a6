//! Installation of the `post-update` hook stub into a repository.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::error::CihookError;

/// Second line of every stub we write; identifies hooks we own.
pub const HOOK_MARKER: &str = "# installed by cihook";
const HOOK_NAME: &str = "post-update";
const BACKUP_SUFFIX: &str = ".old";

/// What `link` did to `hooks/post-update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Installed { hook: PathBuf },
    /// An earlier cihook stub was rewritten in place.
    Refreshed { hook: PathBuf },
    /// A foreign hook was moved aside before installing.
    BackedUp { hook: PathBuf, backup: PathBuf },
}

impl LinkOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Installed { hook } => format!("Linked: hook installed at {}", hook.display()),
            Self::Refreshed { hook } => format!("Linked: hook refreshed at {}", hook.display()),
            Self::BackedUp { hook, backup } => format!(
                "Linked: hook installed at {} (previous hook preserved as {})",
                hook.display(),
                backup.display()
            ),
        }
    }
}

/// Render the hook stub that calls `exe run` for each push.
///
/// Git runs `post-update` from inside the repository with the updated ref
/// names as arguments. Tag pushes are ignored.
pub fn render_hook_script(exe: &Path) -> String {
    let exe = shell_escape(&exe.to_string_lossy());
    format!(
        r#"#!/bin/sh
{HOOK_MARKER}
repo="$(pwd)"
ref="${{1:-HEAD}}"
case "$ref" in
  refs/tags/*) exit 0 ;;
esac
branch="${{ref#refs/heads/}}"
message="$(git log -1 --pretty=%s "$ref")"
exec {exe} run "$repo" -b "$branch" -m "$message"
"#
    )
}

/// Install the hook stub into `<repo>/hooks/post-update`.
///
/// Fails with [`CihookError::NotAGitRepository`] (writing nothing) when the
/// hooks directory is missing. A hook not written by cihook is preserved
/// under a `.old` suffix.
pub fn link_repository(repo: &Path, exe: &Path) -> Result<LinkOutcome> {
    let hooks_dir = repo.join("hooks");
    if !hooks_dir.is_dir() {
        return Err(CihookError::NotAGitRepository {
            path: repo.to_path_buf(),
        }
        .into());
    }
    let hook = hooks_dir.join(HOOK_NAME);

    let outcome = if hook.exists() {
        let existing =
            fs::read(&hook).with_context(|| format!("read existing hook {}", hook.display()))?;
        if is_cihook_stub(&existing) {
            debug!(hook = %hook.display(), "refreshing existing cihook stub");
            LinkOutcome::Refreshed { hook: hook.clone() }
        } else {
            let backup = hooks_dir.join(format!("{HOOK_NAME}{BACKUP_SUFFIX}"));
            fs::rename(&hook, &backup)
                .with_context(|| format!("back up {} to {}", hook.display(), backup.display()))?;
            info!(backup = %backup.display(), "preserved previous hook");
            LinkOutcome::BackedUp {
                hook: hook.clone(),
                backup,
            }
        }
    } else {
        LinkOutcome::Installed { hook: hook.clone() }
    };

    fs::write(&hook, render_hook_script(exe))
        .with_context(|| format!("write hook {}", hook.display()))?;
    make_executable(&hook)?;
    info!(hook = %hook.display(), "hook installed");
    Ok(outcome)
}

fn is_cihook_stub(contents: &[u8]) -> bool {
    String::from_utf8_lossy(contents).lines().nth(1) == Some(HOOK_MARKER)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn shell_escape(input: &str) -> String {
    if !input.is_empty()
        && input
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':'))
    {
        return input.to_string();
    }
    let mut escaped = String::from("'");
    for ch in input.chars() {
        if ch == '\'' {
            escaped.push_str("'\"'\"'");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}
