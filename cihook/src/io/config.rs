//! Persistent settings stored as TOML under the user's config directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

const APP_DIR: &str = "cihook";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_WORKSPACE_DIR: &str = "cihook-workspace";

/// Hook settings (TOML).
///
/// Loaded once at process start and passed by reference to every run. Missing
/// fields take their defaults, so an empty or absent file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Root under which every project and branch workspace is created.
    pub workspace: PathBuf,

    /// Name of the pipeline script at the repository root.
    pub pipeline_file: String,

    /// Default timeout for toolkit `exec` calls and `pull`.
    pub exec_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            workspace: home.join(DEFAULT_WORKSPACE_DIR),
            pipeline_file: "cihook.lua".to_string(),
            exec_timeout_secs: 60 * 60,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.workspace.as_os_str().is_empty() {
            return Err(anyhow!("workspace must not be empty"));
        }
        if self.pipeline_file.trim().is_empty() {
            return Err(anyhow!("pipeline_file must not be empty"));
        }
        if self.pipeline_file.contains(['/', '\\']) {
            return Err(anyhow!(
                "pipeline_file must be a file name at the repository root"
            ));
        }
        if self.exec_timeout_secs == 0 {
            return Err(anyhow!("exec_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

/// Default settings file: `<config dir>/cihook/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| anyhow!("could not determine config directory"))?;
    Ok(base.join(APP_DIR).join(CONFIG_FILE))
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = if path.exists() {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    } else {
        debug!(path = %path.display(), "settings file missing, using defaults");
        Settings::default()
    };
    settings.workspace = expand_home(&settings.workspace);
    settings.validate()?;
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize settings toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("settings path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp settings {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace settings {}", path.display()))?;
    Ok(())
}
