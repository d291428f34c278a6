//! `cihook`: run a repository's Lua pipeline on every push.
//!
//! `cihook link <repo>` installs a `post-update` hook that calls
//! `cihook run <repo> -b <branch> -m <message>` after each push.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use cihook::error::exit_code_of;
use cihook::exit_codes;
use cihook::io::config::{Settings, default_config_path, load_settings, write_settings};
use cihook::io::hook::link_repository;
use cihook::io::workspace::{WorkspacePaths, clean_workspace};
use cihook::logging;
use cihook::run::run_hook;

#[derive(Parser)]
#[command(
    name = "cihook",
    version,
    about = "Git-driven CI hook running a Lua pipeline from the pushed branch",
    arg_required_else_help = true
)]
struct Cli {
    /// Settings file (defaults to `<config dir>/cihook/config.toml`).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Set the workspace root where repositories are checked out.
    Setup {
        /// Workspace root directory.
        path: PathBuf,
    },
    /// Remove workspaces: all projects, one project, or one branch.
    Clean {
        /// Repository whose project workspace should be removed.
        path: Option<String>,
        /// Only remove this branch's workspace (requires a repository path).
        #[arg(short, long, requires = "path")]
        branch: Option<String>,
    },
    /// Install the post-update hook into a git repository.
    Link {
        /// Path to the repository (bare repository or `.git` directory).
        path: PathBuf,
    },
    /// Run the pipeline for a pushed branch. Called from the git hook or manually.
    Run {
        /// Repository path or URL.
        path: String,
        /// Updated branch.
        #[arg(short, long, default_value = "master")]
        branch: String,
        /// Last commit message.
        #[arg(short, long, default_value = "", allow_hyphen_values = true)]
        message: String,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(output) => {
            println!("{output}");
            std::process::exit(exit_codes::OK);
        }
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_code_of(&err).unwrap_or(exit_codes::FAILURE));
        }
    }
}

fn run() -> Result<String> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    debug!(config = %config_path.display(), "using settings file");

    match cli.command {
        Command::Setup { path } => cmd_setup(&config_path, &path),
        Command::Clean { path, branch } => {
            let settings = load_settings(&config_path)?;
            cmd_clean(&settings, path.as_deref(), branch.as_deref())
        }
        Command::Link { path } => {
            let exe = std::env::current_exe().context("locate cihook executable")?;
            Ok(link_repository(&path, &exe)?.message())
        }
        Command::Run {
            path,
            branch,
            message,
        } => {
            let settings = load_settings(&config_path)?;
            let repository = repository_locator(&path)?;
            Ok(run_hook(&settings, &repository, &branch, &message)?.message())
        }
    }
}

fn cmd_setup(config_path: &Path, workspace: &Path) -> Result<String> {
    let mut settings = load_settings(config_path)?;
    fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;
    settings.workspace = fs::canonicalize(workspace)
        .with_context(|| format!("resolve workspace {}", workspace.display()))?;
    write_settings(config_path, &settings)?;
    Ok(format!(
        "cihook workspace set to {}",
        settings.workspace.display()
    ))
}

fn cmd_clean(settings: &Settings, path: Option<&str>, branch: Option<&str>) -> Result<String> {
    match (path, branch) {
        (Some(path), Some(branch)) => {
            let repository = repository_locator(path)?;
            let paths = WorkspacePaths::resolve(&settings.workspace, &repository, branch);
            paths.clean_branch()?;
            Ok(format!("Removed {}", paths.branch_path.display()))
        }
        (Some(path), None) => {
            // Branch name is irrelevant for the project directory.
            let repository = repository_locator(path)?;
            let paths = WorkspacePaths::resolve(&settings.workspace, &repository, "");
            paths.clean_project()?;
            Ok(format!("Removed {}", paths.project_path.display()))
        }
        (None, _) => {
            let removed = clean_workspace(&settings.workspace)?;
            Ok(format!(
                "Removed {removed} project workspace(s) from {}",
                settings.workspace.display()
            ))
        }
    }
}

/// Local paths become absolute so clones made from the workspace resolve
/// them; anything else (URLs, `host:path`) is passed through unchanged.
fn repository_locator(path: &str) -> Result<String> {
    let local = Path::new(path);
    if !local.exists() {
        return Ok(path.to_string());
    }
    let absolute =
        fs::canonicalize(local).with_context(|| format!("resolve repository path {path}"))?;
    Ok(absolute.to_string_lossy().to_string())
}
