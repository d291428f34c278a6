//! Orchestration for one push event.
//!
//! `run_hook` is the whole life of a hook invocation:
//!
//! 1. Resolve the project and branch workspace paths.
//! 2. Parse control flags from the commit message.
//! 3. Take the branch lock.
//! 4. `--cleanproject` removes the project workspace; `--cleanbranch` or
//!    `--clean` removes the branch workspace.
//! 5. `--nohook` stops here with a successful "disabled" outcome.
//! 6. Ensure the project directory, read the pipeline script from git, load
//!    it and invoke its `run(toolkit, branch, message, flags)`.
//!
//! A missing script or a script without `run` is a successful outcome with
//! guidance text. A script that fails to load is an error raised before any
//! `pull` or `exec` can happen.

use anyhow::{Context, Result};
use mlua::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::flags::ControlFlags;
use crate::error::CihookError;
use crate::io::config::Settings;
use crate::io::lock::BranchLock;
use crate::io::workspace::WorkspacePaths;
use crate::pipeline::loader::RUN_FN;
use crate::pipeline::toolkit::toolkit_exit_code;
use crate::pipeline::{PipelineModule, PipelineToolkit, fetch_pipeline};

/// Successful result of a hook run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `--nohook` was present in the commit message.
    Disabled,
    /// The branch has no pipeline script.
    NotConfigured { branch: String, file: String },
    /// The pipeline script does not export `run`.
    MissingRun { branch: String, file: String },
    /// `run` returned; carries its string result, if any.
    Completed {
        branch: String,
        result: Option<String>,
    },
}

impl RunOutcome {
    /// Human-readable text printed by the CLI.
    pub fn message(&self) -> String {
        match self {
            Self::Disabled => "cihook disabled for this push (--nohook).".to_string(),
            Self::NotConfigured { branch, file } => format!(
                "cihook is not configured for branch {branch}: no {file} at the branch tip.\n\
                 Commit a {file} returning {{ {RUN_FN} = function(toolkit, branch, message, flags) ... end }} to enable it."
            ),
            Self::MissingRun { branch, file } => format!(
                "{file} on branch {branch} does not export a `{RUN_FN}` function; nothing to do."
            ),
            Self::Completed {
                result: Some(result),
                ..
            } => result.clone(),
            Self::Completed {
                branch,
                result: None,
            } => format!("Pipeline finished for branch {branch}."),
        }
    }
}

/// Handle one push of `branch` to `repository`.
#[instrument(skip_all, fields(repository = %repository, branch = %branch))]
pub fn run_hook(
    settings: &Settings,
    repository: &str,
    branch: &str,
    message: &str,
) -> Result<RunOutcome> {
    let paths = WorkspacePaths::resolve(&settings.workspace, repository, branch);
    let flags = ControlFlags::parse(message);
    debug!(
        project = %paths.project_path.display(),
        branch_path = %paths.branch_path.display(),
        flags = ?flags.as_slice(),
        "resolved workspace"
    );

    let _lock = BranchLock::acquire(&paths.lock_path())?;

    if flags.clean_project() {
        paths.clean_project()?;
    }
    if flags.clean_branch() {
        paths.clean_branch()?;
    }
    if flags.no_hook() {
        info!("hook disabled by commit message");
        return Ok(RunOutcome::Disabled);
    }

    paths.ensure_project_dir()?;

    let file = settings.pipeline_file.as_str();
    let Some(source) = fetch_pipeline(repository, branch, file)? else {
        info!(file, "no pipeline script on branch");
        return Ok(RunOutcome::NotConfigured {
            branch: branch.to_string(),
            file: file.to_string(),
        });
    };

    let module = PipelineModule::load(&source)?;
    let Some(run_fn) = module.run_fn() else {
        info!(file, "pipeline script has no run function");
        return Ok(RunOutcome::MissingRun {
            branch: branch.to_string(),
            file: file.to_string(),
        });
    };

    let toolkit = PipelineToolkit::new(repository, branch, paths, settings.exec_timeout());
    let lua = module.lua();
    let toolkit = lua
        .create_userdata(toolkit)
        .context("expose toolkit to pipeline")?;
    let flags_table = lua
        .create_sequence_from(flags.as_slice().iter().cloned())
        .context("expose flags to pipeline")?;

    info!("invoking pipeline");
    let returned: Value = run_fn
        .call((toolkit, branch, message, flags_table))
        .map_err(|err| {
            warn!(err = %err, "pipeline failed");
            CihookError::PipelineFailed {
                message: err.to_string(),
                exit_code: toolkit_exit_code(&err),
            }
        })?;

    let result = match returned {
        Value::String(s) => Some(
            s.to_str()
                .context("pipeline result is not valid UTF-8")?
                .to_string(),
        ),
        _ => None,
    };
    info!("pipeline finished");
    Ok(RunOutcome::Completed {
        branch: branch.to_string(),
        result,
    })
}
