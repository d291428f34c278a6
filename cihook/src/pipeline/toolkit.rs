//! The toolkit handed to a pipeline's `run` function.
//!
//! Lua sees a userdata with two methods scoped to the branch workspace:
//!
//! - `toolkit:pull()` clones or updates the workspace to the pushed branch.
//! - `toolkit:exec(message, command, options)` runs a shell command inside the
//!   workspace. `message` is a string or `nil`; `options` is an optional table
//!   `{ cwd = "sub/dir", timeout = <ms> }`.
//!
//! Read-only fields: `branch`, `repository`, `branch_path`, `project_path`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use mlua::{Table, UserData, UserDataFields, UserDataMethods, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::exit_code_of;
use crate::io::git::Git;
use crate::io::process::{ExecOptions, exec};
use crate::io::workspace::WorkspacePaths;

/// Failure raised into Lua by a toolkit method.
///
/// Keeps the child exit code so it survives the trip through the script.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ToolkitError {
    pub message: String,
    pub exit_code: Option<i32>,
}

impl ToolkitError {
    fn from_anyhow(err: &anyhow::Error) -> Self {
        Self {
            message: format!("{err:#}"),
            exit_code: exit_code_of(err),
        }
    }
}

/// Exit code of a toolkit failure somewhere inside a Lua error.
pub fn toolkit_exit_code(err: &mlua::Error) -> Option<i32> {
    match err {
        mlua::Error::CallbackError { cause, .. } | mlua::Error::WithContext { cause, .. } => {
            toolkit_exit_code(cause)
        }
        mlua::Error::ExternalError(inner) => inner
            .downcast_ref::<ToolkitError>()
            .and_then(|failure| failure.exit_code),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct PipelineToolkit {
    repository: String,
    branch: String,
    paths: WorkspacePaths,
    default_timeout: Duration,
}

impl PipelineToolkit {
    pub fn new(
        repository: impl Into<String>,
        branch: impl Into<String>,
        paths: WorkspacePaths,
        default_timeout: Duration,
    ) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            paths,
            default_timeout,
        }
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    /// Clone the branch into its workspace, or update the existing clone.
    ///
    /// Repeated calls converge on the remote branch tip; they never clone twice.
    /// A workspace directory that is not a clone of its own (left behind by an
    /// interrupted clone, say) is removed and cloned afresh.
    #[instrument(skip_all, fields(branch = %self.branch))]
    pub fn pull(&self) -> Result<()> {
        let branch_path = &self.paths.branch_path;
        if branch_path.join(".git").exists() {
            debug!("workspace exists, updating");
            return Git::new(branch_path)
                .with_timeout(self.default_timeout)
                .update_branch(&self.branch);
        }
        if branch_path.exists() {
            warn!(path = %branch_path.display(), "workspace is not a clone, recloning");
            self.paths.clean_branch()?;
        }
        debug!("workspace missing, cloning");
        self.paths.ensure_project_dir()?;
        Git::new(&self.paths.project_path)
            .with_timeout(self.default_timeout)
            .clone_branch(&self.repository, &self.branch, branch_path)
    }

    /// Run `command` in the branch workspace.
    ///
    /// `cwd` in `options` is resolved against the branch workspace when
    /// relative; the timeout defaults to the configured exec timeout.
    pub fn exec(&self, message: Option<&str>, command: &str, options: ExecOptions) -> Result<String> {
        let cwd = match options.cwd {
            Some(cwd) => self.paths.branch_path.join(cwd),
            None => self.paths.branch_path.clone(),
        };
        let options = ExecOptions {
            cwd: Some(cwd),
            timeout: Some(options.timeout.unwrap_or(self.default_timeout)),
        };
        exec(message, command, &options)
    }
}

fn lua_error(err: anyhow::Error) -> mlua::Error {
    mlua::Error::external(ToolkitError::from_anyhow(&err))
}

fn message_arg(value: Value) -> mlua::Result<Option<String>> {
    match value {
        Value::Nil | Value::Boolean(false) => Ok(None),
        Value::String(s) => Ok(Some(s.to_str()?.to_string())),
        other => Err(mlua::Error::RuntimeError(format!(
            "exec message must be a string or nil, got {}",
            other.type_name()
        ))),
    }
}

fn options_arg(table: Option<Table>) -> mlua::Result<ExecOptions> {
    let Some(table) = table else {
        return Ok(ExecOptions::default());
    };
    let cwd: Option<String> = table.get("cwd")?;
    let timeout_ms: Option<u64> = table.get("timeout")?;
    Ok(ExecOptions {
        cwd: cwd.map(PathBuf::from),
        timeout: timeout_ms.map(Duration::from_millis),
    })
}

impl UserData for PipelineToolkit {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("branch", |_, this| Ok(this.branch.clone()));
        fields.add_field_method_get("repository", |_, this| Ok(this.repository.clone()));
        fields.add_field_method_get("branch_path", |_, this| {
            Ok(this.paths.branch_path.to_string_lossy().to_string())
        });
        fields.add_field_method_get("project_path", |_, this| {
            Ok(this.paths.project_path.to_string_lossy().to_string())
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("pull", |_, this, ()| this.pull().map_err(lua_error));

        methods.add_method(
            "exec",
            |_, this, (message, command, options): (Value, String, Option<Table>)| {
                let message = message_arg(message)?;
                let options = options_arg(options)?;
                this.exec(message.as_deref(), &command, options)
                    .map_err(lua_error)
            },
        );
    }
}
