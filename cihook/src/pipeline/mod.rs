//! Pipeline scripts: retrieval from git, loading into Lua, and the toolkit
//! passed to their `run` function.

pub mod loader;
pub mod toolkit;

use anyhow::{Context, Result};

use crate::io::git::Git;

pub use loader::PipelineModule;
pub use toolkit::PipelineToolkit;

/// Read the pipeline script bytes at the tip of `branch` in `repository`.
///
/// `None` means the repository has no pipeline on that branch, which callers
/// treat as "not configured" rather than a failure.
pub fn fetch_pipeline(repository: &str, branch: &str, file: &str) -> Result<Option<Vec<u8>>> {
    Git::new(repository)
        .show_file(branch, file)
        .with_context(|| format!("read {file} from {repository} at {branch}"))
}
