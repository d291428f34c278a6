//! Git-driven continuous-integration hook.
//!
//! A repository linked with `cihook link` calls `cihook run` from its
//! `post-update` hook. Each run resolves a per-repository, per-branch
//! workspace, reads the Lua pipeline script committed at the pushed branch tip
//! and invokes its `run` function with a toolkit scoped to that workspace.
//!
//! - **[`core`]**: Pure, deterministic logic (path slugs, commit-message flags).
//! - **[`io`]**: Side-effecting operations (processes, git, workspace
//!   directories, settings, hook installation).
//! - **[`pipeline`]**: Lua loading and the toolkit exposed to pipeline scripts.
//!
//! [`run`] ties these together for a single push event.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
