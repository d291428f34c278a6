//! Stable exit codes for cihook CLI commands.

/// Command succeeded (including "disabled" and "not configured" runs).
pub const OK: i32 = 0;
/// Command failed and no child process exit code was attached to the error.
pub const FAILURE: i32 = 1;
