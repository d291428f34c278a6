//! Typed errors for outcomes the CLI must tell apart.
//!
//! Everything else flows through `anyhow` with context strings. These variants
//! exist because callers branch on them: the CLI propagates `exit_code()` and
//! the orchestrator recovers `Execution` failures raised inside Lua.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CihookError {
    #[error("{path} is not a git repository (missing hooks directory)")]
    NotAGitRepository { path: PathBuf },

    #[error("failed to load pipeline script: {message}")]
    PipelineParse { message: String },

    #[error("pipeline failed: {message}")]
    PipelineFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("command `{command}` {}", describe_failure(.exit_code, .timed_out))]
    Execution {
        command: String,
        exit_code: Option<i32>,
        timed_out: bool,
    },
}

impl CihookError {
    /// Exit code of the failing child process, when one is known.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::PipelineFailed { exit_code, .. } | Self::Execution { exit_code, .. } => {
                *exit_code
            }
            _ => None,
        }
    }
}

fn describe_failure(exit_code: &Option<i32>, timed_out: &bool) -> String {
    match (*timed_out, *exit_code) {
        (true, _) => "timed out".to_string(),
        (false, Some(code)) => format!("exited with status {code}"),
        (false, None) => "was terminated by a signal".to_string(),
    }
}

/// Find the child exit code attached anywhere in an error chain.
pub fn exit_code_of(err: &anyhow::Error) -> Option<i32> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<CihookError>())
        .find_map(CihookError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn execution_message_names_exit_status() {
        let err = CihookError::Execution {
            command: "make test".to_string(),
            exit_code: Some(2),
            timed_out: false,
        };
        assert_eq!(err.to_string(), "command `make test` exited with status 2");
    }

    #[test]
    fn execution_message_reports_timeout() {
        let err = CihookError::Execution {
            command: "sleep 10".to_string(),
            exit_code: None,
            timed_out: true,
        };
        assert_eq!(err.to_string(), "command `sleep 10` timed out");
    }

    #[test]
    fn exit_code_found_through_context() {
        let result: anyhow::Result<()> = Err(CihookError::PipelineFailed {
            message: "boom".to_string(),
            exit_code: Some(42),
        }
        .into());
        let err = result.context("run pipeline").unwrap_err();
        assert_eq!(exit_code_of(&err), Some(42));
    }

    #[test]
    fn parse_errors_carry_no_exit_code() {
        let err = anyhow::Error::new(CihookError::PipelineParse {
            message: "syntax".to_string(),
        });
        assert_eq!(exit_code_of(&err), None);
    }
}
