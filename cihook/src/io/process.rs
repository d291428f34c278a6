//! Synchronous child processes with enforced timeouts.
//!
//! Every command the hook runs (git plumbing, pipeline `exec` calls) goes
//! through [`run_command_with_timeout`], so a hung child can never block a
//! push beyond its timeout.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::CihookError;

/// Repository variables git exports to hooks. Children run against other
/// repositories (workspace clones), so they must not inherit them.
const HOOK_GIT_ENV: &[&str] = &["GIT_DIR", "GIT_WORK_TREE", "GIT_INDEX_FILE", "GIT_PREFIX"];

/// What to do with one of the child's output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Read into memory and return it in [`CommandOutput`].
    Capture,
    /// Pass straight through to this process.
    Inherit,
    Discard,
}

impl Stream {
    fn stdio(self) -> Stdio {
        match self {
            Self::Capture => Stdio::piped(),
            Self::Inherit => Stdio::inherit(),
            Self::Discard => Stdio::null(),
        }
    }
}

/// Captured child process output. Streams not captured are empty.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Run a command, waiting at most `timeout` (forever when `None`).
///
/// Captured streams are drained on reader threads while the child runs so a
/// chatty child cannot deadlock on a full pipe. On unix the child leads its
/// own process group. When the deadline passes, either because the child is
/// still running or because something it spawned still holds a captured
/// pipe, the whole group is killed and `timed_out` is set.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs())))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdout: Stream,
    stderr: Stream,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    for var in HOOK_GIT_ENV {
        cmd.env_remove(var);
    }
    cmd.stdin(Stdio::null())
        .stdout(stdout.stdio())
        .stderr(stderr.stdio());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout_handle = child
        .stdout
        .take()
        .map(|pipe| thread::spawn(move || read_stream(pipe)));
    let stderr_handle = child
        .stderr
        .take()
        .map(|pipe| thread::spawn(move || read_stream(pipe)));

    let mut timed_out = false;
    let status = match timeout {
        Some(timeout) => match child.wait_timeout(timeout).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "command timed out, killing"
                );
                timed_out = true;
                kill_tree(&mut child);
                child.wait().context("wait command after kill")?
            }
        },
        None => child.wait().context("wait for command")?,
    };

    let readers = [&stdout_handle, &stderr_handle];
    let output_held =
        !timed_out && timeout.is_some_and(|t| !readers_finished(&readers, started + t));
    if output_held {
        warn!("command exited but its output is still held open, killing");
        timed_out = true;
        kill_tree(&mut child);
    }
    if timed_out && !readers_finished(&readers, Instant::now() + KILL_GRACE) {
        warn!("output still open after kill, discarding it");
        return Ok(CommandOutput {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
            timed_out,
        });
    }

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// Time allowed for pipes to close once the process group was killed.
const KILL_GRACE: Duration = Duration::from_secs(1);

type Reader = thread::JoinHandle<Result<Vec<u8>>>;

/// Poll until every reader has hit end of file, or `deadline` passes.
fn readers_finished(readers: &[&Option<Reader>], deadline: Instant) -> bool {
    loop {
        let done = readers
            .iter()
            .all(|reader| reader.as_ref().is_none_or(|handle| handle.is_finished()));
        if done {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Kill the child and everything in its process group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Err(err) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        debug!(err = %err, "process group already gone");
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn join_output(handle: Option<Reader>) -> Result<Vec<u8>> {
    match handle {
        None => Ok(Vec::new()),
        Some(handle) => match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("output reader thread panicked")),
        },
    }
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}

/// Options for [`exec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Working directory; the current directory when `None`.
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// Run `command` through the platform shell and return its stdout.
///
/// With a `message` (empty counts as none), the message is printed first and
/// the child's stdout is discarded so build noise stays out of the hook
/// output; the returned string is then empty. Stderr always passes through.
///
/// Fails with [`CihookError::Execution`] on a non-zero exit or timeout.
#[instrument(skip_all, fields(command = %command))]
pub fn exec(message: Option<&str>, command: &str, options: &ExecOptions) -> Result<String> {
    let message = message.filter(|m| !m.is_empty());
    if let Some(message) = message {
        println!("{message}");
    }

    let mut cmd = shell_command(command);
    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    let stdout = if message.is_some() {
        Stream::Discard
    } else {
        Stream::Capture
    };

    debug!(cwd = ?options.cwd, "exec");
    let output = run_command_with_timeout(cmd, stdout, Stream::Inherit, options.timeout)
        .with_context(|| format!("run `{command}`"))?;

    if !output.success() {
        warn!(exit_code = ?output.status.code(), timed_out = output.timed_out, "exec failed");
        return Err(CihookError::Execution {
            command: command.to_string(),
            exit_code: if output.timed_out {
                None
            } else {
                output.status.code()
            },
            timed_out: output.timed_out,
        }
        .into());
    }
    Ok(output.stdout_lossy())
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}
