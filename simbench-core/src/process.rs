//! External process execution with enforced deadlines.
//!
//! Every subprocess (version control, build, smoke test, measurement) goes
//! through `run_with_timeout`, which reports a deadline hit as
//! `ProcessOutcome::TimedOut` rather than folding it into a non-zero exit.

use crate::error::{BenchError, BenchResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Exit status reported by `run_deadline` when the child hit its deadline.
pub const DEADLINE_EXIT_CODE: i32 = 124;

/// How an external process finished.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The process exited on its own (successfully or not).
    Completed(Output),
    /// The deadline expired and the process was killed.
    TimedOut,
}

impl ProcessOutcome {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        matches!(self, Self::Completed(out) if out.status.success())
    }

    /// Captured stdout, trimmed; empty on timeout.
    pub fn stdout(&self) -> String {
        match self {
            Self::Completed(out) => String::from_utf8_lossy(&out.stdout).trim().to_string(),
            Self::TimedOut => String::new(),
        }
    }

    /// Captured stderr, trimmed; empty on timeout.
    pub fn stderr(&self) -> String {
        match self {
            Self::Completed(out) => String::from_utf8_lossy(&out.stderr).trim().to_string(),
            Self::TimedOut => String::new(),
        }
    }

    /// One-line description of a failure, used in warnings and errors.
    pub fn failure_message(&self, timeout: Duration) -> String {
        match self {
            Self::TimedOut => format!("timed out after {}s", timeout.as_secs()),
            Self::Completed(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                if stderr.is_empty() {
                    format!("exited with {}", out.status)
                } else {
                    stderr
                }
            }
        }
    }
}

/// Run a tokio command with a deadline.
///
/// On unix the child leads its own process group. When the deadline expires,
/// or the returned future is dropped before the child exits, the whole group
/// is killed, so descendants started through a shell die with it. Stdio the
/// caller did not configure is inherited; `run_program` captures it.
pub async fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> BenchResult<ProcessOutcome> {
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    let mut group = ProcessGroupGuard::new(child.id());

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            group.disarm();
            Ok(ProcessOutcome::Completed(output))
        }
        Ok(Err(e)) => Err(BenchError::Io(e)),
        Err(_) => {
            group.kill();
            Ok(ProcessOutcome::TimedOut)
        }
    }
}

/// Kills a child's process group unless disarmed after a normal exit.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    // ESRCH: the group already exited.
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        tracing::debug!(pgid, "killpg: {e}");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Run `program args...`, optionally inside `cwd`, with captured output.
pub async fn run_program<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    timeout: Duration,
) -> BenchResult<ProcessOutcome>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    run_with_timeout(&mut cmd, timeout).await
}

/// Run a shell command line through `sh -c` with captured output.
pub async fn run_shell(command: &str, timeout: Duration) -> BenchResult<ProcessOutcome> {
    run_program("sh", ["-c", command], None, timeout).await
}

/// Execute `argv` with inherited stdio, killing it once `timeout` elapses.
///
/// Returns the exit status to propagate: the child's own code, `128 + signal`
/// when it died from a signal, or [`DEADLINE_EXIT_CODE`] on timeout.
pub async fn run_deadline(argv: &[String], timeout: Duration) -> BenchResult<i32> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| BenchError::config("deadline: no command given"))?;

    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let mut group = ProcessGroupGuard::new(child.id());
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            group.disarm();
            Ok(exit_code(status?))
        }
        Err(_) => {
            group.kill();
            let _ = child.start_kill();
            let _ = child.wait().await;
            Ok(DEADLINE_EXIT_CODE)
        }
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Locate an executable the way a shell would.
///
/// A `program` containing a path separator is checked directly.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        return path.is_file().then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
