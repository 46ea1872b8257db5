use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::runner::outcome::{TestOutcome, TestStatus};

/// Prefix of the stderr text reported when a command cannot be started.
pub const LAUNCH_FAILURE_PREFIX: &str = "Failed to launch";

/// How long to wait for the output pipes to drain after a process group is killed.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs external commands with a hard wall-clock timeout.
///
/// Each child is started in its own process group. On timeout the whole group
/// gets SIGTERM, then SIGKILL once `kill_grace` has elapsed, and the child is
/// reaped before the outcome is returned.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    kill_grace: Duration,
}

impl ProcessRunner {
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }

    /// Run `command` in `working_dir`.
    ///
    /// Never fails: exit code 0 maps to `passed`, any other exit to `failed`,
    /// and launch failure or timeout to `error`.
    pub async fn run(
        &self,
        name: &str,
        command: &CommandLine,
        working_dir: &Path,
        timeout: Duration,
    ) -> TestOutcome {
        let started = Instant::now();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(command = %command, error = %e, "Failed to launch process");
                return TestOutcome::error(name, format!("{LAUNCH_FAILURE_PREFIX} `{command}`: {e}"))
                    .with_duration(started.elapsed());
            }
        };

        tracing::debug!(command = %command, pid = ?child.id(), "Process started");

        let stdout_task = child.stdout.take().map(|pipe| tokio::spawn(read_pipe(pipe)));
        let stderr_task = child.stderr.take().map(|pipe| tokio::spawn(read_pipe(pipe)));

        let waited = tokio::time::timeout(timeout, child.wait()).await;

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                self.terminate(&mut child).await;
                let (stdout, _) = collect(stdout_task, stderr_task).await;
                return TestOutcome::error(name, format!("Failed to wait for `{command}`: {e}"))
                    .with_stdout(stdout)
                    .with_duration(started.elapsed());
            }
            Err(_) => {
                tracing::warn!(
                    command = %command,
                    timeout_secs = timeout.as_secs_f64(),
                    "Process timed out, terminating process group"
                );
                self.terminate(&mut child).await;
                let (stdout, stderr) = collect(stdout_task, stderr_task).await;
                let mut message = format!(
                    "Test execution timed out after {}s: {command}",
                    timeout.as_secs_f64()
                );
                if !stderr.is_empty() {
                    message.push('\n');
                    message.push_str(&stderr);
                }
                return TestOutcome::error(name, message)
                    .with_stdout(stdout)
                    .with_duration(started.elapsed());
            }
        };

        let (stdout, stderr) = collect(stdout_task, stderr_task).await;

        let test_status = if status.success() {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };

        tracing::debug!(
            command = %command,
            exit_code = ?status.code(),
            status = %test_status,
            "Process finished"
        );

        TestOutcome::new(name, test_status)
            .with_stdout(stdout)
            .with_stderr(stderr)
            .with_duration(started.elapsed())
    }

    /// Tear down the child's whole process group and reap the child.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let pgid = Pid::from_raw(pid as i32);

            // Send TERM signal to process group
            let _ = killpg(pgid, Signal::SIGTERM);

            let _ = tokio::time::timeout(self.kill_grace, child.wait()).await;

            // Stragglers in the group may outlive the leader
            let _ = killpg(pgid, Signal::SIGKILL);
        }

        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "Child already exited before kill");
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

async fn join_pipe(task: Option<JoinHandle<String>>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Pipe reader task failed");
            String::new()
        }
        Err(_) => {
            // A process outside the group still holds the pipe open
            task.abort();
            String::new()
        }
    }
}

async fn collect(
    stdout_task: Option<JoinHandle<String>>,
    stderr_task: Option<JoinHandle<String>>,
) -> (String, String) {
    let stdout = join_pipe(stdout_task).await;
    let stderr = join_pipe(stderr_task).await;
    (stdout, stderr)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh").args(["-c", script])
    }

    fn runner() -> ProcessRunner {
        ProcessRunner::new(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_zero_exit_is_passed() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = runner()
            .run("sh", &sh("echo hello"), tmp.path(), Duration::from_secs(10))
            .await;
        assert_eq!(outcome.status, TestStatus::Passed);
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed_with_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = runner()
            .run("sh", &sh("echo boom >&2; exit 3"), tmp.path(), Duration::from_secs(10))
            .await;
        assert_eq!(outcome.status, TestStatus::Failed);
        assert_eq!(outcome.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "here").unwrap();
        let outcome = runner()
            .run("sh", &sh("cat marker.txt"), tmp.path(), Duration::from_secs(10))
            .await;
        assert_eq!(outcome.stdout, "here");
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let command = CommandLine::new("definitely-not-a-real-binary-xyz");
        let outcome = runner()
            .run("missing", &command, tmp.path(), Duration::from_secs(10))
            .await;
        assert_eq!(outcome.status, TestStatus::Error);
        assert!(outcome.stderr.contains("Failed to launch"));
    }

    #[tokio::test]
    async fn test_timeout_is_error_and_returns_promptly() {
        let tmp = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let outcome = runner()
            .run("sh", &sh("sleep 30"), tmp.path(), Duration::from_millis(200))
            .await;
        assert_eq!(outcome.status, TestStatus::Error);
        assert!(outcome.stderr.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            // Field after the parenthesised command name is the state
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .map(|state| state != "Z" && state != "X")
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let tmp = tempfile::tempdir().unwrap();
        let script = "sleep 30 & echo $! > grandchild.pid; wait";
        let outcome = runner()
            .run("sh", &sh(script), tmp.path(), Duration::from_millis(300))
            .await;
        assert_eq!(outcome.status, TestStatus::Error);

        let pid: i32 = std::fs::read_to_string(tmp.path().join("grandchild.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        let mut alive = true;
        for _ in 0..20 {
            if !is_running(pid) {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "grandchild {pid} survived the timeout");
    }

    #[test]
    fn test_command_line_display() {
        let command = CommandLine::new("python3").args(["-m", "pytest", "-v"]);
        assert_eq!(command.to_string(), "python3 -m pytest -v");
    }
}
