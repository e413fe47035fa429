//! Process execution for test commands.
//!
//! This module owns every interaction with the operating system's process
//! table. Tests never spawn processes themselves; they describe what to run
//! with a [`Command`] and hand it to a [`ProcessRunner`].
//!
//! # Execution Modes
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ProcessRunner                         │
//! │  (working directory, base env, optional container wrapper)   │
//! │                                                              │
//! │  execute(Command) ─────────► ProcessResult   (blocking)      │
//! │  spawn_background(Command) ► BackgroundProcess               │
//! └──────────────────────────────────────────────────────────────┘
//!                                      │
//!                                      ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        BackgroundSet                         │
//! │  start(runner, commands)   spawn in declaration order        │
//! │  shutdown()                SIGKILL group, bounded drain      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Launch Failures
//!
//! A command that cannot be started (missing binary, permission denied) is
//! not an error for [`ProcessRunner::execute`]. The returned
//! [`ProcessResult`] carries a `launch_error` and no exit code, so callers
//! can tell "did not run" apart from "ran and returned non-zero".

pub mod container;
pub mod warmup;

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use container::ContainerWrapper;
pub use warmup::{Readiness, WarmUp};

/// Upper bound on collecting a killed background job's remaining output.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on `<runtime> kill` for a containerised background job.
const CONTAINER_KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while driving a process.
///
/// These never escape a test: the runner folds them into a
/// [`ProcessResult`] or a [`BackgroundSet`] failure entry.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process started, but waiting for it or collecting its output
    /// failed.
    #[error("`{program}` started but its result could not be collected: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// An executable plus its positional arguments.
///
/// Commands are built with a fluent builder and are never mutated once a
/// test holds them.
///
/// # Example
///
/// ```
/// use proctest::process::Command;
///
/// let cmd = Command::new("java")
///     .args(["-cp", "app.jar", "Main"])
///     .arg(10.to_string())
///     .input("payload");
///
/// assert_eq!(cmd.program, "java");
/// assert_eq!(cmd.args.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The program/executable to run.
    pub program: String,

    /// Arguments passed to the program, in order.
    pub args: Vec<String>,

    /// Text written to the process's standard input.
    ///
    /// `None` or an empty string leaves stdin closed.
    pub input: Option<String>,

    /// Working directory override.
    ///
    /// Relative paths are resolved against the runner's working directory.
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables for this command.
    pub env: Vec<(String, String)>,
}

impl Command {
    /// Creates a new command for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            input: None,
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Adds a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the text fed to standard input.
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Sets the working directory for this command only.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable for this command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Returns the input text if there is any to write.
    pub fn stdin_text(&self) -> Option<&str> {
        self.input.as_deref().filter(|s| !s.is_empty())
    }

    /// Converts the command to a shell-style string for display.
    ///
    /// Processes are always spawned directly; this string is only used in
    /// reports and logs.
    ///
    /// # Example
    ///
    /// ```
    /// use proctest::process::Command;
    /// let cmd = Command::new("echo").arg("hello world");
    /// assert_eq!(cmd.to_shell_string(), "echo 'hello world'");
    /// ```
    pub fn to_shell_string(&self) -> String {
        let mut parts = vec![shell_escape(&self.program)];
        for arg in &self.args {
            parts.push(shell_escape(arg));
        }
        parts.join(" ")
    }
}

/// Escape a string for use in a shell command.
fn shell_escape(s: &str) -> String {
    if !s.is_empty()
        && s.chars().all(|c| {
            c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | ',' | '+')
        })
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Captured outcome of one execution attempt.
///
/// Produced exactly once per attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,

    /// Captured standard error (lossy UTF-8).
    pub stderr: String,

    /// Exit code of the process.
    ///
    /// A process terminated by a signal reports `-signal` on Unix.
    /// `None` only when the process never started.
    pub exit_code: Option<i32>,

    /// Why no result is available: the process could not be started, or
    /// it started and its exit status could not be collected. The message
    /// tells the two apart.
    pub launch_error: Option<String>,

    /// Wall-clock time of the attempt.
    pub duration: Duration,
}

impl ProcessResult {
    /// Builds the result for a process that never started.
    pub fn launch_failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            launch_error: Some(error.into()),
            duration,
        }
    }

    /// Returns `true` if the process was started and ran to completion.
    pub fn launched(&self) -> bool {
        self.launch_error.is_none()
    }

    /// Returns `true` if the process ran and exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Converts an exit status into a single integer.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

/// Runs commands on the local machine.
///
/// The runner holds the harness-wide defaults every command inherits: the
/// shared working directory, base environment variables, and an optional
/// [`ContainerWrapper`] that every command is routed through.
///
/// # Example
///
/// ```no_run
/// use proctest::process::{Command, ProcessRunner};
///
/// #[tokio::main]
/// async fn main() {
///     let runner = ProcessRunner::new("/tmp");
///     let result = runner.execute(&Command::new("echo").arg("hello")).await;
///     assert_eq!(result.stdout.trim(), "hello");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    working_dir: PathBuf,
    env: Vec<(String, String)>,
    container: Option<ContainerWrapper>,
}

impl ProcessRunner {
    /// Creates a runner rooted at `working_dir`.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            env: Vec::new(),
            container: None,
        }
    }

    /// Creates a runner rooted at the current directory.
    pub fn in_current_dir() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Adds a base environment variable applied to every command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Routes every command through the given container wrapper.
    pub fn with_container(mut self, container: ContainerWrapper) -> Self {
        self.container = Some(container);
        self
    }

    /// Returns a copy of this runner that spawns on the host, bypassing any
    /// container wrapper.
    pub fn host(&self) -> ProcessRunner {
        Self {
            container: None,
            ..self.clone()
        }
    }

    /// Returns the shared working directory.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the command that will actually be spawned for `cmd`.
    ///
    /// With a container wrapper configured this is the wrapper invocation
    /// with the real program appended; otherwise it is `cmd` itself.
    pub fn effective(&self, cmd: &Command) -> Command {
        match &self.container {
            Some(container) => container.wrap(cmd, &self.working_dir),
            None => cmd.clone(),
        }
    }

    fn prepare(&self, cmd: &Command) -> tokio::process::Command {
        let mut process = tokio::process::Command::new(&cmd.program);
        process.args(&cmd.args);
        process.current_dir(&self.working_dir);

        for (key, value) in &self.env {
            process.env(key, value);
        }
        for (key, value) in &cmd.env {
            process.env(key, value);
        }

        if let Some(dir) = &cmd.working_dir {
            process.current_dir(self.working_dir.join(dir));
        }

        process.stdout(Stdio::piped());
        process.stderr(Stdio::piped());
        process.stdin(if cmd.stdin_text().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        process.kill_on_drop(true);
        process
    }

    /// Runs `cmd` to completion and captures its output.
    ///
    /// Blocks (asynchronously) until the process exits. There is no timeout:
    /// a process that never exits stalls the caller.
    pub async fn execute(&self, cmd: &Command) -> ProcessResult {
        let start = Instant::now();
        let cmd = self.effective(cmd);

        match self.try_execute(&cmd, start).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{}", e);
                ProcessResult::launch_failure(e.to_string(), start.elapsed())
            }
        }
    }

    async fn try_execute(
        &self,
        cmd: &Command,
        start: Instant,
    ) -> Result<ProcessResult, ProcessError> {
        debug!("Executing: {}", cmd.to_shell_string());

        let mut child = self
            .prepare(cmd)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        // Feed stdin from a separate task so a chatty process cannot
        // deadlock against a full stdout pipe.
        let feeder = match (child.stdin.take(), cmd.stdin_text()) {
            (Some(mut stdin), Some(text)) => {
                let text = text.to_string();
                Some(tokio::spawn(async move {
                    let written = stdin.write_all(text.as_bytes()).await;
                    drop(stdin);
                    written
                }))
            }
            _ => None,
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ProcessError::Wait {
                program: cmd.program.clone(),
                source,
            })?;

        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    warn!("Failed to write stdin of {}: {}", cmd.program, e);
                }
                _ => {}
            }
        }

        let exit_code = exit_code(output.status);
        debug!("{} exited with {}", cmd.program, exit_code);

        Ok(ProcessResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: Some(exit_code),
            launch_error: None,
            duration: start.elapsed(),
        })
    }

    /// Starts `cmd` without waiting for it.
    ///
    /// On Unix the job leads its own process group, so teardown reaches
    /// anything it forks. Under a container wrapper the job runs in a named
    /// container that teardown stops explicitly. The child is killed when
    /// the returned handle is dropped.
    pub fn spawn_background(&self, cmd: &Command) -> Result<BackgroundProcess, ProcessError> {
        let (cmd, stop) = match &self.container {
            Some(container) => {
                let (wrapped, name) = container.wrap_background(cmd, &self.working_dir);
                (wrapped, Some(container.kill_command(&name)))
            }
            None => (cmd.clone(), None),
        };

        let mut process = self.prepare(&cmd);
        // Background jobs never receive input.
        process.stdin(Stdio::null());
        #[cfg(unix)]
        process.process_group(0);

        let child = process.spawn().map_err(|source| ProcessError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        Ok(BackgroundProcess {
            command_line: cmd.to_shell_string(),
            child,
            stop,
            working_dir: self.working_dir.clone(),
        })
    }
}

/// A long-running auxiliary process.
pub struct BackgroundProcess {
    command_line: String,
    child: tokio::process::Child,
    stop: Option<Command>,
    working_dir: PathBuf,
}

impl BackgroundProcess {
    /// Returns the OS process id, if the process has not been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Returns the command line the process was started with.
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Kills the process with everything it spawned, then collects any
    /// remaining output.
    ///
    /// Output collection is bounded by a timeout: a descendant that escaped
    /// the process group and still holds the pipes open cannot stall
    /// teardown.
    pub async fn kill_and_drain(mut self) -> Result<DrainedOutput, ProcessError> {
        let pid = self.child.id();

        if let Some(stop) = self.stop.take() {
            self.stop_container(&stop).await;
        }
        self.kill_group(pid);

        let stdout = self.child.stdout.take().map(|s| tokio::spawn(read_all(s)));
        let stderr = self.child.stderr.take().map(|s| tokio::spawn(read_all(s)));

        let status = self.child.wait().await.map_err(|source| ProcessError::Wait {
            program: self.command_line.clone(),
            source,
        })?;

        Ok(DrainedOutput {
            stdout: collect(stdout, &self.command_line).await,
            stderr: collect(stderr, &self.command_line).await,
            exit_code: exit_code(status),
            command_line: std::mem::take(&mut self.command_line),
            pid,
        })
    }

    /// Sends SIGKILL to the whole process group, then to the child itself.
    fn kill_group(&mut self, pid: Option<u32>) {
        if let Some(pid) = pid {
            kill_process_group(pid);
        }

        if let Err(e) = self.child.start_kill() {
            // Already exited on its own; waiting still reaps it.
            debug!("Kill of {} reported: {}", self.command_line, e);
        }
    }

    /// Runs the container runtime's kill command for this job.
    async fn stop_container(&self, stop: &Command) {
        info!("Stopping container: {}", stop.to_shell_string());

        let mut process = tokio::process::Command::new(&stop.program);
        process
            .args(&stop.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(CONTAINER_KILL_TIMEOUT, process.output()).await {
            Ok(Ok(output)) if output.status.success() => {}
            Ok(Ok(output)) => warn!(
                "`{}` failed: {}",
                stop.to_shell_string(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Ok(Err(e)) => warn!("Failed to run `{}`: {}", stop.to_shell_string(), e),
            Err(_) => warn!(
                "`{}` did not finish within {:?}",
                stop.to_shell_string(),
                CONTAINER_KILL_TIMEOUT
            ),
        }
    }
}

impl Drop for BackgroundProcess {
    fn drop(&mut self) {
        // `kill_on_drop` only reaches the group leader.
        if let Some(pid) = self.child.id() {
            kill_process_group(pid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!("Kill of process group {} reported: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn read_all<R: AsyncRead + Unpin>(mut stream: R) -> Vec<u8> {
    let mut buf = Vec::new();
    // Whatever was read before an error is still worth reporting.
    let _ = stream.read_to_end(&mut buf).await;
    buf
}

/// Waits for a stream reader, giving up after [`DRAIN_TIMEOUT`].
async fn collect(reader: Option<JoinHandle<Vec<u8>>>, command_line: &str) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };

    match tokio::time::timeout(DRAIN_TIMEOUT, &mut reader).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).to_string(),
        Ok(Err(e)) => {
            warn!("Output reader of {} failed: {}", command_line, e);
            String::new()
        }
        Err(_) => {
            warn!(
                "Output of {} still open after {:?}; a descendant outlived the kill",
                command_line, DRAIN_TIMEOUT
            );
            reader.abort();
            String::new()
        }
    }
}

/// What was left of a background process after it was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainedOutput {
    pub command_line: String,
    pub pid: Option<u32>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The background processes belonging to one test run.
///
/// Processes are started in declaration order. [`shutdown`](Self::shutdown)
/// kills and drains each of them exactly once; a set dropped without an
/// explicit shutdown still kills its children because every child is
/// spawned with `kill_on_drop`.
#[derive(Default)]
pub struct BackgroundSet {
    processes: Vec<BackgroundProcess>,
    failures: Vec<String>,
}

impl BackgroundSet {
    /// Starts every command in order.
    ///
    /// Commands that cannot be started are logged and remembered; the
    /// remaining commands are still started.
    pub fn start(runner: &ProcessRunner, commands: &[Command]) -> Self {
        let mut set = Self::default();

        for cmd in commands {
            info!("Starting background job: {}", cmd.to_shell_string());
            match runner.spawn_background(cmd) {
                Ok(process) => set.processes.push(process),
                Err(e) => {
                    warn!("Background job failed to start: {}", e);
                    set.failures
                        .push(format!("{}: {}", cmd.to_shell_string(), e));
                }
            }
        }

        set
    }

    /// Number of processes still owned by the set.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Returns `true` if no process is owned by the set.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Launch failures recorded by [`start`](Self::start).
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Kills and drains every process, in declaration order.
    ///
    /// Calling this again afterwards is a no-op returning an empty list.
    pub async fn shutdown(&mut self) -> Vec<DrainedOutput> {
        if self.processes.is_empty() {
            return Vec::new();
        }

        info!("Killing {} background processes...", self.processes.len());
        let mut drained = Vec::with_capacity(self.processes.len());

        for process in self.processes.drain(..) {
            let command_line = process.command_line().to_string();
            match process.kill_and_drain().await {
                Ok(output) => {
                    debug!("Background job stdout ({}): {}", command_line, output.stdout);
                    debug!("Background job stderr ({}): {}", command_line, output.stderr);
                    drained.push(output);
                }
                Err(e) => warn!("Failed to drain background job: {}", e),
            }
        }

        info!("Killing background processes done.");
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(std::env::temp_dir())
    }

    #[test]
    fn test_command_builder() {
        let cmd = Command::new("java")
            .arg("-cp")
            .args(["app.jar", "Main"])
            .env("A", "1")
            .input("in");

        assert_eq!(cmd.program, "java");
        assert_eq!(cmd.args, vec!["-cp", "app.jar", "Main"]);
        assert_eq!(cmd.env, vec![("A".to_string(), "1".to_string())]);
        assert_eq!(cmd.stdin_text(), Some("in"));
    }

    #[test]
    fn test_shell_string_escapes() {
        let cmd = Command::new("sh").args(["-c", "echo 'hi'", ""]);
        assert_eq!(cmd.to_shell_string(), "sh -c 'echo '\\''hi'\\''' ''");

        let cmd = Command::new("sorter").args(["localhost:5000", "data/in.txt"]);
        assert_eq!(cmd.to_shell_string(), "sorter localhost:5000 data/in.txt");
    }

    #[test]
    fn test_empty_input_is_no_input() {
        assert_eq!(Command::new("cat").input("").stdin_text(), None);
    }

    #[tokio::test]
    async fn test_execute_captures_stdout() {
        let result = runner().execute(&Command::new("echo").arg("hello")).await;

        assert!(result.launched());
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "hello\n");
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_execute_captures_stderr_and_code() {
        let cmd = Command::new("sh").args(["-c", "echo oops >&2; exit 3"]);
        let result = runner().execute(&cmd).await;

        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr, "oops\n");
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_execute_feeds_input() {
        let cmd = Command::new("cat").input("line one\nline two");
        let result = runner().execute(&cmd).await;

        assert_eq!(result.stdout, "line one\nline two");
    }

    #[tokio::test]
    async fn test_execute_missing_binary_is_launch_failure() {
        let cmd = Command::new("/definitely/not/a/real/binary");
        let result = runner().execute(&cmd).await;

        assert!(!result.launched());
        assert_eq!(result.exit_code, None);
        assert!(
            result
                .launch_error
                .as_deref()
                .unwrap()
                .contains("/definitely/not/a/real/binary")
        );
    }

    #[tokio::test]
    async fn test_execute_uses_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "found").unwrap();

        let runner = ProcessRunner::new(dir.path());
        let result = runner.execute(&Command::new("cat").arg("marker.txt")).await;

        assert_eq!(result.stdout, "found");
    }

    #[tokio::test]
    async fn test_execute_relative_command_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/marker.txt"), "nested").unwrap();

        let runner = ProcessRunner::new(dir.path());
        let cmd = Command::new("cat").arg("marker.txt").working_dir("sub");
        let result = runner.execute(&cmd).await;

        assert_eq!(result.stdout, "nested");
    }

    #[tokio::test]
    async fn test_execute_env() {
        let runner = runner().with_env("BASE_VAR", "base");
        let cmd = Command::new("sh")
            .args(["-c", "echo $BASE_VAR-$CMD_VAR"])
            .env("CMD_VAR", "cmd");
        let result = runner.execute(&cmd).await;

        assert_eq!(result.stdout.trim(), "base-cmd");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_exit_code_is_negative() {
        let cmd = Command::new("sh").args(["-c", "kill -9 $$"]);
        let result = runner().execute(&cmd).await;

        assert_eq!(result.exit_code, Some(-9));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_set_kills_and_drains() {
        let commands = vec![
            Command::new("sh").args(["-c", "echo ready; exec sleep 30"]),
            Command::new("sleep").arg("30"),
        ];

        let mut set = BackgroundSet::start(&runner(), &commands);
        assert_eq!(set.len(), 2);
        assert!(set.failures().is_empty());

        let drained = set.shutdown().await;
        assert_eq!(drained.len(), 2);
        for output in &drained {
            assert_eq!(output.exit_code, -9);
        }
        assert!(set.is_empty());

        // Second shutdown is a no-op
        assert!(set.shutdown().await.is_empty());
    }

    #[tokio::test]
    async fn test_background_set_records_launch_failure() {
        let commands = vec![
            Command::new("/no/such/server"),
            Command::new("sleep").arg("30"),
        ];

        let mut set = BackgroundSet::start(&runner(), &commands);
        assert_eq!(set.len(), 1);
        assert_eq!(set.failures().len(), 1);
        assert!(set.failures()[0].starts_with("/no/such/server"));

        set.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_kills_forked_descendants() {
        // `sh` forks `sleep`, which inherits the output pipes.
        let commands = vec![Command::new("sh").args(["-c", "echo started; sleep 30; echo done"])];
        let mut set = BackgroundSet::start(&runner(), &commands);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let start = Instant::now();
        let drained = set.shutdown().await;

        assert!(start.elapsed() < DRAIN_TIMEOUT, "teardown took {:?}", start.elapsed());
        assert_eq!(drained.len(), 1);
        // EOF was reached, so no descendant still holds the pipe.
        assert_eq!(drained[0].stdout, "started\n");
        assert_eq!(drained[0].exit_code, -9);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_set_kills_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(dir.path());
        let commands = vec![Command::new("sh").args(["-c", "sleep 1; touch survived; sleep 30"])];

        let set = BackgroundSet::start(&runner, &commands);
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(set);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("survived").exists());
    }

    #[test]
    fn test_wait_error_says_process_started() {
        let err = ProcessError::Wait {
            program: "server".to_string(),
            source: std::io::Error::other("boom"),
        };
        assert_eq!(
            err.to_string(),
            "`server` started but its result could not be collected: boom"
        );
    }

    #[tokio::test]
    async fn test_kill_after_natural_exit_still_drains() {
        let process = runner()
            .spawn_background(&Command::new("echo").arg("bye"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let drained = process.kill_and_drain().await.unwrap();
        assert_eq!(drained.stdout, "bye\n");
    }
}
