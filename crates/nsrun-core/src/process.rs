use crate::error::RunError;
use async_trait::async_trait;
use derive_builder::Builder;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::process::Child;
use tracing::warn;

/// Native process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        ProcessId(pid)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a run's process stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Process exited with the given code (zero or not)
    Exited(i32),
    /// Process was killed by a signal (Unix)
    Signaled(i32),
    /// Process could not be started or waited on
    Failed(String),
}

impl TerminationReason {
    /// Only a failure to run is an error; a non-zero exit is not
    pub fn is_error(&self) -> bool {
        matches!(self, TerminationReason::Failed(_))
    }
}

impl From<ExitStatus> for TerminationReason {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return TerminationReason::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return TerminationReason::Signaled(signal);
            }
        }

        TerminationReason::Failed(format!("process ended without exit code: {status}"))
    }
}

/// Result of a process termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Termination signal was delivered
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Permission denied (insufficient privileges)
    AccessDenied,
    /// Operation failed with specific error message
    Failed(String),
}

impl TerminationResult {
    /// Nothing is left running after this result
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            TerminationResult::Success | TerminationResult::ProcessNotFound
        )
    }
}

/// Readable end of a child's stdout or stderr
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Resolves exactly once, when the process has stopped
pub type TerminalFuture = Pin<Box<dyn Future<Output = TerminationReason> + Send>>;

/// Command line for one external process
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct SpawnCommand {
    pub program: PathBuf,
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    pub working_directory: PathBuf,
}

impl SpawnCommand {
    pub fn builder() -> SpawnCommandBuilder {
        SpawnCommandBuilder::default()
    }

    /// Program name as used in log lines and errors
    pub fn display_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl SpawnCommandBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }
}

/// One in-flight external process.
///
/// The two output streams and the terminal future can each be taken once;
/// the supervisor that takes them owns the process from then on.
pub struct RunHandle {
    pid: Option<ProcessId>,
    command: String,
    stdout: Option<ByteStream>,
    stderr: Option<ByteStream>,
    terminal: TerminalFuture,
    terminator: Arc<dyn ProcessTermination>,
}

/// A `RunHandle` taken apart by its owner
pub struct RunParts {
    pub pid: Option<ProcessId>,
    pub command: String,
    pub stdout: Option<ByteStream>,
    pub stderr: Option<ByteStream>,
    pub terminal: TerminalFuture,
    pub terminator: Arc<dyn ProcessTermination>,
}

impl RunHandle {
    pub fn new(
        pid: Option<ProcessId>,
        command: impl Into<String>,
        stdout: Option<ByteStream>,
        stderr: Option<ByteStream>,
        terminal: TerminalFuture,
        terminator: Arc<dyn ProcessTermination>,
    ) -> Self {
        Self {
            pid,
            command: command.into(),
            stdout,
            stderr,
            terminal,
            terminator,
        }
    }

    /// Wrap a freshly spawned child whose stdout and stderr are piped
    pub fn from_child(
        mut child: Child,
        command: impl Into<String>,
        terminator: Arc<dyn ProcessTermination>,
    ) -> Self {
        let pid = child.id().map(ProcessId::from);
        let stdout = child.stdout.take().map(|s| Box::new(s) as ByteStream);
        let stderr = child.stderr.take().map(|s| Box::new(s) as ByteStream);
        let terminal = Box::pin(async move {
            match child.wait().await {
                Ok(status) => TerminationReason::from(status),
                Err(e) => {
                    warn!(error = %e, "Failed to wait on child process");
                    TerminationReason::Failed(e.to_string())
                }
            }
        });

        Self::new(pid, command, stdout, stderr, terminal, terminator)
    }

    pub fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn into_parts(self) -> RunParts {
        RunParts {
            pid: self.pid,
            command: self.command,
            stdout: self.stdout,
            stderr: self.stderr,
            terminal: self.terminal,
            terminator: self.terminator,
        }
    }
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

/// Trait for spawning run processes
pub trait ProcessLifecycle: Send + Sync {
    /// Spawn `command` with piped stdout/stderr.
    ///
    /// Fails synchronously when the executable cannot be started.
    fn spawn_process(&self, command: &SpawnCommand) -> Result<RunHandle, RunError>;
}

/// Trait for terminating a run process together with everything it started
#[async_trait]
pub trait ProcessTermination: Send + Sync {
    /// Ask the process and its group to stop (SIGTERM on Unix).
    ///
    /// Synchronous so that disposal can request termination from any context.
    fn terminate_process_group(&self, pid: ProcessId) -> TerminationResult;

    /// Kill the process and its group outright (SIGKILL on Unix)
    fn kill_process_group(&self, pid: ProcessId) -> TerminationResult;

    /// Find all descendants of a process, deepest first
    async fn find_child_processes(&self, pid: ProcessId) -> anyhow::Result<Vec<ProcessId>>;

    /// Kill a process and every descendant found in the process table
    async fn terminate_process_tree(&self, root_pid: ProcessId) -> TerminationResult;

    /// Escalation used once the grace period after a termination request is over
    async fn force_termination(&self, pid: ProcessId) -> TerminationResult {
        match self.kill_process_group(pid) {
            result if result.is_done() => result,
            result => {
                warn!(pid = %pid, result = ?result, "Process group kill failed, walking process tree");
                self.terminate_process_tree(pid).await
            }
        }
    }
}

/// Platform process manager: spawns runs and hands each its terminator
pub trait ProcessManager: ProcessLifecycle {
    /// Create a new process manager instance
    fn new() -> Self
    where
        Self: Sized;

    /// Get the platform name for logging and debugging
    fn platform_name(&self) -> &'static str;

    /// Terminator attached to every handle this manager spawns
    fn terminator(&self) -> Arc<dyn ProcessTermination>;
}

/// Factory trait for creating platform-specific process managers
pub trait ProcessManagerFactory {
    /// The type of process manager this factory creates
    type Manager: ProcessManager;

    /// Create a process manager for the current platform
    fn create_process_manager() -> Self::Manager;

    fn platform_name() -> &'static str;
}
