use anyhow::Result;
use async_trait::async_trait;
use nsrun_core::*;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use sysinfo::System;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// CREATE_NO_WINDOW: keeps the CLI and taskkill from popping up consoles
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Terminates runs through `taskkill`, which walks the process tree itself
pub struct WindowsTermination {
    system: Mutex<System>,
}

impl WindowsTermination {
    fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Blocking `taskkill`, only for the synchronous disposal path
    fn taskkill_blocking(&self, pid: ProcessId, force: bool) -> TerminationResult {
        let mut cmd = std::process::Command::new("taskkill");
        cmd.args(taskkill_args(pid, force))
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        taskkill_result(pid, force, cmd.status())
    }

    /// `taskkill` that does not hold up the runtime
    async fn taskkill(&self, pid: ProcessId, force: bool) -> TerminationResult {
        let mut cmd = Command::new("taskkill");
        cmd.args(taskkill_args(pid, force))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        taskkill_result(pid, force, cmd.status().await)
    }

    /// Recursively find all child processes, grandchildren before children
    fn find_children_recursive(system: &System, parent_pid: u32, result: &mut Vec<u32>) {
        for (pid, process) in system.processes() {
            if process.parent().is_some_and(|ppid| ppid.as_u32() == parent_pid) {
                let child_pid = pid.as_u32();
                Self::find_children_recursive(system, child_pid, result);
                result.push(child_pid);
            }
        }
    }
}

/// Arguments for `taskkill /T` against `pid`; `force` adds `/F`
fn taskkill_args(pid: ProcessId, force: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(4);
    if force {
        args.push("/F".to_string());
    }
    args.extend(["/T".to_string(), "/PID".to_string(), pid.0.to_string()]);
    args
}

fn taskkill_result(
    pid: ProcessId,
    force: bool,
    status: std::io::Result<std::process::ExitStatus>,
) -> TerminationResult {
    match status {
        Ok(status) if status.success() => {
            info!(pid = %pid, force = force, "taskkill succeeded");
            TerminationResult::Success
        }
        // taskkill exits with 128 when the process does not exist
        Ok(status) if status.code() == Some(128) => {
            debug!(pid = %pid, "Process not found (already terminated)");
            TerminationResult::ProcessNotFound
        }
        Ok(status) => {
            warn!(pid = %pid, status = %status, "taskkill failed");
            TerminationResult::Failed(format!("taskkill exited with {status}"))
        }
        Err(e) => {
            warn!(pid = %pid, error = %e, "Failed to run taskkill");
            TerminationResult::Failed(format!("taskkill could not be started: {e}"))
        }
    }
}

#[async_trait]
impl ProcessTermination for WindowsTermination {
    fn terminate_process_group(&self, pid: ProcessId) -> TerminationResult {
        self.taskkill_blocking(pid, false)
    }

    fn kill_process_group(&self, pid: ProcessId) -> TerminationResult {
        self.taskkill_blocking(pid, true)
    }

    async fn find_child_processes(&self, parent_pid: ProcessId) -> Result<Vec<ProcessId>> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| anyhow::anyhow!("process table lock poisoned"))?;
        system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::All,
            true,
            sysinfo::ProcessRefreshKind::default(),
        );

        let mut children = Vec::new();
        Self::find_children_recursive(&system, parent_pid.0, &mut children);

        Ok(children.into_iter().map(ProcessId::from).collect())
    }

    async fn terminate_process_tree(&self, root_pid: ProcessId) -> TerminationResult {
        let children = match self.find_child_processes(root_pid).await {
            Ok(children) => children,
            Err(e) => {
                warn!(pid = %root_pid, error = %e, "Failed to find child processes");
                return TerminationResult::Failed(format!("Failed to enumerate children: {e}"));
            }
        };

        for child_pid in children {
            let result = self.taskkill(child_pid, true).await;
            if !result.is_done() {
                warn!(pid = %child_pid, result = ?result, "Failed to kill child process");
            }
        }

        self.taskkill(root_pid, true).await
    }

    async fn force_termination(&self, pid: ProcessId) -> TerminationResult {
        match self.taskkill(pid, true).await {
            result if result.is_done() => result,
            result => {
                warn!(pid = %pid, result = ?result, "taskkill /F /T failed, walking process tree");
                self.terminate_process_tree(pid).await
            }
        }
    }
}

/// Spawns runs without a console window
pub struct WindowsProcessManager {
    terminator: Arc<WindowsTermination>,
}

impl Default for WindowsProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLifecycle for WindowsProcessManager {
    fn spawn_process(&self, command: &SpawnCommand) -> Result<RunHandle, RunError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .current_dir(&command.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let child = cmd.spawn().map_err(|source| RunError::Spawn {
            command: command.display_name(),
            source,
        })?;

        if let Some(pid) = child.id() {
            info!(
                pid = %pid,
                command = %command.display_name(),
                args = ?command.args,
                "Spawned Windows process"
            );
        }

        let display = format!("{} {}", command.display_name(), command.args.join(" "));
        Ok(RunHandle::from_child(child, display, self.terminator.clone()))
    }
}

impl ProcessManager for WindowsProcessManager {
    fn new() -> Self {
        debug!("Initializing Windows process manager");
        Self {
            terminator: Arc::new(WindowsTermination::new()),
        }
    }

    fn platform_name(&self) -> &'static str {
        "Windows"
    }

    fn terminator(&self) -> Arc<dyn ProcessTermination> {
        self.terminator.clone()
    }
}
