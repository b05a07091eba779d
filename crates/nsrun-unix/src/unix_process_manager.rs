use anyhow::Result;
use async_trait::async_trait;
use nsrun_core::{
    ProcessId, ProcessLifecycle, ProcessManager, ProcessTermination, RunError, RunHandle,
    SpawnCommand, TerminationResult,
};
use std::sync::Arc;

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use std::process::Stdio;
    use std::sync::Mutex;
    use sysinfo::System;
    use tokio::process::Command;
    use tracing::{debug, info, warn};

    fn signal_result(target: &str, pid: ProcessId, signal: Signal, result: nix::Result<()>) -> TerminationResult {
        match result {
            Ok(()) => {
                debug!("Sent {:?} to {} {}", signal, target, pid);
                TerminationResult::Success
            }
            Err(Errno::ESRCH) => {
                debug!("{} {} not found (already terminated)", target, pid);
                TerminationResult::ProcessNotFound
            }
            Err(Errno::EPERM) => {
                warn!("Permission denied to signal {} {}", target, pid);
                TerminationResult::AccessDenied
            }
            Err(e) => {
                warn!("Failed to send {:?} to {} {}: {}", signal, target, pid, e);
                TerminationResult::Failed(format!("{signal:?} failed: {e}"))
            }
        }
    }

    /// Signals runs spawned as process group leaders
    pub struct UnixTermination {
        system: Mutex<System>,
    }

    impl UnixTermination {
        fn new() -> Self {
            Self {
                system: Mutex::new(System::new()),
            }
        }

        /// Signal the group led by `pid`, or `pid` alone when it leads no group
        fn signal_group(&self, pid: ProcessId, signal: Signal) -> TerminationResult {
            let nix_pid = NixPid::from_raw(pid.0 as i32);
            match signal_result("process group", pid, signal, signal::killpg(nix_pid, signal)) {
                TerminationResult::ProcessNotFound => {
                    signal_result("process", pid, signal, signal::kill(nix_pid, signal))
                }
                result => result,
            }
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

    #[async_trait]
    impl ProcessTermination for UnixTermination {
        fn terminate_process_group(&self, pid: ProcessId) -> TerminationResult {
            let result = self.signal_group(pid, Signal::SIGTERM);
            if result == TerminationResult::Success {
                info!("Sent SIGTERM to process group {}", pid);
            }
            result
        }

        fn kill_process_group(&self, pid: ProcessId) -> TerminationResult {
            let result = self.signal_group(pid, Signal::SIGKILL);
            if result == TerminationResult::Success {
                info!("Sent SIGKILL to process group {}", pid);
            }
            result
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
            info!("Killing process tree for root PID {}", root_pid);

            let children = match self.find_child_processes(root_pid).await {
                Ok(children) => children,
                Err(e) => {
                    warn!("Failed to find child processes for PID {}: {}", root_pid, e);
                    return TerminationResult::Failed(format!("Failed to enumerate children: {e}"));
                }
            };

            for child_pid in &children {
                let nix_pid = NixPid::from_raw(child_pid.0 as i32);
                let result = signal_result("process", *child_pid, Signal::SIGKILL, signal::kill(nix_pid, Signal::SIGKILL));
                if !result.is_done() {
                    warn!("Failed to kill child process {}: {:?}", child_pid, result);
                }
            }

            let nix_pid = NixPid::from_raw(root_pid.0 as i32);
            signal_result("process", root_pid, Signal::SIGKILL, signal::kill(nix_pid, Signal::SIGKILL))
        }
    }

    /// Spawns each run as the leader of its own process group
    pub struct UnixProcessManager {
        terminator: Arc<UnixTermination>,
    }

    impl Default for UnixProcessManager {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ProcessLifecycle for UnixProcessManager {
        fn spawn_process(&self, command: &SpawnCommand) -> Result<RunHandle, RunError> {
            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args)
                .envs(&command.env)
                .current_dir(&command.working_directory)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .process_group(0);

            let child = cmd.spawn().map_err(|source| RunError::Spawn {
                command: command.display_name(),
                source,
            })?;

            if let Some(pid) = child.id() {
                info!(
                    "Spawned Unix process: {} (PID: {}) with args: {:?}",
                    command.display_name(),
                    pid,
                    command.args
                );
            }

            let display = format!("{} {}", command.display_name(), command.args.join(" "));
            Ok(RunHandle::from_child(child, display, self.terminator.clone()))
        }
    }

    impl ProcessManager for UnixProcessManager {
        fn new() -> Self {
            debug!("Initializing Unix process manager");
            Self {
                terminator: Arc::new(UnixTermination::new()),
            }
        }

        fn platform_name(&self) -> &'static str {
            "Unix"
        }

        fn terminator(&self) -> Arc<dyn ProcessTermination> {
            self.terminator.clone()
        }
    }

}

#[cfg(unix)]
pub use unix_impl::{UnixProcessManager, UnixTermination};
