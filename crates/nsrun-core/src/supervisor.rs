use crate::error::RUN_FAILED_MESSAGE;
use crate::pane::{Notifier, OutputPane, ViewColumn};
use crate::process::{ProcessId, ProcessTermination, RunHandle, TerminalFuture, TerminationReason};
use crate::stdio::{self, Relay};
use crate::subscriptions::Disposable;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of one supervised run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Handle created, relay attached, pane shown
    Starting,
    /// Terminal event not yet observed
    Running,
    /// Process stopped; listeners being detached
    Exiting,
    /// Every resource of the run released
    Disposed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Exiting => "exiting",
            RunState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

struct DisposalState {
    pid: Option<ProcessId>,
    terminator: Arc<dyn ProcessTermination>,
    cancel: CancellationToken,
    disposed: AtomicBool,
    exited: AtomicBool,
}

impl DisposalState {
    fn release(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        if self.exited.load(Ordering::SeqCst) {
            debug!(pid = ?self.pid, "Run already exited, nothing to terminate");
            return;
        }

        let Some(pid) = self.pid else {
            return;
        };
        let result = self.terminator.terminate_process_group(pid);
        if result.is_done() {
            info!(pid = %pid, result = ?result, "Requested termination of run");
        } else {
            warn!(pid = %pid, result = ?result, "Failed to request termination of run");
        }
    }
}

impl Drop for DisposalState {
    fn drop(&mut self) {
        self.release();
    }
}

/// Single-use release of one run's process.
///
/// Only the first `dispose` acts; later calls, and calls after the process
/// has exited on its own, do nothing.
#[derive(Clone)]
pub struct DisposalGuard(Arc<DisposalState>);

impl DisposalGuard {
    fn new(
        pid: Option<ProcessId>,
        terminator: Arc<dyn ProcessTermination>,
        cancel: CancellationToken,
    ) -> Self {
        Self(Arc::new(DisposalState {
            pid,
            terminator,
            cancel,
            disposed: AtomicBool::new(false),
            exited: AtomicBool::new(false),
        }))
    }

    pub fn dispose(&self) {
        self.0.release();
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.load(Ordering::SeqCst)
    }

    fn mark_exited(&self) {
        self.0.exited.store(true, Ordering::SeqCst);
    }
}

impl Disposable for DisposalGuard {
    fn dispose(&self) {
        DisposalGuard::dispose(self);
    }

    fn is_disposed(&self) -> bool {
        DisposalGuard::is_disposed(self)
    }
}

/// A run owned by its supervisor task
pub struct SupervisedRun {
    platform: String,
    pid: Option<ProcessId>,
    state: watch::Receiver<RunState>,
    guard: DisposalGuard,
    task: JoinHandle<TerminationReason>,
}

impl SupervisedRun {
    /// Take ownership of `handle`: attach its output to `pane`, show the
    /// pane, and supervise the process until it is gone.
    ///
    /// `grace` is how long a disposed run may take to exit before it is
    /// force killed.
    pub fn start(
        platform: impl Into<String>,
        handle: RunHandle,
        pane: Arc<dyn OutputPane>,
        notifier: Arc<dyn Notifier>,
        grace: Duration,
    ) -> Self {
        let platform = platform.into();
        let parts = handle.into_parts();
        let (state_tx, state) = watch::channel(RunState::Starting);
        let cancel = CancellationToken::new();
        let guard = DisposalGuard::new(parts.pid, parts.terminator.clone(), cancel.clone());

        pane.clear();
        let relay = stdio::attach(parts.stdout, parts.stderr, pane.clone());
        pane.show(ViewColumn::Two);

        let task = tokio::spawn(supervise(Supervision {
            platform: platform.clone(),
            pid: parts.pid,
            terminal: parts.terminal,
            terminator: parts.terminator,
            relay,
            pane,
            notifier,
            guard: guard.clone(),
            cancel,
            state: state_tx,
            grace,
        }));

        Self {
            platform,
            pid: parts.pid,
            state,
            guard,
            task,
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    pub fn disposal_guard(&self) -> DisposalGuard {
        self.guard.clone()
    }

    /// Host-initiated teardown of this run
    pub fn dispose(&self) {
        self.guard.dispose();
    }

    /// Wait until the run is disposed and return how its process ended
    pub async fn wait(self) -> TerminationReason {
        match self.task.await {
            Ok(reason) => reason,
            Err(e) => {
                error!(platform = %self.platform, error = %e, "Run supervisor failed");
                TerminationReason::Failed(e.to_string())
            }
        }
    }
}

struct Supervision {
    platform: String,
    pid: Option<ProcessId>,
    terminal: TerminalFuture,
    terminator: Arc<dyn ProcessTermination>,
    relay: Relay,
    pane: Arc<dyn OutputPane>,
    notifier: Arc<dyn Notifier>,
    guard: DisposalGuard,
    cancel: CancellationToken,
    state: watch::Sender<RunState>,
    grace: Duration,
}

async fn supervise(run: Supervision) -> TerminationReason {
    let Supervision {
        platform,
        pid,
        mut terminal,
        terminator,
        relay,
        pane,
        notifier,
        guard,
        cancel,
        state,
        grace,
    } = run;

    state.send_replace(RunState::Running);

    let reason = tokio::select! {
        reason = &mut terminal => reason,
        _ = cancel.cancelled() => {
            debug!(platform = %platform, pid = ?pid, "Run disposed by host, waiting for exit");
            await_disposed_exit(pid, terminal, terminator.as_ref(), grace).await
        }
    };
    let host_initiated = cancel.is_cancelled();
    guard.mark_exited();

    if !reason.is_error() {
        state.send_replace(RunState::Exiting);
    }
    relay.detach().await;
    pane.hide();

    match &reason {
        TerminationReason::Failed(message) => {
            error!(platform = %platform, pid = ?pid, error = %message, "Run failed");
            if !host_initiated {
                notifier.error(RUN_FAILED_MESSAGE);
            }
        }
        TerminationReason::Exited(code) => {
            info!(platform = %platform, pid = ?pid, code = code, "Run exited");
        }
        TerminationReason::Signaled(signal) => {
            info!(platform = %platform, pid = ?pid, signal = signal, "Run killed by signal");
        }
    }

    guard.dispose();
    state.send_replace(RunState::Disposed);
    reason
}

/// The termination request has already been sent by the guard; escalate if
/// the process outlives the grace period.
async fn await_disposed_exit(
    pid: Option<ProcessId>,
    mut terminal: TerminalFuture,
    terminator: &dyn ProcessTermination,
    grace: Duration,
) -> TerminationReason {
    if let Ok(reason) = tokio::time::timeout(grace, &mut terminal).await {
        return reason;
    }

    let Some(pid) = pid else {
        return TerminationReason::Failed("process without pid did not exit".to_string());
    };

    warn!(pid = %pid, grace = ?grace, "Run ignored termination request, force killing");
    let result = terminator.force_termination(pid).await;
    if !result.is_done() {
        warn!(pid = %pid, result = ?result, "Force kill failed");
    }

    tokio::time::timeout(grace, terminal)
        .await
        .unwrap_or_else(|_| TerminationReason::Failed(format!("process {pid} did not exit after kill")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, RecordingPane, fake_run, fake_run_ignoring_term};
    use tokio::io::AsyncWriteExt;

    const GRACE: Duration = Duration::from_millis(200);

    fn start(
        handle: RunHandle,
    ) -> (SupervisedRun, Arc<RecordingPane>, Arc<RecordingNotifier>) {
        let pane = Arc::new(RecordingPane::new("Run on iOS"));
        let notifier = Arc::new(RecordingNotifier::default());
        let run = SupervisedRun::start("iOS", handle, pane.clone(), notifier.clone(), GRACE);
        (run, pane, notifier)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_normal_exit_hides_pane_without_error() {
        let (handle, mut process) = fake_run(100);
        let (run, pane, notifier) = start(handle);
        assert_eq!(pane.shown_in(), vec![ViewColumn::Two]);

        process.stdout.write_all(b"Project successfully built").await.unwrap();
        settle().await;
        assert_eq!(run.state(), RunState::Running);

        process.exit(TerminationReason::Exited(0));
        let guard = run.disposal_guard();
        let reason = run.wait().await;

        assert_eq!(reason, TerminationReason::Exited(0));
        assert_eq!(pane.text(), "Project successfully built");
        assert!(!pane.is_visible());
        assert!(notifier.errors().is_empty());
        assert!(guard.is_disposed());
        assert_eq!(process.terminator.term_requests(), 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let (handle, process) = fake_run(101);
        let (run, _pane, notifier) = start(handle);

        process.exit(TerminationReason::Exited(1));
        assert_eq!(run.wait().await, TerminationReason::Exited(1));
        assert!(notifier.errors().is_empty());
    }

    #[tokio::test]
    async fn test_no_output_after_terminal_event() {
        let (handle, mut process) = fake_run(102);
        let (run, pane, _notifier) = start(handle);

        process.stdout.write_all(b"first").await.unwrap();
        settle().await;
        process.exit(TerminationReason::Exited(0));
        let mut state = run.subscribe();
        state.wait_for(|s| *s == RunState::Disposed).await.unwrap();
        let seen = pane.append_count();

        let _ = process.stdout.write_all(b"late").await;
        let _ = process.stderr.write_all(b"late").await;
        settle().await;

        assert_eq!(pane.append_count(), seen);
        assert!(!pane.text().contains("late"));
        run.wait().await;
    }

    #[tokio::test]
    async fn test_failure_goes_straight_to_disposed_with_one_notification() {
        let (handle, process) = fake_run(103);
        let (run, pane, notifier) = start(handle);
        let mut state = run.subscribe();
        state.wait_for(|s| *s == RunState::Running).await.unwrap();

        process.exit(TerminationReason::Failed("spawn ENOENT".to_string()));

        let mut seen = Vec::new();
        while state.changed().await.is_ok() {
            seen.push(*state.borrow_and_update());
        }
        assert!(!seen.contains(&RunState::Exiting));
        assert_eq!(seen.last(), Some(&RunState::Disposed));

        assert!(run.wait().await.is_error());
        assert_eq!(notifier.errors(), vec![RUN_FAILED_MESSAGE.to_string()]);
        assert!(!pane.is_visible());
    }

    #[tokio::test]
    async fn test_dispose_terminates_running_process_once() {
        let (handle, process) = fake_run(104);
        let (run, pane, notifier) = start(handle);
        let guard = run.disposal_guard();

        guard.dispose();
        guard.dispose();
        run.dispose();

        let reason = run.wait().await;
        assert_eq!(reason, TerminationReason::Signaled(15));
        assert_eq!(process.terminator.term_requests(), 1);
        assert_eq!(process.terminator.kills(), 0);
        assert!(!pane.is_visible());
        assert!(notifier.errors().is_empty());

        guard.dispose();
        assert_eq!(process.terminator.term_requests(), 1);
    }

    #[tokio::test]
    async fn test_dispose_after_exit_is_noop() {
        let (handle, process) = fake_run(105);
        let (run, _pane, _notifier) = start(handle);
        let guard = run.disposal_guard();

        process.exit(TerminationReason::Exited(0));
        run.wait().await;

        guard.dispose();
        assert_eq!(process.terminator.term_requests(), 0);
    }

    #[tokio::test]
    async fn test_dispose_escalates_after_grace() {
        let (handle, process) = fake_run_ignoring_term(106);
        let (run, _pane, _notifier) = start(handle);

        run.dispose();
        let reason = run.wait().await;

        assert_eq!(reason, TerminationReason::Signaled(9));
        assert_eq!(process.terminator.term_requests(), 1);
        assert_eq!(process.terminator.kills(), 1);
    }

    #[tokio::test]
    async fn test_dropping_last_guard_after_exit_does_not_signal() {
        let (handle, process) = fake_run(107);
        let (run, _pane, _notifier) = start(handle);
        process.exit(TerminationReason::Exited(0));
        run.wait().await;
        assert_eq!(process.terminator.term_requests(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let (ios_handle, ios) = fake_run(200);
        let (android_handle, mut android) = fake_run(201);
        let (ios_run, _ios_pane, _) = start(ios_handle);
        let (android_run, android_pane, _) = start(android_handle);

        ios_run.dispose();
        assert_eq!(ios_run.wait().await, TerminationReason::Signaled(15));

        android.stdout.write_all(b"still building").await.unwrap();
        settle().await;
        assert_eq!(android_run.state(), RunState::Running);
        assert_eq!(android_pane.text(), "still building");
        assert_eq!(android.terminator.term_requests(), 0);

        android.exit(TerminationReason::Exited(0));
        assert_eq!(android_run.wait().await, TerminationReason::Exited(0));
        assert_eq!(ios.terminator.term_requests(), 1);
    }
}
