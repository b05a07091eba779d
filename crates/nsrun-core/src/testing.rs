//! In-memory collaborators shared by the unit tests of this crate

use crate::error::RunError;
use crate::pane::{Notifier, OutputPane, PaneFactory, ViewColumn};
use crate::process::{
    ProcessId, ProcessLifecycle, ProcessManager, ProcessTermination, RunHandle, SpawnCommand,
    TerminationReason, TerminationResult,
};
use crate::services::{Analytics, UpdateCheck, UpdateCheckResult};
use crate::target::{Platform, RunTarget};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::DuplexStream;
use tokio::sync::{Notify, oneshot};

type ExitSender = Arc<Mutex<Option<oneshot::Sender<TerminationReason>>>>;

fn send_exit(sender: &ExitSender, reason: TerminationReason) -> bool {
    match sender.lock().unwrap().take() {
        Some(tx) => tx.send(reason).is_ok(),
        None => false,
    }
}

/// Records termination requests and ends the fake process in response
pub(crate) struct FakeTerminator {
    exit: ExitSender,
    ignore_term: bool,
    terms: AtomicUsize,
    kills: AtomicUsize,
}

impl FakeTerminator {
    pub(crate) fn term_requests(&self) -> usize {
        self.terms.load(Ordering::SeqCst)
    }

    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessTermination for FakeTerminator {
    fn terminate_process_group(&self, _pid: ProcessId) -> TerminationResult {
        self.terms.fetch_add(1, Ordering::SeqCst);
        if self.ignore_term {
            return TerminationResult::Success;
        }
        if send_exit(&self.exit, TerminationReason::Signaled(15)) {
            TerminationResult::Success
        } else {
            TerminationResult::ProcessNotFound
        }
    }

    fn kill_process_group(&self, _pid: ProcessId) -> TerminationResult {
        self.kills.fetch_add(1, Ordering::SeqCst);
        if send_exit(&self.exit, TerminationReason::Signaled(9)) {
            TerminationResult::Success
        } else {
            TerminationResult::ProcessNotFound
        }
    }

    async fn find_child_processes(&self, _pid: ProcessId) -> anyhow::Result<Vec<ProcessId>> {
        Ok(Vec::new())
    }

    async fn terminate_process_tree(&self, root_pid: ProcessId) -> TerminationResult {
        self.kill_process_group(root_pid)
    }
}

/// The process side of a fake run: write its output, end it
pub(crate) struct FakeProcess {
    pub stdout: DuplexStream,
    pub stderr: DuplexStream,
    pub terminator: Arc<FakeTerminator>,
}

impl FakeProcess {
    pub(crate) fn exit(&self, reason: TerminationReason) {
        send_exit(&self.terminator.exit, reason);
    }
}

fn build_run(pid: u32, ignore_term: bool) -> (RunHandle, FakeProcess) {
    let (stdout, stdout_reader) = tokio::io::duplex(4096);
    let (stderr, stderr_reader) = tokio::io::duplex(4096);
    let (tx, rx) = oneshot::channel();
    let terminator = Arc::new(FakeTerminator {
        exit: Arc::new(Mutex::new(Some(tx))),
        ignore_term,
        terms: AtomicUsize::new(0),
        kills: AtomicUsize::new(0),
    });

    let terminal = Box::pin(async move {
        rx.await
            .unwrap_or_else(|_| TerminationReason::Failed("fake process dropped".to_string()))
    });
    let handle = RunHandle::new(
        Some(ProcessId(pid)),
        "tns run",
        Some(Box::new(stdout_reader)),
        Some(Box::new(stderr_reader)),
        terminal,
        terminator.clone(),
    );

    (
        handle,
        FakeProcess {
            stdout,
            stderr,
            terminator,
        },
    )
}

/// A run that stops on the first termination request
pub(crate) fn fake_run(pid: u32) -> (RunHandle, FakeProcess) {
    build_run(pid, false)
}

/// A run that only stops when killed
pub(crate) fn fake_run_ignoring_term(pid: u32) -> (RunHandle, FakeProcess) {
    build_run(pid, true)
}

fn enoent(command: &str) -> RunError {
    RunError::Spawn {
        command: command.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
    }
}

pub(crate) struct FakeTarget {
    name: String,
    dir: Option<PathBuf>,
    handle: Mutex<Option<RunHandle>>,
    calls: AtomicUsize,
}

impl FakeTarget {
    pub(crate) fn new(name: &str, dir: Option<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            dir,
            handle: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every `run` fails as if the executable did not exist
    pub(crate) fn failing(name: &str, dir: Option<PathBuf>) -> Self {
        Self::new(name, dir)
    }

    pub(crate) fn with_handle(name: &str, dir: Option<PathBuf>, handle: RunHandle) -> Self {
        let target = Self::new(name, dir);
        *target.handle.lock().unwrap() = Some(handle);
        target
    }

    pub(crate) fn run_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RunTarget for FakeTarget {
    fn platform_name(&self) -> &str {
        &self.name
    }

    fn working_directory(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn run(&self) -> Result<RunHandle, RunError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.handle
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| enoent("tns"))
    }
}

/// Hands out queued runs and records what it was asked to spawn
#[derive(Default)]
pub(crate) struct FakeProcessManager {
    queued: Mutex<VecDeque<RunHandle>>,
    spawned: Mutex<Vec<SpawnCommand>>,
}

impl FakeProcessManager {
    pub(crate) fn queue(&self, handle: RunHandle) {
        self.queued.lock().unwrap().push_back(handle);
    }

    pub(crate) fn spawned(&self) -> Vec<SpawnCommand> {
        self.spawned.lock().unwrap().clone()
    }
}

impl ProcessLifecycle for FakeProcessManager {
    fn spawn_process(&self, command: &SpawnCommand) -> Result<RunHandle, RunError> {
        self.spawned.lock().unwrap().push(command.clone());
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| enoent(&command.display_name()))
    }
}

impl ProcessManager for FakeProcessManager {
    fn new() -> Self {
        Self::default()
    }

    fn platform_name(&self) -> &'static str {
        "fake"
    }

    fn terminator(&self) -> Arc<dyn ProcessTermination> {
        fake_run(0).1.terminator
    }
}

/// Pane that keeps everything it is told
pub(crate) struct RecordingPane {
    title: String,
    chunks: Mutex<Vec<String>>,
    visible: AtomicBool,
    shown: Mutex<Vec<ViewColumn>>,
    hides: AtomicUsize,
    clears: AtomicUsize,
    appended: Notify,
}

impl RecordingPane {
    pub(crate) fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            chunks: Mutex::new(Vec::new()),
            visible: AtomicBool::new(false),
            shown: Mutex::new(Vec::new()),
            hides: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            appended: Notify::new(),
        }
    }

    pub(crate) fn text(&self) -> String {
        self.chunks.lock().unwrap().concat()
    }

    pub(crate) fn append_count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    pub(crate) fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub(crate) fn shown_in(&self) -> Vec<ViewColumn> {
        self.shown.lock().unwrap().clone()
    }

    pub(crate) fn hides(&self) -> usize {
        self.hides.load(Ordering::SeqCst)
    }

    pub(crate) fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Wait until the accumulated text contains `needle`
    pub(crate) async fn wait_for_text(&self, needle: &str) {
        loop {
            let notified = self.appended.notified();
            if self.text().contains(needle) {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl OutputPane for RecordingPane {
    fn title(&self) -> &str {
        &self.title
    }

    fn show(&self, column: ViewColumn) {
        self.visible.store(true, Ordering::SeqCst);
        self.shown.lock().unwrap().push(column);
    }

    fn hide(&self) {
        self.visible.store(false, Ordering::SeqCst);
        self.hides.fetch_add(1, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    async fn append(&self, text: &str) {
        self.chunks.lock().unwrap().push(text.to_string());
        self.appended.notify_waiters();
    }
}

#[derive(Default)]
pub(crate) struct RecordingPaneFactory {
    panes: Mutex<Vec<Arc<RecordingPane>>>,
}

impl RecordingPaneFactory {
    pub(crate) fn panes(&self) -> Vec<Arc<RecordingPane>> {
        self.panes.lock().unwrap().clone()
    }

    pub(crate) fn pane(&self, title: &str) -> Option<Arc<RecordingPane>> {
        self.panes()
            .into_iter()
            .rev()
            .find(|pane| pane.title() == title)
    }
}

impl PaneFactory for RecordingPaneFactory {
    fn create_pane(&self, title: &str) -> Arc<dyn OutputPane> {
        let pane = Arc::new(RecordingPane::new(title));
        self.panes.lock().unwrap().push(pane.clone());
        pane
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    infos: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub(crate) fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub(crate) fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub(crate) struct FakeAnalytics {
    fail: bool,
    initialized: AtomicUsize,
    runs: Mutex<Vec<Platform>>,
}

impl FakeAnalytics {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub(crate) fn runs(&self) -> Vec<Platform> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analytics for FakeAnalytics {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("analytics backend unavailable");
        }
        Ok(())
    }

    async fn track_run(&self, platform: Platform) -> anyhow::Result<()> {
        self.runs.lock().unwrap().push(platform);
        if self.fail {
            anyhow::bail!("analytics backend unavailable");
        }
        Ok(())
    }
}

/// Update check answering with a fixed result once released
pub(crate) struct FakeUpdateCheck {
    result: UpdateCheckResult,
    release: Arc<Notify>,
    gated: bool,
}

impl FakeUpdateCheck {
    pub(crate) fn new(result: UpdateCheckResult) -> Self {
        Self {
            result,
            release: Arc::new(Notify::new()),
            gated: false,
        }
    }

    /// Answer only after `release` is notified
    pub(crate) fn gated(result: UpdateCheckResult) -> (Self, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let check = Self {
            result,
            release: release.clone(),
            gated: true,
        };
        (check, release)
    }
}

#[async_trait]
impl UpdateCheck for FakeUpdateCheck {
    async fn check(&self) -> UpdateCheckResult {
        if self.gated {
            self.release.notified().await;
        }
        self.result.clone()
    }
}
