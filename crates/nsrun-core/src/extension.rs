use crate::commands::{CommandId, CommandOutcome, CommandSurface};
use crate::error::RunError;
use crate::pane::OutputPane;
use crate::services::Services;
use crate::subscriptions::{Disposable, Subscriptions};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Title of the persistent diagnostic pane
pub const INFO_CHANNEL_TITLE: &str = "NativeScript Extension";

/// A command as registered with the host
pub struct CommandRegistration {
    id: CommandId,
    disposed: AtomicBool,
}

impl CommandRegistration {
    fn new(id: CommandId) -> Self {
        Self {
            id,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }
}

impl Disposable for CommandRegistration {
    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!(command = %self.id, "Command unregistered");
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// The activated extension: registered commands plus everything they started.
///
/// Dropping it deactivates it.
pub struct Extension {
    services: Arc<Services>,
    surface: CommandSurface,
    info_channel: Arc<dyn OutputPane>,
    commands: HashMap<CommandId, Arc<CommandRegistration>>,
    subscriptions: Subscriptions,
    background: CancellationToken,
    update_check: Mutex<Option<JoinHandle<()>>>,
    deactivated: AtomicBool,
}

impl Extension {
    /// Activate against `workspace_root` (`None` when no folder is open).
    ///
    /// An incompatible CLI is reported but does not prevent registration.
    pub async fn activate(services: Services, workspace_root: Option<PathBuf>) -> Self {
        let services = Arc::new(services);
        let background = CancellationToken::new();

        let analytics = services.analytics.clone();
        tokio::spawn(async move {
            if let Err(e) = analytics.initialize().await {
                debug!(error = %e, "Failed to initialize analytics");
            }
        });

        let update_check = tokio::spawn(run_update_check(services.clone(), background.clone()));

        let version = services.cli.version();
        if let Some(message) = version.error_message() {
            services.notifier.error(message);
        }

        let info_channel = services.panes.create_pane(INFO_CHANNEL_TITLE);
        for line in info_lines(&version.to_string()) {
            info_channel.append_line(&line).await;
        }

        let subscriptions = Subscriptions::new();
        let commands: HashMap<_, _> = CommandId::ALL
            .into_iter()
            .map(|id| (id, Arc::new(CommandRegistration::new(id))))
            .collect();
        for registration in commands.values() {
            subscriptions.push(Box::new(registration.clone()));
        }

        info!(
            workspace = ?workspace_root,
            cli = %services.cli.path().display(),
            cli_version = %version,
            "Extension activated"
        );

        let surface = CommandSurface::new(services.clone(), workspace_root, info_channel.clone());
        Self {
            services,
            surface,
            info_channel,
            commands,
            subscriptions,
            background,
            update_check: Mutex::new(Some(update_check)),
            deactivated: AtomicBool::new(false),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn info_channel(&self) -> &Arc<dyn OutputPane> {
        &self.info_channel
    }

    pub fn is_registered(&self, id: CommandId) -> bool {
        self.commands
            .get(&id)
            .is_some_and(|registration| !registration.is_disposed())
    }

    /// Execute a registered command; started runs are disposed on deactivation
    pub fn execute(&self, id: CommandId) -> Result<CommandOutcome, RunError> {
        if !self.is_registered(id) {
            return Err(RunError::CommandDisposed(id.as_str().to_string()));
        }

        let outcome = self.surface.execute(id)?;
        if let CommandOutcome::Started(run) = &outcome {
            self.subscriptions.push(Box::new(run.disposal_guard()));
        }
        Ok(outcome)
    }

    /// Execute a command by its host-facing name
    pub fn execute_named(&self, name: &str) -> Result<CommandOutcome, RunError> {
        self.execute(name.parse()?)
    }

    pub fn dispose_command(&self, id: CommandId) {
        if let Some(registration) = self.commands.get(&id) {
            registration.dispose();
        }
    }

    /// Live subscriptions: registered commands plus unfinished runs
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.active()
    }

    /// Stop the update check and dispose every subscription.
    ///
    /// Termination of still-running processes is requested before this
    /// returns.
    pub fn deactivate(&self) {
        if self.deactivated.swap(true, Ordering::SeqCst) {
            return;
        }

        self.background.cancel();
        let update_check = self
            .update_check
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = update_check {
            task.abort();
        }

        self.subscriptions.dispose_all();
        info!("Extension deactivated");
    }
}

impl Drop for Extension {
    fn drop(&mut self) {
        self.deactivate();
    }
}

async fn run_update_check(services: Arc<Services>, cancel: CancellationToken) {
    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = services.update_check.check() => result,
    };

    if cancel.is_cancelled() {
        return;
    }
    if !result.result {
        warn!(error = %result.error, "Update check reported a problem");
        services.notifier.warning(&result.error);
    }
}

fn info_lines(cli_version: &str) -> Vec<String> {
    let mut lines = vec![format!("Version: {}", env!("CARGO_PKG_VERSION"))];
    if let Some(build) = option_env!("NSRUN_BUILD_VERSION") {
        lines.push(format!("Build version: {build}"));
    }
    if let Some(commit) = option_env!("NSRUN_COMMIT_ID") {
        lines.push(format!("Commit id: {commit}"));
    }
    lines.push(format!("NativeScript CLI: {cli_version}"));
    lines
}
