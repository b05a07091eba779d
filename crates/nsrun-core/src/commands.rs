use crate::error::RunError;
use crate::invocation;
use crate::pane::{OutputPane, ViewColumn};
use crate::services::Services;
use crate::supervisor::SupervisedRun;
use crate::target::{Platform, PlatformProject};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Commands contributed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    RunIos,
    RunAndroid,
    ShowOutputChannel,
}

impl CommandId {
    pub const ALL: [CommandId; 3] = [
        CommandId::RunIos,
        CommandId::RunAndroid,
        CommandId::ShowOutputChannel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandId::RunIos => "nativescript.runIos",
            CommandId::RunAndroid => "nativescript.runAndroid",
            CommandId::ShowOutputChannel => "nativescript.showOutputChannel",
        }
    }

    /// Platform a run command is bound to
    pub fn platform(&self) -> Option<Platform> {
        match self {
            CommandId::RunIos => Some(Platform::Ios),
            CommandId::RunAndroid => Some(Platform::Android),
            CommandId::ShowOutputChannel => None,
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandId {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| RunError::UnknownCommand(s.to_string()))
    }
}

/// What executing a command produced
pub enum CommandOutcome {
    /// A run was started and is now supervised
    Started(SupervisedRun),
    /// The diagnostic pane was revealed
    Shown,
}

impl fmt::Debug for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Started(run) => f
                .debug_struct("Started")
                .field("platform", &run.platform())
                .field("pid", &run.pid())
                .finish(),
            CommandOutcome::Shown => f.write_str("Shown"),
        }
    }
}

/// Title of the pane a run on `platform` writes to
pub fn run_pane_title(platform: Platform) -> String {
    format!("Run on {platform}")
}

/// Dispatches commands to run invocation with a pre-bound target
pub struct CommandSurface {
    services: Arc<Services>,
    workspace_root: Option<PathBuf>,
    info_channel: Arc<dyn OutputPane>,
}

impl CommandSurface {
    pub fn new(
        services: Arc<Services>,
        workspace_root: Option<PathBuf>,
        info_channel: Arc<dyn OutputPane>,
    ) -> Self {
        Self {
            services,
            workspace_root,
            info_channel,
        }
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    fn target(&self, platform: Platform) -> PlatformProject {
        PlatformProject::new(
            platform,
            self.workspace_root.clone(),
            self.services.cli.clone(),
            self.services.process_manager.clone(),
        )
    }

    pub fn execute(&self, id: CommandId) -> Result<CommandOutcome, RunError> {
        debug!(command = %id, "Executing command");
        match id.platform() {
            Some(platform) => self.run_platform(platform).map(CommandOutcome::Started),
            None => {
                self.show_output_channel();
                Ok(CommandOutcome::Shown)
            }
        }
    }

    /// Start a supervised run on `platform`.
    ///
    /// Failures are reported to the user here and returned to the caller; no
    /// pane is created for a run that never started.
    pub fn run_platform(&self, platform: Platform) -> Result<SupervisedRun, RunError> {
        let target = self.target(platform);
        let handle = match invocation::run(&target) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(platform = %platform, error = %e, "Run command failed");
                self.services.notifier.error(&e.notification());
                return Err(e);
            }
        };

        let pane = self.services.panes.create_pane(&run_pane_title(platform));
        let run = SupervisedRun::start(
            platform.display_name(),
            handle,
            pane,
            self.services.notifier.clone(),
            self.services.config.termination_grace(),
        );
        info!(platform = %platform, pid = ?run.pid(), "Run supervised");

        self.track_run(platform);
        Ok(run)
    }

    pub fn show_output_channel(&self) {
        self.info_channel.show(ViewColumn::Active);
    }

    fn track_run(&self, platform: Platform) {
        let analytics = self.services.analytics.clone();
        tokio::spawn(async move {
            if let Err(e) = analytics.track_run(platform).await {
                debug!(platform = %platform, error = %e, "Failed to record run analytics");
            }
        });
    }
}
