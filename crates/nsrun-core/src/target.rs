use crate::cli::Cli;
use crate::error::RunError;
use crate::process::{ProcessManager, RunHandle};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mobile platform a run deploys to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    /// Name shown to the user
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::Android => "Android",
        }
    }

    /// Argument passed to `tns run`
    pub fn cli_name(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Something that can start one run of a project on a platform
pub trait RunTarget: Send + Sync {
    fn platform_name(&self) -> &str;

    /// Directory the run needs; `None` when no workspace is open
    fn working_directory(&self) -> Option<&Path>;

    /// Spawn the run process
    fn run(&self) -> Result<RunHandle, RunError>;
}

/// A NativeScript project run through the CLI on one platform
pub struct PlatformProject {
    platform: Platform,
    project_root: Option<PathBuf>,
    cli: Arc<Cli>,
    process_manager: Arc<dyn ProcessManager>,
}

impl PlatformProject {
    pub fn new(
        platform: Platform,
        project_root: Option<PathBuf>,
        cli: Arc<Cli>,
        process_manager: Arc<dyn ProcessManager>,
    ) -> Self {
        Self {
            platform,
            project_root,
            cli,
            process_manager,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

impl RunTarget for PlatformProject {
    fn platform_name(&self) -> &str {
        self.platform.display_name()
    }

    fn working_directory(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    fn run(&self) -> Result<RunHandle, RunError> {
        let root = self.project_root.as_deref().ok_or(RunError::NoWorkspace)?;
        let command = self.cli.run_command(self.platform, root)?;
        self.process_manager.spawn_process(&command)
    }
}
