use crate::error::RunError;
use crate::process::SpawnCommand;
use crate::target::Platform;
use crate::version::{VersionBounds, VersionInfo, evaluate};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// The NativeScript CLI as discovered at startup
#[derive(Debug, Clone)]
pub struct Cli {
    path: PathBuf,
    version: VersionInfo,
}

impl Cli {
    /// Query `<path> --version` and evaluate it against `bounds`.
    ///
    /// Never fails: a missing executable, a timeout or a failing exit all
    /// produce a "not installed" verdict.
    pub async fn detect(path: impl Into<PathBuf>, bounds: &VersionBounds, timeout: Duration) -> Self {
        let path = path.into();
        let raw = query_version(&path, timeout).await;
        let version = evaluate(raw.as_deref(), bounds);

        if version.is_compatible() {
            info!(cli = %path.display(), version = %version, "Detected NativeScript CLI");
        } else {
            warn!(
                cli = %path.display(),
                version = %version,
                state = ?version.state(),
                "NativeScript CLI is not usable"
            );
        }

        Self { path, version }
    }

    /// Use an already evaluated version
    pub fn with_version(path: impl Into<PathBuf>, version: VersionInfo) -> Self {
        Self {
            path: path.into(),
            version,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    /// Command line that runs the project in `project_root` on `platform`
    pub fn run_command(
        &self,
        platform: Platform,
        project_root: &Path,
    ) -> Result<SpawnCommand, RunError> {
        SpawnCommand::builder()
            .program(self.path.clone())
            .args(["run", platform.cli_name()])
            .working_directory(project_root.to_path_buf())
            .build()
            .map_err(|e| RunError::Configuration(e.to_string()))
    }
}

async fn query_version(path: &Path, timeout: Duration) -> Option<String> {
    let output = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(Ok(output)) => {
            debug!(cli = %path.display(), status = %output.status, "Version query failed");
            None
        }
        Ok(Err(e)) => {
            debug!(cli = %path.display(), error = %e, "CLI could not be executed");
            None
        }
        Err(_) => {
            warn!(cli = %path.display(), timeout = ?timeout, "Timed out querying CLI version");
            None
        }
    }
}
