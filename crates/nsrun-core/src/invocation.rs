use crate::error::RunError;
use crate::process::RunHandle;
use crate::target::RunTarget;
use tracing::{debug, info};

/// Start one run of `target`.
///
/// The workspace is checked before anything is spawned, so a missing
/// workspace never launches a process.
pub fn run(target: &dyn RunTarget) -> Result<RunHandle, RunError> {
    let Some(dir) = target.working_directory() else {
        debug!(platform = %target.platform_name(), "Run refused: no workspace opened");
        return Err(RunError::NoWorkspace);
    };

    if !dir.is_dir() {
        debug!(platform = %target.platform_name(), dir = %dir.display(), "Run refused: workspace root missing");
        return Err(RunError::WorkspaceNotFound(dir.to_path_buf()));
    }

    let handle = target.run()?;
    info!(
        platform = %target.platform_name(),
        pid = ?handle.pid(),
        command = %handle.command(),
        "Started run"
    );
    Ok(handle)
}
