//! nsrun - run NativeScript projects on iOS and Android
//!
//! Wires the platform process manager into the core command layer and
//! provides the logging bootstrap used by the `nsrun` binary.

mod factory;
mod logging;

pub use factory::*;
pub use logging::*;
pub use nsrun_core::*;

use std::path::PathBuf;
use std::sync::Arc;

/// Detect the CLI and activate the extension for `workspace_root`.
///
/// Only an invalid configuration fails activation; an unusable CLI is
/// reported through the notifier and the commands are registered anyway.
pub async fn activate(
    config: ExtensionConfig,
    workspace_root: Option<PathBuf>,
    panes: Arc<dyn PaneFactory>,
) -> Result<Extension, RunError> {
    config.validate()?;
    let bounds = config.version_bounds()?;
    let cli = Cli::detect(config.cli_path(), &bounds, config.version_timeout()).await;

    let services = Services::builder()
        .cli(Arc::new(cli))
        .process_manager(create_process_manager())
        .panes(panes)
        .analytics(Arc::new(TracingAnalytics::new(config.analytics_enabled)))
        .config(config)
        .build()
        .map_err(|e| RunError::Configuration(e.to_string()))?;

    Ok(Extension::activate(services, workspace_root).await)
}
