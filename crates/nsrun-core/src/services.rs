use crate::cli::Cli;
use crate::config::ExtensionConfig;
use crate::pane::{Notifier, PaneFactory, TracingNotifier};
use crate::process::ProcessManager;
use crate::target::Platform;
use async_trait::async_trait;
use derive_builder::Builder;
use std::sync::Arc;
use tracing::info;

/// Usage analytics sink
#[async_trait]
pub trait Analytics: Send + Sync {
    async fn initialize(&self) -> anyhow::Result<()>;

    /// One successfully dispatched run
    async fn track_run(&self, platform: Platform) -> anyhow::Result<()>;
}

/// Analytics recorded as structured log events
#[derive(Debug, Clone, Copy)]
pub struct TracingAnalytics {
    enabled: bool,
}

impl TracingAnalytics {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for TracingAnalytics {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Analytics for TracingAnalytics {
    async fn initialize(&self) -> anyhow::Result<()> {
        if self.enabled {
            info!(target: "nsrun::analytics", "Analytics initialized");
        }
        Ok(())
    }

    async fn track_run(&self, platform: Platform) -> anyhow::Result<()> {
        if self.enabled {
            info!(target: "nsrun::analytics", platform = %platform, "Run command executed");
        }
        Ok(())
    }
}

/// Outcome of the startup update check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheckResult {
    /// `false` when the user should be told something
    pub result: bool,
    pub error: String,
}

impl UpdateCheckResult {
    pub fn ok() -> Self {
        Self {
            result: true,
            error: String::new(),
        }
    }

    pub fn warn(error: impl Into<String>) -> Self {
        Self {
            result: false,
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait UpdateCheck: Send + Sync {
    async fn check(&self) -> UpdateCheckResult;
}

/// Update check that never reports anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUpdateCheck;

#[async_trait]
impl UpdateCheck for NoUpdateCheck {
    async fn check(&self) -> UpdateCheckResult {
        UpdateCheckResult::ok()
    }
}

/// Collaborators shared by every command, read-only after activation
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct Services {
    #[builder(default)]
    pub config: ExtensionConfig,
    pub cli: Arc<Cli>,
    pub process_manager: Arc<dyn ProcessManager>,
    pub panes: Arc<dyn PaneFactory>,
    #[builder(default = "Arc::new(TracingNotifier)")]
    pub notifier: Arc<dyn Notifier>,
    #[builder(default = "Arc::new(TracingAnalytics::default())")]
    pub analytics: Arc<dyn Analytics>,
    #[builder(default = "Arc::new(NoUpdateCheck)")]
    pub update_check: Arc<dyn UpdateCheck>,
}

impl Services {
    pub fn builder() -> ServicesBuilder {
        ServicesBuilder::default()
    }
}
