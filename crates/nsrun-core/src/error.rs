use std::path::PathBuf;
use thiserror::Error;

/// Notification shown when a run's process cannot be started or supervised.
pub const RUN_FAILED_MESSAGE: &str = "Unexpected error executing NativeScript Run command.";

/// Core error types for run operations
#[derive(Error, Debug)]
pub enum RunError {
    #[error("No workspace opened.")]
    NoWorkspace,

    #[error("Workspace root does not exist: {}", .0.display())]
    WorkspaceNotFound(PathBuf),

    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Incompatible NativeScript CLI: {0}")]
    IncompatibleTool(String),

    #[error("Command {0} is no longer registered")]
    CommandDisposed(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RunError {
    /// Check if the run was refused before any process was created
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            RunError::NoWorkspace | RunError::WorkspaceNotFound(_) | RunError::CommandDisposed(_)
        )
    }

    /// Text for the user-visible notification reporting this error
    pub fn notification(&self) -> String {
        match self {
            RunError::NoWorkspace => self.to_string(),
            RunError::WorkspaceNotFound(_) => self.to_string(),
            RunError::Spawn { .. } | RunError::Other(_) => RUN_FAILED_MESSAGE.to_string(),
            RunError::IncompatibleTool(message) => message.clone(),
            RunError::CommandDisposed(_)
            | RunError::UnknownCommand(_)
            | RunError::Configuration(_) => self.to_string(),
        }
    }
}
