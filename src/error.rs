//! Error types for toolsync
//!
//! Centralized error handling using thiserror.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::CommandSequence;
use crate::reconcile::ReconciliationError;

/// All error types that can occur in toolsync
#[derive(Debug, Error)]
pub enum ToolsyncError {
    /// Configuration could not be located or is invalid
    #[error("Config error: {0}")]
    Config(String),

    /// The tool-definitions root does not exist
    #[error("Tool definitions directory not found: {}", .0.display())]
    MissingDefinitionsDir(PathBuf),

    /// Whitelist and blacklist overlap
    #[error("Whitelist/blacklist conflicts: {}", format_sequences(.0))]
    Conflicts(Vec<CommandSequence>),

    /// One or more tools are misclassified
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    /// Both lists are equally decisive for a sequence
    #[error("Unresolved whitelist/blacklist tie for '{0}'")]
    UnresolvedTie(CommandSequence),

    /// Capture process could not be run
    #[error("Capture failed for '{sequence}': {reason}")]
    Capture { sequence: CommandSequence, reason: String },

    /// Capture process exceeded its timeout
    #[error("Capture timed out for '{sequence}' after {}ms", .timeout.as_millis())]
    CaptureTimeout { sequence: CommandSequence, timeout: Duration },

    /// Index lock could not be acquired in time
    #[error("Timed out after {}ms waiting for index lock {}", .waited.as_millis(), .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    /// Sandbox container could not be started or stopped
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Index document is unusable
    #[error("Index error: {0}")]
    Index(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML config parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn format_sequences(sequences: &[CommandSequence]) -> String {
    sequences
        .iter()
        .map(|s| format!("'{}'", s.to_config_path()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for toolsync operations
pub type Result<T> = std::result::Result<T, ToolsyncError>;
