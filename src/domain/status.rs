//! Classification types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reconciliation status of a discovered tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolStatus {
    /// Whitelisted, has a definitions directory, installed
    ManagedOk,
    /// Whitelisted with a definitions directory but not installed
    ManagedMissingEnv,
    /// Whitelisted and installed, no definitions directory yet
    WhitelistedNotInDir,
    /// Blacklisted and installed, correctly unmanaged
    BlacklistedInEnv,
    /// Installed but named in neither list
    NewEnvTool,
    /// Blacklisted but has a definitions directory
    ErrorBlacklistedInDir,
    /// Definitions directory for a tool named in neither list
    ErrorOrphanInDir,
    /// Whitelisted but neither installed nor defined
    ErrorMissingWhitelisted,
}

impl ToolStatus {
    pub const ALL: [ToolStatus; 8] = [
        ToolStatus::ManagedOk,
        ToolStatus::ManagedMissingEnv,
        ToolStatus::WhitelistedNotInDir,
        ToolStatus::BlacklistedInEnv,
        ToolStatus::NewEnvTool,
        ToolStatus::ErrorBlacklistedInDir,
        ToolStatus::ErrorOrphanInDir,
        ToolStatus::ErrorMissingWhitelisted,
    ];

    /// Returns true for statuses that abort a run.
    ///
    /// `NewEnvTool` counts: an unclassified tool needs human triage.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ToolStatus::ErrorBlacklistedInDir
                | ToolStatus::ErrorOrphanInDir
                | ToolStatus::ErrorMissingWhitelisted
                | ToolStatus::NewEnvTool
        )
    }

    /// Returns true if the tool belongs to the managed set
    pub fn is_managed(&self) -> bool {
        matches!(
            self,
            ToolStatus::ManagedOk | ToolStatus::ManagedMissingEnv | ToolStatus::WhitelistedNotInDir
        )
    }

    /// Returns true if the tool can be captured in this environment
    pub fn is_syncable(&self) -> bool {
        matches!(self, ToolStatus::ManagedOk | ToolStatus::WhitelistedNotInDir)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::ManagedOk => "MANAGED_OK",
            ToolStatus::ManagedMissingEnv => "MANAGED_MISSING_ENV",
            ToolStatus::WhitelistedNotInDir => "WHITELISTED_NOT_IN_DIR",
            ToolStatus::BlacklistedInEnv => "BLACKLISTED_IN_ENV",
            ToolStatus::NewEnvTool => "NEW_ENV_TOOL",
            ToolStatus::ErrorBlacklistedInDir => "ERROR_BLACKLISTED_IN_DIR",
            ToolStatus::ErrorOrphanInDir => "ERROR_ORPHAN_IN_DIR",
            ToolStatus::ErrorMissingWhitelisted => "ERROR_MISSING_WHITELISTED",
        }
    }

    /// What a human should do about an error status
    pub fn remediation_hint(&self, tool: &str) -> Option<String> {
        let hint = match self {
            ToolStatus::ErrorBlacklistedInDir => format!(
                "remove the '{tool}' definitions directory or take '{tool}' off the blacklist"
            ),
            ToolStatus::ErrorOrphanInDir => {
                format!("add '{tool}' to the whitelist or blacklist, or delete its definitions directory")
            }
            ToolStatus::ErrorMissingWhitelisted => {
                format!("install '{tool}' in the environment or remove it from the whitelist")
            }
            ToolStatus::NewEnvTool => {
                format!("classify '{tool}' by adding it to the whitelist or blacklist")
            }
            _ => return None,
        };
        Some(hint)
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution of one sequence against the whitelist and blacklist trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectiveStatus {
    Whitelisted,
    Blacklisted,
    Unspecified,
}

impl fmt::Display for EffectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EffectiveStatus::Whitelisted => "WHITELISTED",
            EffectiveStatus::Blacklisted => "BLACKLISTED",
            EffectiveStatus::Unspecified => "UNSPECIFIED",
        };
        f.write_str(s)
    }
}
