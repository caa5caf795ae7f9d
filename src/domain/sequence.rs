//! Command sequences.
//!
//! A command sequence names one manageable unit: a tool (`["ruff"]`) or a
//! tool plus a subcommand path (`["ruff", "check"]`). Equality is positional.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered, non-empty list of path segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandSequence(Vec<String>);

impl CommandSequence {
    /// Build a sequence, rejecting empty lists and empty segments.
    pub fn new(parts: Vec<String>) -> Option<Self> {
        if parts.is_empty() || parts.iter().any(|p| p.trim().is_empty()) {
            return None;
        }
        Some(Self(parts))
    }

    /// Convenience constructor from string slices.
    pub fn from_parts(parts: &[&str]) -> Option<Self> {
        Self::new(parts.iter().map(|p| p.to_string()).collect())
    }

    /// Parse a `tool:sub:sub` config path. No wildcards or sibling lists.
    pub fn from_config_path(path: &str) -> Option<Self> {
        Self::new(path.split(':').map(|s| s.trim().to_string()).collect())
    }

    /// The tool this sequence belongs to.
    pub fn tool(&self) -> &str {
        &self.0[0]
    }

    /// Subcommand segments after the tool name.
    pub fn subcommands(&self) -> &[String] {
        &self.0[1..]
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_tool(&self) -> bool {
        self.0.len() == 1
    }

    /// Extend this sequence by one segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(segment.into());
        Self(parts)
    }

    /// Identifier used for artifact file names (`ruff_check`).
    pub fn tool_id(&self) -> String {
        self.0.join("_")
    }

    /// Config grammar form (`ruff:check`).
    pub fn to_config_path(&self) -> String {
        self.0.join(":")
    }
}

impl fmt::Display for CommandSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

impl TryFrom<Vec<String>> for CommandSequence {
    type Error = String;

    fn try_from(parts: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(parts).ok_or_else(|| "command sequence must be non-empty".to_string())
    }
}

impl From<CommandSequence> for Vec<String> {
    fn from(seq: CommandSequence) -> Self {
        seq.0
    }
}
