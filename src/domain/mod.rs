//! Domain types for toolsync
//!
//! This module contains the core value types shared by every component:
//! - CommandSequence: a tool name plus optional subcommand path
//! - ToolStatus: reconciliation classification of a discovered tool
//! - EffectiveStatus: whitelist/blacklist resolution of one sequence

pub mod sequence;
pub mod status;

pub use sequence::CommandSequence;
pub use status::{EffectiveStatus, ToolStatus};
