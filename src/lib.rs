//! toolsync - a registry of managed command-line tools
//!
//! toolsync classifies the tools of a development environment against a
//! whitelist and blacklist, and keeps a checksummed record of each tool's
//! help output so drift shows up as a changed CRC in the tool index.

pub mod baseline;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod hierarchy;
pub mod index;
pub mod process;
pub mod reconcile;
pub mod sync;
pub mod timestamp;

pub use error::{Result, ToolsyncError};
