//! Configuration system for toolsync.
//!
//! A single YAML project config carries the whitelist/blacklist lists and
//! every runtime setting. It is loaded once at startup and passed by
//! reference; nothing reads configuration from globals.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{CaptureConfig, Config, EnvironmentConfig, PathsConfig, SandboxConfig, SyncConfig};

mod global;

/// Environment variable selecting the toolchain runner.
pub const RUNNER_ENV_VAR: &str = "TOOLSYNC_RUNNER";

/// Config file name looked up in the project and user config directories.
pub const CONFIG_FILE_NAME: &str = "toolsync.yml";

/// Candidate config locations in search order.
///
/// 1. Explicit path if provided
/// 2. toolsync.yml in current directory
/// 3. .toolsync.yml in current directory
/// 4. ~/.config/toolsync/toolsync.yml
pub fn config_candidates(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
    if let Some(path) = explicit_path {
        return vec![path.clone()];
    }

    let mut candidates = vec![
        PathBuf::from(CONFIG_FILE_NAME),
        PathBuf::from(format!(".{}", CONFIG_FILE_NAME)),
    ];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("toolsync").join(CONFIG_FILE_NAME));
    }
    candidates
}

/// Load configuration from the standard search paths.
///
/// Unlike most settings files, a missing config is fatal: the whitelist and
/// blacklist cannot be defaulted.
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<Config> {
    let candidates = config_candidates(explicit_path);
    for candidate in &candidates {
        if candidate.exists() {
            let config = Config::load_from_file(candidate)
                .map_err(|e| e.wrap_err(format!("Failed to load config from {}", candidate.display())))?;
            log::info!("Loaded config from {}", candidate.display());
            return Ok(config);
        }
    }

    let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
    eyre::bail!("No config file found (searched: {})", searched.join(", "))
}
