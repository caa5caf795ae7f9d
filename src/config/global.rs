//! Project configuration.
//!
//! Loaded from toolsync.yml, .toolsync.yml or ~/.config/toolsync/toolsync.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for toolsync, built once and passed by reference.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Allowed tools and subcommand paths.
    pub whitelist: Vec<String>,

    /// Denied tools and subcommand paths.
    pub blacklist: Vec<String>,

    /// Filesystem locations.
    pub paths: PathsConfig,

    /// Toolchain environment settings.
    pub environment: EnvironmentConfig,

    /// Baseline capture settings.
    pub capture: CaptureConfig,

    /// Sync orchestration settings.
    pub sync: SyncConfig,

    /// Optional container sandbox.
    pub sandbox: SandboxConfig,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    pub(crate) fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.sync.max_workers == 0 {
            eyre::bail!("sync.max-workers must be > 0");
        }
        if self.sync.error_limit == Some(0) {
            eyre::bail!("sync.error-limit must be > 0 (omit it for no limit)");
        }
        if self.capture.timeout_ms == 0 {
            eyre::bail!("capture.timeout-ms must be > 0");
        }
        if self.environment.locate_timeout_ms == 0 {
            eyre::bail!("environment.locate-timeout-ms must be > 0");
        }
        if self.sandbox.enabled && self.sandbox.image.trim().is_empty() {
            eyre::bail!("sandbox.image is required when the sandbox is enabled");
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Tool-definitions root.
    pub fn definitions_dir(&self) -> PathBuf {
        self.resolve(&self.paths.definitions_dir)
    }

    /// Tool index JSON file.
    pub fn index_file(&self) -> PathBuf {
        self.resolve(&self.paths.index_file)
    }

    /// Raw script override for a tool, resolved against the config directory.
    pub fn executable_override(&self, tool: &str) -> Option<PathBuf> {
        self.capture.overrides.get(tool).map(|p| self.resolve(p))
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root holding one subdirectory per managed tool.
    #[serde(rename = "definitions-dir")]
    pub definitions_dir: PathBuf,

    /// Tool index file.
    #[serde(rename = "index-file")]
    pub index_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            definitions_dir: PathBuf::from("tools"),
            index_file: PathBuf::from("tools/index.json"),
        }
    }
}

/// Toolchain environment settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Runner prefix that executes inside the toolchain (e.g. "uv run").
    pub runner: Option<String>,

    /// Command printing the toolchain's executable directory.
    #[serde(rename = "locate-command")]
    pub locate_command: Vec<String>,

    /// Timeout for the locate command in milliseconds.
    #[serde(rename = "locate-timeout-ms")]
    pub locate_timeout_ms: u64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            runner: None,
            locate_command: vec![
                "python".to_string(),
                "-c".to_string(),
                "import os, sys; print(os.path.dirname(sys.executable))".to_string(),
            ],
            locate_timeout_ms: 15_000,
        }
    }
}

impl EnvironmentConfig {
    /// Runner argv prefix, with TOOLSYNC_RUNNER taking precedence.
    pub fn runner_prefix(&self) -> Vec<String> {
        let from_env = std::env::var(crate::config::RUNNER_ENV_VAR).ok();
        split_runner(from_env.as_deref().or(self.runner.as_deref()))
    }

    pub fn locate_timeout(&self) -> Duration {
        Duration::from_millis(self.locate_timeout_ms)
    }
}

pub(crate) fn split_runner(runner: Option<&str>) -> Vec<String> {
    runner
        .map(|r| r.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

/// Baseline capture settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Timeout per capture in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Raw scripts run instead of the tool (no --help appended).
    pub overrides: BTreeMap<String, PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            overrides: BTreeMap::new(),
        }
    }
}

impl CaptureConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sync orchestration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Concurrent capture workers.
    #[serde(rename = "max-workers")]
    pub max_workers: usize,

    /// Entries checked within this many seconds are skipped.
    #[serde(rename = "freshness-window-secs")]
    pub freshness_window_secs: u64,

    /// How long to wait for the index lock in milliseconds.
    #[serde(rename = "lock-timeout-ms")]
    pub lock_timeout_ms: u64,

    /// Stop dispatching after this many failed tasks.
    #[serde(rename = "error-limit")]
    pub error_limit: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            freshness_window_secs: 86_400, // 1 day
            lock_timeout_ms: 10_000,
            error_limit: None,
        }
    }
}

impl SyncConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Container sandbox settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub enabled: bool,

    /// Container engine binary (docker or podman).
    pub engine: String,

    pub image: String,

    /// Mount point of the project inside the container.
    pub workdir: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            engine: "docker".to_string(),
            image: String::new(),
            workdir: "/workspace".to_string(),
        }
    }
}
