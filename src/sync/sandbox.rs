//! Execution contexts for captures.
//!
//! Captures run either directly on the host or inside one long-lived
//! container started for the whole run. Either way the context only
//! contributes an argv prefix; the capture command itself is unchanged.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SandboxConfig;
use crate::error::{Result, ToolsyncError};
use crate::process::run_with_timeout;

const ENGINE_TIMEOUT: Duration = Duration::from_secs(120);

/// Where capture commands execute
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Prepare the context. Called once before any capture.
    async fn start(&mut self) -> Result<()>;

    /// Tear the context down. Called once after the last capture, also on abort.
    async fn stop(&mut self) -> Result<()>;

    /// Argv prefix placed in front of every command run in this context.
    fn command_prefix(&self) -> Vec<String>;

    /// Where a host path is visible to commands run in this context.
    fn map_path(&self, host_path: &Path) -> PathBuf {
        host_path.to_path_buf()
    }
}

/// Runs commands directly on the host
#[derive(Debug, Default)]
pub struct HostContext;

#[async_trait]
impl ExecutionContext for HostContext {
    fn name(&self) -> &str {
        "host"
    }

    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn command_prefix(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Runs commands inside a detached docker/podman container
#[derive(Debug)]
pub struct ContainerContext {
    engine: String,
    image: String,
    workdir: String,
    host_dir: PathBuf,
    container_id: Option<String>,
}

impl ContainerContext {
    /// `host_dir` is mounted at `workdir` inside the container.
    pub fn new(config: &SandboxConfig, host_dir: impl AsRef<Path>) -> Self {
        Self {
            engine: config.engine.clone(),
            image: config.image.clone(),
            workdir: config.workdir.clone(),
            host_dir: host_dir.as_ref().to_path_buf(),
            container_id: None,
        }
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    fn run_argv(&self) -> Vec<String> {
        vec![
            self.engine.clone(),
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{}", self.host_dir.display(), self.workdir),
            "-w".to_string(),
            self.workdir.clone(),
            self.image.clone(),
            "sleep".to_string(),
            "infinity".to_string(),
        ]
    }

    async fn engine(&self, argv: &[String]) -> Result<String> {
        let output = run_with_timeout(argv, ENGINE_TIMEOUT)
            .await
            .map_err(|e| ToolsyncError::Sandbox(format!("Failed to run {}: {}", self.engine, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolsyncError::Sandbox(format!(
                "{} {} failed: {}",
                self.engine,
                argv.get(1).map(String::as_str).unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ExecutionContext for ContainerContext {
    fn name(&self) -> &str {
        "container"
    }

    async fn start(&mut self) -> Result<()> {
        if self.container_id.is_some() {
            return Ok(());
        }
        let id = self.engine(&self.run_argv()).await?;
        if id.is_empty() {
            return Err(ToolsyncError::Sandbox(format!("{} run printed no container id", self.engine)));
        }
        log::info!("Started sandbox container {} from {}", id, self.image);
        self.container_id = Some(id);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(id) = self.container_id.take() else {
            return Ok(());
        };
        let argv = vec![self.engine.clone(), "rm".to_string(), "-f".to_string(), id.clone()];
        self.engine(&argv).await?;
        log::info!("Stopped sandbox container {}", id);
        Ok(())
    }

    fn command_prefix(&self) -> Vec<String> {
        match &self.container_id {
            Some(id) => vec![
                self.engine.clone(),
                "exec".to_string(),
                "-w".to_string(),
                self.workdir.clone(),
                id.clone(),
            ],
            None => Vec::new(),
        }
    }

    /// Paths under the mounted project move to `workdir`; anything else is
    /// passed through unchanged.
    fn map_path(&self, host_path: &Path) -> PathBuf {
        let absolute = if host_path.is_absolute() {
            host_path.to_path_buf()
        } else {
            match std::env::current_dir() {
                Ok(cwd) => cwd.join(host_path),
                Err(_) => return host_path.to_path_buf(),
            }
        };
        match absolute.strip_prefix(&self.host_dir) {
            Ok(relative) => Path::new(&self.workdir).join(relative),
            Err(_) => host_path.to_path_buf(),
        }
    }
}

/// Context selected by the sandbox config.
pub fn from_config(config: &SandboxConfig, host_dir: impl AsRef<Path>) -> Box<dyn ExecutionContext> {
    if config.enabled {
        Box::new(ContainerContext::new(config, host_dir))
    } else {
        Box::new(HostContext)
    }
}
