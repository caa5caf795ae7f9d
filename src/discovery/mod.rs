//! Tool discovery.
//!
//! Three independent sources name candidate tools:
//! - the toolchain environment (executables next to the active interpreter)
//! - the tool-definitions root (one subdirectory per managed tool)
//! - the whitelist/blacklist config lists
//!
//! The environment scan fails closed: any problem yields an empty set and a
//! warning. A missing definitions root is fatal.

mod subcommands;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, ToolsyncError};
use crate::hierarchy::{self, HierarchyNode};
use crate::process::run_with_timeout;

pub use subcommands::{definition_subcommands, discover_subcommands};

/// Whitelist and blacklist trees for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigLists {
    pub whitelist: HierarchyNode,
    pub blacklist: HierarchyNode,
}

impl ConfigLists {
    pub fn from_items<S: AsRef<str>>(whitelist: &[S], blacklist: &[S]) -> Self {
        Self {
            whitelist: hierarchy::parse(whitelist),
            blacklist: hierarchy::parse(blacklist),
        }
    }

    /// Every tool named at the top level of either list.
    pub fn tools(&self) -> BTreeSet<String> {
        self.whitelist
            .children
            .keys()
            .chain(self.blacklist.children.keys())
            .cloned()
            .collect()
    }
}

/// Parse the config's whitelist and blacklist.
pub fn scan_config(config: &Config) -> ConfigLists {
    let lists = ConfigLists::from_items(&config.whitelist, &config.blacklist);
    log::debug!(
        "Config lists name {} tools ({} whitelist items, {} blacklist items)",
        lists.tools().len(),
        config.whitelist.len(),
        config.blacklist.len()
    );
    lists
}

/// Names of the tools installed in the toolchain environment.
///
/// Runs `wrapper + runner + locate_command`, takes the last non-empty stdout
/// line as the executable directory and returns the file stems inside it.
/// With a wrapper the directory belongs to the sandbox, so it is listed
/// through the wrapper as well.
pub async fn scan_environment(
    wrapper: &[String],
    runner: &[String],
    locate_command: &[String],
    timeout: Duration,
) -> BTreeSet<String> {
    let argv: Vec<String> = wrapper.iter().chain(runner).chain(locate_command).cloned().collect();
    log::debug!("Locating toolchain executables: {:?}", argv);

    let Some(stdout) = run_scan_command(&argv, timeout).await else {
        return BTreeSet::new();
    };
    let Some(dir) = stdout.lines().map(str::trim).rfind(|l| !l.is_empty()) else {
        log::warn!("Environment scan printed no directory");
        return BTreeSet::new();
    };

    let listed = if wrapper.is_empty() {
        list_executables(Path::new(dir))
    } else {
        list_executables_in(wrapper, dir, timeout).await
    };
    match listed {
        Ok(tools) => {
            log::debug!("Found {} executables in {}", tools.len(), dir);
            tools
        }
        Err(e) => {
            log::warn!("Cannot list executable directory {}: {}", dir, e);
            BTreeSet::new()
        }
    }
}

/// Stdout of a successful scan command; `None` (with a warning) otherwise.
async fn run_scan_command(argv: &[String], timeout: Duration) -> Option<String> {
    let output = match run_with_timeout(argv, timeout).await {
        Ok(output) => output,
        Err(e) => {
            log::warn!("Environment scan failed to run {:?}: {}", argv, e);
            return None;
        }
    };
    if !output.status.success() {
        log::warn!(
            "Environment scan command {:?} exited with {:?}: {}",
            argv,
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// File stems of the regular files in `dir`, listed by running `find`
/// behind `wrapper`.
pub async fn list_executables_in(wrapper: &[String], dir: &str, timeout: Duration) -> std::io::Result<BTreeSet<String>> {
    let argv: Vec<String> = wrapper
        .iter()
        .cloned()
        .chain(
            ["find", "-L", dir, "-mindepth", "1", "-maxdepth", "1", "-type", "f"]
                .into_iter()
                .map(String::from),
        )
        .collect();
    let stdout = run_scan_command(&argv, timeout)
        .await
        .ok_or_else(|| std::io::Error::other("listing through the execution context failed"))?;

    Ok(stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| Path::new(l).file_stem().and_then(|s| s.to_str()).map(String::from))
        .collect())
}

/// File stems of the regular files in `dir`.
pub fn list_executables(dir: &Path) -> std::io::Result<BTreeSet<String>> {
    let mut tools = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            tools.insert(stem.to_string());
        }
    }
    Ok(tools)
}

/// Names of the subdirectories of the tool-definitions root.
///
/// Hidden directories are ignored.
pub fn scan_definitions_dir(root: &Path) -> Result<BTreeSet<String>> {
    if !root.is_dir() {
        return Err(ToolsyncError::MissingDefinitionsDir(root.to_path_buf()));
    }

    let mut tools = BTreeSet::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        tools.insert(name);
    }
    log::debug!("Found {} tool directories under {}", tools.len(), root.display());
    Ok(tools)
}

/// Everything discovery found for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    pub in_env: BTreeSet<String>,
    pub in_dir: BTreeSet<String>,
    pub lists: ConfigLists,
    pub definitions_dir: PathBuf,
}

impl Discovery {
    /// Union of every tool name from every source.
    pub fn all_tools(&self) -> BTreeSet<String> {
        let mut all = self.lists.tools();
        all.extend(self.in_env.iter().cloned());
        all.extend(self.in_dir.iter().cloned());
        all
    }
}

/// Run all three scanners.
///
/// `wrapper` is prepended to the environment scan command (the sandbox exec
/// prefix, when one is active).
pub async fn discover(config: &Config, wrapper: &[String]) -> Result<Discovery> {
    let definitions_dir = config.definitions_dir();
    let in_dir = scan_definitions_dir(&definitions_dir)?;
    let lists = scan_config(config);

    let in_env = scan_environment(
        wrapper,
        &config.environment.runner_prefix(),
        &config.environment.locate_command,
        config.environment.locate_timeout(),
    )
    .await;

    log::info!(
        "Discovery: {} in environment, {} in definitions dir, {} in config",
        in_env.len(),
        in_dir.len(),
        lists.tools().len()
    );
    Ok(Discovery {
        in_env,
        in_dir,
        lists,
        definitions_dir,
    })
}
