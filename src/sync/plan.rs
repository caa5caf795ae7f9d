//! Task planning and the skip policy.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use crate::config::SyncConfig;
use crate::discovery::{ConfigLists, discover_subcommands};
use crate::domain::CommandSequence;
use crate::index::{IndexEntry, ToolIndex};

/// Knobs for one sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Capture even when the entry was checked recently
    pub force: bool,
    /// Capture baselines; without it a run only discovers and reconciles
    pub generate: bool,
    /// Restrict the run to these tools
    pub tools: Option<BTreeSet<String>>,
    pub max_workers: usize,
    /// Stop dispatching after this many failures; `None` means never
    pub error_limit: Option<usize>,
    /// Entries checked at or after this timestamp are skipped
    pub since: Option<f64>,
    /// Entries checked within this window are skipped when `since` is unset
    pub freshness_window: Duration,
    pub lock_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            force: false,
            generate: false,
            tools: None,
            max_workers: config.max_workers,
            error_limit: config.error_limit,
            since: None,
            freshness_window: Duration::from_secs(config.freshness_window_secs),
            lock_timeout: config.lock_timeout(),
        }
    }

    /// Earliest `checked_timestamp` that still counts as fresh.
    pub fn fresh_cutoff(&self, now: f64) -> f64 {
        self.since
            .unwrap_or_else(|| now - self.freshness_window.as_secs_f64())
    }

    /// Returns true if a sequence with this entry needs no capture.
    pub fn should_skip(&self, entry: Option<&IndexEntry>, now: f64) -> bool {
        if self.force {
            return false;
        }
        match entry {
            Some(entry) if !entry.is_placeholder() => entry.checked_timestamp >= self.fresh_cutoff(now),
            _ => false,
        }
    }
}

/// One sequence to capture
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SyncTask {
    pub sequence: CommandSequence,
    /// Recorded checksum, if any
    pub previous_crc: Option<String>,
}

/// Tasks to dispatch plus the sequences the skip policy left out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPlan {
    pub tasks: Vec<SyncTask>,
    pub skipped: Vec<CommandSequence>,
}

impl TaskPlan {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Expand the syncable tools into command sequences and apply the skip policy.
pub fn plan_tasks(
    syncable: &BTreeSet<String>,
    lists: &ConfigLists,
    index: &ToolIndex,
    definitions_dir: &Path,
    options: &SyncOptions,
    now: f64,
) -> TaskPlan {
    if let Some(requested) = &options.tools {
        for tool in requested.difference(syncable) {
            log::warn!("Ignoring '{}': not a syncable managed tool", tool);
        }
    }

    let mut plan = TaskPlan::default();
    let selected = syncable
        .iter()
        .filter(|tool| options.tools.as_ref().is_none_or(|t| t.contains(*tool)));

    for tool in selected {
        let Some(root) = CommandSequence::new(vec![tool.clone()]) else {
            continue;
        };
        let mut sequences = vec![root];
        sequences.extend(discover_subcommands(
            tool,
            &lists.whitelist,
            &lists.blacklist,
            index,
            definitions_dir,
        ));

        for sequence in sequences {
            let entry = index.get_entry(&sequence);
            if options.should_skip(entry, now) {
                log::debug!("Skipping fresh '{}'", sequence);
                plan.skipped.push(sequence);
                continue;
            }
            plan.tasks.push(SyncTask {
                previous_crc: entry.filter(|e| !e.is_placeholder()).map(|e| e.crc.clone()),
                sequence,
            });
        }
    }

    log::info!("Planned {} tasks, {} skipped as fresh", plan.tasks.len(), plan.skipped.len());
    plan
}
