//! Synchronization of the tool index with reality.
//!
//! A run goes through four stages:
//! 1. discovery and reconciliation, which must be clean before anything runs
//! 2. planning: managed tools expand into command sequences, fresh ones skipped
//! 3. capture on a bounded worker pool, optionally inside a sandbox container
//! 4. one locked read-modify-write of the index with every result
//!
//! Workers never touch the index; persistence happens once in
//! [`apply_results`].

mod orchestrator;
mod plan;
pub mod sandbox;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::baseline::{BaselineGenerator, BaselineResult, Capturer};
use crate::config::Config;
use crate::discovery::{self, Discovery};
use crate::domain::CommandSequence;
use crate::error::{Result, ToolsyncError};
use crate::hierarchy::check_conflicts;
use crate::index::{Change, ToolIndex};
use crate::reconcile::{ReconciliationReport, reconcile};
use crate::timestamp::now_ts;

pub use orchestrator::{SyncOrchestrator, SyncReport, TaskFailure};
pub use plan::{SyncOptions, SyncTask, TaskPlan, plan_tasks};
pub use sandbox::{ContainerContext, ExecutionContext, HostContext};

/// Everything a sync run produced
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub reconciliation: ReconciliationReport,
    /// `None` when captures were not requested
    pub report: Option<SyncReport>,
    /// Index change per captured sequence
    pub changes: Vec<(CommandSequence, Change)>,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.report.as_ref().is_none_or(SyncReport::is_success)
    }
}

/// Persist capture results with one locked reload, merge and save.
pub fn apply_results(
    index_path: &Path,
    results: &[BaselineResult],
    lock_timeout: Duration,
) -> Result<Vec<(CommandSequence, Change)>> {
    if results.is_empty() {
        return Ok(Vec::new());
    }
    let changes = ToolIndex::with_locked(index_path, lock_timeout, |index| {
        Ok(results
            .iter()
            .map(|result| {
                let change = index.record_verification(&result.sequence, &result.verification());
                (result.sequence.clone(), change)
            })
            .collect::<Vec<_>>())
    })?;
    log::info!("Recorded {} results in {}", changes.len(), index_path.display());
    Ok(changes)
}

/// Remove index entries for tools outside `keep`, under the index lock.
pub async fn prune_index(index_path: PathBuf, keep: BTreeSet<String>, lock_timeout: Duration) -> Result<Vec<String>> {
    let removed =
        locked_blocking(move || ToolIndex::with_locked(&index_path, lock_timeout, |index| Ok(index.prune(&keep))))
            .await?;
    log::info!("Pruned {} index entries", removed.len());
    Ok(removed)
}

/// Run an index transaction off the async workers; lock acquisition polls
/// with blocking sleeps.
async fn locked_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolsyncError::Index(format!("Index update task failed: {e}")))?
}

/// Discover and reconcile, failing on conflicts.
///
/// Reconciliation errors are left in the report for the caller to decide on.
pub async fn survey(config: &Config, wrapper: &[String]) -> Result<(Discovery, ReconciliationReport)> {
    let discovery = discovery::discover(config, wrapper).await?;

    let conflicts = check_conflicts(&discovery.lists.whitelist, &discovery.lists.blacklist);
    if !conflicts.is_empty() {
        return Err(ToolsyncError::Conflicts(conflicts));
    }

    let report = reconcile(&discovery)?;
    Ok((discovery, report))
}

/// Full sync run inside `context`.
///
/// The context is started before discovery and always stopped afterwards,
/// including when the run fails.
pub async fn sync(config: &Config, options: &SyncOptions, context: &mut dyn ExecutionContext) -> Result<SyncOutcome> {
    context.start().await?;
    log::debug!("Execution context '{}' started", context.name());

    let outcome = run_in_context(config, options, &*context).await;

    if let Err(e) = context.stop().await {
        log::error!("Failed to stop execution context '{}': {}", context.name(), e);
        if outcome.is_ok() {
            return Err(e);
        }
    }
    outcome
}

async fn run_in_context(config: &Config, options: &SyncOptions, context: &dyn ExecutionContext) -> Result<SyncOutcome> {
    let wrapper = context.command_prefix();
    let (discovery, reconciliation) = survey(config, &wrapper).await?;
    reconciliation.ensure_valid()?;

    if !options.generate {
        log::info!("Baseline generation not requested, stopping after reconciliation");
        return Ok(SyncOutcome {
            reconciliation,
            ..Default::default()
        });
    }

    let index_path = config.index_file();
    let index = ToolIndex::load(&index_path)?;
    let plan = plan_tasks(
        &reconciliation.syncable(),
        &discovery.lists,
        &index,
        &discovery.definitions_dir,
        options,
        now_ts(),
    );

    let capturer = Capturer::new(config.environment.runner_prefix(), config.capture.timeout()).with_wrapper(wrapper);
    let overrides = config
        .capture
        .overrides
        .keys()
        .filter_map(|tool| {
            config
                .executable_override(tool)
                .map(|path| (tool.clone(), context.map_path(&path)))
        })
        .collect();
    let generator = BaselineGenerator::new(&discovery.definitions_dir, capturer).with_overrides(overrides);

    let report = SyncOrchestrator::new(generator, options).run(plan).await;
    let results = report.results.clone();
    let lock_timeout = options.lock_timeout;
    let changes = locked_blocking(move || apply_results(&index_path, &results, lock_timeout)).await?;

    Ok(SyncOutcome {
        reconciliation,
        report: Some(report),
        changes,
    })
}
