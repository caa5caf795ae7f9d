//! Bounded parallel capture.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::baseline::{BaselineGenerator, BaselineResult};
use crate::domain::CommandSequence;
use crate::error::ToolsyncError;

use super::plan::{SyncOptions, TaskPlan};

/// A task whose capture failed
#[derive(Debug)]
pub struct TaskFailure {
    pub sequence: CommandSequence,
    pub error: ToolsyncError,
}

/// Outcome of one run, before anything is persisted
#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<BaselineResult>,
    pub errors: Vec<TaskFailure>,
    /// Tasks that ran to completion, successful or not
    pub processed: usize,
    pub skipped: usize,
    /// Dispatch stopped early because the error limit was reached
    pub aborted: bool,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.aborted
    }
}

fn limit_reached(errors: &AtomicUsize, limit: Option<usize>) -> bool {
    limit.is_some_and(|limit| errors.load(Ordering::SeqCst) >= limit)
}

/// Runs planned captures on a bounded worker pool.
pub struct SyncOrchestrator {
    generator: Arc<BaselineGenerator>,
    max_workers: usize,
    error_limit: Option<usize>,
}

impl SyncOrchestrator {
    pub fn new(generator: BaselineGenerator, options: &SyncOptions) -> Self {
        Self {
            generator: Arc::new(generator),
            max_workers: options.max_workers.max(1),
            // A zero limit would abort before the first task
            error_limit: options.error_limit.filter(|&limit| limit > 0),
        }
    }

    /// Dispatch every task in `plan`, at most `max_workers` at a time.
    ///
    /// Once the failure count reaches the error limit no further task is
    /// started; tasks already running finish and their results are kept.
    pub async fn run(&self, plan: TaskPlan) -> SyncReport {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let error_count = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();
        let mut in_flight = HashMap::new();
        let mut report = SyncReport {
            skipped: plan.skipped.len(),
            ..Default::default()
        };
        let total = plan.tasks.len();

        for (dispatched, task) in plan.tasks.into_iter().enumerate() {
            if limit_reached(&error_count, self.error_limit) {
                report.aborted = true;
                log::warn!("Error limit reached, not dispatching {} remaining tasks", total - dispatched);
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            // Failures may have landed while waiting for the permit
            if limit_reached(&error_count, self.error_limit) {
                report.aborted = true;
                log::warn!("Error limit reached, not dispatching {} remaining tasks", total - dispatched);
                break;
            }

            let generator = Arc::clone(&self.generator);
            let error_count = Arc::clone(&error_count);
            let sequence = task.sequence.clone();
            let handle = set.spawn(async move {
                let _permit = permit;
                let result = generator.generate_or_verify(&task.sequence).await;
                if result.is_err() {
                    error_count.fetch_add(1, Ordering::SeqCst);
                }
                (task.sequence, result)
            });
            in_flight.insert(handle.id(), sequence);
        }

        while let Some(joined) = set.join_next_with_id().await {
            report.processed += 1;
            match joined {
                Ok((id, (sequence, Ok(result)))) => {
                    in_flight.remove(&id);
                    log::info!("Captured '{}' ({})", sequence, result.crc);
                    report.results.push(result);
                }
                Ok((id, (sequence, Err(error)))) => {
                    in_flight.remove(&id);
                    log::error!("Capture failed for '{}': {}", sequence, error);
                    report.errors.push(TaskFailure { sequence, error });
                }
                Err(join_error) => {
                    let Some(sequence) = in_flight.remove(&join_error.id()) else {
                        log::error!("Worker task failed: {}", join_error);
                        continue;
                    };
                    log::error!("Worker for '{}' failed: {}", sequence, join_error);
                    report.errors.push(TaskFailure {
                        error: ToolsyncError::Capture {
                            sequence: sequence.clone(),
                            reason: format!("worker failed: {join_error}"),
                        },
                        sequence,
                    });
                }
            }
        }

        report.results.sort_by(|a, b| a.sequence.cmp(&b.sequence));
        report.errors.sort_by(|a, b| a.sequence.cmp(&b.sequence));
        log::info!(
            "Sync finished: {} processed, {} failed, {} skipped{}",
            report.processed,
            report.errors.len(),
            report.skipped,
            if report.aborted { ", aborted" } else { "" }
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::Capturer;
    use crate::sync::plan::SyncTask;
    use std::time::Duration;
    use tempfile::TempDir;

    fn seq(parts: &[&str]) -> CommandSequence {
        CommandSequence::from_parts(parts).unwrap()
    }

    fn plan(tools: &[&str]) -> TaskPlan {
        TaskPlan {
            tasks: tools
                .iter()
                .map(|t| SyncTask {
                    sequence: seq(&[t]),
                    previous_crc: None,
                })
                .collect(),
            skipped: vec![],
        }
    }

    /// Runner that succeeds for tools named `ok*` and fails for everything else.
    fn generator(root: &TempDir, sleep: &str) -> BaselineGenerator {
        let script = format!("sleep {sleep}; case \"$1\" in ok*) echo \"usage: $1\";; *) exit 1;; esac");
        let capturer = Capturer::new(
            vec!["sh".to_string(), "-c".to_string(), script, "sh".to_string()],
            Duration::from_secs(10),
        );
        BaselineGenerator::new(root.path(), capturer)
    }

    fn options(max_workers: usize, error_limit: Option<usize>) -> SyncOptions {
        SyncOptions {
            max_workers,
            error_limit,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_all_tasks_succeed() {
        let temp = TempDir::new().unwrap();
        let orchestrator = SyncOrchestrator::new(generator(&temp, "0"), &options(4, None));

        let report = orchestrator.run(plan(&["ok_b", "ok_a", "ok_c"])).await;
        assert!(report.is_success());
        assert_eq!(report.processed, 3);
        let done: Vec<_> = report.results.iter().map(|r| r.sequence.clone()).collect();
        assert_eq!(done, vec![seq(&["ok_a"]), seq(&["ok_b"]), seq(&["ok_c"])]);
    }

    #[tokio::test]
    async fn test_failures_without_limit_run_everything() {
        let temp = TempDir::new().unwrap();
        let orchestrator = SyncOrchestrator::new(generator(&temp, "0"), &options(2, None));

        let report = orchestrator.run(plan(&["bad1", "ok1", "bad2", "ok2"])).await;
        assert!(!report.aborted);
        assert_eq!(report.processed, 4);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.errors.len(), 2);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_error_limit_aborts_dispatch() {
        let temp = TempDir::new().unwrap();
        // One worker makes dispatch sequential: the first failure is seen
        // before the second task gets a permit
        let orchestrator = SyncOrchestrator::new(generator(&temp, "0"), &options(1, Some(1)));

        let report = orchestrator.run(plan(&["bad", "ok1", "ok2", "ok3"])).await;
        assert!(report.aborted);
        assert_eq!(report.errors.len(), 1);
        assert!(report.processed < 4);
    }

    #[tokio::test]
    async fn test_zero_error_limit_is_no_limit() {
        let temp = TempDir::new().unwrap();
        let orchestrator = SyncOrchestrator::new(generator(&temp, "0"), &options(1, Some(0)));

        let report = orchestrator.run(plan(&["ok1"])).await;
        assert!(!report.aborted);
        assert_eq!(report.processed, 1);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_in_flight_tasks_drain_on_abort() {
        let temp = TempDir::new().unwrap();
        let orchestrator = SyncOrchestrator::new(generator(&temp, "0.2"), &options(2, Some(1)));

        let report = orchestrator.run(plan(&["bad", "ok1", "ok2", "ok3", "ok4"])).await;
        assert!(report.aborted);
        // Whatever was dispatched completed and was reported
        assert_eq!(report.processed, report.results.len() + report.errors.len());
        assert!(report.processed >= 2);
        assert!(report.processed < 5);
    }

    #[tokio::test]
    async fn test_skipped_count_carried() {
        let temp = TempDir::new().unwrap();
        let orchestrator = SyncOrchestrator::new(generator(&temp, "0"), &options(1, None));
        let mut p = plan(&["ok"]);
        p.skipped = vec![seq(&["fresh1"]), seq(&["fresh2"])];

        let report = orchestrator.run(p).await;
        assert_eq!(report.skipped, 2);
        assert_eq!(report.processed, 1);
    }
}
