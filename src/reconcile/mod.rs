//! Tool reconciliation.
//!
//! Every tool name found by discovery is classified into exactly one
//! [`ToolStatus`] from four facts: is it installed, does it have a
//! definitions directory, is it whitelisted, is it blacklisted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use crate::discovery::{ConfigLists, Discovery};
use crate::domain::{CommandSequence, EffectiveStatus, ToolStatus};
use crate::error::Result;
use crate::hierarchy::effective_status;

/// Where a tool was seen and how the lists treat it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolPresence {
    pub in_env: bool,
    pub in_dir: bool,
    pub whitelisted: bool,
    pub blacklisted: bool,
}

/// Apply the decision table. `None` if no row matches.
///
/// Rows are checked errors first, then managed, then the other valid states.
pub fn classify(p: ToolPresence) -> Option<ToolStatus> {
    let ToolPresence {
        in_env,
        in_dir,
        whitelisted,
        blacklisted,
    } = p;

    let status = if blacklisted && in_dir {
        ToolStatus::ErrorBlacklistedInDir
    } else if in_dir && !whitelisted && !blacklisted {
        ToolStatus::ErrorOrphanInDir
    } else if whitelisted && !in_env && !in_dir {
        ToolStatus::ErrorMissingWhitelisted
    } else if whitelisted && in_dir && in_env {
        ToolStatus::ManagedOk
    } else if whitelisted && in_dir {
        ToolStatus::ManagedMissingEnv
    } else if whitelisted && in_env {
        ToolStatus::WhitelistedNotInDir
    } else if blacklisted && in_env {
        ToolStatus::BlacklistedInEnv
    } else if in_env && !whitelisted && !blacklisted {
        ToolStatus::NewEnvTool
    } else {
        return None;
    };
    Some(status)
}

/// Tool-level list membership as (whitelisted, blacklisted).
///
/// A tool with no decisive node of its own still counts as whitelisted when
/// the whitelist names any of its subcommands, and as blacklisted when only
/// the blacklist names it.
pub fn membership(tool: &str, lists: &ConfigLists) -> Result<(bool, bool)> {
    let Some(seq) = CommandSequence::new(vec![tool.to_string()]) else {
        return Ok((false, false));
    };
    let in_whitelist = lists.whitelist.names_tool(tool);
    let in_blacklist = lists.blacklist.names_tool(tool);

    let flags = match effective_status(&seq, &lists.whitelist, &lists.blacklist)? {
        EffectiveStatus::Whitelisted => (true, false),
        EffectiveStatus::Blacklisted => (false, true),
        EffectiveStatus::Unspecified => (in_whitelist, in_blacklist && !in_whitelist),
    };
    Ok(flags)
}

/// One misclassified tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub tool: String,
    pub status: ToolStatus,
    pub hint: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.tool, self.status, self.hint)
    }
}

/// Every hard reconciliation failure of a run, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Reconciliation failed for {} tool(s):\n{}", .violations.len(), format_violations(.violations))]
pub struct ReconciliationError {
    pub violations: Vec<Violation>,
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classification of every discovered tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationReport {
    pub statuses: BTreeMap<String, ToolStatus>,
    /// Tools no row of the decision table matched
    pub unclassified: Vec<String>,
}

impl ReconciliationReport {
    /// Tools in the managed set.
    pub fn managed(&self) -> BTreeSet<String> {
        self.with(ToolStatus::is_managed)
    }

    /// Managed tools that can be captured here.
    pub fn syncable(&self) -> BTreeSet<String> {
        self.with(ToolStatus::is_syncable)
    }

    fn with(&self, pred: impl Fn(&ToolStatus) -> bool) -> BTreeSet<String> {
        self.statuses
            .iter()
            .filter(|(_, status)| pred(*status))
            .map(|(tool, _)| tool.clone())
            .collect()
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.statuses
            .iter()
            .filter_map(|(tool, status)| {
                status.remediation_hint(tool).map(|hint| Violation {
                    tool: tool.clone(),
                    status: *status,
                    hint,
                })
            })
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.statuses.values().any(ToolStatus::is_error)
    }

    /// Fail with every violation if any tool is in an error state.
    pub fn ensure_valid(&self) -> std::result::Result<(), ReconciliationError> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ReconciliationError { violations })
        }
    }

    /// Tool count per status, for summaries.
    pub fn counts(&self) -> BTreeMap<ToolStatus, usize> {
        let mut counts = BTreeMap::new();
        for status in self.statuses.values() {
            *counts.entry(*status).or_insert(0) += 1;
        }
        counts
    }
}

/// Classify every tool named by any discovery source.
pub fn reconcile(discovery: &Discovery) -> Result<ReconciliationReport> {
    let mut report = ReconciliationReport::default();

    for tool in discovery.all_tools() {
        let (whitelisted, blacklisted) = membership(&tool, &discovery.lists)?;
        let presence = ToolPresence {
            in_env: discovery.in_env.contains(&tool),
            in_dir: discovery.in_dir.contains(&tool),
            whitelisted,
            blacklisted,
        };
        match classify(presence) {
            Some(status) => {
                log::debug!("{} -> {}", tool, status);
                report.statuses.insert(tool, status);
            }
            None => {
                log::warn!("No reconciliation rule matched '{}' ({:?})", tool, presence);
                report.unclassified.push(tool);
            }
        }
    }

    let errors = report.statuses.values().filter(|s| s.is_error()).count();
    log::info!(
        "Reconciled {} tools: {} managed, {} errors",
        report.statuses.len(),
        report.managed().len(),
        errors
    );
    Ok(report)
}
