//! Subcommand discovery for managed tools.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::domain::{CommandSequence, EffectiveStatus};
use crate::hierarchy::{HierarchyNode, effective_status};
use crate::index::{IndexEntry, ToolIndex};

/// Subcommand sequences to process for `tool`, sorted.
///
/// The union of the decisive whitelist paths under the tool, the subcommands
/// already recorded in the index and those listed in the tool's definition
/// file. Blacklisted sequences and unresolved ties are dropped.
pub fn discover_subcommands(
    tool: &str,
    whitelist: &HierarchyNode,
    blacklist: &HierarchyNode,
    index: &ToolIndex,
    definitions_dir: &Path,
) -> Vec<CommandSequence> {
    let Some(root) = CommandSequence::new(vec![tool.to_string()]) else {
        return Vec::new();
    };

    let mut found: BTreeSet<CommandSequence> = whitelist.decisive_paths_under(&root).into_iter().collect();
    if let Some(entry) = index.get_entry(&root) {
        collect_index_paths(entry, &root, &mut found);
    }
    found.extend(definition_subcommands(tool, definitions_dir));

    found
        .into_iter()
        .filter(|seq| match effective_status(seq, whitelist, blacklist) {
            Ok(EffectiveStatus::Blacklisted) => {
                log::debug!("Skipping blacklisted subcommand '{}'", seq);
                false
            }
            Ok(_) => true,
            Err(e) => {
                log::warn!("Skipping subcommand: {}", e);
                false
            }
        })
        .collect()
}

fn collect_index_paths(entry: &IndexEntry, path: &CommandSequence, out: &mut BTreeSet<CommandSequence>) {
    for (name, child) in &entry.subcommands {
        let child_path = path.child(name.clone());
        collect_index_paths(child, &child_path, out);
        out.insert(child_path);
    }
}

/// Subcommands listed in `<definitions_dir>/<tool>/<tool>.json`.
///
/// Items are either names or objects with a `name`; objects may nest their
/// own `subcommands`. A missing or unreadable file yields nothing.
pub fn definition_subcommands(tool: &str, definitions_dir: &Path) -> Vec<CommandSequence> {
    let path = definitions_dir.join(tool).join(format!("{tool}.json"));
    if !path.exists() {
        return Vec::new();
    }

    let value: Value = match fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
    {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Ignoring unreadable definition {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    if let (Some(root), Some(items)) = (
        CommandSequence::new(vec![tool.to_string()]),
        value.get("subcommands").and_then(Value::as_array),
    ) {
        collect_definition_items(items, &root, &mut out);
    }
    out
}

fn collect_definition_items(items: &[Value], path: &CommandSequence, out: &mut Vec<CommandSequence>) {
    for item in items {
        let name = match item {
            Value::String(name) => Some(name.as_str()),
            Value::Object(obj) => obj.get("name").and_then(Value::as_str),
            _ => None,
        };
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            log::debug!("Skipping malformed subcommand item under '{}': {}", path, item);
            continue;
        };
        let child = path.child(name);
        if let Some(nested) = item.get("subcommands").and_then(Value::as_array) {
            collect_definition_items(nested, &child, out);
        }
        out.push(child);
    }
}
