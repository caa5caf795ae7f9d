//! Effective status resolution and conflict detection.

use crate::domain::{CommandSequence, EffectiveStatus};
use crate::error::{Result, ToolsyncError};

use super::tree::HierarchyNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Explicit,
    Wildcard,
}

/// Deepest decisive node on the path of `seq`, as (depth, kind).
fn deepest_decision(tree: &HierarchyNode, seq: &CommandSequence) -> Option<(usize, Decision)> {
    let mut node = tree;
    let mut found = None;
    for (index, segment) in seq.parts().iter().enumerate() {
        let Some(child) = node.child(segment) else {
            break;
        };
        if child.explicit {
            found = Some((index + 1, Decision::Explicit));
        } else if child.all {
            found = Some((index + 1, Decision::Wildcard));
        }
        node = child;
    }
    found
}

/// Resolve whether `seq` is whitelisted, blacklisted or neither.
///
/// The deeper decisive node wins; at equal depth explicit beats wildcard.
/// Two equally decisive nodes at the same depth are an error: conflict
/// checking is expected to have rejected that configuration already.
pub fn effective_status(
    seq: &CommandSequence,
    whitelist: &HierarchyNode,
    blacklist: &HierarchyNode,
) -> Result<EffectiveStatus> {
    let allowed = deepest_decision(whitelist, seq);
    let denied = deepest_decision(blacklist, seq);

    let status = match (allowed, denied) {
        (None, None) => EffectiveStatus::Unspecified,
        (Some(_), None) => EffectiveStatus::Whitelisted,
        (None, Some(_)) => EffectiveStatus::Blacklisted,
        (Some((wl_depth, wl_kind)), Some((bl_depth, bl_kind))) => {
            if wl_depth > bl_depth {
                EffectiveStatus::Whitelisted
            } else if bl_depth > wl_depth {
                EffectiveStatus::Blacklisted
            } else {
                match (wl_kind, bl_kind) {
                    (Decision::Explicit, Decision::Wildcard) => EffectiveStatus::Whitelisted,
                    (Decision::Wildcard, Decision::Explicit) => EffectiveStatus::Blacklisted,
                    _ => return Err(ToolsyncError::UnresolvedTie(seq.clone())),
                }
            }
        }
    };
    Ok(status)
}

/// Every path where both trees are decisive at once.
///
/// Covers explicit/explicit and wildcard/wildcard on the same node, and a
/// decisive node in one tree lying under a wildcard in the other.
pub fn check_conflicts(whitelist: &HierarchyNode, blacklist: &HierarchyNode) -> Vec<CommandSequence> {
    let mut conflicts = Vec::new();
    let mut path = Vec::new();
    walk(
        Some(whitelist),
        Some(blacklist),
        false,
        false,
        &mut path,
        &mut conflicts,
    );
    conflicts
}

fn walk(
    whitelist: Option<&HierarchyNode>,
    blacklist: Option<&HierarchyNode>,
    wl_covered: bool,
    bl_covered: bool,
    path: &mut Vec<String>,
    conflicts: &mut Vec<CommandSequence>,
) {
    let mut names: Vec<&String> = whitelist
        .into_iter()
        .chain(blacklist)
        .flat_map(|node| node.children.keys())
        .collect();
    names.sort();
    names.dedup();

    for name in names {
        let wl_child = whitelist.and_then(|n| n.child(name));
        let bl_child = blacklist.and_then(|n| n.child(name));
        let wl_decisive = wl_child.is_some_and(HierarchyNode::is_decisive);
        let bl_decisive = bl_child.is_some_and(HierarchyNode::is_decisive);

        path.push(name.clone());
        let overlapping = (wl_decisive && bl_decisive)
            || (wl_decisive && bl_covered)
            || (bl_decisive && wl_covered);
        if overlapping {
            if let Some(seq) = CommandSequence::new(path.clone()) {
                conflicts.push(seq);
            }
        }

        walk(
            wl_child,
            bl_child,
            wl_covered || wl_child.is_some_and(|n| n.all),
            bl_covered || bl_child.is_some_and(|n| n.all),
            path,
            conflicts,
        );
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::parse;

    fn seq(parts: &[&str]) -> CommandSequence {
        CommandSequence::from_parts(parts).unwrap()
    }

    fn status(wl: &[&str], bl: &[&str], path: &[&str]) -> EffectiveStatus {
        effective_status(&seq(path), &parse(wl), &parse(bl)).unwrap()
    }

    #[test]
    fn test_wildcard_covers_descendants() {
        assert_eq!(
            status(&["parent_allow:*"], &[], &["parent_allow", "anything"]),
            EffectiveStatus::Whitelisted
        );
        assert_eq!(
            status(&["parent_allow:*"], &[], &["parent_allow"]),
            EffectiveStatus::Whitelisted
        );
    }

    #[test]
    fn test_mixed_tool() {
        let wl = ["mixed_tool:allow_sub"];
        let bl = ["mixed_tool:block_sub"];
        assert_eq!(status(&wl, &bl, &["mixed_tool", "allow_sub"]), EffectiveStatus::Whitelisted);
        assert_eq!(status(&wl, &bl, &["mixed_tool", "block_sub"]), EffectiveStatus::Blacklisted);
        assert_eq!(status(&wl, &bl, &["mixed_tool", "other_sub"]), EffectiveStatus::Unspecified);
        assert_eq!(status(&wl, &bl, &["mixed_tool"]), EffectiveStatus::Unspecified);
    }

    #[test]
    fn test_deeper_node_wins() {
        assert_eq!(
            status(&["toolA:*"], &["toolA:danger"], &["toolA", "danger"]),
            EffectiveStatus::Blacklisted
        );
        assert_eq!(
            status(&["toolA:*"], &["toolA:danger"], &["toolA", "safe"]),
            EffectiveStatus::Whitelisted
        );
        assert_eq!(
            status(&["ruff"], &["ruff:server"], &["ruff", "server", "start"]),
            EffectiveStatus::Blacklisted
        );
        assert_eq!(status(&["ruff"], &["ruff:server"], &["ruff", "check"]), EffectiveStatus::Whitelisted);
    }

    #[test]
    fn test_explicit_beats_wildcard_at_same_depth() {
        assert_eq!(status(&["toolA"], &["toolA:*"], &["toolA"]), EffectiveStatus::Whitelisted);
        assert_eq!(status(&["toolA:*"], &["toolA"], &["toolA"]), EffectiveStatus::Blacklisted);
    }

    #[test]
    fn test_unlisted_is_unspecified() {
        assert_eq!(status(&["a"], &["b"], &["c"]), EffectiveStatus::Unspecified);
        assert_eq!(status(&[], &[], &["c", "d"]), EffectiveStatus::Unspecified);
    }

    #[test]
    fn test_true_tie_is_error() {
        let result = effective_status(&seq(&["toolA"]), &parse(&["toolA"]), &parse(&["toolA"]));
        assert!(matches!(result, Err(ToolsyncError::UnresolvedTie(_))));

        let result = effective_status(&seq(&["toolA", "x"]), &parse(&["toolA:*"]), &parse(&["toolA:*"]));
        assert!(matches!(result, Err(ToolsyncError::UnresolvedTie(_))));
    }

    #[test]
    fn test_conflict_explicit_explicit() {
        let conflicts = check_conflicts(&parse(&["toolA"]), &parse(&["toolA"]));
        assert_eq!(conflicts, vec![seq(&["toolA"])]);
    }

    #[test]
    fn test_conflict_under_wildcard() {
        let conflicts = check_conflicts(&parse(&["toolA:*"]), &parse(&["toolA:sub1"]));
        assert_eq!(conflicts, vec![seq(&["toolA", "sub1"])]);

        let conflicts = check_conflicts(&parse(&["toolA:sub1"]), &parse(&["toolA:*"]));
        assert_eq!(conflicts, vec![seq(&["toolA", "sub1"])]);
    }

    #[test]
    fn test_conflict_wildcard_wildcard() {
        let conflicts = check_conflicts(&parse(&["toolA:*"]), &parse(&["toolA:*"]));
        assert_eq!(conflicts, vec![seq(&["toolA"])]);

        let conflicts = check_conflicts(&parse(&["toolA:*"]), &parse(&["toolA:x:*"]));
        assert_eq!(conflicts, vec![seq(&["toolA", "x"])]);
    }

    #[test]
    fn test_no_conflict_for_disjoint_or_explicit_parent() {
        assert!(check_conflicts(&parse(&["mixed:allow"]), &parse(&["mixed:block"])).is_empty());
        assert!(check_conflicts(&parse(&["ruff"]), &parse(&["ruff:server"])).is_empty());
        assert!(check_conflicts(&parse(&["a", "b:*"]), &parse(&["c"])).is_empty());
        assert!(check_conflicts(&parse::<&str>(&[]), &parse::<&str>(&[])).is_empty());
    }

    #[test]
    fn test_conflicts_sorted_and_complete() {
        let conflicts = check_conflicts(&parse(&["zed", "alpha:*"]), &parse(&["zed", "alpha:one,two"]));
        assert_eq!(
            conflicts,
            vec![seq(&["alpha", "one"]), seq(&["alpha", "two"]), seq(&["zed"])]
        );
    }
}
