//! Whitelist/blacklist hierarchy resolution.
//!
//! Config lists name tools and subcommand paths in a small grammar:
//! - `tool` names one tool explicitly
//! - `tool:sub1,sub2` names sibling subcommands explicitly
//! - `tool:*` covers the whole subtree under `tool`
//!
//! Each list parses into a [`HierarchyNode`] tree. The effective status of a
//! command sequence is decided by the deepest decisive node on its path in
//! either tree; conflicting overlaps between the two trees are reported by
//! [`check_conflicts`].

mod resolve;
mod tree;

pub use resolve::{check_conflicts, effective_status};
pub use tree::{HierarchyNode, parse};
