//! Hierarchy tree parsing.

use std::collections::BTreeMap;

use crate::domain::CommandSequence;

const WILDCARD: &str = "*";

/// One path segment of a whitelist or blacklist tree.
///
/// The root node is unnamed and never decisive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyNode {
    /// This exact path was named
    pub explicit: bool,
    /// The whole subtree under this path is covered
    pub all: bool,
    pub children: BTreeMap<String, HierarchyNode>,
}

/// A config entry split into its parts.
#[derive(Debug, PartialEq)]
struct ParsedEntry {
    prefix: Vec<String>,
    terminals: Vec<String>,
    wildcard: bool,
}

/// Parse config list items into a tree.
///
/// Malformed items are skipped, never reported as errors.
pub fn parse<S: AsRef<str>>(items: &[S]) -> HierarchyNode {
    let mut root = HierarchyNode::default();
    for item in items {
        let raw = item.as_ref();
        match parse_entry(raw) {
            Some(entry) => root.insert(entry),
            None => log::warn!("Skipping malformed hierarchy entry: {:?}", raw),
        }
    }
    root
}

fn parse_entry(raw: &str) -> Option<ParsedEntry> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with(':') {
        return None;
    }

    let mut segments: Vec<&str> = raw.split(':').map(str::trim).collect();
    let wildcard = segments.last() == Some(&WILDCARD);
    if wildcard {
        segments.pop();
    }
    if segments.iter().any(|s| s.is_empty() || *s == WILDCARD) {
        return None;
    }

    let (last, prefix) = segments.split_last()?;
    // Sibling lists are only allowed in the terminal position
    if prefix.iter().any(|s| s.contains(',')) {
        return None;
    }

    let terminals: Vec<String> = last
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if terminals.is_empty() || terminals.iter().any(|t| t == WILDCARD) {
        return None;
    }

    Some(ParsedEntry {
        prefix: prefix.iter().map(|s| s.to_string()).collect(),
        terminals,
        wildcard,
    })
}

impl HierarchyNode {
    fn insert(&mut self, entry: ParsedEntry) {
        let mut node = self;
        for segment in entry.prefix {
            node = node.children.entry(segment).or_default();
        }
        for terminal in entry.terminals {
            let leaf = node.children.entry(terminal).or_default();
            if entry.wildcard {
                leaf.all = true;
            } else {
                leaf.explicit = true;
            }
        }
    }

    /// Returns true if this node decides the status of its path
    pub fn is_decisive(&self) -> bool {
        self.explicit || self.all
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, segment: &str) -> Option<&HierarchyNode> {
        self.children.get(segment)
    }

    /// Node at the end of `seq`, if every segment exists.
    pub fn find(&self, seq: &CommandSequence) -> Option<&HierarchyNode> {
        seq.parts().iter().try_fold(self, |node, segment| node.child(segment))
    }

    /// Returns true if `tool` is a top-level entry, whether it was named
    /// itself or only through a path below it.
    pub fn names_tool(&self, tool: &str) -> bool {
        self.children.contains_key(tool)
    }

    /// Every decisive path strictly below `seq`.
    pub fn decisive_paths_under(&self, seq: &CommandSequence) -> Vec<CommandSequence> {
        let mut out = Vec::new();
        if let Some(node) = self.find(seq) {
            node.collect_decisive(seq, &mut out);
        }
        out
    }

    fn collect_decisive(&self, path: &CommandSequence, out: &mut Vec<CommandSequence>) {
        for (name, child) in &self.children {
            let child_path = path.child(name.clone());
            if child.is_decisive() {
                out.push(child_path.clone());
            }
            child.collect_decisive(&child_path, out);
        }
    }

    /// Re-serialize the tree into config grammar.
    ///
    /// Parsing the result yields an identical tree.
    pub fn entries(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        self.collect_entries(&mut path, &mut out);
        out
    }

    fn collect_entries(&self, path: &mut Vec<String>, out: &mut Vec<String>) {
        for (name, child) in &self.children {
            path.push(name.clone());
            let joined = path.join(":");
            if child.explicit {
                out.push(joined.clone());
            }
            if child.all {
                out.push(format!("{joined}:{WILDCARD}"));
            }
            child.collect_entries(path, out);
            path.pop();
        }
    }
}
