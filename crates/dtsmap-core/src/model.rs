//! Core data structures for the device-tree hierarchy

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a node within one parse, assigned in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of the node in the hierarchy arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Key used for this node in rendered diagrams (`N0`, `N1`, ...).
    pub fn diagram_key(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Inclusive, 1-based line range of a node in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub end_line: u32,
}

impl SourceSpan {
    /// Number of source lines covered by the span.
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn contains(&self, line: u32) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }
}

/// A braced block in the source, one vertex of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Label preceding the name (`cpu0` in `cpu0: cpu@0 {`).
    pub label: Option<String>,
    /// Raw name token: `/`, `&phandle`, or a generic node name.
    pub name: String,
    /// Label if present, else the name.
    pub display: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Slash-joined display names from the outermost ancestor down to this node.
    pub path: String,
}

impl Node {
    pub fn span(&self) -> SourceSpan {
        SourceSpan {
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }

    /// Whether the node is a `&phandle { ... }` override rather than a new node.
    pub fn is_reference(&self) -> bool {
        self.name.starts_with('&')
    }
}

/// Parent/child relation, recorded when the child opens inside the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub parent: NodeId,
    pub child: NodeId,
}

/// Normalize a display name for use as a path segment: surrounding quotes
/// stripped, all whitespace removed.
pub fn normalize_segment(display: &str) -> String {
    display
        .trim_matches('"')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}
