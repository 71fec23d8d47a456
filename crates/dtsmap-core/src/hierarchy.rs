//! Brace-depth driven construction of the node hierarchy
//!
//! Nodes live in an arena indexed by [`NodeId`]; the stack of open nodes holds
//! ids only and parent/child relations are kept as a flat edge list, with a
//! per-node parent link alongside it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::braces::count_braces;
use crate::matcher::{NodeOpening, match_node_open};
use crate::model::{Edge, Node, NodeId, SourceSpan, normalize_segment};
use crate::preprocess::strip_comments;

/// Result of parsing one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// Parent of each node, indexed like `nodes`.
    parents: Vec<Option<NodeId>>,
    paths: BTreeSet<String>,
    /// Nodes still open at end of input and closed at the last line.
    forced_closes: usize,
}

impl Hierarchy {
    /// Parse raw source text.
    pub fn parse(text: &str) -> Self {
        let clean = strip_comments(text);
        Self::from_preprocessed_lines(clean.lines())
    }

    /// Parse raw bytes, replacing invalid UTF-8 sequences.
    pub fn parse_bytes(bytes: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(bytes))
    }

    /// Build the hierarchy from lines that already had comments stripped.
    pub fn from_preprocessed_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut builder = HierarchyBuilder::default();
        for line in lines {
            builder.push_line(line);
        }
        builder.finish()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// All nodes in discovery order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges in discovery order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Distinct node paths.
    pub fn paths(&self) -> &BTreeSet<String> {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn forced_closes(&self) -> usize {
        self.forced_closes
    }

    /// True when unbalanced input forced nodes closed at end of file.
    pub fn is_incomplete(&self) -> bool {
        self.forced_closes > 0
    }

    pub fn span(&self, id: NodeId) -> Option<SourceSpan> {
        self.node(id).map(Node::span)
    }

    /// Direct children of a node, in discovery order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.parent == id)
            .map(|e| e.child)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(id.index()).copied().flatten()
    }

    /// Nodes opened at depth zero.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(|(_, parent)| parent.is_none())
            .map(|(index, _)| NodeId(index as u32))
    }

    /// Every node carrying the given path. Paths are not unique.
    pub fn find_by_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| n.path == path)
    }
}

/// A node that is still open on the stack.
#[derive(Debug, Clone, Copy)]
struct Frame {
    id: NodeId,
    /// Brace depth inside the node; the node closes once depth drops below it.
    depth_at_open: i64,
}

/// Node under construction; `end_line` is filled in when its frame closes.
#[derive(Debug)]
struct Draft {
    label: Option<String>,
    name: String,
    display: String,
    start_line: u32,
    end_line: Option<u32>,
    path: String,
    parent: Option<NodeId>,
}

/// Line-by-line state machine behind [`Hierarchy::from_preprocessed_lines`].
#[derive(Debug, Default)]
struct HierarchyBuilder {
    drafts: Vec<Draft>,
    edges: Vec<Edge>,
    paths: BTreeSet<String>,
    stack: Vec<Frame>,
    depth: i64,
    line_no: u32,
}

impl HierarchyBuilder {
    fn push_line(&mut self, line: &str) {
        self.line_no += 1;
        let line_no = self.line_no;

        let opened = match_node_open(line).map(|m| self.open_node(m, line_no));
        let depth_before = self.depth;

        self.depth += count_braces(line).delta();

        // The frame sits just inside its own opening brace, so a node that also
        // closes on this line is popped below.
        if let Some(id) = opened {
            self.stack.push(Frame {
                id,
                depth_at_open: depth_before + 1,
            });
        }

        while let Some(top) = self.stack.last().copied() {
            if self.depth >= top.depth_at_open {
                break;
            }
            self.stack.pop();
            self.drafts[top.id.index()].end_line = Some(line_no);
        }
    }

    fn open_node(&mut self, m: NodeOpening<'_>, line_no: u32) -> NodeId {
        let id = NodeId(self.drafts.len() as u32);
        let display = m.display();
        let parent_path = self
            .stack
            .last()
            .map_or("", |top| self.drafts[top.id.index()].path.as_str());
        let path = format!("{parent_path}/{}", normalize_segment(display));

        let parent = self.stack.last().map(|top| top.id);
        if let Some(parent) = parent {
            self.edges.push(Edge { parent, child: id });
        }
        self.paths.insert(path.clone());
        self.drafts.push(Draft {
            label: m.label.map(str::to_owned),
            name: m.name.to_owned(),
            display: display.to_owned(),
            start_line: line_no,
            end_line: None,
            path,
            parent,
        });
        id
    }

    fn finish(mut self) -> Hierarchy {
        let forced_closes = self.stack.len();
        let last_line = self.line_no;
        while let Some(top) = self.stack.pop() {
            self.drafts[top.id.index()].end_line = Some(last_line);
        }

        let parents: Vec<Option<NodeId>> = self.drafts.iter().map(|d| d.parent).collect();
        let nodes: Vec<Node> = self
            .drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| Node {
                id: NodeId(index as u32),
                label: draft.label,
                name: draft.name,
                display: draft.display,
                start_line: draft.start_line,
                end_line: draft.end_line.unwrap_or(last_line),
                path: draft.path,
            })
            .collect();

        tracing::debug!(
            nodes = nodes.len(),
            edges = self.edges.len(),
            forced_closes,
            "parsed device-tree hierarchy"
        );

        Hierarchy {
            nodes,
            edges: self.edges,
            parents,
            paths: self.paths,
            forced_closes,
        }
    }
}
