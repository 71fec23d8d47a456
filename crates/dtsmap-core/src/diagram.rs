//! Diagram description derived from a hierarchy
//!
//! Diagram entries are keyed by strings so the same structure can carry the
//! parsed tree (`N0`, `N1`, ...) and fixed-shape diagrams such as the idle
//! topology.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::hierarchy::Hierarchy;
use crate::model::{NodeId, SourceSpan};

/// JavaScript callback invoked by the renderer when a node is clicked.
pub const CLICK_CALLBACK: &str = "onNodeClick";

const MERMAID_INIT: &str =
    "%%{init: {'flowchart': {'useMaxWidth': false, 'htmlLabels': true}}}%%";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub key: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub from: String,
    pub to: String,
}

/// Ordered node declarations and edges, plus click targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
    /// Diagram key → display text handed to the click callback.
    pub click_targets: BTreeMap<String, String>,
}

impl Diagram {
    /// Emit one declaration per node and one edge per parent/child pair, both
    /// in discovery order. Every node is clickable.
    pub fn from_hierarchy(hierarchy: &Hierarchy) -> Self {
        let mut diagram = Diagram::default();
        for node in hierarchy.nodes() {
            diagram.add_clickable_node(node.id.diagram_key(), &node.display);
        }
        for edge in hierarchy.edges() {
            diagram.add_edge(edge.parent.diagram_key(), edge.child.diagram_key());
        }
        diagram
    }

    pub fn add_node(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.nodes.push(DiagramNode {
            key: key.into(),
            text: text.into(),
        });
    }

    pub fn add_clickable_node(&mut self, key: impl Into<String>, text: &str) {
        let key = key.into();
        self.click_targets.insert(key.clone(), text.to_owned());
        self.add_node(key, text);
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.push(DiagramEdge {
            from: from.into(),
            to: to.into(),
        });
    }

    /// Render as a Mermaid top-down flowchart.
    ///
    /// Each declaration is followed by the edges leading into it and its click
    /// binding, so a node's lines stay together in the output.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{MERMAID_INIT}");
        out.push_str("graph TD");

        let mut incoming: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for edge in &self.edges {
            incoming.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
        }

        for node in &self.nodes {
            let _ = write!(out, "\n  {}[\"{}\"]", node.key, escape_label(&node.text));
            for from in incoming.get(node.key.as_str()).into_iter().flatten() {
                let _ = write!(out, "\n  {from} --> {}", node.key);
            }
            if let Some(text) = self.click_targets.get(&node.key) {
                let _ = write!(
                    out,
                    "\n  click {} {CLICK_CALLBACK} \"{}\"",
                    node.key,
                    escape_label(text)
                );
            }
        }

        // Edges to undeclared keys are still drawn.
        let declared: BTreeSet<&str> = self.nodes.iter().map(|n| n.key.as_str()).collect();
        for edge in &self.edges {
            if !declared.contains(edge.to.as_str()) {
                let _ = write!(out, "\n  {} --> {}", edge.from, edge.to);
            }
        }

        out
    }
}

fn escape_label(text: &str) -> String {
    text.replace('"', "#quot;")
}

/// Source span of every node, keyed by its diagram key.
pub fn source_spans(hierarchy: &Hierarchy) -> BTreeMap<String, SourceSpan> {
    hierarchy
        .nodes()
        .iter()
        .map(|n| (n.id.diagram_key(), n.span()))
        .collect()
}

/// Resolve a clicked diagram key (`N3`) back to its source span.
pub fn resolve_click(hierarchy: &Hierarchy, key: &str) -> Option<SourceSpan> {
    let index: u32 = key.strip_prefix('N')?.parse().ok()?;
    hierarchy.span(NodeId(index))
}
