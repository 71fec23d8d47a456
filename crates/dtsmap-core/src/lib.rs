//! dtsmap core: device-tree source structure extraction, diagrams and diff

pub mod model;
pub mod preprocess;
pub mod braces;
pub mod matcher;
pub mod hierarchy;
pub mod diagram;
pub mod diff;
pub mod summary;
pub mod idle;
pub mod analysis;


pub use model::{NodeId, Node, Edge, SourceSpan};
pub use preprocess::strip_comments;
pub use braces::{BraceCount, count_braces};
pub use matcher::{NodeOpening, match_node_open};
pub use hierarchy::Hierarchy;
pub use diagram::{Diagram, DiagramNode, DiagramEdge, source_spans, resolve_click};
pub use diff::StructuralDiff;
pub use summary::{SubsystemSummary, SummaryLimits, GroupCount};
pub use idle::IdleTopology;
pub use analysis::Analysis;
