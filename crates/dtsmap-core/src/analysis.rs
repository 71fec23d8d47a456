//! One-shot analysis of a source file

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diagram::{Diagram, source_spans};
use crate::hierarchy::Hierarchy;
use crate::idle::IdleTopology;
use crate::model::SourceSpan;
use crate::preprocess::strip_comments;
use crate::summary::{SubsystemSummary, SummaryLimits};

/// Every artifact derived from one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub hierarchy: Hierarchy,
    pub diagram: Diagram,
    pub summary: SubsystemSummary,
    pub idle: IdleTopology,
}

impl Analysis {
    pub fn new(text: &str) -> Self {
        Self::with_limits(text, SummaryLimits::default())
    }

    pub fn with_limits(text: &str, limits: SummaryLimits) -> Self {
        let clean = strip_comments(text);
        let hierarchy = Hierarchy::from_preprocessed_lines(clean.lines());
        let diagram = Diagram::from_hierarchy(&hierarchy);
        let summary = SubsystemSummary::from_paths(hierarchy.paths(), limits);
        let idle = IdleTopology::extract(&clean);
        Analysis {
            hierarchy,
            diagram,
            summary,
            idle,
        }
    }

    /// Analyze raw bytes, replacing invalid UTF-8 sequences.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(&String::from_utf8_lossy(bytes))
    }

    /// Diagram key → source span, for click-to-source navigation.
    pub fn source_spans(&self) -> BTreeMap<String, SourceSpan> {
        source_spans(&self.hierarchy)
    }

    pub fn is_incomplete(&self) -> bool {
        self.hierarchy.is_incomplete()
    }
}
