//! Structural diff over node paths

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::hierarchy::Hierarchy;

/// Paths present in only one of two hierarchies.
///
/// A renamed node shows up as one removal plus one addition; there is no
/// notion of a modified node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralDiff {
    /// Paths in the new version but not the old one, sorted.
    pub added_paths: Vec<String>,
    /// Paths in the old version but not the new one, sorted.
    pub removed_paths: Vec<String>,
}

impl StructuralDiff {
    /// Set difference in both directions: `added = new − old`,
    /// `removed = old − new`.
    pub fn between(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Self {
        StructuralDiff {
            added_paths: new.difference(old).cloned().collect(),
            removed_paths: old.difference(new).cloned().collect(),
        }
    }

    pub fn between_hierarchies(old: &Hierarchy, new: &Hierarchy) -> Self {
        Self::between(old.paths(), new.paths())
    }

    /// Parse both texts and diff their path sets.
    pub fn between_texts(old: &str, new: &str) -> Self {
        Self::between_hierarchies(&Hierarchy::parse(old), &Hierarchy::parse(new))
    }

    /// Check if this diff is empty (no structural changes).
    pub fn is_empty(&self) -> bool {
        self.added_paths.is_empty() && self.removed_paths.is_empty()
    }

    /// Swap the roles of old and new.
    pub fn reversed(&self) -> Self {
        StructuralDiff {
            added_paths: self.removed_paths.clone(),
            removed_paths: self.added_paths.clone(),
        }
    }
}
