//! Bounded two-level overview of large hierarchies

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Name of the top-level group whose children get their own ranking.
pub const SOC_GROUP: &str = "soc";

/// How many groups each level of the summary keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryLimits {
    pub top: usize,
    pub soc: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        SummaryLimits { top: 18, soc: 18 }
    }
}

/// A group name and the number of paths that fall under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemSummary {
    /// Top-level groups ranked by population.
    pub groups: Vec<GroupCount>,
    /// Children of the `soc` group, present only when that group exists.
    pub soc_children: Option<Vec<GroupCount>>,
    /// Distinct paths considered.
    pub total_paths: usize,
    /// Distinct top-level groups before truncation.
    pub total_groups: usize,
}

impl SubsystemSummary {
    /// Summarize a path set. Empty path segments are skipped, so `//`-style
    /// paths from a `/ { ... }` root group by their first real name.
    pub fn from_paths(paths: &BTreeSet<String>, limits: SummaryLimits) -> Self {
        let mut top: HashMap<&str, usize> = HashMap::new();
        let mut soc: Option<HashMap<&str, usize>> = None;

        for path in paths {
            let mut segments = path.split('/').filter(|s| !s.is_empty());
            let Some(group) = segments.next() else {
                continue;
            };
            *top.entry(group).or_insert(0) += 1;

            if group == SOC_GROUP {
                let children = soc.get_or_insert_with(HashMap::new);
                if let Some(child) = segments.next() {
                    *children.entry(child).or_insert(0) += 1;
                }
            }
        }

        let total_groups = top.len();
        SubsystemSummary {
            groups: rank(top, limits.top),
            soc_children: soc.map(|children| rank(children, limits.soc)),
            total_paths: paths.len(),
            total_groups,
        }
    }

    /// Whether groups were dropped to honor the limit.
    pub fn is_truncated(&self) -> bool {
        self.total_groups > self.groups.len()
    }
}

/// Sort by descending count, ties by ascending name, keep the first `limit`.
fn rank(counts: HashMap<&str, usize>, limit: usize) -> Vec<GroupCount> {
    let mut ranked: Vec<GroupCount> = counts
        .into_iter()
        .map(|(name, count)| GroupCount {
            name: name.to_owned(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(limit);
    ranked
}
