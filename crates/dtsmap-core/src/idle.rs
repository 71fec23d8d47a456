//! Heuristic recognizer for CPU idle-state and power-domain topology
//!
//! Works on comment-stripped text rather than the hierarchy: the markers it
//! looks for are labels and properties that may appear anywhere in a file.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diagram::Diagram;

/// Literal markers; without one of them the text has no idle topology.
const IDLE_MARKERS: [&str; 2] = ["domain-idle-states", "idle-states"];

/// CPU indices assumed when no `cpuN: cpu@addr {` node is found.
const QUAD_CORE_FALLBACK: [u32; 4] = [0, 1, 2, 3];

static CPU_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcpu(\d+)\s*:\s*cpu@[0-9A-Fa-fx]+\s*\{").expect("valid regex"));

static POWER_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bcpu_pd(\d+)\s*:\s*power-domain-cpu\d+\s*\{").expect("valid regex")
});

/// A `cpu_sleep...:` or `cluster_sleep...:` labeled block, up to the first
/// line holding only `};`.
static SLEEP_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)\b(cpu_sleep|cluster_sleep)\w*\s*:(.*?)^\s*\};\s*$").expect("valid regex")
});

static PSCI_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"arm,psci-suspend-param\s*=\s*<([^>]*)>\s*;").expect("valid regex")
});

static CLUSTER_PD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcluster_pd\s*:").expect("valid regex"));

static MPM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmpm\s*:\s*interrupt-controller").expect("valid regex"));

/// CPU idle / power-domain topology found in a file.
///
/// When `found` is false no other field carries data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleTopology {
    pub found: bool,
    pub cpus: BTreeSet<u32>,
    pub power_domains: BTreeSet<u32>,
    pub cpu_sleep_param: Option<String>,
    pub cluster_sleep_param: Option<String>,
    pub has_cluster_pd: bool,
    pub has_mpm: bool,
    /// The CPU set was defaulted to 0..=3 rather than read from the text.
    /// Power domains are defaulted too, but only when none were declared.
    pub assumed_quad_core: bool,
}

impl IdleTopology {
    pub fn not_found() -> Self {
        Self::default()
    }

    /// Scan comment-stripped text for the idle topology.
    pub fn extract(text: &str) -> Self {
        if !IDLE_MARKERS.iter().any(|marker| text.contains(marker)) {
            return Self::not_found();
        }

        let cpus = capture_indices(&CPU_RE, text);
        let power_domains = capture_indices(&POWER_DOMAIN_RE, text);

        let mut cpu_sleep_param = None;
        let mut cluster_sleep_param = None;
        for block in SLEEP_BLOCK_RE.captures_iter(text) {
            let slot = match &block[1] {
                "cpu_sleep" => &mut cpu_sleep_param,
                _ => &mut cluster_sleep_param,
            };
            if slot.is_none() {
                *slot = PSCI_PARAM_RE
                    .captures(&block[2])
                    .map(|c| c[1].trim().to_owned());
            }
        }

        let has_cluster_pd = CLUSTER_PD_RE.is_match(text);
        let has_mpm = MPM_RE.is_match(text);

        let found = cpu_sleep_param.is_some()
            || cluster_sleep_param.is_some()
            || (!cpus.is_empty() && has_cluster_pd);
        if !found {
            return Self::not_found();
        }

        // Matched indices are never replaced. Power domains are only assumed
        // alongside assumed CPUs; declared CPUs without domains link straight
        // to the CPU idle state.
        let assumed_quad_core = cpus.is_empty();
        let (cpus, power_domains) = match (cpus.is_empty(), power_domains.is_empty()) {
            (true, true) => (quad_core(), quad_core()),
            (true, false) => (quad_core(), power_domains),
            _ => (cpus, power_domains),
        };

        IdleTopology {
            found,
            cpus,
            power_domains,
            cpu_sleep_param,
            cluster_sleep_param,
            has_cluster_pd,
            has_mpm,
            assumed_quad_core,
        }
    }

    /// Fixed-shape diagram: CPUs → power domains → CPU idle state → cluster
    /// idle state → cluster power domain → system power manager.
    ///
    /// A CPU without a matching power domain links straight to the CPU idle
    /// state. Returns `None` when nothing was found.
    pub fn diagram(&self) -> Option<Diagram> {
        if !self.found {
            return None;
        }

        let mut diagram = Diagram::default();
        for cpu in &self.cpus {
            diagram.add_node(format!("CPU{cpu}"), format!("CPU{cpu}"));
        }
        for pd in &self.power_domains {
            diagram.add_node(format!("PD{pd}"), format!("cpu_pd{pd}"));
        }
        diagram.add_node("CPU_SLEEP", state_text("cpu_sleep", self.cpu_sleep_param.as_deref()));
        diagram.add_node(
            "CLUSTER_SLEEP",
            state_text("cluster_sleep", self.cluster_sleep_param.as_deref()),
        );
        diagram.add_node("CLUSTER_PD", presence_text("cluster_pd", self.has_cluster_pd));
        diagram.add_node("MPM", presence_text("mpm", self.has_mpm));

        for cpu in &self.cpus {
            if self.power_domains.contains(cpu) {
                diagram.add_edge(format!("CPU{cpu}"), format!("PD{cpu}"));
            } else {
                diagram.add_edge(format!("CPU{cpu}"), "CPU_SLEEP");
            }
        }
        for pd in &self.power_domains {
            diagram.add_edge(format!("PD{pd}"), "CPU_SLEEP");
        }
        diagram.add_edge("CPU_SLEEP", "CLUSTER_SLEEP");
        diagram.add_edge("CLUSTER_SLEEP", "CLUSTER_PD");
        diagram.add_edge("CLUSTER_PD", "MPM");

        Some(diagram)
    }
}

fn quad_core() -> BTreeSet<u32> {
    QUAD_CORE_FALLBACK.into_iter().collect()
}

fn capture_indices(re: &Regex, text: &str) -> BTreeSet<u32> {
    re.captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

fn state_text(name: &str, param: Option<&str>) -> String {
    match param {
        Some(param) => format!("{name}<br/>psci {param}"),
        None => name.to_owned(),
    }
}

fn presence_text(name: &str, present: bool) -> String {
    if present {
        name.to_owned()
    } else {
        format!("{name} (not declared)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE_DTSI: &str = r#"
cpus {
	cpu0: cpu@0 {
		power-domains = <&cpu_pd0>;
	};
	cpu1: cpu@100 {
		power-domains = <&cpu_pd1>;
	};
	cpu2: cpu@200 {
	};

	idle-states {
		cpu_sleep: cpu-sleep-0 {
			compatible = "arm,idle-state";
			arm,psci-suspend-param = < 0x40000004 >;
		};
	};

	domain-idle-states {
		cluster_sleep: cluster-sleep-0 {
			compatible = "domain-idle-state";
			arm,psci-suspend-param = <0x41000044>;
		};
	};
};

psci {
	cpu_pd0: power-domain-cpu0 {
	};
	cpu_pd1: power-domain-cpu1 {
	};
	cluster_pd: power-domain-cluster {
	};
};

soc {
	mpm: interrupt-controller {
	};
};
"#;

    #[test]
    fn test_full_topology() {
        let topo = IdleTopology::extract(IDLE_DTSI);
        assert!(topo.found);
        assert_eq!(topo.cpus, BTreeSet::from([0, 1, 2]));
        assert_eq!(topo.power_domains, BTreeSet::from([0, 1]));
        assert_eq!(topo.cpu_sleep_param.as_deref(), Some("0x40000004"));
        assert_eq!(topo.cluster_sleep_param.as_deref(), Some("0x41000044"));
        assert!(topo.has_cluster_pd);
        assert!(topo.has_mpm);
        assert!(!topo.assumed_quad_core);
    }

    #[test]
    fn test_no_marker_short_circuits() {
        let text = "cpus {\n\tcpu0: cpu@0 {\n\t};\n};\ncluster_pd: power-domain-cluster {\n};\n";
        assert_eq!(IdleTopology::extract(text), IdleTopology::not_found());
        assert!(IdleTopology::not_found().diagram().is_none());
    }

    #[test]
    fn test_cpus_with_cluster_pd_without_params() {
        let text = "domain-idle-states = <&x>;\ncpu4: cpu@400 {\n};\ncluster_pd: power-domain-cluster {\n};\n";
        let topo = IdleTopology::extract(text);
        assert!(topo.found);
        assert_eq!(topo.cpus, BTreeSet::from([4]));
        assert!(topo.power_domains.is_empty());
        assert_eq!(topo.cpu_sleep_param, None);
    }

    #[test]
    fn test_markers_without_evidence_are_not_found() {
        let text = "idle-states {\n};\ncpu0: cpu@0 {\n};\n";
        assert!(!IdleTopology::extract(text).found);
    }

    #[test]
    fn test_quad_core_fallback() {
        let text = "domain-idle-states {\n\tcpu_sleep: cpu-sleep {\n\t\tarm,psci-suspend-param = <0x1>;\n\t};\n};\n";
        let topo = IdleTopology::extract(text);
        assert!(topo.found);
        assert!(topo.assumed_quad_core);
        assert_eq!(topo.cpus, BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(topo.power_domains, BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(topo.cpu_sleep_param.as_deref(), Some("0x1"));
    }

    #[test]
    fn test_declared_power_domains_survive_cpu_fallback() {
        let text = "idle-states {\n\tcpu_sleep: cpu-sleep {\n\t\tarm,psci-suspend-param = <0x40000004>;\n\t};\n};\n\
                    psci {\n\tcpu_pd4: power-domain-cpu4 {\n\t};\n\tcpu_pd5: power-domain-cpu5 {\n\t};\n};\n";
        let topo = IdleTopology::extract(text);
        assert!(topo.found);
        assert!(topo.assumed_quad_core);
        assert_eq!(topo.cpus, BTreeSet::from([0, 1, 2, 3]));
        assert_eq!(topo.power_domains, BTreeSet::from([4, 5]));

        let diagram = topo.diagram().unwrap();
        let keys: Vec<&str> = diagram.nodes.iter().map(|n| n.key.as_str()).collect();
        assert!(keys.contains(&"PD4") && keys.contains(&"PD5"));
        assert!(!keys.contains(&"PD0"));
    }

    #[test]
    fn test_sleep_block_without_param() {
        let text = "idle-states {\n\tcpu_sleep: cpu-sleep {\n\t\tstatus = \"okay\";\n\t};\n};\n";
        let topo = IdleTopology::extract(text);
        assert!(!topo.found);
    }

    #[test]
    fn test_diagram_routes_cpus_without_domain_directly() {
        let topo = IdleTopology::extract(IDLE_DTSI);
        let diagram = topo.diagram().unwrap();
        let edges: Vec<(&str, &str)> = diagram
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect();
        assert!(edges.contains(&("CPU0", "PD0")));
        assert!(edges.contains(&("PD0", "CPU_SLEEP")));
        assert!(edges.contains(&("CPU2", "CPU_SLEEP")));
        assert!(!edges.contains(&("CPU0", "CPU_SLEEP")));
        assert_eq!(
            &edges[edges.len() - 3..],
            &[
                ("CPU_SLEEP", "CLUSTER_SLEEP"),
                ("CLUSTER_SLEEP", "CLUSTER_PD"),
                ("CLUSTER_PD", "MPM"),
            ]
        );
    }
}
