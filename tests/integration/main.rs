//! Integration tests for dtsmap
//!
//! These tests drive the CLI binary and the crates together.

use std::path::Path;
use std::process::{Command, Output};

use dtsmap_core::Analysis;
use dtsmap_projects::{ProjectStore, WorkspaceConfig};
use tempfile::TempDir;

const BOARD: &str = r#"// SPDX-License-Identifier: GPL-2.0
/dts-v1/;

/ {
	model = "Example board {v1}";

	soc: soc@0 {
		gcc: clock-controller@100000 {
			#clock-cells = <1>;
		};
	};
};
"#;

const BOARD_V2: &str = r#"/ {
	soc: soc@0 {
		gcc: clock-controller@100000 {
		};
		tlmm: pinctrl@f100000 {
		};
	};
};
"#;

const IDLE: &str = r#"/ {
	cpus {
		cpu0: cpu@0 {
		};
		cpu1: cpu@100 {
		};
		domain-idle-states {
			cluster_sleep_0: cluster-sleep-0 {
				arm,psci-suspend-param = <0x41000044>;
			};
		};
		idle-states {
			cpu_sleep_0: cpu-sleep-0 {
				arm,psci-suspend-param = <0x40000004>;
			};
		};
	};
};
"#;

fn dtsmap(args: &[&str], work_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dtsmap"))
        .args(args)
        .env("WORK_DIR", work_dir)
        .env_remove("DTSMAP_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute dtsmap")
}

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path.to_string_lossy().into_owned()
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let dir = TempDir::new().unwrap();
    let output = dtsmap(&["--help"], dir.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("dtsmap"));
    assert!(stdout.contains("Device-tree structure maps"));
}

#[test]
fn test_analyze_mermaid() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "board.dts", BOARD);
    let output = dtsmap(&["analyze", &file, "--format", "mermaid"], dir.path());
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("graph TD"));
    assert!(stdout.contains(r#"N1["soc"]"#));
    assert!(stdout.contains("N1 --> N2"));
    assert!(stdout.contains(r#"click N2 onNodeClick "gcc""#));
}

#[test]
fn test_analyze_json() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "board.dts", BOARD);
    let output = dtsmap(&["analyze", &file], dir.path());
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["node_count"], 3);
    assert_eq!(json["incomplete"], false);
    assert!(json["idle"].is_null());
}

#[test]
fn test_diff_command() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "a.dts", BOARD);
    let b = write(dir.path(), "b.dts", BOARD_V2);
    let output = dtsmap(&["diff", &a, &b], dir.path());
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["added_paths"], serde_json::json!(["///soc/tlmm"]));
    assert_eq!(json["removed_paths"], serde_json::json!([]));
}

#[test]
fn test_idle_command() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "idle.dtsi", IDLE);
    let output = dtsmap(&["idle", &file, "--format", "mermaid"], dir.path());
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("CPU0"));
    assert!(stdout.contains("CPU1"));
    assert!(stdout.contains("0x40000004"));

    let plain = write(dir.path(), "board.dts", BOARD);
    let output = dtsmap(&["idle", &plain, "--format", "mermaid"], dir.path());
    assert!(!output.status.success());
}

#[test]
fn test_scan_directory() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "b.dts", BOARD_V2);
    write(dir.path(), "a.dtsi", BOARD);
    write(dir.path(), "broken.dts", "soc {\n");
    write(dir.path(), "README", "not a source file");

    let output = dtsmap(&["scan", &dir.path().to_string_lossy()], dir.path());
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines, vec!["a.dtsi\t3", "b.dts\t4", "broken.dts\t1\tincomplete"]);
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    let output = dtsmap(&["version"], dir.path());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("dtsmap v"));
}

/// Store and core together: a seeded project analyzes like a plain file.
#[test]
fn test_store_feeds_analysis() {
    let dir = TempDir::new().unwrap();
    let config = WorkspaceConfig {
        work_dir: dir.path().to_path_buf(),
        ..WorkspaceConfig::default()
    };
    let store = ProjectStore::new(config).unwrap();
    store.create_project("board", None).unwrap();
    let dts = store.dts_dir("board");
    std::fs::create_dir_all(&dts).unwrap();
    std::fs::write(dts.join("board.dts"), BOARD).unwrap();

    let text = store.read_file("board", "board.dts").unwrap();
    assert_eq!(Analysis::new(&text), Analysis::new(BOARD));
    assert_eq!(store.list_projects().unwrap()[0].file_count, 1);
}

#[tokio::test]
async fn test_server_startup() {
    use dtsmap_server::{DtsServer, ServerConfig};

    let dir = TempDir::new().unwrap();
    let config = WorkspaceConfig {
        work_dir: dir.path().to_path_buf(),
        ..WorkspaceConfig::default()
    };
    let server = DtsServer::new(
        ProjectStore::new(config).unwrap(),
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
    );
    let state = server.state();
    assert!(state.store.list_projects().unwrap().is_empty());
    assert!(!state.syncs.state("anything").is_running());
}
