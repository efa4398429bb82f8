//! CLI integration tests for kgraph
//!
//! Tests the kgraph CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

/// Isolated config directory and database file per test
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("graph.db")
    }

    /// kgraph command pointed at this workspace
    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("kgraph").unwrap();
        cmd.env("KGRAPH_CONFIG_DIR", self.dir.path().join("config"));
        cmd.env("RUST_LOG", "kgraph=warn");
        cmd.arg("--db").arg(self.db());
        cmd
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Ingest a small dependency graph
    fn seed(&self) {
        let nodes = self.write(
            "nodes.json",
            r#"[
                {"name": "gateway", "node_type": "project", "importance": 0.9},
                {"name": "auth", "node_type": "project", "importance": 0.8},
                {"name": "Redis", "node_type": "technology", "importance": 0.6},
                {"name": "session store", "node_type": "concept", "importance": 0.3}
            ]"#,
        );
        let edges = self.write(
            "edges.json",
            r#"[
                {"source": "gateway", "target": "auth", "edge_type": "depends_on", "weight": 0.9},
                {"source": "auth", "target": "redis", "edge_type": "uses", "weight": 0.8},
                {"source": "redis", "target": "session store", "edge_type": "implements", "weight": 0.6},
                {"source": "auth", "target": "nowhere", "edge_type": "uses"}
            ]"#,
        );

        self.cmd()
            .args(["ingest", "--nodes"])
            .arg(nodes)
            .arg("--edges")
            .arg(edges)
            .assert()
            .success()
            .stdout(predicate::str::contains("Ingested 4 nodes and 3 edges"));
    }
}

#[test]
fn test_help_lists_commands() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("related"))
        .stdout(predicate::str::contains("centrality"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_init_creates_database() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized graph store"));

    assert!(ws.db().exists(), "Database file should exist");
}

#[test]
fn test_ingest_then_stats() {
    let ws = Workspace::new();
    ws.seed();

    ws.cmd()
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nodes:        4"))
        .stdout(predicate::str::contains("Edges:        3"))
        .stdout(predicate::str::contains("Store nodes:  4"));
}

#[test]
fn test_stats_json() {
    let ws = Workspace::new();
    ws.seed();

    let output = ws.cmd().args(["stats", "--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["node_count"], 4);
    assert_eq!(stats["edge_count"], 3);
    assert_eq!(stats["node_type_histogram"]["project"], 2);
}

#[test]
fn test_related_by_name() {
    let ws = Workspace::new();
    ws.seed();

    ws.cmd()
        .args(["related", "gateway", "--depth", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[1] auth"))
        .stdout(predicate::str::contains("[2] Redis"))
        .stdout(predicate::str::contains("session store").not());
}

#[test]
fn test_related_filters_edge_type() {
    let ws = Workspace::new();
    ws.seed();

    ws.cmd()
        .args(["related", "auth", "--depth", "3", "--edge-type", "uses"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Redis"))
        .stdout(predicate::str::contains("session store").not());
}

#[test]
fn test_related_unknown_node_fails() {
    let ws = Workspace::new();
    ws.seed();

    ws.cmd()
        .args(["related", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_activate_orders_by_activation() {
    let ws = Workspace::new();
    ws.seed();

    let output = ws
        .cmd()
        .args(["activate", "gateway", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let activated: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let activated = activated.as_array().unwrap();
    assert_eq!(activated[0]["name"], "gateway");
    assert_eq!(activated[0]["activation"], 1.0);
    assert_eq!(activated[1]["name"], "auth");
}

#[test]
fn test_centrality_unknown_metric_still_succeeds() {
    let ws = Workspace::new();
    ws.seed();

    ws.cmd()
        .args(["centrality", "katz", "--top", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("auth"));
}

#[test]
fn test_subgraph_by_type() {
    let ws = Workspace::new();
    ws.seed();

    ws.cmd()
        .args(["subgraph", "--node-type", "project"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nodes (2):"))
        .stdout(predicate::str::contains("gateway -[depends_on 0.90]-> auth"));
}

#[test]
fn test_subgraph_rejects_unknown_type() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["subgraph", "--node-type", "galaxy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown node type 'galaxy'"));
}

#[test]
fn test_data_survives_between_runs() {
    let ws = Workspace::new();
    ws.seed();

    ws.cmd()
        .args(["related", "redis", "--depth", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("session store"));
}

#[test]
fn test_config_set_get_roundtrip() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["config", "set", "cache.ttl_secs", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set cache.ttl_secs = 42"));

    ws.cmd()
        .args(["config", "get", "cache.ttl_secs"])
        .assert()
        .success()
        .stdout(predicate::str::diff("42\n"));

    ws.cmd()
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mirror.max_nodes = 100000"));
}

#[test]
fn test_config_rejects_invalid_value() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "set", "analytics.workers", "0"])
        .assert()
        .failure();

    ws.cmd()
        .args(["config", "get", "no.such.key"])
        .assert()
        .failure();
}

#[test]
fn test_config_path_uses_override_dir() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_doctor_passes_on_fresh_store() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Database: Connected"))
        .stdout(predicate::str::contains("All checks passed!"));
}
