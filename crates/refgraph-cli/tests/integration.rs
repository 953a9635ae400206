//! Integration tests for the refgraph CLI
//!
//! These tests run the binary against syntax trees written into a temporary
//! working directory, with `HOME` pointed inside it so no user configuration
//! leaks in.

use assert_cmd::Command;
use predicates::prelude::*;
use refgraph_core::{Dialect, Fact, NodeKind, Stmt, StmtKind, SyntaxTree, TreeBuilder};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a Command for the refgraph binary, isolated to `sandbox`
#[allow(deprecated)]
fn refgraph(sandbox: &Path) -> Command {
    let mut cmd = Command::cargo_bin("refgraph").expect("Failed to find refgraph binary");
    cmd.current_dir(sandbox)
        .env("HOME", sandbox.join("home"))
        .env_remove("REFGRAPH_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

/// `count` empty C functions, one per line.
fn functions_tree(count: u32) -> SyntaxTree {
    let mut b = TreeBuilder::new(Dialect::C);
    let lines: Vec<String> = (0..count).map(|i| format!("void f{i}(void) {{ }}\n")).collect();
    let file = b.add_file("unit.c", Some(&lines.concat()));
    let mut offset = 0;
    for (i, line) in lines.iter().enumerate() {
        let name = format!("f{i}");
        let span = b.span(file, offset + 5, offset + 5 + name.len() as u32);
        let f = b.function(b.root(), &name, None, span);
        let body = b.compound(Vec::new());
        b.set_body(f, body);
        offset += line.len() as u32;
    }
    b.finish()
}

/// One function whose body holds a statement with no indexing rule.
fn unsupported_tree() -> SyntaxTree {
    let mut b = TreeBuilder::new(Dialect::ObjC);
    let file = b.add_file("u.m", Some("void f(void) { @try {} }\n"));
    let f = b.function(b.root(), "f", None, b.span(file, 5, 6));
    let odd = b.add_stmt(
        Stmt::new(StmtKind::Unsupported {
            construct: "objc_try".to_string(),
        })
        .at(b.span(file, 15, 22)),
    );
    let body = b.compound(vec![odd]);
    b.set_body(f, body);
    b.finish()
}

fn write_tree(dir: &Path, name: &str, tree: &SyntaxTree) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string(tree).unwrap()).unwrap();
    path
}

fn parse_facts(text: &str) -> Vec<Fact> {
    text.lines()
        .map(|line| serde_json::from_str(line).expect("fact line"))
        .collect()
}

fn count_nodes(facts: &[Fact], wanted: NodeKind) -> usize {
    facts
        .iter()
        .filter(|fact| matches!(fact, Fact::Node { kind, .. } if *kind == wanted))
        .count()
}

// ============================================================================
// Index Command Integration Tests
// ============================================================================

#[test]
fn test_index_writes_facts_to_stdout() {
    let sandbox = TempDir::new().unwrap();
    write_tree(sandbox.path(), "unit.json", &functions_tree(3));

    let output = refgraph(sandbox.path())
        .args(["-q", "index", "unit.json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let facts = parse_facts(&String::from_utf8(output.stdout).unwrap());
    assert_eq!(count_nodes(&facts, NodeKind::Function), 3);
    assert_eq!(count_nodes(&facts, NodeKind::File), 1);
    assert!(facts.iter().all(|fact| match fact {
        Fact::Anchor { path, .. } => path.as_deref() == Some("unit.c"),
        _ => true,
    }));
}

#[test]
fn test_index_directory_writes_one_file_per_unit() {
    let sandbox = TempDir::new().unwrap();
    let trees = sandbox.path().join("trees");
    std::fs::create_dir(&trees).unwrap();
    write_tree(&trees, "a.json", &functions_tree(1));
    write_tree(&trees, "b.json", &functions_tree(2));

    refgraph(sandbox.path())
        .args(["-q", "index", "trees", "-o", "out", "-j", "2"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let a = std::fs::read_to_string(sandbox.path().join("out/a.jsonl")).unwrap();
    let b = std::fs::read_to_string(sandbox.path().join("out/b.jsonl")).unwrap();
    assert_eq!(count_nodes(&parse_facts(&a), NodeKind::Function), 1);
    assert_eq!(count_nodes(&parse_facts(&b), NodeKind::Function), 2);
}

#[test]
fn test_index_directory_mirrors_nested_layout() {
    let sandbox = TempDir::new().unwrap();
    let trees = sandbox.path().join("trees");
    std::fs::create_dir_all(trees.join("a")).unwrap();
    std::fs::create_dir_all(trees.join("b")).unwrap();
    write_tree(&trees.join("a"), "unit.json", &functions_tree(1));
    write_tree(&trees.join("b"), "unit.json", &functions_tree(3));

    refgraph(sandbox.path())
        .args(["-q", "index", "trees", "-o", "out"])
        .assert()
        .success();

    let a = std::fs::read_to_string(sandbox.path().join("out/a/unit.jsonl")).unwrap();
    let b = std::fs::read_to_string(sandbox.path().join("out/b/unit.jsonl")).unwrap();
    assert_eq!(count_nodes(&parse_facts(&a), NodeKind::Function), 1);
    assert_eq!(count_nodes(&parse_facts(&b), NodeKind::Function), 3);
}

#[test]
fn test_index_rejects_inputs_sharing_an_output() {
    let sandbox = TempDir::new().unwrap();
    for dir in ["a", "b"] {
        std::fs::create_dir(sandbox.path().join(dir)).unwrap();
        write_tree(&sandbox.path().join(dir), "unit.json", &functions_tree(1));
    }

    refgraph(sandbox.path())
        .args(["index", "a/unit.json", "b/unit.json", "-o", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("would both write"));
    assert!(!sandbox.path().join("out").exists());
}

#[test]
fn test_index_rejects_cyclic_tree() {
    let sandbox = TempDir::new().unwrap();
    let mut tree = functions_tree(1);
    let body = tree
        .stmts
        .iter()
        .position(|stmt| matches!(stmt.kind, StmtKind::Compound { .. }))
        .unwrap();
    tree.stmts[body].kind = StmtKind::Compound {
        stmts: vec![refgraph_core::StmtId(body as u32)],
    };
    write_tree(sandbox.path(), "cyclic.json", &tree);

    refgraph(sandbox.path())
        .args(["index", "cyclic.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid syntax tree"));
}

#[test]
fn test_index_output_is_deterministic() {
    let sandbox = TempDir::new().unwrap();
    write_tree(sandbox.path(), "unit.json", &functions_tree(4));

    let run = || {
        refgraph(sandbox.path())
            .args(["-q", "index", "unit.json"])
            .output()
            .unwrap()
            .stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn test_index_graph_format_reports_counts() {
    let sandbox = TempDir::new().unwrap();
    write_tree(sandbox.path(), "unit.json", &functions_tree(2));

    let output = refgraph(sandbox.path())
        .args(["-q", "index", "unit.json", "--format", "graph"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["unit"], "unit.json");
    assert_eq!(report["nodes"]["function"], 2);
    assert_eq!(report["nodes"]["file"], 1);
    assert_eq!(report["decl_jobs"], 2);
    assert_eq!(report["cancelled"], false);
}

#[test]
fn test_abort_policy_fails_the_run() {
    let sandbox = TempDir::new().unwrap();
    write_tree(sandbox.path(), "odd.json", &unsupported_tree());

    refgraph(sandbox.path())
        .args(["index", "odd.json", "--on-unimplemented", "abort"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("objc_try"));

    refgraph(sandbox.path())
        .args(["-q", "index", "odd.json"])
        .assert()
        .success();
}

#[test]
fn test_local_config_sets_policy() {
    let sandbox = TempDir::new().unwrap();
    write_tree(sandbox.path(), "odd.json", &unsupported_tree());
    std::fs::create_dir(sandbox.path().join(".refgraph")).unwrap();
    std::fs::write(
        sandbox.path().join(".refgraph/config.toml"),
        "[indexer]\non_unimplemented = \"abort\"\n",
    )
    .unwrap();

    refgraph(sandbox.path())
        .args(["-q", "index", "odd.json"])
        .assert()
        .failure();

    // the flag wins over the file
    refgraph(sandbox.path())
        .args(["-q", "index", "odd.json", "--on-unimplemented", "continue"])
        .assert()
        .success();
}

#[test]
fn test_index_reports_malformed_tree() {
    let sandbox = TempDir::new().unwrap();
    std::fs::write(sandbox.path().join("broken.json"), "{ \"files\": 3 }").unwrap();

    refgraph(sandbox.path())
        .args(["index", "broken.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse syntax tree"));
}

#[test]
fn test_index_missing_input_fails() {
    let sandbox = TempDir::new().unwrap();

    refgraph(sandbox.path())
        .args(["index", "absent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input not found"));
}

// ============================================================================
// Config Command Integration Tests
// ============================================================================

#[test]
fn test_config_init_then_path() {
    let sandbox = TempDir::new().unwrap();

    refgraph(sandbox.path())
        .args(["config", "init"])
        .assert()
        .success();
    assert!(sandbox.path().join(".refgraph/config.toml").exists());

    refgraph(sandbox.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Local:"))
        .stdout(predicate::str::contains("exists"));
}

#[test]
fn test_config_set_then_get() {
    let sandbox = TempDir::new().unwrap();

    refgraph(sandbox.path())
        .args(["config", "set", "indexer.templates", "skip"])
        .assert()
        .success();

    refgraph(sandbox.path())
        .args(["config", "get", "indexer.templates"])
        .assert()
        .success()
        .stdout(predicate::str::diff("skip\n"));
}

#[test]
fn test_config_set_rejects_invalid_value() {
    let sandbox = TempDir::new().unwrap();

    refgraph(sandbox.path())
        .args(["config", "set", "indexer.usr_byte_size", "64"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("usr_byte_size"));
}

#[test]
fn test_config_show_uses_explicit_file() {
    let sandbox = TempDir::new().unwrap();
    let path = sandbox.path().join("custom.toml");
    std::fs::write(&path, "[output]\nformat = \"graph\"\n").unwrap();

    refgraph(sandbox.path())
        .args(["config", "show", "--json", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"graph\""));
}
