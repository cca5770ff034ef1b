// Command-line tests for the loomck binary.
//
// Exit codes: 0 for a valid graph, 1 when issues were found, 2 when the
// input could not be read or parsed. Graph documents are written to the
// system temp dir under unique names so tests can run in parallel.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn loomck_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_loomck"))
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn write_temp(contents: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "loomck_cli_{}_{}.json",
        std::process::id(),
        n
    ));
    std::fs::write(&path, contents).expect("failed to write temp graph");
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(loomck_binary())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run loomck")
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("non-UTF8 output")
}

fn bad_dtype_graph() -> PathBuf {
    let mut doc: serde_json::Value =
        serde_json::from_str(include_str!("fixtures/matmul.json")).unwrap();
    doc["nodes"][0]["body"]["dtype"] = serde_json::json!("bfloat16");
    write_temp(&doc.to_string())
}

#[test]
fn valid_graph_exits_zero() {
    let path = fixture("matmul.json");
    let output = run(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        stdout(&output),
        "graph 00000000-0000-0000-0000-0000000000ff: ok\n"
    );
}

#[test]
fn issues_exit_one() {
    let path = bad_dtype_graph();
    let output = run(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.starts_with("graph 00000000-0000-0000-0000-0000000000ff: 1 issue(s)\n"));
    assert!(out.contains("Tensor dtype (bfloat16) not a recognized type"));
    std::fs::remove_file(path).ok();
}

#[test]
fn dtype_flag_replaces_defaults() {
    let path = bad_dtype_graph();
    let output = run(&[
        path.to_str().unwrap(),
        "--dtype",
        "int32",
        "--dtype",
        "bfloat16",
    ]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));

    let output = run(&[path.to_str().unwrap(), "--dtype", "bfloat16"]);
    assert_eq!(output.status.code(), Some(1));
    std::fs::remove_file(path).ok();
}

#[test]
fn json_format() {
    let path = fixture("matmul.json");
    let output = run(&[
        path.to_str().unwrap(),
        "--format",
        "json",
        "--fingerprint",
        "--coloring",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["valid"], true);
    assert_eq!(report["issues"], serde_json::json!([]));
    assert_eq!(report["fingerprint"].as_str().map(str::len), Some(64));
    assert_eq!(report["coloring"]["numberOfColors"], 4);
}

#[test]
fn unreadable_input_exits_two() {
    let output = run(&["/nonexistent/loomck/graph.json"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("loomck: error:"), "{stderr}");
}

#[test]
fn malformed_document_exits_two() {
    let path = write_temp("{\"id\": \"not-a-uuid\", \"nodes\": []}");
    let output = run(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).is_empty());
    std::fs::remove_file(path).ok();
}
