use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path).expect("read json");
    serde_json::from_str(&text).expect("parse json")
}

fn run_with_profile(args: &[&str], expected_exit_code: i32) -> (Value, String) {
    let root = repo_root();
    let temp = TempDir::new().expect("tmp dir");
    let result_path = temp.path().join("result.json");
    let csv_path = temp.path().join("profile.csv");

    let mut all_args = args.to_vec();
    all_args.extend([
        "--format",
        "json",
        "--output",
        result_path.to_str().expect("result path utf8"),
        "--profile",
        csv_path.to_str().expect("csv path utf8"),
    ]);

    let output = cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args(&all_args)
        .output()
        .expect("run allstar");

    assert_eq!(output.status.code(), Some(expected_exit_code));
    assert!(output.stdout.is_empty());

    let result = read_json(&result_path);
    let csv = fs::read_to_string(&csv_path).expect("read csv");
    (result, csv)
}

#[test]
fn profile_csv_aggregates_every_input() {
    let (result, csv) = run_with_profile(
        &[
            "parse",
            "tests/cases/lookahead.json",
            "tests/cases/look_b.tokens",
            "tests/cases/look_ab.tokens",
            "tests/cases/look_aab.tokens",
            "--start-rule",
            "q",
        ],
        0,
    );

    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("Rule,Invocations,Time (ms),Total k,Max k,Ambiguities,DFA cache miss")
    );
    let row = lines.next().expect("decision row").split(',').collect::<Vec<_>>();
    assert_eq!(row[0], "q:0");
    assert_eq!(row[1], "3");
    assert!(row[2].parse::<f64>().expect("time") >= 0.0);
    // each input warms its own cache, so every edge is a miss
    assert_eq!(&row[3..], ["6", "3", "0", "6"]);
    assert_eq!(lines.next(), None);

    let parse_info = &result["profile"]["parse_info"];
    assert_eq!(parse_info["total_sll_lookahead_ops"], 6);
    assert_eq!(parse_info["total_ll_lookahead_ops"], 0);
    assert_eq!(parse_info["total_atn_lookahead_ops"], 6);
    assert_eq!(parse_info["ll_decisions"], serde_json::json!([]));
    assert!(result["profile"]["csv"]
        .as_str()
        .expect("csv path")
        .ends_with("profile.csv"));
}

#[test]
fn profile_csv_records_full_context_decisions() {
    let (result, csv) = run_with_profile(
        &[
            "parse",
            "tests/cases/escalation.json",
            "tests/cases/escalation.tokens",
            "--start-rule",
            "top2",
        ],
        0,
    );

    assert_eq!(result["profile"]["parse_info"]["ll_decisions"], serde_json::json!([0]));
    assert_eq!(result["profile"]["parse_info"]["total_ll_lookahead_ops"], 2);
    let rows = csv.lines().skip(1).collect::<Vec<_>>();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("q:0,1,"));
}

#[test]
fn profile_is_omitted_without_flag() {
    let root = repo_root();
    let output = cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args([
            "parse",
            "tests/cases/lookahead.json",
            "tests/cases/look_b.tokens",
            "--start-rule",
            "q",
        ])
        .output()
        .expect("run allstar");
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let result: Value = serde_json::from_str(&stdout).expect("parse json");
    assert!(result.get("profile").is_none());
}
