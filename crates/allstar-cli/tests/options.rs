use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use serde_json::Value;
use std::path::PathBuf;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

#[test]
fn jobs_must_be_at_least_one() {
    let root = repo_root();
    cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args([
            "parse",
            "tests/cases/list.json",
            "tests/cases/list_ok.tokens",
            "--start-rule",
            "list",
            "--jobs",
            "0",
        ])
        .assert()
        .code(2)
        .stderr(contains("--jobs must be >= 1"));
}

#[test]
fn malformed_predicate_flag_is_a_tool_error() {
    let root = repo_root();
    cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args([
            "parse",
            "tests/cases/guarded.json",
            "tests/cases/guarded.tokens",
            "--start-rule",
            "s",
            "--pred",
            "q0=false",
        ])
        .assert()
        .code(2)
        .stderr(contains("tool error: --pred q0=false: expected RULE:INDEX=BOOL"));

    cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args([
            "parse",
            "tests/cases/guarded.json",
            "tests/cases/guarded.tokens",
            "--start-rule",
            "s",
            "--pred",
            "nope:0=true",
        ])
        .assert()
        .code(2)
        .stderr(contains("unknown rule 'nope'"));
}

#[test]
fn invalid_grammar_produces_error_document() {
    let root = repo_root();
    let output = cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args([
            "parse",
            "tests/cases/invalid_grammar.json",
            "tests/cases/list_ok.tokens",
            "--start-rule",
            "s",
        ])
        .output()
        .expect("run allstar");
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let result: Value = serde_json::from_str(&stdout).expect("parse json");
    assert_eq!(result["status"], "error");
    assert_eq!(result["exit_code"], 2);
    assert_eq!(result["reason"]["kind"], "invalid_grammar");
    assert!(result["reason"]["message"]
        .as_str()
        .expect("message")
        .contains("'B'"));
}

#[test]
fn unknown_start_rule_produces_error_document() {
    let root = repo_root();
    let output = cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args([
            "parse",
            "tests/cases/list.json",
            "tests/cases/list_ok.tokens",
            "--start-rule",
            "program",
        ])
        .output()
        .expect("run allstar");
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let result: Value = serde_json::from_str(&stdout).expect("parse json");
    assert_eq!(result["reason"]["kind"], "invalid_input");
    assert_eq!(result["reason"]["message"], "unknown start rule 'program'");
}

#[test]
fn decision_out_of_range_produces_error_document() {
    let root = repo_root();
    let output = cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args([
            "predict",
            "tests/cases/lookahead.json",
            "tests/cases/look_aac.tokens",
            "--decision",
            "7",
        ])
        .output()
        .expect("run allstar");
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let result: Value = serde_json::from_str(&stdout).expect("parse json");
    assert_eq!(result["reason"]["kind"], "invalid_input");
    assert!(result["reason"]["message"]
        .as_str()
        .expect("message")
        .starts_with("decision 7 out of range"));
}

#[test]
fn call_stack_must_name_invoking_states() {
    let root = repo_root();
    let output = cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args([
            "predict",
            "tests/cases/escalation.json",
            "tests/cases/escalation.tokens",
            "--decision",
            "0",
            "--call-stack",
            "100000",
        ])
        .output()
        .expect("run allstar");
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let result: Value = serde_json::from_str(&stdout).expect("parse json");
    assert_eq!(result["reason"]["message"], "state 100000 does not invoke a rule");
}
