use assert_cmd::cargo::cargo_bin_cmd;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

fn load_schema() -> JSONSchema {
    let schema_path = repo_root().join("schemas").join("allstar-result.schema.json");
    let schema_text = fs::read_to_string(schema_path).expect("read schema");
    let schema_json: Value = serde_json::from_str(&schema_text).expect("parse schema");
    JSONSchema::compile(&schema_json).expect("compile schema")
}

fn run_json(args: &[&str]) -> Value {
    let root = repo_root();
    let output = cargo_bin_cmd!("allstar")
        .current_dir(&root)
        .args(args)
        .output()
        .expect("run allstar");
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    serde_json::from_str(&stdout).expect("parse json")
}

fn assert_valid(actual: &Value) {
    let schema = load_schema();
    let result = schema.validate(actual);
    if let Err(errors) = result {
        let messages = errors.map(|err| err.to_string()).collect::<Vec<_>>();
        panic!("schema violations: {messages:?}");
    }
}

#[test]
fn schema_parse_accepted() {
    let actual = run_json(&[
        "parse",
        "tests/cases/list.json",
        "tests/cases/list_ok.tokens",
        "--start-rule",
        "list",
        "--format",
        "json",
    ]);
    assert_valid(&actual);
}

#[test]
fn schema_parse_rejected_with_diagnostics() {
    let actual = run_json(&[
        "parse",
        "tests/cases/list.json",
        "tests/cases/list_bad.tokens",
        "tests/cases/list_short.tokens",
        "--start-rule",
        "list",
        "--diagnostics",
    ]);
    assert_valid(&actual);
}

#[test]
fn schema_parse_escalation_diagnostics() {
    let actual = run_json(&[
        "parse",
        "tests/cases/escalation.json",
        "tests/cases/escalation.tokens",
        "--start-rule",
        "top2",
        "--diagnostics",
    ]);
    assert_valid(&actual);
}

#[test]
fn schema_parse_invalid_grammar() {
    let actual = run_json(&[
        "parse",
        "tests/cases/invalid_grammar.json",
        "tests/cases/list_ok.tokens",
        "--start-rule",
        "s",
    ]);
    assert_valid(&actual);
}

#[test]
fn schema_predict() {
    let actual = run_json(&[
        "predict",
        "tests/cases/lookahead.json",
        "tests/cases/look_aac.tokens",
        "--decision",
        "0",
    ]);
    assert_valid(&actual);
}
