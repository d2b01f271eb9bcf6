//! Integration tests for the jtl CLI

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use serde_json::{json, Value};

/// Helper to get the path to a compiled binary
fn get_binary_path(name: &str) -> String {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test executable name
    path.pop(); // Remove "deps"
    path.push(name);
    path.to_str().unwrap().to_string()
}

/// Helper to create a test file inside a temporary directory
fn create_temp_file(dir: &Path, name: &str, content: &str) -> String {
    let file_path = dir.join(name);
    fs::write(&file_path, content).expect("Failed to write temp file");
    file_path.to_str().unwrap().to_string()
}

fn jtl(args: &[&str]) -> std::process::Output {
    Command::new(get_binary_path("jtl"))
        .args(args)
        .output()
        .expect("Failed to execute jtl")
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_jtl_expand_with_json_params() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(
        dir.path(),
        "template.json",
        r#"{"greeting": "Hello {{ name }}", "double": "{{ n * 2 }}"}"#,
    );
    let params = create_temp_file(dir.path(), "params.json", r#"{"name": "Greg", "n": 21}"#);

    let output = jtl(&["expand", &template, "--params", &params]);

    assert!(output.status.success(), "jtl expand should succeed");
    assert_eq!(
        stdout_json(&output),
        json!({"greeting": "Hello Greg", "double": 42})
    );
}

#[test]
fn test_jtl_expand_with_yaml_params() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(
        dir.path(),
        "template.json",
        r#"{"{{ each people as p }}": "{{ p.name }}"}"#,
    );
    let params = create_temp_file(
        dir.path(),
        "params.yaml",
        "people:\n  - name: Jeremy\n  - name: Greg\n",
    );

    let output = jtl(&["expand", &template, "-p", &params]);

    assert!(output.status.success());
    assert_eq!(stdout_json(&output), json!(["Jeremy", "Greg"]));
}

#[test]
fn test_jtl_expand_yaml_template_with_toml_params() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(
        dir.path(),
        "template.yaml",
        "port: \"{{ base + offset }}\"\nhost: \"{{ host }}\"\n",
    );
    let params = create_temp_file(
        dir.path(),
        "params.toml",
        "base = 8000\noffset = 80\nhost = \"localhost\"\n",
    );

    let output = jtl(&["expand", &template, "-p", &params]);

    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output),
        json!({"port": 8080, "host": "localhost"})
    );
}

#[test]
fn test_jtl_expand_set_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(
        dir.path(),
        "template.json",
        r#"{"name": "{{ name }}", "count": "{{ count + 1 }}"}"#,
    );
    let params = create_temp_file(dir.path(), "params.json", r#"{"name": "old", "count": 1}"#);

    let output = jtl(&[
        "expand", &template, "-p", &params, "--set", "name=new", "--set", "count=9",
    ]);

    assert!(output.status.success());
    assert_eq!(stdout_json(&output), json!({"name": "new", "count": 10}));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("overrides parameter 'name'"));
}

#[test]
fn test_jtl_expand_compact_and_yaml_output() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(dir.path(), "template.json", r#"{"a": "{{ 1 + 2 }}"}"#);

    let output = jtl(&["expand", &template, "--compact"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), r#"{"a":3}"#);

    let output = jtl(&["expand", &template, "--format", "yaml"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "a: 3");
}

#[test]
fn test_jtl_expand_from_stdin() {
    let mut child = Command::new(get_binary_path("jtl"))
        .args(["expand", "-", "--set", "x=5", "--compact"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to execute jtl");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"["{{ x }}", "{{ x * x }}"]"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "[5,25]");
}

#[test]
fn test_jtl_expand_undefined_as_null() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(dir.path(), "template.json", r#"{"a": "{{ missing }}"}"#);

    let output = jtl(&["expand", &template]);
    assert!(!output.status.success(), "undefined value should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Undefined value in template string"));

    let output = jtl(&["expand", &template, "--undefined-as-null"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), json!({"a": null}));
}

#[test]
fn test_jtl_expand_reports_undefined_path() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(
        dir.path(),
        "template.json",
        r#"{"x": "{{ users[0].missing.field }}"}"#,
    );
    let params = create_temp_file(dir.path(), "params.json", r#"{"users": [{}]}"#);

    let output = jtl(&["expand", &template, "-p", &params]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("users.0.missing"));
    assert!(stderr.contains("Hint:"));
}

#[test]
fn test_jtl_check_valid() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(
        dir.path(),
        "valid.json",
        r#"{"{{ if a == 1 }}": "yes", "{{ else }}": "no"}"#,
    );

    let output = jtl(&["check", &template]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("is valid"));
}

#[test]
fn test_jtl_check_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(dir.path(), "invalid.json", r#"{"a": {"b": "{{ }}"}}"#);

    let output = jtl(&["check", &template]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("a.b.3"), "stderr: {}", stderr);
}

#[test]
fn test_jtl_check_rejects_bare_condition() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(
        dir.path(),
        "bare.json",
        r#"{"{{ if a }}": "yes", "{{ else }}": "no"}"#,
    );

    let output = jtl(&["check", &template]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_jtl_missing_file() {
    let output = jtl(&["check", "/nonexistent/template.json"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read file"));
}

#[test]
fn test_jtl_ast() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(dir.path(), "template.json", r#""{{ 1 + 2 }}""#);

    let output = jtl(&["ast", &template]);

    assert!(output.status.success());
    let ast = stdout_json(&output);
    assert!(ast.get("kind").is_some());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Math"));
}

#[test]
fn test_jtl_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let template = create_temp_file(dir.path(), "template.json", r#"{"k": 1}"#);

    let output = jtl(&["tokens", &template]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ObjectStart"));
    assert!(stdout.contains("Char('k')"));
    assert!(stdout.contains("Number(1)"));
    assert_eq!(stdout.lines().count(), 12);
}
