use serde_json::{json, Value};
use std::io::Write;
use std::process::{Command, Stdio};

const WORKER: &str = env!("CARGO_BIN_EXE_grader-worker");

fn run_worker(args: &[&str], envs: &[(&str, &str)], stdin: &str) -> (bool, String) {
    let mut cmd = Command::new(WORKER);
    cmd.args(args)
        .env_remove("GRADER_MODE")
        .env_remove("GRADER_BINDING")
        .env_remove("GRADER_ISOLATION")
        .env_remove("GRADER_CASE_TIMEOUT_MS")
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().expect("failed to spawn grader-worker");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    (
        output.status.success(),
        String::from_utf8(output.stdout).unwrap(),
    )
}

fn grade(envs: &[(&str, &str)], request: &Value) -> Value {
    let (ok, stdout) = run_worker(&["handle"], envs, &request.to_string());
    assert!(ok, "worker exited with failure");
    serde_json::from_str(stdout.trim()).unwrap()
}

fn add_request(cases: Value) -> Value {
    json!({
        "functionName": "add",
        "functionArgs": ["int a", "int b"],
        "functionBody": "print(`adding ${a} and ${b}`); a + b",
        "testCases": cases
    })
}

#[test]
fn test_handle_round_trip() {
    let response = grade(
        &[],
        &add_request(json!([
            {"input": [2, 3], "output": 5},
            {"input": [1, 1], "output": 3}
        ])),
    );

    assert_eq!(response["STATUS"], "FAILED");
    assert_eq!(response["failedCaseNo"], 2);
    assert_eq!(response["results"][0]["passed"], true);
    assert_eq!(response["results"][0]["consoleOutput"], json!(["adding 2 and 3"]));
    assert_eq!(response["results"][1]["output"], 2);
}

#[test]
fn test_default_command_reads_stdin() {
    let request = add_request(json!([{"input": [2, 3], "output": 5}]));
    let (ok, stdout) = run_worker(&[], &[], &request.to_string());

    assert!(ok);
    let response: Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(response["STATUS"], "PASSED");
    assert_eq!(response["failedCaseNo"], -1);
}

#[test]
fn test_event_file() {
    let path = std::env::temp_dir().join(format!("grader-event-{}.json", std::process::id()));
    std::fs::write(&path, add_request(json!([{"input": [4, 4], "output": 8}])).to_string()).unwrap();

    let (ok, stdout) = run_worker(&["handle", "--event", path.to_str().unwrap()], &[], "");
    std::fs::remove_file(&path).ok();

    assert!(ok);
    let response: Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(response["STATUS"], "PASSED");
}

#[test]
fn test_invalid_event_is_error_response() {
    let (ok, stdout) = run_worker(&["handle"], &[], "{ not json");

    assert!(ok);
    let response: Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(response["STATUS"], "ERROR");
    assert_eq!(response["failedCaseNo"], -1);
    assert_eq!(response["results"], json!([]));
}

#[test]
fn test_serve_answers_each_line() {
    let first = add_request(json!([{"input": [2, 3], "output": 5}]));
    let second = add_request(json!([{"input": [2, 3], "output": 6}]));
    let input = format!("{}\n\n{}\n", first, second);

    let (ok, stdout) = run_worker(&["serve"], &[], &input);

    assert!(ok);
    let statuses: Vec<String> = stdout
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["STATUS"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["PASSED", "FAILED"]);
}

#[test]
fn test_synth_prints_unit() {
    let request = add_request(json!([]));
    let (ok, stdout) = run_worker(&["synth"], &[], &request.to_string());

    assert!(ok);
    assert!(stdout.starts_with("fn add(a, b) {\n"), "{}", stdout);
}

#[test]
fn test_subprocess_isolation() {
    let envs = [
        ("GRADER_ISOLATION", "subprocess"),
        ("GRADER_CHILD_PROGRAM", WORKER),
    ];
    let response = grade(
        &envs,
        &add_request(json!([
            {"input": [2, 3], "output": 5},
            {"input": [10, -4], "output": 6}
        ])),
    );

    assert_eq!(response["STATUS"], "PASSED");
    assert_eq!(response["results"][1]["consoleOutput"], json!(["adding 10 and -4"]));
}

#[test]
fn test_subprocess_isolation_load_error() {
    let envs = [
        ("GRADER_ISOLATION", "subprocess"),
        ("GRADER_CHILD_PROGRAM", WORKER),
    ];
    let request = json!({
        "functionName": "add",
        "functionArgs": ["a", "b"],
        "functionBody": "a + ;",
        "testCases": [{"input": [2, 3], "output": 5}]
    });

    let response = grade(&envs, &request);

    assert_eq!(response["STATUS"], "ERROR");
    assert!(response["message"].as_str().unwrap().starts_with("Load error"));
}

#[test]
fn test_subprocess_timeout_is_recorded_per_case() {
    let envs = [
        ("GRADER_ISOLATION", "subprocess"),
        ("GRADER_CHILD_PROGRAM", WORKER),
        ("GRADER_MODE", "hardened"),
        ("GRADER_CASE_TIMEOUT_MS", "200"),
    ];
    let request = json!({
        "functionName": "spin",
        "functionArgs": ["int n"],
        "functionBody": "if n < 0 { let i = 0; loop { i += 1; } } n",
        "testCases": [
            {"input": [1], "output": 1},
            {"input": [-1], "output": -1},
            {"input": [3], "output": 3}
        ]
    });

    let response = grade(&envs, &request);

    assert_eq!(response["STATUS"], "FAILED");
    assert_eq!(response["failedCaseNo"], 2);
    assert_eq!(response["results"][1]["output"], Value::Null);
    assert_eq!(
        response["results"][1]["error"],
        "Invocation timed out after 200ms"
    );
    assert_eq!(response["results"][2]["passed"], true);
}
