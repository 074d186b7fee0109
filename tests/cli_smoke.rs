use std::process::Command;

use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct EvalMetrics {
    kendall_tau: f64,
    spearman_rho: f64,
    top1_hit: bool,
    pairs_scheduled: usize,
    pairs_evaluated: usize,
    neither_votes: usize,
}

#[derive(Debug, serde::Deserialize)]
struct EvalResult {
    case_name: String,
    candidates: usize,
    metrics: EvalMetrics,
}

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

fn run_cli_eval(case: &str) -> EvalResult {
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("eval.jsonl");

    let status = Command::new(env!("CARGO_BIN_EXE_pairwise-rank"))
        .args(["eval", "--case", case])
        .arg("--out")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());

    let raw = std::fs::read_to_string(&out_path).unwrap();
    let first_line = raw.lines().next().unwrap();
    serde_json::from_str(first_line).unwrap()
}

#[test]
fn cli_eval_smoke_and_determinism() {
    let a = run_cli_eval("clean_ordering_10");
    let b = run_cli_eval("clean_ordering_10");

    assert_eq!(a.case_name, "clean_ordering_10");
    assert_eq!(a.candidates, 10);
    assert!(a.metrics.kendall_tau >= 0.99);
    assert!(a.metrics.spearman_rho >= 0.99);
    assert!(a.metrics.top1_hit);
    assert_eq!(a.metrics.pairs_scheduled, 45);
    assert_eq!(a.metrics.pairs_evaluated, 45);
    assert_eq!(a.metrics.neither_votes, 0);

    // Latency is environment-dependent; compare everything else.
    assert!(approx_eq(a.metrics.kendall_tau, b.metrics.kendall_tau, 1e-12));
    assert!(approx_eq(a.metrics.spearman_rho, b.metrics.spearman_rho, 1e-12));
    assert_eq!(a.metrics.pairs_evaluated, b.metrics.pairs_evaluated);
}

#[test]
fn cli_plan_reports_linear_budget_for_large_groups() {
    let dir = tempdir().unwrap();
    let request_path = dir.path().join("request.json");

    let candidates: Vec<serde_json::Value> = (0..150)
        .map(|i| serde_json::json!({ "title": format!("candidate {i}") }))
        .collect();
    let req = serde_json::json!({
        "group": 4,
        "candidates": candidates,
        "context": { "subject": "pick the most promising candidate" }
    });
    std::fs::write(&request_path, serde_json::to_string_pretty(&req).unwrap()).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_pairwise-rank"))
        .args(["plan", "--seed", "7"])
        .arg("--request")
        .arg(&request_path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["group"], 4);
    assert_eq!(v["candidates"], 150);
    assert_eq!(v["pairs"], 300);
    assert!(v["min_participation"].as_u64().unwrap() >= 2);
    assert_eq!(v["participation"].as_array().unwrap().len(), 150);
}

#[test]
fn cli_plan_rejects_invalid_request() {
    let dir = tempdir().unwrap();
    let request_path = dir.path().join("request.json");
    let req = serde_json::json!({
        "candidates": [{ "title": "a" }, { "title": "b" }],
        "context": { "subject": "   " }
    });
    std::fs::write(&request_path, req.to_string()).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_pairwise-rank"))
        .arg("plan")
        .arg("--request")
        .arg(&request_path)
        .status()
        .unwrap();
    assert!(!status.success());
}
