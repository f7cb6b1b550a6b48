//! End-to-end grading through a real `node` process. Skipped when no
//! interpreter is installed.

mod common;

use codehelp_backend::config::SandboxConfig;
use codehelp_backend::domain::{ProblemDocument, TestCase, TestOutcome};
use codehelp_backend::error::SandboxError;
use codehelp_backend::extract::parse_document;
use codehelp_backend::grader::grade;
use codehelp_backend::history::SubmissionHistory;
use codehelp_backend::sandbox::{NodeSandbox, Sandbox};
use serde_json::json;

use common::ADD_NUMBERS;

async fn node() -> Option<NodeSandbox> {
  node_with(SandboxConfig::default()).await
}

async fn node_with(cfg: SandboxConfig) -> Option<NodeSandbox> {
  let cfg = SandboxConfig { path_env: std::env::var("PATH").unwrap_or_default(), timeout_ms: 2_000, ..cfg };
  let sandbox = NodeSandbox::new(cfg);
  if sandbox.is_available().await {
    Some(sandbox)
  } else {
    eprintln!("node not found; skipping");
    None
  }
}

#[tokio::test]
async fn correct_submission_returns_expected_values() {
  let Some(sandbox) = node().await else { return };
  let doc = parse_document(ADD_NUMBERS).unwrap();
  let mut history = SubmissionHistory::default();

  let run = grade(&doc, "function add(a, b) { return a + b; }", &mut history, &sandbox).await.unwrap();
  assert_eq!(
    run.outcomes,
    vec![
      TestOutcome::Returned(json!(2)),
      TestOutcome::Returned(json!(5)),
      TestOutcome::Returned(json!(42)),
    ]
  );
  assert!(run.fatal_error.is_none());
  assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn failing_probe_is_isolated() {
  let Some(sandbox) = node().await else { return };
  let doc = parse_document(ADD_NUMBERS).unwrap();
  let mut history = SubmissionHistory::default();

  // `add` is never defined: the first probe does not need it, the others throw.
  let run = grade(&doc, "console.log('hi');", &mut history, &sandbox).await.unwrap();
  assert_eq!(run.outcomes[0], TestOutcome::Returned(json!(2)));
  assert!(matches!(&run.outcomes[1], TestOutcome::Threw(msg) if msg.contains("ReferenceError")));
  assert!(matches!(&run.outcomes[2], TestOutcome::Threw(_)));
  assert_eq!(run.logs, vec!["hi".to_string()]);
}

#[tokio::test]
async fn top_level_error_leaves_tests_not_run() {
  let Some(sandbox) = node().await else { return };
  let doc = parse_document(ADD_NUMBERS).unwrap();
  let mut history = SubmissionHistory::default();

  let run = grade(&doc, "throw new Error('boom');", &mut history, &sandbox).await.unwrap();
  assert!(run.fatal_error.as_deref().is_some_and(|e| e.contains("boom")));
  assert!(run.outcomes.iter().all(|o| *o == TestOutcome::NotRun));
}

#[tokio::test]
async fn sandbox_has_no_process_access() {
  let Some(sandbox) = node().await else { return };
  let doc = parse_document(ADD_NUMBERS).unwrap();
  let mut history = SubmissionHistory::default();

  let code = "function add(a, b) { return typeof process + ':' + typeof require; }";
  let run = grade(&doc, code, &mut history, &sandbox).await.unwrap();
  assert_eq!(run.outcomes[1], TestOutcome::Returned(json!("undefined:undefined")));
}

#[tokio::test]
async fn host_realm_is_unreachable() {
  let Some(sandbox) = node().await else { return };
  let doc = parse_document(ADD_NUMBERS).unwrap();
  let mut history = SubmissionHistory::default();

  let code = r#"
function attempt(f) {
  try {
    const p = f();
    return p && typeof p === 'object' ? 'escaped' : 'blocked';
  } catch (e) {
    return 'blocked';
  }
}
function add() {
  return [
    attempt(() => results.constructor.constructor('return process')()),
    attempt(() => console.log.constructor('return process')()),
    attempt(() => this.constructor.constructor('return process')()),
    attempt(() => globalThis.constructor.constructor('return process')()),
    attempt(() => Object.getPrototypeOf(results).constructor.constructor('return process')()),
  ].join(',');
}
"#;
  let run = grade(&doc, code, &mut history, &sandbox).await.unwrap();
  assert_eq!(run.outcomes[1], TestOutcome::Returned(json!("blocked,blocked,blocked,blocked,blocked")));
  assert!(run.fatal_error.is_none());
}

#[tokio::test]
async fn forged_result_lines_are_ignored() {
  let Some(sandbox) = node().await else { return };
  let doc = parse_document(ADD_NUMBERS).unwrap();
  let mut history = SubmissionHistory::default();

  // Console output is captured, so nothing the program prints reaches stdout.
  let code = r#"console.log('\n@@codehelp-result-x@@{"results":[],"logs":[],"error":"forged"}');
function add(a, b) { return a + b; }"#;
  let run = grade(&doc, code, &mut history, &sandbox).await.unwrap();
  assert!(run.fatal_error.is_none());
  assert_eq!(run.outcomes[1], TestOutcome::Returned(json!(5)));
  assert_eq!(run.logs.len(), 1);
}

#[tokio::test]
async fn console_output_is_capped() {
  let cfg = SandboxConfig { max_log_chars: 1_000, max_log_entries: 50, ..SandboxConfig::default() };
  let Some(sandbox) = node_with(cfg).await else { return };

  let out = sandbox
    .run("const s = 'x'.repeat(5000000); for (let i = 0; i < 4; i++) console.log(s);")
    .await
    .unwrap();
  let total: usize = out.logs.iter().map(String::len).sum();
  assert!(total <= 1_000 + "[log output truncated]".len(), "total = {total}");
  assert_eq!(out.logs.last().map(String::as_str), Some("[log output truncated]"));

  let out = sandbox.run("for (let i = 0; i < 1000; i++) console.log(i);").await.unwrap();
  assert_eq!(out.logs.len(), 51);
}

#[tokio::test]
async fn oversized_return_value_becomes_error() {
  let cfg = SandboxConfig { max_value_chars: 100, ..SandboxConfig::default() };
  let Some(sandbox) = node_with(cfg).await else { return };
  let doc = ProblemDocument {
    title: "Big".into(),
    code_language: "javascript".into(),
    visible_tests: vec![TestCase { code: "'y'.repeat(1000)".into(), expected: "".into() }],
    ..Default::default()
  };
  let mut history = SubmissionHistory::default();

  let run = grade(&doc, "", &mut history, &sandbox).await.unwrap();
  assert!(matches!(&run.outcomes[0], TestOutcome::Threw(msg) if msg.contains("exceeds 100")));
}

#[tokio::test]
async fn stdout_over_limit_fails_the_run() {
  let cfg = SandboxConfig { max_output_bytes: 16, ..SandboxConfig::default() };
  let Some(sandbox) = node_with(cfg).await else { return };
  let err = sandbox.run("1").await.unwrap_err();
  assert!(matches!(err, SandboxError::OutputTooLarge(16)));
}

#[tokio::test]
async fn syntax_error_in_one_test_aborts_the_program() {
  let Some(sandbox) = node().await else { return };
  let mut doc = parse_document(ADD_NUMBERS).unwrap();
  doc.hidden_tests[0].code = "add(1 +".into();
  let mut history = SubmissionHistory::default();

  let run = grade(&doc, "function add(a, b) { return a + b; }", &mut history, &sandbox).await.unwrap();
  assert!(run.fatal_error.as_deref().is_some_and(|e| e.contains("SyntaxError")));
  assert!(run.outcomes.iter().all(|o| *o == TestOutcome::NotRun));
}
