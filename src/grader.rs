//! Grading harness: splice the submission into the problem template, append
//! one scoped probe block per test and run the result in a sandbox.

use tracing::{info, instrument, warn};

use crate::domain::{GradeRun, ProblemDocument, TestCase, TestOutcome};
use crate::error::SandboxError;
use crate::history::SubmissionHistory;
use crate::sandbox::{Sandbox, SandboxOutput};

/// Name of the array probes push into. Also the only binding the sandbox exposes.
pub const RESULTS_BINDING: &str = "results";

/// Record the submission, build the program and execute it.
///
/// Outcomes come back in test order (visible first). A probe that throws only
/// affects its own outcome; an error thrown by the template or submission code
/// leaves every test without a value as `NotRun`.
///
/// Isolation covers runtime errors only. Everything is compiled as one
/// program, so a syntax error anywhere (submission or any single test) fails
/// the whole compile: `fatal_error` carries the `SyntaxError` and every test,
/// including those before the broken one, is `NotRun`.
#[instrument(
  level = "info",
  skip_all,
  fields(title = %doc.title, code_len = code.len(), tests = doc.test_count())
)]
pub async fn grade(
  doc: &ProblemDocument,
  code: &str,
  history: &mut SubmissionHistory,
  sandbox: &dyn Sandbox,
) -> Result<GradeRun, SandboxError> {
  let recorded = history.record(code);

  if !sandbox.supports(&doc.code_language) {
    return Err(SandboxError::UnsupportedLanguage(doc.code_language.clone()));
  }

  let program = synthesize_program(doc, code);
  let output = sandbox.run(&program).await?;
  let run = collect_outcomes(program, doc.test_count(), output);

  if let Some(err) = &run.fatal_error {
    warn!(target: "grading", error = %err, "Program aborted before all tests ran");
  }
  info!(
    target: "grading",
    recorded,
    history_len = history.len(),
    returned = run.outcomes.iter().filter(|o| matches!(o, TestOutcome::Returned(_))).count(),
    "Grading run finished"
  );
  Ok(run)
}

/// Template prefix, submission and suffix followed by one block per test.
pub fn synthesize_program(doc: &ProblemDocument, code: &str) -> String {
  let mut program = format!("{}\n{}\n{}\n", doc.template_prefix, code, doc.template_suffix);
  for (i, test) in doc.all_tests().enumerate() {
    program.push_str(&probe_block(i, test));
  }
  program
}

fn probe_block(i: usize, test: &TestCase) -> String {
  let (setup, expr) = split_probe(&test.code);
  let setup = if setup.is_empty() { String::new() } else { format!("{}\n", setup) };
  format!(
    "\n{{\ntry {{\n{setup}let result{i} = (\n{expr}\n);\n{r}.push({{ index: {i}, ok: true, value: result{i} }});\n}} catch (err{i}) {{\n{r}.push({{ index: {i}, ok: false, error: (err{i} && typeof err{i} === 'object' && 'message' in err{i}) ? String(err{i}.name || 'Error') + ': ' + err{i}.message : String(err{i}) }});\n}}\n}}\n",
    setup = setup,
    expr = expr,
    i = i,
    r = RESULTS_BINDING,
  )
}

/// All lines but the last are setup; the last becomes the captured expression.
fn split_probe(code: &str) -> (String, String) {
  let mut lines: Vec<&str> = code.lines().collect();
  while lines.last().is_some_and(|l| l.trim().is_empty()) {
    lines.pop();
  }
  let Some(last) = lines.pop() else {
    return (String::new(), "undefined".to_string());
  };
  (lines.join("\n"), probe_expression(last))
}

/// Turn a probe's final line into a bare expression: drop a leading `return`
/// keyword and trailing semicolons.
fn probe_expression(line: &str) -> String {
  let mut expr = line.trim();
  if let Some(rest) = expr.strip_prefix("return") {
    let keyword_ends = rest.chars().next().map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '$'));
    if keyword_ends {
      expr = rest.trim_start();
    }
  }
  let expr = expr.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
  if expr.is_empty() {
    "undefined".to_string()
  } else {
    expr.to_string()
  }
}

fn collect_outcomes(program: String, count: usize, output: SandboxOutput) -> GradeRun {
  let mut outcomes = vec![TestOutcome::NotRun; count];
  for res in output.results {
    let Some(idx) = res.index.filter(|i| *i < count) else { continue };
    outcomes[idx] = if res.ok {
      TestOutcome::Returned(res.value.unwrap_or(serde_json::Value::Null))
    } else {
      TestOutcome::Threw(res.error.unwrap_or_default())
    };
  }
  GradeRun { program, outcomes, logs: output.logs, fatal_error: output.error }
}
