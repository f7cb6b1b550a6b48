//! Domain models: the parsed problem document and the outcome of a grading run.

use serde::{Deserialize, Serialize};

/// Language assumed when the problem's code block declares none.
pub const DEFAULT_LANGUAGE: &str = "javascript";

/// Literal line in the problem template where a submission is spliced in.
pub const INSERTION_MARKER: &str = "// Your code here";

/// Title carried by the placeholder document on fetch or parse failure.
pub const SENTINEL_TITLE: &str = "Failed to load problem";

/// One probe snippet plus the human-readable result it should produce.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
  pub code: String,
  pub expected: String,
}

/// Validated problem document. Built once per load and never mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDocument {
  pub title: String,
  pub description: String,
  pub code_language: String,
  pub template_prefix: String,
  pub template_suffix: String,
  pub reference_solution: String,
  pub solution_explanation: String,
  pub visible_tests: Vec<TestCase>,
  pub hidden_tests: Vec<TestCase>,
}

impl ProblemDocument {
  /// Placeholder substituted whenever a document cannot be fetched or parsed.
  pub fn sentinel() -> Self {
    Self { title: SENTINEL_TITLE.to_string(), ..Default::default() }
  }

  pub fn is_sentinel(&self) -> bool {
    self.title == SENTINEL_TITLE && self.code_language.is_empty()
  }

  /// Visible tests followed by hidden tests, in grading order.
  pub fn all_tests(&self) -> impl Iterator<Item = &TestCase> {
    self.visible_tests.iter().chain(self.hidden_tests.iter())
  }

  pub fn test_count(&self) -> usize {
    self.visible_tests.len() + self.hidden_tests.len()
  }
}

/// What a single probe produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum TestOutcome {
  /// The probe's final expression evaluated to this value.
  Returned(serde_json::Value),
  /// The probe threw; the message is what the interpreter reported.
  Threw(String),
  /// Execution stopped before this probe ran.
  NotRun,
}

impl TestOutcome {
  pub fn value(&self) -> Option<&serde_json::Value> {
    match self {
      TestOutcome::Returned(v) => Some(v),
      _ => None,
    }
  }

  /// Short rendering used in hint prompts and logs.
  pub fn summary(&self) -> String {
    match self {
      TestOutcome::Returned(v) => format!("Returned {}", v),
      TestOutcome::Threw(msg) => format!("Error: {}", msg),
      TestOutcome::NotRun => "Not run".to_string(),
    }
  }
}

/// Ephemeral record of one grading invocation.
#[derive(Clone, Debug, Serialize)]
pub struct GradeRun {
  /// The synthesized program that was executed.
  pub program: String,
  /// One entry per test, visible tests first.
  pub outcomes: Vec<TestOutcome>,
  /// Console output captured inside the sandbox.
  pub logs: Vec<String>,
  /// Error raised outside any probe; aborts the remaining tests.
  pub fatal_error: Option<String>,
}

impl GradeRun {
  pub fn values(&self) -> Vec<Option<&serde_json::Value>> {
    self.outcomes.iter().map(TestOutcome::value).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn sentinel_is_recognisable() {
    let doc = ProblemDocument::sentinel();
    assert_eq!(doc.title, SENTINEL_TITLE);
    assert!(doc.is_sentinel());
    assert_eq!(doc.test_count(), 0);
  }

  #[test]
  fn outcome_serializes_with_status_tag() {
    let out = serde_json::to_value(TestOutcome::Returned(json!(2))).unwrap();
    assert_eq!(out, json!({ "status": "returned", "value": 2 }));
    let out = serde_json::to_value(TestOutcome::NotRun).unwrap();
    assert_eq!(out, json!({ "status": "not_run" }));
  }
}
