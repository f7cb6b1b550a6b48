//! Client for the external hint ("AI tutor") service.
//!
//! We only build the prompt and relay the reply. Calls are instrumented with
//! prompt size and status; the credential and prompt body are never logged.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::{HintConfig, Prompts};
use crate::domain::{ProblemDocument, TestCase, TestOutcome};
use crate::error::HintError;
use crate::util::fill_template;

/// Classified reply, each variant with a user-facing message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum HintReply {
  Answer(String),
  LoginRequired,
  LoginExpired,
  Unauthorized,
  Failed,
}

impl HintReply {
  pub fn message(&self) -> String {
    match self {
      HintReply::Answer(text) => text.clone(),
      HintReply::LoginRequired => "You must be logged in to use the AI tutor. Please log in and try again.".into(),
      HintReply::LoginExpired => "Your login has expired. Please try again after logging in.".into(),
      HintReply::Unauthorized => "You are not authorized to use the AI tutor.".into(),
      HintReply::Failed => "An error occurred while using the AI tutor. Please try again later.".into(),
    }
  }

  /// True when the caller should drop its stored credential.
  pub fn invalidates_credential(&self) -> bool {
    matches!(self, HintReply::LoginExpired)
  }
}

#[derive(Serialize)]
struct HintRequest<'a> {
  prompt: &'a str,
  max_tokens: u32,
}

#[derive(Deserialize)]
struct HintResponse {
  #[serde(default)]
  status: u16,
  #[serde(default)]
  response: String,
  #[serde(default)]
  expire_logins: bool,
}

#[derive(Clone)]
pub struct HintClient {
  client: reqwest::Client,
  cfg: HintConfig,
}

impl HintClient {
  /// None when no endpoint is configured.
  pub fn from_config(cfg: &HintConfig) -> Option<Self> {
    if cfg.url.trim().is_empty() {
      return None;
    }
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()
      .ok()?;
    Some(Self { client, cfg: cfg.clone() })
  }

  pub fn url(&self) -> &str {
    &self.cfg.url
  }

  #[instrument(level = "info", skip(self, prompt, token), fields(prompt_len = prompt.len()))]
  pub async fn ask(&self, prompt: &str, token: &str) -> Result<HintReply, HintError> {
    let res = self
      .client
      .post(&self.cfg.url)
      .header(CONTENT_TYPE, "application/json")
      .header(ACCEPT, "application/json")
      .header(USER_AGENT, self.cfg.user_agent.as_str())
      .header(AUTHORIZATION, format!("token {}", token))
      .json(&HintRequest { prompt, max_tokens: self.cfg.max_tokens })
      .send()
      .await?;

    let http_status = res.status();
    let body: HintResponse = res.json().await?;
    let reply = classify(&body);
    match &reply {
      HintReply::Answer(text) => info!(target: "hint", %http_status, reply_len = text.len(), "Hint received"),
      other => warn!(target: "hint", %http_status, status = body.status, ?other, "Hint service declined"),
    }
    Ok(reply)
  }
}

fn classify(body: &HintResponse) -> HintReply {
  if body.expire_logins {
    HintReply::LoginExpired
  } else if body.status == 401 {
    HintReply::Unauthorized
  } else if body.status != 200 {
    HintReply::Failed
  } else {
    HintReply::Answer(body.response.clone())
  }
}

/// Log transport failures and collapse them into the generic failure reply.
pub fn reply_or_failed(res: Result<HintReply, HintError>) -> HintReply {
  res.unwrap_or_else(|e| {
    error!(target: "hint", error = %e, "Hint request failed");
    HintReply::Failed
  })
}

/// Build the hint prompt from the problem, the latest submission and the
/// outcomes of the last grading run (visible tests first).
pub fn build_hint_prompt(
  prompts: &Prompts,
  doc: &ProblemDocument,
  last_submission: Option<&str>,
  outcomes: &[TestOutcome],
) -> String {
  let visible = render_tests(&doc.visible_tests, outcomes, 0);
  let hidden = render_tests(&doc.hidden_tests, outcomes, doc.visible_tests.len());
  fill_template(
    &prompts.hint_template,
    &[
      ("title", doc.title.as_str()),
      ("description", doc.description.as_str()),
      ("solution", doc.reference_solution.as_str()),
      ("language", doc.code_language.as_str()),
      ("prefix", doc.template_prefix.as_str()),
      ("user_code", last_submission.unwrap_or_default()),
      ("suffix", doc.template_suffix.as_str()),
      ("visible_tests", visible.as_str()),
      ("hidden_tests", hidden.as_str()),
    ],
  )
}

fn render_tests(tests: &[TestCase], outcomes: &[TestOutcome], offset: usize) -> String {
  tests
    .iter()
    .enumerate()
    .map(|(i, t)| {
      let result = outcomes.get(offset + i).map(TestOutcome::summary).unwrap_or_else(|| "Not run".into());
      format!("- {} -> {} : {}\n", t.code, t.expected, result)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn doc() -> ProblemDocument {
    ProblemDocument {
      title: "Sum".into(),
      description: "Add things.".into(),
      code_language: "javascript".into(),
      template_prefix: "function sum(a, b) {".into(),
      template_suffix: "}".into(),
      reference_solution: "return a + b;".into(),
      visible_tests: vec![TestCase { code: "sum(1, 2)".into(), expected: "3".into() }],
      hidden_tests: vec![TestCase { code: "sum(2, 2)".into(), expected: "4".into() }],
      ..Default::default()
    }
  }

  #[test]
  fn prompt_embeds_user_code_between_template_parts() {
    let prompt = build_hint_prompt(&Prompts::default(), &doc(), Some("return a - b;"), &[]);
    assert!(prompt.starts_with("One of our users is stuck on this problem:\n## Sum\nAdd things.\n"));
    assert!(prompt.contains(
      "```javascript\nfunction sum(a, b) {\n// Below is the first line of the user's code\nreturn a - b;\n// Above is the last line of the user's code\n}\n```"
    ));
    assert!(prompt.contains("- sum(1, 2) -> 3 : Not run\n"));
    assert!(prompt.contains("- sum(2, 2) -> 4 : Not run\n"));
  }

  #[test]
  fn hidden_results_are_offset_by_visible_count() {
    let outcomes = vec![TestOutcome::Returned(json!(-1)), TestOutcome::Threw("TypeError: x".into())];
    let prompt = build_hint_prompt(&Prompts::default(), &doc(), Some(""), &outcomes);
    assert!(prompt.contains("- sum(1, 2) -> 3 : Returned -1\n"));
    assert!(prompt.contains("- sum(2, 2) -> 4 : Error: TypeError: x\n"));
  }

  #[test]
  fn classification_order() {
    let body = |status, expire| HintResponse { status, response: "hi".into(), expire_logins: expire };
    assert_eq!(classify(&body(200, true)), HintReply::LoginExpired);
    assert_eq!(classify(&body(401, false)), HintReply::Unauthorized);
    assert_eq!(classify(&body(500, false)), HintReply::Failed);
    assert_eq!(classify(&body(200, false)), HintReply::Answer("hi".into()));
    assert!(HintReply::LoginExpired.invalidates_credential());
  }

  #[test]
  fn empty_url_disables_client() {
    assert!(HintClient::from_config(&HintConfig::default()).is_none());
  }
}
