//! Core behaviours shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Loading problem documents into sessions (last fetch wins)
//!   - Grading a submission against the session's document
//!   - Building and relaying hint requests
//!   - Reading submission history

use tracing::{info, instrument, warn};

use crate::error::{HintError, ServiceError};
use crate::fetch::load_problem;
use crate::grader::grade;
use crate::hint::{build_hint_prompt, reply_or_failed, HintReply};
use crate::protocol::{grade_out, hint_out, problem_out, GradeOut, HintOut, ProblemOut};
use crate::state::{AppState, SessionHandle};

/// Result of loading a document into a session.
pub struct LoadReport {
  pub problem: ProblemOut,
  /// False when a newer load superseded this one before it finished.
  pub applied: bool,
}

/// Fetch and parse without touching any session.
#[instrument(level = "info", skip(state))]
pub async fn preview_problem(state: &AppState, url: &str) -> ProblemOut {
  let outcome = load_problem(&state.fetcher, url).await;
  problem_out(&outcome.document(), outcome.failure())
}

#[instrument(level = "info", skip(state))]
pub async fn open_session(state: &AppState, url: &str) -> (String, ProblemOut) {
  let (id, handle) = state.create_session().await;
  let report = load_into_session(state, &handle, url).await;
  info!(target: "problem", session = %id, title = %report.problem.title, "Session opened");
  (id, report.problem)
}

/// Load `url` into the session. Only the most recently started load is kept.
#[instrument(level = "info", skip(state, session))]
pub async fn load_into_session(state: &AppState, session: &SessionHandle, url: &str) -> LoadReport {
  let generation = {
    let mut s = session.lock().await;
    s.generation += 1;
    s.generation
  };

  let outcome = load_problem(&state.fetcher, url).await;

  let mut s = session.lock().await;
  if s.generation != generation {
    warn!(target: "problem", %url, generation, current = s.generation, "Discarding superseded problem load");
    return LoadReport { problem: problem_out(&s.document, s.load_error.clone()), applied: false };
  }
  s.url = url.to_string();
  s.load_error = outcome.failure();
  s.document = outcome.into_document();
  s.last_outcomes.clear();
  LoadReport { problem: problem_out(&s.document, s.load_error.clone()), applied: true }
}

#[instrument(level = "info", skip(state))]
pub async fn reload_session(state: &AppState, session_id: &str, url: &str) -> Result<LoadReport, ServiceError> {
  let handle = state
    .get_session(session_id)
    .await
    .ok_or_else(|| ServiceError::UnknownSession(session_id.to_string()))?;
  Ok(load_into_session(state, &handle, url).await)
}

/// Grade `code` against the session's problem and remember the outcomes for hints.
#[instrument(level = "info", skip(state, code), fields(%session_id, code_len = code.len()))]
pub async fn grade_submission(state: &AppState, session_id: &str, code: &str) -> Result<GradeOut, ServiceError> {
  let handle = state
    .get_session(session_id)
    .await
    .ok_or_else(|| ServiceError::UnknownSession(session_id.to_string()))?;

  let mut s = handle.lock().await;
  if s.document.is_sentinel() {
    return Err(ServiceError::NoProblem);
  }

  let doc = s.document.clone();
  let run = grade(&doc, code, &mut s.history, state.sandbox.as_ref()).await?;
  s.last_outcomes = run.outcomes.clone();
  Ok(grade_out(&doc, &run))
}

/// Ask the hint service about the session's latest submission. When `code` is
/// given it is graded first so the prompt reflects fresh results; that only
/// happens once a credential is present.
#[instrument(level = "info", skip(state, token, code), fields(%session_id, has_token = token.is_some()))]
pub async fn request_hint(
  state: &AppState,
  session_id: &str,
  token: Option<&str>,
  code: Option<&str>,
) -> Result<HintOut, ServiceError> {
  let handle = state
    .get_session(session_id)
    .await
    .ok_or_else(|| ServiceError::UnknownSession(session_id.to_string()))?;
  if handle.lock().await.document.is_sentinel() {
    return Err(ServiceError::NoProblem);
  }

  let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
    info!(target: "hint", "Hint requested without credential");
    return Ok(hint_out(HintReply::LoginRequired));
  };

  if let Some(code) = code {
    if let Err(e) = grade_submission(state, session_id, code).await {
      warn!(target: "hint", error = %e, "Pre-hint grading failed; using previous results");
    }
  }

  let prompt = {
    let s = handle.lock().await;
    build_hint_prompt(&state.config.prompts, &s.document, s.history.last(), &s.last_outcomes)
  };

  let reply = match &state.hint {
    Some(client) => reply_or_failed(client.ask(&prompt, token).await),
    None => reply_or_failed(Err(HintError::NotConfigured)),
  };
  Ok(hint_out(reply))
}

pub async fn session_history(state: &AppState, session_id: &str) -> Result<Vec<String>, ServiceError> {
  let handle = state
    .get_session(session_id)
    .await
    .ok_or_else(|| ServiceError::UnknownSession(session_id.to_string()))?;
  let s = handle.lock().await;
  Ok(s.history.all().to_vec())
}

/// Credential from an `Authorization` header value (`Bearer x` or `token x`),
/// falling back to the configured one.
pub fn resolve_token(header: Option<&str>, fallback: Option<&str>) -> Option<String> {
  let from_header = header.and_then(|h| {
    let h = h.trim();
    let (scheme, value) = h.split_once(' ')?;
    let known = scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token");
    let value = value.trim();
    (known && !value.is_empty()).then(|| value.to_string())
  });
  from_header.or_else(|| fallback.map(str::to_string))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_resolution() {
    assert_eq!(resolve_token(Some("Bearer abc"), None).as_deref(), Some("abc"));
    assert_eq!(resolve_token(Some("token xyz"), Some("cfg")).as_deref(), Some("xyz"));
    assert_eq!(resolve_token(Some("Basic zzz"), Some("cfg")).as_deref(), Some("cfg"));
    assert_eq!(resolve_token(None, None), None);
  }
}
