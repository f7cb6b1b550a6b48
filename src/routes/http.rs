//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::{header::AUTHORIZATION, HeaderMap, StatusCode},
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::error::{SandboxError, ServiceError};
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorOut>);

/// Map a service failure onto a status code and JSON body.
pub fn api_error(e: ServiceError) -> ApiError {
  let status = match &e {
    ServiceError::UnknownSession(_) => StatusCode::NOT_FOUND,
    ServiceError::NoProblem => StatusCode::CONFLICT,
    ServiceError::Sandbox(SandboxError::UnsupportedLanguage(_)) => StatusCode::UNPROCESSABLE_ENTITY,
    ServiceError::Sandbox(SandboxError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
    ServiceError::Sandbox(_) => StatusCode::INTERNAL_SERVER_ERROR,
  };
  (status, Json(ErrorOut { error: e.to_string() }))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, q), fields(url = %q.url))]
pub async fn http_get_problem(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ProblemQuery>,
) -> impl IntoResponse {
  let problem = preview_problem(&state, &q.url).await;
  info!(target: "problem", url = %q.url, title = %problem.title, "HTTP problem preview served");
  Json(problem)
}

#[instrument(level = "info", skip(state, body), fields(url = %body.url))]
pub async fn http_post_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionIn>,
) -> impl IntoResponse {
  let (session_id, problem) = open_session(&state, &body.url).await;
  Json(SessionOut { session_id, problem })
}

#[instrument(level = "info", skip(state, id, body), fields(%id, url = %body.url))]
pub async fn http_post_load(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<LoadIn>,
) -> Result<Json<ProblemOut>, ApiError> {
  let report = reload_session(&state, &id, &body.url).await.map_err(api_error)?;
  info!(target: "problem", %id, applied = report.applied, "HTTP problem reload");
  Ok(Json(report.problem))
}

#[instrument(level = "info", skip(state, id), fields(%id))]
pub async fn http_get_history(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<HistoryOut>, ApiError> {
  let entries = session_history(&state, &id).await.map_err(api_error)?;
  Ok(Json(HistoryOut { entries }))
}

#[instrument(level = "info", skip(state, body), fields(session_id = %body.session_id, code_len = body.code.len()))]
pub async fn http_post_grade(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GradeIn>,
) -> Result<Json<GradeOut>, ApiError> {
  let out = grade_submission(&state, &body.session_id, &body.code).await.map_err(api_error)?;
  info!(target: "grading", session_id = %body.session_id, tests = out.results.len(), "HTTP grade served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, headers, body), fields(session_id = %body.session_id))]
pub async fn http_post_hint(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<HintIn>,
) -> Result<Json<HintOut>, ApiError> {
  let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
  let token = resolve_token(header, state.config.hint.token.as_deref());
  let out = request_hint(&state, &body.session_id, token.as_deref(), body.code.as_deref())
    .await
    .map_err(api_error)?;
  Ok(Json(out))
}
