//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  http::{header::AUTHORIZATION, HeaderMap},
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state, headers))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> impl IntoResponse {
  info!(target: "codehelp_backend", "WebSocket upgrade requested");
  // Credential presented at upgrade time; a per-message token overrides it.
  let upgrade_token = headers
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .map(str::to_string);
  ws.on_upgrade(move |socket| handle_ws(socket, state, upgrade_token))
}

#[instrument(level = "info", skip(socket, state, upgrade_token))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, upgrade_token: Option<String>) {
  info!(target: "codehelp_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "codehelp_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, upgrade_token.as_deref()).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "codehelp_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "codehelp_backend", "WebSocket disconnected");
}

#[instrument(level = "info", skip(state, upgrade_token))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, upgrade_token: Option<&str>) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::OpenSession { url } => {
      let (session_id, problem) = open_session(state, &url).await;
      info!(target: "problem", %session_id, %url, "WS open_session served");
      ServerWsMessage::Session { session_id, problem }
    }

    ClientWsMessage::LoadProblem { session_id, url } => match reload_session(state, &session_id, &url).await {
      Ok(report) => {
        info!(target: "problem", %session_id, applied = report.applied, "WS load_problem served");
        ServerWsMessage::Problem { problem: report.problem }
      }
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::Grade { session_id, code } => match grade_submission(state, &session_id, &code).await {
      Ok(result) => {
        info!(target: "grading", %session_id, tests = result.results.len(), "WS grade served");
        ServerWsMessage::GradeResult { result }
      }
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::Hint { session_id, token, code } => {
      let header = token.map(|t| format!("token {}", t));
      let header = header.as_deref().or(upgrade_token);
      let token = resolve_token(header, state.config.hint.token.as_deref());
      match request_hint(state, &session_id, token.as_deref(), code.as_deref()).await {
        Ok(hint) => ServerWsMessage::Hint { hint },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }
  }
}
