//! Codehelp · coding exercise backend
//!
//! - Axum HTTP + WebSocket API
//! - Problem documents fetched as markdown and graded in a node sandbox
//! - Optional hint service relay
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   HINT_SERVICE_URL     : enables hints when set
//!   HINT_TOKEN           : fallback credential for the hint service
//!   SANDBOX_INTERPRETER  : default "node"
//!   SANDBOX_TIMEOUT_MS   : default 5000
//!   FETCH_TIMEOUT_SECS   : default 10
//!   FETCH_ALLOWED_HOSTS  : comma-separated document hosts (default: any public host)
//!   MAX_SESSIONS         : default 10000
//!   CODEHELP_CONFIG_PATH : path to TOML config
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use codehelp_backend::config::AppConfig;
use codehelp_backend::routes::build_router;
use codehelp_backend::sandbox::NodeSandbox;
use codehelp_backend::state::{spawn_session_sweeper, AppState};
use codehelp_backend::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = AppConfig::load();
  if !NodeSandbox::new(config.sandbox.clone()).is_available().await {
    warn!(
      target: "codehelp_backend",
      interpreter = %config.sandbox.interpreter,
      "Sandbox interpreter not found; grading requests will fail"
    );
  }

  let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
  let state = Arc::new(AppState::new(config));
  spawn_session_sweeper(&state);
  let app = build_router(state.clone());

  let listener = TcpListener::bind(addr).await?;
  info!(target: "codehelp_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
