#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
  http::{header::LOCATION, StatusCode},
  routing::get,
  Router,
};
use codehelp_backend::config::{AppConfig, FetchConfig};
use codehelp_backend::error::SandboxError;
use codehelp_backend::sandbox::{ProbeResult, Sandbox, SandboxOutput};
use tokio::net::TcpListener;

pub const ADD_NUMBERS: &str = include_str!("../fixtures/add_numbers.md");

/// Serve problem documents from an in-process server and return its address.
pub async fn spawn_problem_server() -> SocketAddr {
  let without_hidden = ADD_NUMBERS[..ADD_NUMBERS.find("## Hidden Tests").unwrap_or(ADD_NUMBERS.len())].to_string();
  let app = Router::new()
    .route("/add.md", get(|| async { ADD_NUMBERS }))
    .route("/no-hidden.md", get(move || {
      let body = without_hidden.clone();
      async move { body }
    }))
    .route("/no-marker.md", get(|| async { ADD_NUMBERS.replace("// Your code here\n", "") }))
    .route("/html", get(|| async { "<html><body>nope</body></html>" }))
    .route("/gone.md", get(|| async { (StatusCode::NOT_FOUND, "missing") }))
    .route("/slow.md", get(|| async {
      tokio::time::sleep(Duration::from_millis(600)).await;
      ADD_NUMBERS
    }))
    .route("/moved.md", get(|| async { (StatusCode::FOUND, [(LOCATION, "/add.md")]) }))
    .route("/escape.md", get(|| async { (StatusCode::FOUND, [(LOCATION, "http://10.0.0.1/add.md")]) }))
    .route("/loop.md", get(|| async { (StatusCode::FOUND, [(LOCATION, "/loop.md")]) }))
    .route("/huge.md", get(|| async { format!("# Huge\n\n{}", "x".repeat(2 * 1024 * 1024)) }));

  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  addr
}

/// Fetch settings that trust only the in-process fixture server.
pub fn local_fetch() -> FetchConfig {
  FetchConfig { timeout_secs: 5, allowed_hosts: vec!["127.0.0.1".into()], ..FetchConfig::default() }
}

pub fn local_config() -> AppConfig {
  AppConfig { fetch: local_fetch(), ..AppConfig::default() }
}

/// Answers every probe with the number 2 and remembers what it was asked to run.
#[derive(Default)]
pub struct FixedSandbox {
  pub programs: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl Sandbox for FixedSandbox {
  fn supports(&self, language: &str) -> bool {
    language == "javascript"
  }

  async fn run(&self, program: &str) -> Result<SandboxOutput, SandboxError> {
    self.programs.lock().unwrap().push(program.to_string());
    let probes = program.matches("ok: true, value:").count();
    Ok(SandboxOutput {
      results: (0..probes)
        .map(|i| ProbeResult { index: Some(i), ok: true, value: Some(serde_json::json!(2)), error: None })
        .collect(),
      logs: vec!["hello".into()],
      error: None,
    })
  }
}
