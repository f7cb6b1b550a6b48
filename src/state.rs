//! Application state: configuration, shared clients, the sandbox and the
//! per-session stores.
//!
//! Each session owns one problem view: the current document, its submission
//! history and the outcomes of the latest grading run. Sessions are locked
//! individually so a long grading run only blocks its own session. The store
//! is bounded: idle sessions expire and the least recently used one is
//! dropped at capacity.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::domain::{ProblemDocument, TestOutcome};
use crate::fetch::DocumentFetcher;
use crate::hint::HintClient;
use crate::history::SubmissionHistory;
use crate::sandbox::{NodeSandbox, Sandbox};

#[derive(Debug, Default)]
pub struct Session {
    pub url: String,
    pub document: ProblemDocument,
    /// Why the sentinel document is shown, if it is.
    pub load_error: Option<String>,
    pub history: SubmissionHistory,
    /// Bumped by every load; a finished fetch is applied only if still current.
    pub generation: u64,
    pub last_outcomes: Vec<TestOutcome>,
}

pub type SessionHandle = Arc<Mutex<Session>>;

struct SessionEntry {
    handle: SessionHandle,
    last_used: Instant,
}

pub struct AppState {
    pub config: AppConfig,
    pub fetcher: DocumentFetcher,
    pub sandbox: Arc<dyn Sandbox>,
    pub hint: Option<HintClient>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl AppState {
    /// Build state with the process-isolated interpreter sandbox.
    #[instrument(level = "info", skip_all)]
    pub fn new(config: AppConfig) -> Self {
        let sandbox = Arc::new(NodeSandbox::new(config.sandbox.clone()));
        Self::with_sandbox(config, sandbox)
    }

    pub fn with_sandbox(config: AppConfig, sandbox: Arc<dyn Sandbox>) -> Self {
        let fetcher = DocumentFetcher::new(config.fetch.clone());
        let hint = HintClient::from_config(&config.hint);
        if let Some(h) = &hint {
            info!(target: "codehelp_backend", url = %h.url(), "Hint service enabled.");
        } else {
            info!(target: "codehelp_backend", "Hint service disabled (no hint.url / HINT_SERVICE_URL).");
        }
        if config.fetch.allowed_hosts.is_empty() {
            info!(target: "codehelp_backend", allow_private = config.fetch.allow_private, "Documents fetched from any public host");
        } else {
            info!(target: "codehelp_backend", hosts = ?config.fetch.allowed_hosts, "Documents fetched from allowlisted hosts only");
        }
        info!(
            target: "codehelp_backend",
            interpreter = %config.sandbox.interpreter,
            timeout_ms = config.sandbox.timeout_ms,
            max_heap_mb = config.sandbox.max_heap_mb,
            "Sandbox configured"
        );

        Self { config, fetcher, sandbox, hint, sessions: RwLock::new(HashMap::new()) }
    }

    fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.config.sessions.idle_ttl_secs)
    }

    /// Register an empty session and return its id. Idle sessions are dropped
    /// first; at capacity the least recently used one goes.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_session(&self) -> (String, SessionHandle) {
        let id = Uuid::new_v4().to_string();
        let handle: SessionHandle = Arc::new(Mutex::new(Session::default()));
        let now = Instant::now();
        let ttl = self.idle_ttl();
        let max = self.config.sessions.max_sessions.max(1);

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, e| now.duration_since(e.last_used) < ttl);
        while sessions.len() >= max {
            let Some(oldest) = sessions.iter().min_by_key(|(_, e)| e.last_used).map(|(k, _)| k.clone()) else {
                break;
            };
            sessions.remove(&oldest);
            debug!(target: "codehelp_backend", session = %oldest, "Evicted least recently used session");
        }
        sessions.insert(id.clone(), SessionEntry { handle: handle.clone(), last_used: now });
        (id, handle)
    }

    /// Look up a live session and mark it used.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_session(&self, id: &str) -> Option<SessionHandle> {
        let now = Instant::now();
        let ttl = self.idle_ttl();
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        if now.duration_since(entry.last_used) >= ttl {
            sessions.remove(id);
            return None;
        }
        entry.last_used = now;
        Some(entry.handle.clone())
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for longer than the TTL; returns how many went.
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.idle_ttl();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, e| now.duration_since(e.last_used) < ttl);
        before - sessions.len()
    }
}

/// Periodically evict idle sessions until the state is dropped.
pub fn spawn_session_sweeper(state: &Arc<AppState>) -> JoinHandle<()> {
    let weak = Arc::downgrade(state);
    let period = Duration::from_secs(state.config.sessions.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let Some(state) = weak.upgrade() else { break };
            let evicted = state.evict_idle().await;
            if evicted > 0 {
                let remaining = state.session_count().await;
                info!(target: "codehelp_backend", evicted, remaining, "Idle sessions evicted");
            }
        }
    })
}
