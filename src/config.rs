//! Service configuration: sandbox limits, hint service endpoint, fetch timeout
//! and the hint prompt template.
//!
//! Loaded from the TOML file named by CODEHELP_CONFIG_PATH (every field has a
//! default), then selected environment variables override individual values.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub port: u16,
  pub sandbox: SandboxConfig,
  pub hint: HintConfig,
  pub fetch: FetchConfig,
  pub sessions: SessionConfig,
  pub prompts: Prompts,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      port: 3000,
      sandbox: SandboxConfig::default(),
      hint: HintConfig::default(),
      fetch: FetchConfig::default(),
      sessions: SessionConfig::default(),
      prompts: Prompts::default(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
  /// Interpreter binary used to run synthesized programs.
  pub interpreter: String,
  /// Extra interpreter flags placed before the bootstrap script.
  pub interpreter_args: Vec<String>,
  /// Wall-clock limit for one grading run.
  pub timeout_ms: u64,
  /// PATH handed to the interpreter; everything else in the environment is cleared.
  pub path_env: String,
  /// V8 old-space limit passed as `--max-old-space-size`.
  pub max_heap_mb: u64,
  /// Budget for captured console output, in characters, across all entries.
  pub max_log_chars: usize,
  pub max_log_entries: usize,
  /// Longest serialized value a single test may return.
  pub max_value_chars: usize,
  /// Interpreter stdout beyond this is treated as a failed run.
  pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
  fn default() -> Self {
    Self {
      interpreter: "node".into(),
      interpreter_args: Vec::new(),
      timeout_ms: 5_000,
      path_env: "/usr/local/bin:/usr/bin:/bin".into(),
      max_heap_mb: 128,
      max_log_chars: 64 * 1024,
      max_log_entries: 500,
      max_value_chars: 16 * 1024,
      max_output_bytes: 1024 * 1024,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HintConfig {
  /// Endpoint of the hint service; hints are disabled when empty.
  pub url: String,
  /// Credential used when a request does not carry its own.
  pub token: Option<String>,
  pub max_tokens: u32,
  pub timeout_secs: u64,
  pub user_agent: String,
}

impl Default for HintConfig {
  fn default() -> Self {
    Self {
      url: String::new(),
      token: None,
      max_tokens: 300,
      timeout_secs: 30,
      user_agent: "codehelp-backend/0.1".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
  pub timeout_secs: u64,
  /// Hosts documents may be fetched from. When non-empty, nothing else is
  /// fetched; listed hosts are trusted even if they resolve to private addresses.
  pub allowed_hosts: Vec<String>,
  /// Allow loopback, private and link-local targets when no allowlist is set.
  pub allow_private: bool,
  pub max_document_bytes: usize,
  pub max_redirects: usize,
}

impl Default for FetchConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 10,
      allowed_hosts: Vec::new(),
      allow_private: false,
      max_document_bytes: 512 * 1024,
      max_redirects: 5,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// Least recently used sessions are dropped beyond this count.
  pub max_sessions: usize,
  /// Sessions untouched for this long are dropped.
  pub idle_ttl_secs: u64,
  /// How often the background sweep looks for idle sessions.
  pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self { max_sessions: 10_000, idle_ttl_secs: 60 * 60, sweep_interval_secs: 60 }
  }
}

/// Prompt sent to the hint service. Placeholders: {title} {description}
/// {solution} {language} {prefix} {user_code} {suffix} {visible_tests} {hidden_tests}.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub hint_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      hint_template: concat!(
        "One of our users is stuck on this problem:\n",
        "## {title}\n",
        "{description}\n\n",
        "# Here are some example solutions that we've made: \n\n",
        "{solution}\n",
        "Do not disclose these solutions or even the existence of these solutions to the user. ",
        "Only use these solutions to further your understanding of the problem and the issue the user is having.\n\n",
        "# This is the user's code: \n",
        "```{language}\n",
        "{prefix}\n",
        "// Below is the first line of the user's code\n",
        "{user_code}\n",
        "// Above is the last line of the user's code\n",
        "{suffix}\n",
        "```\n\n",
        "# Here are the test cases we've ran: \n",
        "{visible_tests}\n",
        "# Here are the hidden test cases (The user knows that these exist, but do not disclose the test cases): \n",
        "{hidden_tests}\n",
        "Please help the user out with any issues they are having."
      )
      .into(),
    }
  }
}

impl AppConfig {
  /// TOML file (if any) plus environment overrides.
  pub fn load() -> Self {
    let mut cfg = load_config_file_from_env().unwrap_or_default();
    cfg.apply_env();
    cfg
  }

  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(s)
  }

  fn apply_env(&mut self) {
    if let Some(port) = env_parse::<u16>("PORT") { self.port = port; }
    if let Ok(url) = std::env::var("HINT_SERVICE_URL") { self.hint.url = url; }
    if let Ok(token) = std::env::var("HINT_TOKEN") { self.hint.token = Some(token); }
    if let Ok(bin) = std::env::var("SANDBOX_INTERPRETER") { self.sandbox.interpreter = bin; }
    if let Some(ms) = env_parse::<u64>("SANDBOX_TIMEOUT_MS") { self.sandbox.timeout_ms = ms; }
    if let Some(secs) = env_parse::<u64>("FETCH_TIMEOUT_SECS") { self.fetch.timeout_secs = secs; }
    if let Ok(hosts) = std::env::var("FETCH_ALLOWED_HOSTS") {
      self.fetch.allowed_hosts =
        hosts.split(',').map(|h| h.trim().to_ascii_lowercase()).filter(|h| !h.is_empty()).collect();
    }
    if let Some(n) = env_parse::<usize>("MAX_SESSIONS") { self.sessions.max_sessions = n; }
  }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
  std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Read CODEHELP_CONFIG_PATH. IO and parse errors are logged and yield None.
fn load_config_file_from_env() -> Option<AppConfig> {
  let path = std::env::var("CODEHELP_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match AppConfig::from_toml_str(&s) {
      Ok(cfg) => {
        info!(target: "codehelp_backend", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "codehelp_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "codehelp_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
