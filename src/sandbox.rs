//! Isolated execution of synthesized programs.
//!
//! `NodeSandbox` starts a fresh interpreter process per run: empty temporary
//! working directory, cleared environment, stdin as the only way in and a
//! marker-tagged JSON line on stdout as the only way out. Inside the process
//! the program is evaluated in a `vm` context whose only globals besides the
//! language built-ins are a `results` array and a capturing `console`, both
//! created inside the context. Heap, CPU time, console volume and stdout size
//! are bounded.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::util::trunc_for_log;

const BOOTSTRAP: &str = include_str!("sandbox_bootstrap.js");

/// Extra wall-clock time granted to interpreter start-up and shutdown on top
/// of the in-context evaluation limit.
const PROCESS_GRACE_MS: u64 = 2_000;

/// Stderr kept for crash reports.
const STDERR_LIMIT: usize = 16 * 1024;

/// One entry the program pushed into `results`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub index: Option<usize>,
    pub ok: bool,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Everything that crosses back out of the sandbox.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SandboxOutput {
    #[serde(default)]
    pub results: Vec<ProbeResult>,
    #[serde(default)]
    pub logs: Vec<String>,
    /// Error that escaped the program itself.
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Whether programs in `language` can be executed.
    fn supports(&self, language: &str) -> bool;

    async fn run(&self, program: &str) -> Result<SandboxOutput, SandboxError>;
}

#[derive(Clone, Debug)]
pub struct NodeSandbox {
    cfg: SandboxConfig,
}

impl NodeSandbox {
    pub fn new(cfg: SandboxConfig) -> Self {
        Self { cfg }
    }

    /// True when the configured interpreter can be started at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.cfg.interpreter)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Sandbox for NodeSandbox {
    fn supports(&self, language: &str) -> bool {
        matches!(language.to_ascii_lowercase().as_str(), "javascript" | "js")
    }

    #[instrument(level = "info", skip(self, program), fields(interpreter = %self.cfg.interpreter, program_len = program.len()))]
    async fn run(&self, program: &str) -> Result<SandboxOutput, SandboxError> {
        let workdir = tempfile::tempdir()?;
        let bootstrap_path = workdir.path().join("bootstrap.js");
        tokio::fs::write(&bootstrap_path, BOOTSTRAP).await?;

        // The marker travels on stdin only; the program never sees argv.
        let marker = format!("@@codehelp-result-{}@@", Uuid::new_v4().simple());
        let header = json!({
            "marker": marker,
            "timeout": self.cfg.timeout_ms,
            "maxLogChars": self.cfg.max_log_chars,
            "maxLogEntries": self.cfg.max_log_entries,
            "maxValueChars": self.cfg.max_value_chars,
        });

        let mut cmd = Command::new(&self.cfg.interpreter);
        cmd.arg(format!("--max-old-space-size={}", self.cfg.max_heap_mb))
            .args(&self.cfg.interpreter_args)
            .arg(&bootstrap_path)
            .current_dir(workdir.path())
            .env_clear()
            .env("PATH", &self.cfg.path_env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            let cpu_secs = self.cfg.timeout_ms.div_ceil(1000) + PROCESS_GRACE_MS / 1000;
            // SAFETY: only async-signal-safe setrlimit calls run between fork and exec.
            unsafe {
                cmd.pre_exec(move || limits::apply(cpu_secs));
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|source| SandboxError::Spawn { interpreter: self.cfg.interpreter.clone(), source })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(header.to_string().as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.write_all(program.as_bytes()).await?;
            stdin.flush().await?;
        }

        let limit = Duration::from_millis(self.cfg.timeout_ms + PROCESS_GRACE_MS);
        let (status, stdout, stderr) = match tokio::time::timeout(limit, collect_bounded(&mut child, self.cfg.max_output_bytes)).await {
            Ok(res) => res?,
            Err(_) => {
                warn!(target: "grading", timeout_ms = self.cfg.timeout_ms, "Sandbox process timed out; killed");
                return Err(SandboxError::Timeout(self.cfg.timeout_ms));
            }
        };

        let stdout = String::from_utf8_lossy(&stdout);
        match parse_marked_output(&stdout, &marker) {
            Some(parsed) => {
                let parsed = parsed?;
                debug!(target: "grading", results = parsed.results.len(), logs = parsed.logs.len(), "Sandbox run finished");
                Ok(parsed)
            }
            None => {
                let stderr = String::from_utf8_lossy(&stderr);
                if status.success() {
                    Err(SandboxError::MalformedOutput("result line missing".into()))
                } else {
                    Err(SandboxError::Crashed { status: status.to_string(), stderr: trunc_for_log(stderr.trim(), 2_000) })
                }
            }
        }
    }
}

/// Read stdout up to `max_stdout` bytes and a bounded slice of stderr, then
/// wait for exit. A process that writes more than allowed is killed.
async fn collect_bounded(
    child: &mut Child,
    max_stdout: usize,
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), SandboxError> {
    let stdout = child.stdout.take().ok_or_else(|| SandboxError::MalformedOutput("stdout not captured".into()))?;
    let stderr = child.stderr.take().ok_or_else(|| SandboxError::MalformedOutput("stderr not captured".into()))?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let mut stderr = stderr;
        let _ = (&mut stderr).take(STDERR_LIMIT as u64).read_to_end(&mut buf).await;
        // Keep draining so the child never blocks on a full stderr pipe.
        let _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
        buf
    });

    let mut out = Vec::new();
    stdout.take(max_stdout as u64 + 1).read_to_end(&mut out).await?;
    if out.len() > max_stdout {
        let _ = child.start_kill();
        stderr_task.abort();
        warn!(target: "grading", max_stdout, "Sandbox output over limit; killed");
        return Err(SandboxError::OutputTooLarge(max_stdout));
    }

    let status = child.wait().await?;
    let err = stderr_task.await.unwrap_or_default();
    Ok((status, out, err))
}

#[cfg(unix)]
mod limits {
    use std::io;

    macro_rules! set_limit {
        ($resource:expr, $value:expr) => {{
            let limit = libc::rlimit { rlim_cur: $value as libc::rlim_t, rlim_max: $value as libc::rlim_t };
            if unsafe { libc::setrlimit($resource, &limit) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }};
    }

    /// CPU seconds, no file writes, no core dumps.
    pub fn apply(cpu_secs: u64) -> io::Result<()> {
        set_limit!(libc::RLIMIT_CPU, cpu_secs);
        set_limit!(libc::RLIMIT_FSIZE, 0);
        set_limit!(libc::RLIMIT_CORE, 0);
        Ok(())
    }
}

/// Locate the marker line in `stdout` and decode its JSON payload.
fn parse_marked_output(stdout: &str, marker: &str) -> Option<Result<SandboxOutput, SandboxError>> {
    let line = stdout.lines().rev().find_map(|l| l.strip_prefix(marker))?;
    Some(serde_json::from_str(line).map_err(|e| SandboxError::MalformedOutput(e.to_string())))
}
