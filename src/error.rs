//! Error taxonomy, one enum per failure domain.
//!
//! Only `MalformedDocument` and `FetchError` ever reach the document loader, and
//! both end in the sentinel document there. `SandboxError` and `HintError` are
//! turned into user-facing messages by the handlers.

use thiserror::Error;

/// The fetched text could not be turned into a problem document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedDocument {
    #[error("document does not start with a title heading")]
    MissingTitle,

    #[error("no code block found in the {section} section")]
    MissingCodeBlock { section: &'static str },

    #[error("problem code block has no insertion marker")]
    MissingInsertionMarker,

    #[error("problem code block has {count} insertion markers, expected exactly one")]
    MultipleInsertionMarkers { count: usize },

    #[error("solution language '{solution}' does not match problem language '{problem}'")]
    SolutionLanguageMismatch { problem: String, solution: String },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} did not return a markdown document")]
    NotMarkdown { url: String },

    #[error("'{url}' is not a valid URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{url} is not an allowed document source: {reason}")]
    Forbidden { url: String, reason: &'static str },

    #[error("could not resolve {url}: {source}")]
    Resolve {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("{url} redirected too many times")]
    TooManyRedirects { url: String },
}

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("language '{0}' cannot be executed by the sandbox")]
    UnsupportedLanguage(String),

    #[error("failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sandbox I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("execution exceeded {0} ms")]
    Timeout(u64),

    #[error("interpreter exited with {status}: {stderr}")]
    Crashed { status: String, stderr: String },

    #[error("sandbox output exceeded {0} bytes")]
    OutputTooLarge(usize),

    #[error("sandbox produced unreadable output: {0}")]
    MalformedOutput(String),
}

#[derive(Error, Debug)]
pub enum HintError {
    #[error("hint service is not configured")]
    NotConfigured,

    #[error("hint request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Failures surfaced by the shared request logic to HTTP and WebSocket callers.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("no problem is loaded in this session")]
    NoProblem,

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
