//! Codehelp backend: loads markdown problem documents, grades submissions in
//! an isolated interpreter and relays hint requests.

pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod grader;
pub mod hint;
pub mod history;
pub mod logic;
pub mod markdown;
pub mod protocol;
pub mod routes;
pub mod sandbox;
pub mod state;
pub mod telemetry;
pub mod util;
