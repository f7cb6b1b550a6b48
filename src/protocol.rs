//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Hidden test code never leaves the server; only its count and outcome do.

use serde::{Deserialize, Serialize};

use crate::domain::{GradeRun, ProblemDocument, TestCase, TestOutcome};
use crate::hint::HintReply;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    OpenSession {
        url: String,
    },
    LoadProblem {
        #[serde(rename = "sessionId")]
        session_id: String,
        url: String,
    },
    Grade {
        #[serde(rename = "sessionId")]
        session_id: String,
        code: String,
    },
    Hint {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        code: Option<String>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
        problem: ProblemOut,
    },
    Problem {
        problem: ProblemOut,
    },
    GradeResult {
        result: GradeOut,
    },
    Hint {
        hint: HintOut,
    },
    Error {
        message: String,
    },
}

/// What the client sees of a problem document.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemOut {
    pub title: String,
    pub description: String,
    pub code_language: String,
    pub template_prefix: String,
    pub template_suffix: String,
    pub reference_solution: String,
    pub solution_explanation: String,
    pub visible_tests: Vec<TestCase>,
    pub hidden_test_count: usize,
    /// Set when the sentinel document was substituted.
    pub load_error: Option<String>,
}

pub fn problem_out(doc: &ProblemDocument, load_error: Option<String>) -> ProblemOut {
    ProblemOut {
        title: doc.title.clone(),
        description: doc.description.clone(),
        code_language: doc.code_language.clone(),
        template_prefix: doc.template_prefix.clone(),
        template_suffix: doc.template_suffix.clone(),
        reference_solution: doc.reference_solution.clone(),
        solution_explanation: doc.solution_explanation.clone(),
        visible_tests: doc.visible_tests.clone(),
        hidden_test_count: doc.hidden_tests.len(),
        load_error,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultOut {
    pub index: usize,
    pub hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    pub outcome: TestOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOut {
    pub results: Vec<TestResultOut>,
    pub logs: Vec<String>,
    pub fatal_error: Option<String>,
}

pub fn grade_out(doc: &ProblemDocument, run: &GradeRun) -> GradeOut {
    let visible = doc.visible_tests.len();
    let results = run
        .outcomes
        .iter()
        .enumerate()
        .map(|(index, outcome)| {
            let hidden = index >= visible;
            let test = if hidden { None } else { doc.visible_tests.get(index) };
            TestResultOut {
                index,
                hidden,
                code: test.map(|t| t.code.clone()),
                expected: test.map(|t| t.expected.clone()),
                outcome: outcome.clone(),
            }
        })
        .collect();
    GradeOut { results, logs: run.logs.clone(), fatal_error: run.fatal_error.clone() }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintOut {
    pub reply: HintReply,
    pub message: String,
    /// The client should forget its stored credential.
    pub expire_credential: bool,
}

pub fn hint_out(reply: HintReply) -> HintOut {
    HintOut { message: reply.message(), expire_credential: reply.invalidates_credential(), reply }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct ProblemQuery {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionIn {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub problem: ProblemOut,
}

#[derive(Debug, Deserialize)]
pub struct LoadIn {
    pub url: String,
}

#[derive(Deserialize)]
pub struct GradeIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct HintIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Current editor contents; graded before the hint is requested.
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Serialize)]
pub struct HistoryOut {
    pub entries: Vec<String>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: String,
}
