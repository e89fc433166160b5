//! Code execution through the hosted sandbox, plus the output comparison used
//! to decide whether a run passes a problem's expected output.

mod piston;

use std::sync::LazyLock;

use axum::{debug_handler, extract::State, routing::post, Router};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{auth::CurrentUser, AppJson, AppResult, AppState};

pub use piston::{ExecuteOutcome, Language, PistonClient};

static OPEN_BRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\s+").unwrap());
static CLOSE_BRACKET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+\]").unwrap());
static COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*,\s*").unwrap());

/// Canonical form of program output: lines trimmed, blank lines dropped,
/// whitespace around brackets and commas removed.
pub fn normalize_output(raw: &str) -> String {
    raw.trim()
        .lines()
        .map(|line| {
            let line = OPEN_BRACKET.replace_all(line.trim(), "[");
            let line = CLOSE_BRACKET.replace_all(&line, "]");
            COMMA.replace_all(&line, ",").into_owned()
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecuteBody {
    language: Language,
    code: String,
    expected: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExecuteResponse {
    #[serde(flatten)]
    outcome: ExecuteOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    passed: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(execute))
}

#[debug_handler(state = AppState)]
pub(crate) async fn execute(
    State(piston): State<PistonClient>,
    CurrentUser(_): CurrentUser,
    AppJson(ExecuteBody { language, code, expected }): AppJson<ExecuteBody>,
) -> AppResult<AppJson<ExecuteResponse>> {
    let outcome = piston.execute(language, &code).await;

    let passed = expected.map(|expected| {
        outcome.success && outputs_match(outcome.output.as_deref().unwrap_or_default(), &expected)
    });

    Ok(AppJson(ExecuteResponse { outcome, passed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_brackets_commas_and_blank_lines() {
        assert_eq!(normalize_output("  [ 0 , 1 ]  \n\n  [1,  2 ]\n"), "[0,1]\n[1,2]");
        assert_eq!(normalize_output("\n\n"), "");
    }

    #[test]
    fn matching_ignores_formatting_only() {
        assert!(outputs_match("[0, 1]\n", "[0,1]"));
        assert!(outputs_match("true\r\n", "true"));
        assert!(!outputs_match("[1,0]", "[0,1]"));
        assert!(!outputs_match("a b", "ab"));
    }
}
