use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Python,
    Java,
}

impl Language {
    /// Runtime name and pinned version on the execution service.
    fn runtime(&self) -> (&'static str, &'static str) {
        use Language::*;
        match self {
            Javascript => ("javascript", "18.15.0"),
            Python => ("python", "3.10.0"),
            Java => ("java", "15.0.2"),
        }
    }

    fn file_name(&self) -> &'static str {
        use Language::*;
        match self {
            Javascript => "main.js",
            Python => "main.py",
            Java => "main.java",
        }
    }
}

/// Outcome of one run. `output` may accompany a failure (compiler or runtime
/// diagnostics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecuteOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteOutcome {
    fn ok(output: String) -> Self {
        ExecuteOutcome { success: true, output: Some(output), error: None }
    }

    fn failed(error: impl Into<String>, output: Option<String>) -> Self {
        ExecuteOutcome { success: false, output, error: Some(error.into()) }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Stage {
    stdout: Option<String>,
    stderr: Option<String>,
    output: Option<String>,
    code: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PistonResponse {
    run: Option<Stage>,
    compile: Option<Stage>,
    message: Option<String>,
}

/// Client for the hosted Piston code execution API.
#[derive(Clone)]
pub struct PistonClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PistonClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building execution http client")?;

        Ok(PistonClient {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        })
    }

    /// Never fails: transport problems are reported inside the outcome.
    pub async fn execute(&self, language: Language, code: &str) -> ExecuteOutcome {
        if code.trim().is_empty() {
            return ExecuteOutcome::failed("Code is empty.", None);
        }

        let (runtime, version) = language.runtime();
        let request = self
            .http
            .post(format!("{}/execute", self.base_url))
            .json(&json!({
                "language": runtime,
                "version": version,
                "files": [{ "name": language.file_name(), "content": code }],
            }));

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return self.transport_failure(err),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = if text.is_empty() {
                status.canonical_reason().unwrap_or_default().to_owned()
            } else {
                text
            };
            return ExecuteOutcome::failed(
                format!("Piston request failed ({}): {detail}", status.as_u16()),
                None,
            );
        }

        match response.json::<PistonResponse>().await {
            Ok(body) => interpret(body),
            Err(err) => self.transport_failure(err),
        }
    }

    fn transport_failure(&self, err: reqwest::Error) -> ExecuteOutcome {
        if err.is_timeout() {
            return ExecuteOutcome::failed(
                format!("Execution timed out after {}ms.", self.timeout.as_millis()),
                None,
            );
        }

        warn!(error = ?err, "execution request failed");
        ExecuteOutcome::failed(err.to_string(), None)
    }
}

fn trimmed(text: &Option<String>) -> Option<String> {
    text.as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

pub(crate) fn interpret(body: PistonResponse) -> ExecuteOutcome {
    if let Some(compile) = &body.compile {
        if let Some(diagnostics) = trimmed(&compile.stderr).or_else(|| trimmed(&compile.stdout)) {
            return ExecuteOutcome::failed("Compilation error.", Some(diagnostics));
        }
    }

    let run = body.run.unwrap_or_default();
    let stderr = trimmed(&run.stderr);
    let output = run.output.clone().unwrap_or_else(|| {
        [trimmed(&run.stdout), stderr.clone()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n")
    });

    if output.is_empty() {
        if let Some(message) = body.message {
            return ExecuteOutcome::failed(message, None);
        }
    }

    if run.code.unwrap_or(0) != 0 || stderr.is_some() {
        let output = Some(output)
            .filter(|output| !output.is_empty())
            .or(stderr)
            .unwrap_or_else(|| "Unknown runtime error.".to_owned());
        return ExecuteOutcome::failed("Runtime error.", Some(output));
    }

    ExecuteOutcome::ok(output)
}
