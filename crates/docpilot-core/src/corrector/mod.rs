//! Execute, and on a 4xx feed the error back to the synthesizer.
//!
//! ```text
//! Attempt(n) ──2xx──────────────────────────▶ Success
//! Attempt(n) ──4xx, n < max──re-synthesize──▶ Attempt(n+1)
//! Attempt(n) ──4xx, n == max────────────────▶ Exhausted
//! Attempt(n) ──5xx / network / other────────▶ Exhausted
//! ```
//!
//! `max_retries` counts corrections, so at most `max_retries + 1` requests
//! are sent.

use serde::Serialize;
use tracing::{info, warn};

use crate::executor::{Classification, Execution, Executor};
use crate::synth::{CallPlan, Correction, SynthesisError, SynthesisRequest, Synthesizer};

pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const MAX_RETRIES_CAP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Attempt(u32),
    Success,
    Exhausted,
}

/// Transition out of `Attempt(n)` given how that attempt ended.
pub fn next_state(n: u32, outcome: Classification, max_retries: u32) -> State {
    match outcome {
        Classification::Success => State::Success,
        Classification::ClientError if n < max_retries => State::Attempt(n + 1),
        _ => State::Exhausted,
    }
}

/// Terminal artifact of one `api_call`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub status_code: Option<u16>,
    pub body_preview: String,
    pub body_is_json: bool,
    pub truncated: bool,
    pub classification: Classification,
    /// Requests actually sent.
    pub attempts: u32,
    /// `true` when the final plan came from a correction pass.
    pub corrected: bool,
    /// Holds raw credential values; render through a redactor.
    pub final_plan: CallPlan,
    pub full_url: String,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn from_execution(exec: Execution, plan: CallPlan, attempts: u32) -> Self {
        Self {
            status_code: exec.status,
            body_preview: exec.body_preview,
            body_is_json: exec.body_is_json,
            truncated: exec.truncated,
            classification: exec.classification,
            attempts,
            corrected: attempts > 1,
            final_plan: plan,
            full_url: exec.full_url,
            error: exec.error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.classification.is_success()
    }

    /// Corrections made before the final attempt.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

pub struct RetryCorrector<'a> {
    synthesizer: &'a Synthesizer,
    executor: &'a Executor,
    max_retries: u32,
}

impl<'a> RetryCorrector<'a> {
    /// `max_retries` above [`MAX_RETRIES_CAP`] is clamped.
    pub fn new(synthesizer: &'a Synthesizer, executor: &'a Executor, max_retries: u32) -> Self {
        Self {
            synthesizer,
            executor,
            max_retries: max_retries.min(MAX_RETRIES_CAP),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Synthesize, execute and correct until success or exhaustion.
    ///
    /// A synthesis failure on any pass, first or corrective, fails the call.
    pub async fn run(&self, req: SynthesisRequest<'_>) -> Result<ExecutionResult, SynthesisError> {
        let mut plan = self.synthesizer.synthesize(&req).await?;
        let mut n = 0;

        loop {
            let exec = self.executor.execute(&plan).await;
            let attempts = n + 1;
            let state = next_state(n, exec.classification, self.max_retries);
            info!(
                attempt = attempts,
                status = exec.status.unwrap_or(0),
                outcome = exec.classification.label(),
                "Attempt finished"
            );

            match state {
                State::Attempt(next) => {
                    let correction = Correction {
                        plan: plan.clone(),
                        status: exec.status.unwrap_or(0),
                        error_body: exec.body_preview.clone(),
                    };
                    let retry_req = SynthesisRequest {
                        correction: Some(&correction),
                        ..req
                    };
                    plan = self.synthesizer.synthesize(&retry_req).await.inspect_err(|e| {
                        warn!(error = %e, status = correction.status, "Correction pass failed");
                    })?;
                    n = next;
                }
                State::Success | State::Exhausted => {
                    return Ok(ExecutionResult::from_execution(exec, plan, attempts));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Redactor;
    use crate::provider::scripted::ScriptedProvider;
    use httpmock::prelude::*;
    use reqwest::Client;
    use std::sync::Arc;

    #[test]
    fn test_transitions() {
        assert_eq!(next_state(0, Classification::Success, 1), State::Success);
        assert_eq!(next_state(0, Classification::ClientError, 1), State::Attempt(1));
        assert_eq!(next_state(1, Classification::ClientError, 1), State::Exhausted);
        assert_eq!(next_state(0, Classification::ServerError, 2), State::Exhausted);
        assert_eq!(next_state(0, Classification::NetworkError, 2), State::Exhausted);
        assert_eq!(next_state(0, Classification::ClientError, 0), State::Exhausted);
    }

    fn plan_json(url: &str) -> String {
        format!(r#"{{"method":"GET","url":"{}"}}"#, url)
    }

    async fn run_with(
        replies: Vec<String>,
        max_retries: u32,
    ) -> (Result<ExecutionResult, SynthesisError>, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(replies));
        let synth = Synthesizer::new(provider.clone());
        let executor = Executor::new(Client::new(), 1000);
        let redactor = Redactor::new();
        let corrector = RetryCorrector::new(&synth, &executor, max_retries);
        let req = SynthesisRequest {
            documentation: "docs",
            spec: None,
            instruction: "do it",
            endpoint_override: None,
            credential: None,
            correction: None,
            redactor: &redactor,
        };
        (corrector.run(req).await, provider)
    }

    #[tokio::test]
    async fn test_never_exceeds_max_retries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/bad");
                then.status(400).body("nope");
            })
            .await;
        let url = server.url("/bad");
        let replies = vec![plan_json(&url); 10];

        let (result, provider) = run_with(replies, 5).await;
        let result = result.unwrap();
        assert_eq!(result.attempts, MAX_RETRIES_CAP + 1);
        assert!(result.corrected);
        assert_eq!(result.classification, Classification::ClientError);
        assert_eq!(provider.calls() as u32, MAX_RETRIES_CAP + 1);
        mock.assert_hits_async((MAX_RETRIES_CAP + 1) as usize).await;
    }

    #[tokio::test]
    async fn test_server_error_is_terminal() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/down");
                then.status(503);
            })
            .await;
        let (result, provider) = run_with(vec![plan_json(&server.url("/down"))], 2).await;
        let result = result.unwrap();
        assert_eq!(result.attempts, 1);
        assert!(!result.corrected);
        assert_eq!(result.status_code, Some(503));
        assert_eq!(provider.calls(), 1);
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_failed_correction_is_fatal() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/bad");
                then.status(401);
            })
            .await;
        let replies = vec![plan_json(&server.url("/bad")), r#"{"url":"https://x.io"}"#.into()];
        let (result, provider) = run_with(replies, 1).await;
        assert!(matches!(result, Err(SynthesisError::MissingField("method"))));
        assert_eq!(provider.calls(), 2);
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_initial_synthesis_failure_is_fatal() {
        let (result, _) = run_with(vec!["{\"url\": \"https://x.io\"}".into()], 1).await;
        assert!(matches!(result, Err(SynthesisError::MissingField("method"))));
    }
}
