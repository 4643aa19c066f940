//! Submits task runs and long-polls them to completion.
//!
//! One run at a time: submit once, then issue up to `max_attempts` blocking
//! result calls in sequence. A 408 from the result endpoint means "not done
//! yet" and costs one attempt; anything else ends the run.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::consts::{
    MAX_POLL_ATTEMPTS, MINUTES_PER_ATTEMPT, POLL_TIMEOUT_SECS, SEARCH_PATH, TASK_RUNS_PATH,
    result_path,
};
use crate::error::{Error, Result};
use crate::flatten::{FlatRecord, TaskRunResult, flatten};
use crate::request::{SearchParams, TaskParams, build_search_body, build_task_body};
use crate::transport::{Method, Transport};

/// Poll budget for a [`TaskRunner`]. A zero `max_attempts` is raised to one.
pub struct RunnerConfig {
    pub max_attempts: u32,
    pub poll_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_POLL_ATTEMPTS,
            poll_timeout_secs: POLL_TIMEOUT_SECS,
        }
    }
}

/// Identifier of a submitted run. Lives only as long as its poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle(String);

impl RunHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
struct CreatedRun {
    run_id: String,
}

/// Drives task and search calls over a [`Transport`].
pub struct TaskRunner {
    transport: Arc<dyn Transport>,
    config: RunnerConfig,
}

impl TaskRunner {
    pub fn new(transport: Arc<dyn Transport>, mut config: RunnerConfig) -> Self {
        if config.max_attempts == 0 {
            warn!("max_attempts is 0, polling once");
            config.max_attempts = 1;
        }
        Self { transport, config }
    }

    /// Create a run. Not retried.
    pub async fn submit(&self, body: &Value) -> Result<RunHandle> {
        let created = self
            .transport
            .request(Method::Post, TASK_RUNS_PATH, Some(body))
            .await
            .map_err(|e| Error::Submission(submission_message(e)))?;

        let run: CreatedRun = serde_json::from_value(created)
            .map_err(|e| Error::MalformedResponse(format!("task run response: {e}")))?;
        info!(run_id = %run.run_id, "task run submitted");
        Ok(RunHandle(run.run_id))
    }

    /// Long-poll the result endpoint until the run completes or the attempt
    /// budget runs out.
    pub async fn poll(&self, handle: &RunHandle) -> Result<TaskRunResult> {
        let endpoint = result_path(handle.as_str(), self.config.poll_timeout_secs);

        for attempt in 1..=self.config.max_attempts {
            debug!(run_id = %handle, attempt, "polling for result");
            match self.transport.request(Method::Get, &endpoint, None).await {
                Ok(body) => {
                    info!(run_id = %handle, attempt, "task run completed");
                    return serde_json::from_value(body)
                        .map_err(|e| Error::MalformedResponse(format!("task run result: {e}")));
                }
                Err(e) if e.is_timeout() => {
                    debug!(run_id = %handle, attempt, "result not ready, polling again");
                }
                Err(e) => return Err(e),
            }
        }

        let attempts = self.config.max_attempts;
        warn!(run_id = %handle, attempts, "task run did not complete in time");
        Err(exhausted(attempts))
    }

    /// Build, submit, poll, and flatten one task.
    pub async fn execute_task(&self, params: &TaskParams, item_index: usize) -> Result<FlatRecord> {
        let body = build_task_body(params, item_index)?;
        let handle = self.submit(&body).await?;
        let result = self.poll(&handle).await?;
        Ok(flatten(&result))
    }

    /// Run a web search. The response is returned as-is.
    pub async fn execute_search(&self, params: &SearchParams) -> Result<Value> {
        let body = build_search_body(params)?;
        self.transport
            .request(Method::Post, SEARCH_PATH, Some(&body))
            .await
            .map_err(|e| Error::Submission(submission_message(e)))
    }
}

fn exhausted(attempts: u32) -> Error {
    Error::PollExhausted {
        attempts,
        approx_minutes: attempts.saturating_mul(MINUTES_PER_ATTEMPT),
    }
}

fn submission_message(err: Error) -> String {
    match err {
        Error::Upstream { message, .. } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_poll_budget() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.poll_timeout_secs, 570);
    }

    #[test]
    fn submission_message_keeps_upstream_text_verbatim() {
        let msg = submission_message(Error::Upstream {
            status: Some(422),
            message: r#"{"error":"bad processor"}"#.to_string(),
        });
        assert_eq!(msg, r#"{"error":"bad processor"}"#);
    }

    #[test]
    fn exhausted_minutes_saturate() {
        match exhausted(u32::MAX) {
            Error::PollExhausted {
                attempts,
                approx_minutes,
            } => {
                assert_eq!(attempts, u32::MAX);
                assert_eq!(approx_minutes, u32::MAX);
            }
            other => panic!("expected PollExhausted, got {other:?}"),
        }
        assert_eq!(
            exhausted(8).to_string(),
            "Task execution timed out after 8 attempts (approximately 80 minutes)"
        );
    }

    #[test]
    fn run_handle_displays_id() {
        assert_eq!(RunHandle("run_1".to_string()).to_string(), "run_1");
    }
}
