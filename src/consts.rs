//! Project-wide constants.

use std::path::PathBuf;

/// Upstream API host. Overridable via config or `--base-url`.
pub const DEFAULT_BASE_URL: &str = "https://api.parallel.ai";

/// Environment variable consulted when no API key is stored.
pub const API_KEY_ENV: &str = "PARALLEL_API_KEY";

/// Task creation endpoint.
pub const TASK_RUNS_PATH: &str = "/v1/tasks/runs";

/// Synchronous web search endpoint.
pub const SEARCH_PATH: &str = "/v1beta/search";

/// Per-call wait budget for the blocking result endpoint, in seconds.
/// Sits just under the ten-minute ceiling common to upstream proxies.
pub const POLL_TIMEOUT_SECS: u64 = 570;

/// Long-poll attempts before giving up. Eight calls cover a run of a bit
/// over an hour.
pub const MAX_POLL_ATTEMPTS: u32 = 8;

/// Rough wall-clock minutes per attempt, used only in error messages.
pub const MINUTES_PER_ATTEMPT: u32 = 10;

/// Default config database path: `~/.parallel-flow/config.db`.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".parallel-flow")
        .join("config.db")
}

/// Result endpoint for a run.
pub fn result_path(run_id: &str, timeout_secs: u64) -> String {
    format!("{TASK_RUNS_PATH}/{run_id}/result?timeout={timeout_secs}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_path_embeds_run_and_timeout() {
        assert_eq!(
            result_path("run_abc", POLL_TIMEOUT_SECS),
            "/v1/tasks/runs/run_abc/result?timeout=570"
        );
    }

    #[test]
    fn default_db_path_is_under_project_dir() {
        let path = default_db_path();
        assert!(path.ends_with(".parallel-flow/config.db"));
    }

    #[test]
    fn poll_budget_exceeds_an_hour() {
        assert!(u64::from(MAX_POLL_ATTEMPTS) * POLL_TIMEOUT_SECS > 3600);
    }
}
