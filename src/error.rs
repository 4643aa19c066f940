//! Error kinds surfaced by the connector.

use thiserror::Error;

/// Everything that can go wrong while building, submitting, polling or
/// flattening a single item.
#[derive(Debug, Error)]
pub enum Error {
    /// The output schema text was not valid JSON.
    #[error("Invalid JSON in output schema (item {item_index}): {message}")]
    SchemaParse { item_index: usize, message: String },

    /// A required parameter was missing or empty.
    #[error("Invalid parameter (item {item_index}): {message}")]
    InvalidParameter { item_index: usize, message: String },

    /// Task or search creation failed. Carries the upstream message verbatim.
    #[error("submission failed: {0}")]
    Submission(String),

    /// A single long-poll call timed out (HTTP 408). Retried by the poller.
    #[error("result not ready before the poll timeout")]
    PollTimeout,

    /// Every poll attempt timed out.
    #[error(
        "Task execution timed out after {attempts} attempts (approximately {approx_minutes} minutes)"
    )]
    PollExhausted { attempts: u32, approx_minutes: u32 },

    /// Any other non-success response or transport failure.
    #[error("{}", upstream_message(.status, .message))]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    /// The body did not have the expected surface shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A request body could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no Parallel API key found. Run `parallel-flow config set api_key <KEY>` or set PARALLEL_API_KEY.")]
    MissingApiKey,

    /// An item failed and the batch was not allowed to continue.
    #[error("item {item_index}: {source}")]
    Item {
        item_index: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether this is the non-terminal timeout signal of a long-poll call.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::PollTimeout)
    }
}

fn upstream_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("Parallel API error ({status}): {message}"),
        None => format!("Parallel API request failed: {message}"),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_message_reports_attempts_and_minutes() {
        let err = Error::PollExhausted {
            attempts: 8,
            approx_minutes: 80,
        };
        assert_eq!(
            err.to_string(),
            "Task execution timed out after 8 attempts (approximately 80 minutes)"
        );
    }

    #[test]
    fn upstream_message_with_status() {
        let err = Error::Upstream {
            status: Some(500),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Parallel API error (500): boom");
    }

    #[test]
    fn upstream_message_without_status() {
        let err = Error::Upstream {
            status: None,
            message: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn item_wraps_source() {
        let err = Error::Item {
            item_index: 3,
            source: Box::new(Error::Submission("bad request".to_string())),
        };
        assert_eq!(err.to_string(), "item 3: submission failed: bad request");
    }

    #[test]
    fn only_poll_timeout_is_timeout() {
        assert!(Error::PollTimeout.is_timeout());
        assert!(!Error::Submission("x".to_string()).is_timeout());
    }
}
