pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// HTTP verbs the upstream API needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// The authenticated call primitive. Could be the live API or a test script.
///
/// Implementations map HTTP 408 to [`Error::PollTimeout`](crate::error::Error::PollTimeout)
/// and every other failure to [`Error::Upstream`](crate::error::Error::Upstream).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value>;
}
