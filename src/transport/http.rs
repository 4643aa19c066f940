use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::consts::DEFAULT_BASE_URL;
use crate::error::{Error, Result};

use super::{Method, Transport};

/// Live transport against the Parallel REST API.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        // No client-side timeout: long polls are bounded by the upstream wait
        // budget and the poller's attempt count.
        Self {
            client: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(endpoint);
        debug!(method = method.as_str(), %url, "sending request");

        let mut req = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .header("x-api-key", &self.api_key)
        .header("content-type", "application/json");

        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::PollTimeout
            } else {
                Error::Upstream {
                    status: e.status().map(|s| s.as_u16()),
                    message: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if status == StatusCode::REQUEST_TIMEOUT {
            return Err(Error::PollTimeout);
        }
        if !status.is_success() {
            return Err(Error::Upstream {
                status: Some(status.as_u16()),
                message: error_body(resp.text().await),
            });
        }

        let text = resp.text().await.map_err(|e| Error::Upstream {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("{e}\nraw: {text}")))
    }
}

/// Body of a failed response, or why it could not be read.
fn error_body<E: std::fmt::Display>(read: std::result::Result<String, E>) -> String {
    match read {
        Ok(text) => text,
        Err(e) => format!("failed to read error body: {e}"),
    }
}
