//! Per-item entry point and the batch driver around it.
//!
//! [`Connector::execute`] handles exactly one item and never decides what
//! happens to the rest of a batch. [`run_batch`] is the host side: it walks
//! items in order and either records a failure in the item's envelope or
//! aborts, depending on `continue_on_fail`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::request::{SearchParams, TaskParams};
use crate::runner::TaskRunner;

/// One input item: a resource/operation pair with its parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "resource", rename_all = "lowercase")]
pub enum Request {
    Task(TaskOperation),
    Search(SearchOperation),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum TaskOperation {
    /// Execute a task and wait for completion.
    Execute(TaskParams),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum SearchOperation {
    /// Search the web.
    Search(SearchParams),
}

/// What the host emits per item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutput {
    pub json: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub paired_item: usize,
}

pub struct Connector {
    runner: TaskRunner,
}

impl Connector {
    pub fn new(runner: TaskRunner) -> Self {
        Self { runner }
    }

    /// Run one item.
    pub async fn execute(&self, item_index: usize, request: &Request) -> Result<Value> {
        match request {
            Request::Task(TaskOperation::Execute(params)) => {
                let flat = self.runner.execute_task(params, item_index).await?;
                Ok(Value::Object(flat))
            }
            Request::Search(SearchOperation::Search(params)) => {
                self.runner.execute_search(params).await
            }
        }
    }
}

/// Process items one at a time, in order.
///
/// With `continue_on_fail`, a failed item yields an empty record carrying the
/// error message and processing moves on. Otherwise the first failure aborts
/// the batch as [`Error::Item`].
pub async fn run_batch(
    connector: &Connector,
    requests: &[Request],
    continue_on_fail: bool,
) -> Result<Vec<ItemOutput>> {
    let mut outputs = Vec::with_capacity(requests.len());

    for (item_index, request) in requests.iter().enumerate() {
        match connector.execute(item_index, request).await {
            Ok(json) => outputs.push(ItemOutput {
                json,
                error: None,
                paired_item: item_index,
            }),
            Err(e) if continue_on_fail => {
                warn!(item_index, error = %e, "item failed, continuing");
                outputs.push(ItemOutput {
                    json: Value::Object(Map::new()),
                    error: Some(e.to_string()),
                    paired_item: item_index,
                });
            }
            Err(e) => {
                return Err(Error::Item {
                    item_index,
                    source: Box::new(e),
                });
            }
        }
    }

    info!(items = outputs.len(), "batch finished");
    Ok(outputs)
}

/// Parse newline-delimited JSON requests. Blank lines are skipped.
pub fn parse_requests(text: &str) -> anyhow::Result<Vec<Request>> {
    use anyhow::Context;

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Request>(line)
                .with_context(|| format!("invalid request on line {}", n + 1))
        })
        .collect()
}
