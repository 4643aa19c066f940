//! Turns user-supplied parameters into request bodies.
//!
//! Nothing here touches the network. The only fallible step is parsing a
//! JSON output schema; free-text task input is coerced to JSON on a
//! best-effort basis and never fails.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Cost/quality tier for a task run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Processor {
    /// Basic metadata, fallback, low latency.
    Lite,
    /// Reliable standard enrichments.
    #[default]
    Base,
    /// Cross-referenced, moderately complex outputs.
    Core,
    /// Exploratory web research.
    Pro,
    /// Advanced multi-source deep research.
    Ultra,
    #[value(name = "ultra2x")]
    Ultra2x,
    #[value(name = "ultra4x")]
    Ultra4x,
    #[value(name = "ultra8x")]
    Ultra8x,
}

/// Tier for a web search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchProcessor {
    #[default]
    Base,
    Pro,
}

/// Which kind of output the task should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Auto,
    Text,
    Json,
}

/// Output contract for a task run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputSchema {
    Auto,
    Text { description: String },
    Json { json_schema: Value },
}

impl OutputSchema {
    /// Resolve the schema from the raw parameters.
    ///
    /// With no explicit mode, a non-empty schema selects `json`, a non-empty
    /// description selects `text`, and otherwise `auto` is used.
    pub fn from_params(
        mode: Option<OutputMode>,
        description: Option<&str>,
        schema_text: Option<&str>,
        item_index: usize,
    ) -> Result<Self> {
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let schema_text = schema_text.filter(|s| !s.trim().is_empty());

        let mode = mode.unwrap_or(match (schema_text, description) {
            (Some(_), _) => OutputMode::Json,
            (None, Some(_)) => OutputMode::Text,
            (None, None) => OutputMode::Auto,
        });

        match mode {
            OutputMode::Auto => Ok(OutputSchema::Auto),
            OutputMode::Text => {
                let description = description.ok_or_else(|| Error::InvalidParameter {
                    item_index,
                    message: "text output requires a non-empty output description".to_string(),
                })?;
                Ok(OutputSchema::Text {
                    description: description.to_string(),
                })
            }
            OutputMode::Json => {
                let text = schema_text.unwrap_or_default();
                let json_schema =
                    serde_json::from_str(text).map_err(|e| Error::SchemaParse {
                        item_index,
                        message: e.to_string(),
                    })?;
                Ok(OutputSchema::Json { json_schema })
            }
        }
    }
}

/// What a task run must produce, plus an optional hint about its input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSpec {
    pub output_schema: OutputSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<String>,
}

/// Include/exclude domain filter for web retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourcePolicy {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
}

impl SourcePolicy {
    /// Build from comma-separated lists. `None` when both end up empty.
    pub fn from_lists(include: Option<&str>, exclude: Option<&str>) -> Option<Self> {
        let policy = SourcePolicy {
            include_domains: include.map(split_list).unwrap_or_default(),
            exclude_domains: exclude.map(split_list).unwrap_or_default(),
        };
        if policy.include_domains.is_empty() && policy.exclude_domains.is_empty() {
            None
        } else {
            Some(policy)
        }
    }
}

/// One user-supplied metadata entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPair {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Parameters for the task `execute` operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskParams {
    pub input: String,
    pub output_description: Option<String>,
    pub output_mode: Option<OutputMode>,
    pub output_schema: Option<String>,
    pub input_schema: Option<String>,
    pub processor: Processor,
    pub metadata: Vec<MetadataPair>,
    pub include_domains: Option<String>,
    pub exclude_domains: Option<String>,
}

/// Parameters for the search `search` operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub objective: Option<String>,
    pub processor: SearchProcessor,
    pub search_queries: Option<String>,
    pub max_results: Option<u32>,
    pub max_chars_per_result: Option<u32>,
    pub include_domains: Option<String>,
    pub exclude_domains: Option<String>,
}

#[derive(Debug, Serialize)]
struct TaskBody {
    input: Value,
    processor: Processor,
    task_spec: TaskSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_policy: Option<SourcePolicy>,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    objective: Option<&'a str>,
    processor: SearchProcessor,
    #[serde(skip_serializing_if = "Option::is_none")]
    search_queries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_chars_per_result: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_policy: Option<SourcePolicy>,
}

/// Build the body for `POST /v1/tasks/runs`.
pub fn build_task_body(params: &TaskParams, item_index: usize) -> Result<Value> {
    let output_schema = OutputSchema::from_params(
        params.output_mode,
        params.output_description.as_deref(),
        params.output_schema.as_deref(),
        item_index,
    )?;

    let body = TaskBody {
        input: parse_task_input(&params.input),
        processor: params.processor,
        task_spec: TaskSpec {
            output_schema,
            input_schema: params
                .input_schema
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        },
        metadata: build_metadata(&params.metadata),
        source_policy: SourcePolicy::from_lists(
            params.include_domains.as_deref(),
            params.exclude_domains.as_deref(),
        ),
    };

    Ok(serde_json::to_value(body)?)
}

/// Build the body for `POST /v1beta/search`.
pub fn build_search_body(params: &SearchParams) -> Result<Value> {
    let body = SearchBody {
        objective: params
            .objective
            .as_deref()
            .filter(|o| !o.trim().is_empty()),
        processor: params.processor,
        search_queries: params
            .search_queries
            .as_deref()
            .map(split_list)
            .filter(|q| !q.is_empty()),
        max_results: params.max_results.filter(|n| *n > 0),
        max_chars_per_result: params.max_chars_per_result.filter(|n| *n > 0),
        source_policy: SourcePolicy::from_lists(
            params.include_domains.as_deref(),
            params.exclude_domains.as_deref(),
        ),
    };

    Ok(serde_json::to_value(body)?)
}

/// Task input is JSON if it parses, otherwise a plain string.
pub fn parse_task_input(input: &str) -> Value {
    serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
}

/// Keep pairs where both sides are non-empty. Later keys overwrite earlier ones.
pub fn build_metadata(pairs: &[MetadataPair]) -> Option<Map<String, Value>> {
    let mut metadata = Map::new();
    for pair in pairs {
        if !pair.key.is_empty() && !pair.value.is_empty() {
            metadata.insert(pair.key.clone(), Value::String(pair.value.clone()));
        }
    }
    (!metadata.is_empty()).then_some(metadata)
}

/// Split on commas, trim, and drop empty entries.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
