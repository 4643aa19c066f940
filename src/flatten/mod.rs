//! Reshapes a completed task run into a flat record.
//!
//! Automation hosts prefer single-level key/value records over nested
//! objects. For every top-level output field we emit the value itself,
//! followed by `<key>.confidence` and a markdown `<key>.evidence` string
//! built from the field's basis.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Flat output record. Insertion-ordered, so keys follow the content order.
pub type FlatRecord = Map<String, Value>;

/// Reasoning used when a text run carries no basis for its output.
pub const DEFAULT_TEXT_REASONING: &str = "Text output from task";

/// How sure the upstream model is about a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    /// Traffic-light marker shown next to the level in evidence text.
    pub fn marker(self) -> &'static str {
        match self {
            Confidence::High => "🟢",
            Confidence::Medium => "🟡",
            Confidence::Low => "🔴",
        }
    }
}

/// A source backing a field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub excerpts: Vec<String>,
}

/// Evidence for one output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBasis {
    pub field: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
    /// Unrecognised levels read as `None`.
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<Confidence>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    #[serde(rename = "type")]
    pub output_type: OutputType,
    pub content: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub basis: Vec<FieldBasis>,
}

/// Read an explicit `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_confidence<'de, D>(deserializer: D) -> Result<Option<Confidence>, D::Error>
where
    D: Deserializer<'de>,
{
    let level = match Value::deserialize(deserializer)? {
        Value::String(level) => level,
        _ => return Ok(None),
    };
    Ok(match level.as_str() {
        "low" => Some(Confidence::Low),
        "medium" => Some(Confidence::Medium),
        "high" => Some(Confidence::High),
        _ => None,
    })
}

/// Body of a successful `GET /v1/tasks/runs/{id}/result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunResult {
    #[serde(default)]
    pub run: Value,
    pub output: TaskOutput,
}

/// Flatten a run result. Pure; no I/O.
pub fn flatten(result: &TaskRunResult) -> FlatRecord {
    let output = &result.output;
    let basis_map: HashMap<&str, &FieldBasis> = output
        .basis
        .iter()
        .map(|b| (b.field.as_str(), b))
        .collect();

    let mut flat = FlatRecord::new();

    if output.output_type == OutputType::Text {
        let fallback;
        let basis = match basis_map.get("output") {
            Some(basis) => *basis,
            None => {
                fallback = FieldBasis {
                    field: "output".to_string(),
                    reasoning: DEFAULT_TEXT_REASONING.to_string(),
                    confidence: None,
                    citations: Vec::new(),
                };
                &fallback
            }
        };
        flat.insert("output".to_string(), output.content.clone());
        push_companions(&mut flat, "output", basis);
        return flat;
    }

    match &output.content {
        Value::Object(content) => {
            for (key, value) in content {
                flat.insert(key.clone(), value.clone());
                if let Some(basis) = basis_map.get(key.as_str()) {
                    push_companions(&mut flat, key, basis);
                }
            }
        }
        other => {
            flat.insert("content".to_string(), other.clone());
            // Lists and scalars have no per-key basis; upstream files it under
            // either name.
            let basis = basis_map
                .get("content")
                .or_else(|| basis_map.get("output"));
            if let Some(basis) = basis {
                push_companions(&mut flat, "content", basis);
            }
        }
    }

    flat
}

fn push_companions(flat: &mut FlatRecord, key: &str, basis: &FieldBasis) {
    let confidence = basis
        .confidence
        .map_or(Value::Null, |c| Value::String(c.as_str().to_string()));
    flat.insert(format!("{key}.confidence"), confidence);
    flat.insert(format!("{key}.evidence"), Value::String(evidence(basis)));
}

/// Render a basis as markdown.
pub fn evidence(basis: &FieldBasis) -> String {
    let mut out = format!("**Field:** {}\n", basis.field);
    if let Some(confidence) = basis.confidence {
        out.push_str(&format!(
            "**Confidence:** {} {}\n",
            confidence.marker(),
            confidence.as_str()
        ));
    }
    out.push('\n');

    if !basis.reasoning.is_empty() {
        out.push_str(&format!("**Reasoning:** {}\n", basis.reasoning));
    }

    if !basis.citations.is_empty() {
        out.push_str("\n**Sources:**\n");
        for (i, citation) in basis.citations.iter().enumerate() {
            let title = citation
                .title
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(&citation.url);
            out.push_str(&format!("{}. [{}]({})\n", i + 1, title, citation_url(citation)));
        }
    }

    out.trim().to_string()
}

/// Citation URL with a scroll-to-text fragment per usable excerpt.
pub fn citation_url(citation: &Citation) -> String {
    let fragments: Vec<String> = citation
        .excerpts
        .iter()
        .filter(|e| !e.trim().is_empty())
        .map(|e| {
            let stripped = e.strip_suffix("...").unwrap_or(e);
            format!("text={}", urlencoding::encode(stripped.trim()))
        })
        .collect();

    if fragments.is_empty() {
        return citation.url.clone();
    }
    format!("{}#:~:{}", citation.url, fragments.join("&"))
}
