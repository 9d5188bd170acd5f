use agent::llm::Content;
use regex::Regex;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// The structured answer the research agent is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchResponse {
    /// main subject of the query, e.g. "Supply Chain" for "What is supply chain?"
    pub topic: String,
    /// answer to the query
    pub summary: String,
    /// where the information came from
    pub sources: Vec<String>,
    /// names of the tools used while researching
    pub tools_used: Vec<String>,
}

impl ResearchResponse {
    /// Plain-text rendering written to the research file.
    pub fn to_text(&self) -> String {
        let sources = self
            .sources
            .iter()
            .map(|source| format!("  - {}", source))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Topic: {}\nSummary: {}\nSources:\n{}\nTools Used: {}",
            self.topic,
            self.summary,
            sources,
            self.tools_used.join(", ")
        )
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("agent output carries no text: {0}")]
    NoText(&'static str),

    #[error("no JSON object found in agent output")]
    NoJsonObject,

    #[error("malformed JSON in agent output: {0}")]
    MalformedJson(serde_json::Error),

    #[error("agent output does not match the response schema: {0}")]
    Mismatch(serde_json::Error),
}

const FORMAT_INSTRUCTIONS: &str = r#"The output must be a single JSON object that is an instance of the JSON schema below. Return the object itself with its fields filled in, not the schema.

For example, given the schema {"properties": {"tags": {"type": "array", "items": {"type": "string"}}}, "required": ["tags"]}, the object {"tags": ["a", "b"]} is well formatted, while {"properties": {"tags": ["a", "b"]}} is not.

Output schema:
```
{schema}
```"#;

/// Describes the response schema to the model.
pub fn format_instructions() -> String {
    let schema = schema_for!(ResearchResponse);
    // a derived schema always serializes
    let schema = serde_json::to_string(&schema).unwrap_or_default();
    FORMAT_INSTRUCTIONS.replace("{schema}", &schema)
}

/// Normalizes the agent output to the text that should hold the payload: the
/// string itself, or the text of the first content block.
pub fn output_text(raw: &Content) -> Result<&str, SchemaError> {
    match raw {
        Content::Text(text) => Ok(text.as_str()),
        Content::Blocks(blocks) => blocks
            .first()
            .ok_or(SchemaError::NoText("empty content block list"))?
            .text
            .as_deref()
            .ok_or(SchemaError::NoText("first content block has no text")),
    }
}

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid regex"));

/// Finds the first well-formed JSON object in `text`. Fenced blocks are
/// searched before the surrounding prose.
pub fn extract_json_object(
    text: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, SchemaError> {
    let fenced = FENCED
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()));

    let mut first_error = None;
    for candidate in fenced.chain(std::iter::once(text)) {
        match first_object(candidate) {
            Ok(Some(object)) => return Ok(object),
            Ok(None) => {}
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error.map_or(SchemaError::NoJsonObject, SchemaError::MalformedJson))
}

/// Tries every `{` in turn and returns the first one that starts a complete
/// JSON object. The error of the first failed attempt is reported when none
/// does.
fn first_object(
    text: &str,
) -> Result<Option<serde_json::Map<String, serde_json::Value>>, serde_json::Error> {
    let mut first_error = None;

    for (idx, _) in text.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&text[idx..]).into_iter::<serde_json::Value>();
        match stream.next() {
            Some(Ok(serde_json::Value::Object(object))) => return Ok(Some(object)),
            Some(Ok(_)) | None => {}
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

/// Coerces raw agent output into a [`ResearchResponse`].
pub fn parse(raw: &Content) -> Result<ResearchResponse, SchemaError> {
    let text = output_text(raw)?;
    let object = extract_json_object(text)?;
    serde_json::from_value(serde_json::Value::Object(object)).map_err(SchemaError::Mismatch)
}
