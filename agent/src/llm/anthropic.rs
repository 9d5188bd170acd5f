use crate::llm::{self, Content, ContentBlock, Message};
use crate::tools::{ToolCall, ToolDefinition};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Claude through the Messages API.
pub struct Anthropic {
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl Anthropic {
    /// A missing key is only reported when a completion is requested.
    pub fn new(model: String, api_key: Option<String>) -> Result<std::sync::Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(std::sync::Arc::new(Self {
            model,
            api_key,
            http_client,
        }))
    }

    fn request_body(&self, request: &llm::CompletionRequest<'_>) -> Result<Value> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": 0.0,
            "messages": to_anthropic_messages(request.messages)?,
        });

        let system = request
            .messages
            .iter()
            .filter_map(|m| match m {
                Message::System(s) => Some(s.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        if !system.is_empty() {
            body["system"] = json!(system);
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(to_anthropic_tools(request.tools));
        }

        Ok(body)
    }
}

fn to_anthropic_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.desc,
                "input_schema": tool.params,
            })
        })
        .collect()
}

/// Tool results must all arrive in the single user turn that follows the
/// assistant's tool_use blocks, so consecutive tool messages are merged.
fn to_anthropic_messages(messages: &[Message]) -> Result<Vec<Value>> {
    let mut out: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    let flush = |out: &mut Vec<Value>, pending: &mut Vec<Value>| {
        if !pending.is_empty() {
            out.push(json!({ "role": "user", "content": std::mem::take(pending) }));
        }
    };

    for msg in messages {
        match msg {
            Message::System(_) => continue,
            Message::Tool { id, result, .. } => {
                pending_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": result,
                }));
            }
            Message::User(text) => {
                flush(&mut out, &mut pending_results);
                out.push(json!({
                    "role": "user",
                    "content": [{ "type": "text", "text": text }],
                }));
            }
            Message::Assistant(content, tool_calls) => {
                flush(&mut out, &mut pending_results);
                let mut blocks = Vec::new();
                let text = content.text();
                if !text.is_empty() {
                    blocks.push(json!({ "type": "text", "text": text }));
                }
                for call in tool_calls {
                    let input: Value = if call.args.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&call.args)?
                    };
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": input,
                    }));
                }
                if blocks.is_empty() {
                    blocks.push(json!({ "type": "text", "text": "" }));
                }
                out.push(json!({ "role": "assistant", "content": blocks }));
            }
        }
    }
    flush(&mut out, &mut pending_results);

    Ok(out)
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

fn parse_response(response: MessagesResponse) -> llm::CompletionResponse {
    let mut blocks = Vec::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            ResponseBlock::Text { text } => blocks.push(ContentBlock::text(text)),
            ResponseBlock::ToolUse { id, name, input } => {
                blocks.push(ContentBlock {
                    kind: "tool_use".to_string(),
                    text: None,
                });
                tool_calls.push(ToolCall {
                    id,
                    name,
                    args: input.to_string(),
                });
            }
            ResponseBlock::Other => {}
        }
    }

    llm::CompletionResponse {
        content: Content::Blocks(blocks),
        tool_calls,
    }
}

#[async_trait]
impl llm::LLM for Anthropic {
    async fn completion<'a>(
        &self,
        request: llm::CompletionRequest<'a>,
    ) -> Result<llm::CompletionResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(Error::MissingCredentials("ANTHROPIC_API_KEY".to_string()))?;

        let body = self.request_body(&request)?;

        debug!(model = %self.model, messages = request.messages.len(), "anthropic completion");
        let response = self
            .http_client
            .post(API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, "anthropic api returned error");
            return Err(Error::LLMResponseError(format!(
                "anthropic api status {}: {}",
                status, text
            )));
        }

        let response: MessagesResponse = response.json().await?;
        if response.content.is_empty() {
            return Err(Error::LLMResponseError("content is empty".to_string()));
        }

        Ok(parse_response(response))
    }
}
