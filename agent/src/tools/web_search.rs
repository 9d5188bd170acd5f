use crate::Result;
use crate::llm::Message;
use crate::tools::{FunctionalTool, QueryArgs, ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const API_ENDPOINT: &str = "https://api.duckduckgo.com/";
const MAX_RESULTS: usize = 5;

/// Web search through the DuckDuckGo Instant Answer API.
pub struct WebSearch {
    http_client: reqwest::Client,
}

impl WebSearch {
    pub fn new() -> Result<Box<Self>> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("research-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Box::new(Self { http_client }))
    }

    pub async fn search(&self, query: &str) -> Result<String> {
        debug!(query = %query, "duckduckgo search");

        let response = self
            .http_client
            .get(API_ENDPOINT)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await?
            .error_for_status()
            .inspect_err(|e| warn!(error = %e, "duckduckgo request failed"))?;

        let response: DuckDuckGoResponse = response.json().await?;
        Ok(render_results(query, &response))
    }
}

#[derive(Debug, Default, Deserialize)]
struct DuckDuckGoResponse {
    #[serde(rename = "Heading", default)]
    heading: String,
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Result {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn collect_topics<'a>(topics: &'a [RelatedTopic], out: &mut Vec<(&'a str, &'a str)>) {
    for topic in topics {
        if out.len() >= MAX_RESULTS {
            return;
        }
        match topic {
            RelatedTopic::Result { text, first_url } if !text.is_empty() => {
                out.push((text, first_url));
            }
            RelatedTopic::Result { .. } => {}
            RelatedTopic::Group { topics } => collect_topics(topics, out),
        }
    }
}

fn render_results(query: &str, response: &DuckDuckGoResponse) -> String {
    let mut lines = Vec::new();

    if !response.abstract_text.is_empty() {
        let heading = if response.heading.is_empty() {
            query
        } else {
            response.heading.as_str()
        };
        lines.push(format!(
            "{}: {} ({})",
            heading, response.abstract_text, response.abstract_url
        ));
    }

    let mut topics = Vec::new();
    collect_topics(&response.related_topics, &mut topics);
    lines.extend(
        topics
            .into_iter()
            .map(|(text, url)| format!("- {} ({})", text, url)),
    );

    if lines.is_empty() {
        return format!("No good DuckDuckGo Search Result was found for: {}", query);
    }

    lines.join("\n")
}

#[async_trait]
impl FunctionalTool for WebSearch {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<QueryArgs>("search", "Search the web for information")
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: QueryArgs = call.args()?;
        Ok(call.reply(self.search(&args.query).await?))
    }
}
