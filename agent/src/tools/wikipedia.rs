use crate::Result;
use crate::llm::Message;
use crate::tools::{FunctionalTool, QueryArgs, ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const API_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";

const DESCRIPTION: &str = "A wrapper around Wikipedia. Useful for when you need to answer general questions about people, places, companies, facts, historical events, or other subjects. Input should be a search query.";

/// Encyclopedia lookup: the intro of the best matching Wikipedia page.
pub struct Wikipedia {
    http_client: reqwest::Client,
    max_chars: usize,
}

impl Wikipedia {
    /// `max_chars` caps the length of every returned observation.
    pub fn new(max_chars: usize) -> Result<Box<Self>> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("research-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Box::new(Self {
            http_client,
            max_chars,
        }))
    }

    pub async fn lookup(&self, query: &str) -> Result<String> {
        debug!(query = %query, "wikipedia search");

        let search: SearchResponse = self
            .http_client
            .get(API_ENDPOINT)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", "1"),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(hit) = search.query.search.into_iter().next() else {
            return Ok("No good Wikipedia Search Result was found".to_string());
        };

        let pages: ExtractResponse = self
            .http_client
            .get(API_ENDPOINT)
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", hit.title.as_str()),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let summary = pages
            .query
            .pages
            .into_iter()
            .next()
            .and_then(|page| page.extract)
            .unwrap_or_default();

        Ok(render_page(&hit.title, &summary, self.max_chars))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: SearchQuery,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    query: ExtractQuery,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    extract: Option<String>,
}

fn render_page(title: &str, summary: &str, max_chars: usize) -> String {
    format!("Page: {}\nSummary: {}", title, summary.trim())
        .chars()
        .take(max_chars)
        .collect()
}

#[async_trait]
impl FunctionalTool for Wikipedia {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<QueryArgs>("wikipedia", DESCRIPTION)
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: QueryArgs = call.args()?;
        Ok(call.reply(self.lookup(&args.query).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtractResponse, SearchResponse, render_page};

    #[test]
    fn test_render_page_caps_length() {
        let page = render_page("Supply chain", "A supply chain is a complex logistics system.", 30);

        assert_eq!(page.chars().count(), 30);
        assert_eq!(page, "Page: Supply chain\nSummary: A ");
    }

    #[test]
    fn test_render_page_counts_chars_not_bytes() {
        let page = render_page("Zürich", "Größte Stadt", 1000);
        assert_eq!(page, "Page: Zürich\nSummary: Größte Stadt");

        let cut = render_page("Zürich", "", 8);
        assert_eq!(cut, "Page: Zü");
    }

    #[test]
    fn test_decode_api_payloads() {
        let search: SearchResponse = serde_json::from_value(serde_json::json!({
            "batchcomplete": "",
            "query": { "searchinfo": { "totalhits": 1 }, "search": [{ "ns": 0, "title": "Supply chain", "pageid": 42 }] }
        }))
        .unwrap();
        assert_eq!(search.query.search[0].title, "Supply chain");

        let pages: ExtractResponse = serde_json::from_value(serde_json::json!({
            "query": { "pages": [{ "pageid": 42, "title": "Supply chain", "extract": "A supply chain..." }] }
        }))
        .unwrap();
        assert_eq!(pages.query.pages[0].extract.as_deref(), Some("A supply chain..."));
    }
}
