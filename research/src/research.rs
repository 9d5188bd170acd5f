use crate::config::Config;
use crate::response;
use crate::save::SaveToFile;
use agent::llm::{self, Content, Message};
use agent::tools;
use agent::{Agent, AgentBuilder, Error, FinalAnswer, Result, callbacks};
use std::sync::Arc;
use tracing::{info, warn};

const RESEARCH_PROMPT: &str = include_str!("prompts/research.md");

/// What the run yields when the model never settles on an answer.
pub const ITERATION_LIMIT_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";

pub fn system_prompt() -> String {
    RESEARCH_PROMPT.replace("{format_instructions}", &response::format_instructions())
}

pub struct Orchestrator {
    agent: Agent,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn llm::LLM + Send + Sync>,
        config: &Config,
        saver: SaveToFile,
    ) -> Result<Self> {
        Ok(Self {
            agent: AgentBuilder::new()
                .system_prompt(system_prompt())
                .llm(llm)
                .tool(tools::WebSearch::new()?)
                .tool(tools::Wikipedia::new(config.wiki_max_chars)?)
                .tool(Box::new(saver))
                .callback(callbacks::MessageLogger::new("research"))
                .stop_condition(Box::new(FinalAnswer))
                .max_iterations(config.max_iterations)
                .build()?,
        })
    }

    /// Runs the agent on `query` and returns its final answer as produced by
    /// the model. Model service errors are returned unchanged.
    pub async fn run(mut self, query: &str) -> Result<Content> {
        let history = match self.agent.run_task(query).await {
            Ok(history) => history,
            Err(Error::IterationLimit(n)) => {
                warn!("agent hit the iteration limit of {}", n);
                return Ok(Content::Text(ITERATION_LIMIT_OUTPUT.to_string()));
            }
            Err(e) => return Err(e),
        };

        info!("agent finished after {} messages", history.len());
        final_answer(history)
    }
}

fn final_answer(history: Vec<Message>) -> Result<Content> {
    history
        .into_iter()
        .rev()
        .find_map(|message| match message {
            Message::Assistant(content, _) => Some(content),
            _ => None,
        })
        .ok_or(Error::LLMResponseError(
            "agent finished without an answer".to_string(),
        ))
}
