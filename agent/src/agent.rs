use crate::callbacks;
use crate::llm;
use crate::tools;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_MAX_ITERATIONS: usize = 15;

pub trait StopCondition {
    fn done(&self, history: &[llm::Message]) -> bool;
}

/// Stops once the model answers without requesting any tool.
pub struct FinalAnswer;

impl StopCondition for FinalAnswer {
    fn done(&self, history: &[llm::Message]) -> bool {
        matches!(history.last(), Some(llm::Message::Assistant(_, tool_calls)) if tool_calls.is_empty())
    }
}

type Tool = Box<dyn tools::Tool + Send>;
type Callback = Box<dyn callbacks::Callback + Send>;

pub struct Agent {
    llm: Arc<dyn llm::LLM + Send + Sync>,
    tools: HashMap<String, Tool>,
    callbacks: Vec<Callback>,
    tool_defs: Vec<tools::ToolDefinition>,
    stop_condition: Box<dyn StopCondition + Send>,
    system_prompt: Option<String>,
    max_iterations: usize,
}

impl Agent {
    /// Runs the agent on a fresh conversation: the system prompt, if any,
    /// followed by the task as the user message.
    pub async fn run_task(&mut self, task: &str) -> Result<Vec<llm::Message>> {
        let mut history: Vec<llm::Message> = self
            .system_prompt
            .clone()
            .map(llm::Message::System)
            .into_iter()
            .collect();
        history.push(llm::Message::User(task.to_string()));

        self.run(history).await
    }

    async fn execute_tool_call(
        &mut self,
        tool_call: &tools::ToolCall,
        messages: Vec<llm::Message>,
    ) -> Result<Vec<llm::Message>> {
        let tool = self
            .tools
            .get_mut(&tool_call.name)
            .ok_or(Error::ToolDoesNotExist(tool_call.name.clone()))?;

        let messages = tool
            .invoke(tool_call, messages)
            .await
            .map_err(|e| Error::ToolInvocationError {
                name: tool_call.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(messages)
    }

    /// Tool failures are fed back to the model as observations so it can
    /// adapt; only model errors abort the run.
    pub async fn run(&mut self, mut messages: Vec<llm::Message>) -> Result<Vec<llm::Message>> {
        let mut iterations = 0;

        while !self.stop_condition.done(&messages) {
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(Error::IterationLimit(self.max_iterations));
            }
            debug!("agent iteration {}", iterations);

            let next = self
                .llm
                .completion(llm::CompletionRequest {
                    messages: &messages,
                    tools: &self.tool_defs,
                })
                .await?;

            messages.push(llm::Message::Assistant(
                next.content,
                next.tool_calls.clone(),
            ));

            for tool_call in &next.tool_calls {
                // a failed tool leaves the history untouched, so keep a copy
                // to append the error observation to
                let snapshot = messages.clone();
                messages = match self.execute_tool_call(tool_call, messages).await {
                    Ok(messages) => messages,
                    Err(e) => {
                        warn!(tool = %tool_call.name, error = %e, "tool call failed");
                        let mut messages = snapshot;
                        messages.push(tool_call.reply(format!("Tool error: {}", e)));
                        messages
                    }
                };
            }

            for callback in &mut self.callbacks {
                messages = callback.call(messages).await?;
            }
        }

        Ok(messages)
    }
}

pub struct AgentBuilder {
    llm: Option<Arc<dyn llm::LLM + Send + Sync>>,
    system_prompt: Option<String>,
    tools: Vec<Tool>,
    callbacks: Vec<Callback>,
    stop_condition: Option<Box<dyn StopCondition + Send>>,
    max_iterations: usize,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            llm: None,
            system_prompt: None,
            tools: Vec::new(),
            callbacks: Vec::new(),
            stop_condition: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn llm(mut self, llm: Arc<dyn llm::LLM + Send + Sync>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn stop_condition(mut self, cond: Box<dyn StopCondition + Send>) -> Self {
        self.stop_condition = Some(cond);
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let mut tool_defs = Vec::new();
        let mut tools = HashMap::new();

        for tool in self.tools {
            let def = tool.definition()?;
            tools.insert(def.name.clone(), tool);
            tool_defs.push(def);
        }

        Ok(Agent {
            llm: self
                .llm
                .ok_or(Error::MissingArg("llm is required for agent".to_string()))?,
            tools,
            tool_defs,
            callbacks: self.callbacks,
            stop_condition: self.stop_condition.ok_or(Error::MissingArg(
                "stop_condition is required for agent".to_string(),
            ))?,
            system_prompt: self.system_prompt,
            max_iterations: self.max_iterations,
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use core::panic;

    use crate::llm::{CompletionRequest, CompletionResponse, Content, LLM, Message};
    use crate::tools::{FunctionalTool, ToolCall, ToolDefinition};
    use crate::{AgentBuilder, Error, FinalAnswer, Result, StopCondition};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct MockLLM;

    #[async_trait]
    impl LLM for MockLLM {
        async fn completion<'a>(
            &self,
            request: CompletionRequest<'a>,
        ) -> Result<CompletionResponse> {
            match request.messages.last() {
                Some(Message::User(_)) => Ok(CompletionResponse {
                    content: "tool call".into(),
                    tool_calls: vec![ToolCall {
                        id: "call1".to_string(),
                        name: "double".to_string(),
                        args: "{\"arg\":123}".to_string(),
                    }],
                }),
                Some(Message::Tool { .. }) => Ok(CompletionResponse {
                    content: "tool call recieved".into(),
                    tool_calls: vec![],
                }),
                Some(Message::Assistant(_, _)) => Ok(CompletionResponse {
                    content: "completed".into(),
                    tool_calls: vec![],
                }),
                _ => panic!("unexpected message sequence"),
            }
        }
    }

    struct DoubleTool;

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    struct DoubleArgs {
        arg: i32,
    }

    #[async_trait]
    impl FunctionalTool for DoubleTool {
        fn definition(&self) -> Result<ToolDefinition> {
            ToolDefinition::new::<DoubleArgs>("double", "double")
        }

        async fn invoke_fn(&mut self, tool_call: &ToolCall) -> Result<Message> {
            let args: DoubleArgs = tool_call.args()?;
            Ok(tool_call.reply(format!("2 * {} = {}", args.arg, 2 * args.arg)))
        }
    }

    struct SimpleStop;

    impl StopCondition for SimpleStop {
        fn done(&self, history: &[Message]) -> bool {
            if let Some(Message::Assistant(content, _)) = history.last() {
                content.text() == "completed"
            } else {
                false
            }
        }
    }

    #[tokio::test]
    async fn test_agent() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(MockLLM))
            .tool(Box::new(DoubleTool))
            .stop_condition(Box::new(SimpleStop))
            .build()?;

        let history = agent
            .run(vec![Message::User("do stuff".to_string())])
            .await?;

        assert_eq!(history.len(), 5);

        assert!(matches!(&history[0], Message::User (content) if content == "do stuff"));
        assert!(matches!(&history[1], Message::Assistant (_, tool_calls) if tool_calls.len() == 1));
        assert!(matches!(&history[2], Message::Tool {  result,.. } if result == "2 * 123 = 246"));
        assert!(
            matches!(&history[3], Message::Assistant (content, _) if content.text() == "tool call recieved")
        );
        assert!(matches!(&history[4], Message::Assistant (content, _) if content.text() == "completed"));

        Ok(())
    }

    #[tokio::test]
    async fn test_final_answer_stops_after_first_answer() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(MockLLM))
            .system_prompt("you double numbers".to_string())
            .tool(Box::new(DoubleTool))
            .stop_condition(Box::new(FinalAnswer))
            .build()?;

        let history = agent.run_task("do stuff").await?;

        assert_eq!(history.len(), 5);
        assert!(matches!(&history[0], Message::System(prompt) if prompt == "you double numbers"));
        assert!(matches!(&history[1], Message::User(task) if task == "do stuff"));
        assert!(
            matches!(&history[4], Message::Assistant (content, calls) if content.text() == "tool call recieved" && calls.is_empty())
        );

        Ok(())
    }

    /// Requests a tool the agent does not have, then one with bad arguments.
    struct BadCallsLLM;

    #[async_trait]
    impl LLM for BadCallsLLM {
        async fn completion<'a>(
            &self,
            request: CompletionRequest<'a>,
        ) -> Result<CompletionResponse> {
            match request.messages.last() {
                Some(Message::User(_)) => Ok(CompletionResponse {
                    content: Content::Text(String::new()),
                    tool_calls: vec![
                        ToolCall {
                            id: "a".to_string(),
                            name: "triple".to_string(),
                            args: "{}".to_string(),
                        },
                        ToolCall {
                            id: "b".to_string(),
                            name: "double".to_string(),
                            args: "{\"arg\":\"x\"}".to_string(),
                        },
                    ],
                }),
                _ => Ok(CompletionResponse {
                    content: "gave up".into(),
                    tool_calls: vec![],
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_tool_errors_become_observations() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(BadCallsLLM))
            .tool(Box::new(DoubleTool))
            .stop_condition(Box::new(FinalAnswer))
            .build()?;

        let history = agent.run_task("do stuff").await?;

        assert_eq!(history.len(), 5);
        assert!(
            matches!(&history[2], Message::Tool { id, result, .. } if id == "a" && result == "Tool error: Tool triple does not exist")
        );
        assert!(
            matches!(&history[3], Message::Tool { id, result, .. } if id == "b" && result.starts_with("Tool error: Tool double failed:"))
        );

        Ok(())
    }

    /// Never stops asking for tools.
    struct LoopingLLM;

    #[async_trait]
    impl LLM for LoopingLLM {
        async fn completion<'a>(&self, _: CompletionRequest<'a>) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                content: "again".into(),
                tool_calls: vec![ToolCall {
                    id: "loop".to_string(),
                    name: "double".to_string(),
                    args: "{\"arg\":1}".to_string(),
                }],
            })
        }
    }

    #[tokio::test]
    async fn test_iteration_limit() -> Result<()> {
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(LoopingLLM))
            .tool(Box::new(DoubleTool))
            .stop_condition(Box::new(FinalAnswer))
            .max_iterations(3)
            .build()?;

        let result = agent.run_task("do stuff").await;

        assert!(matches!(result, Err(Error::IterationLimit(3))));
        Ok(())
    }

    struct FailingLLM;

    #[async_trait]
    impl LLM for FailingLLM {
        async fn completion<'a>(&self, _: CompletionRequest<'a>) -> Result<CompletionResponse> {
            Err(Error::LLMResponseError("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_model_errors_propagate() {
        let mut agent = AgentBuilder::new()
            .llm(Arc::new(FailingLLM))
            .stop_condition(Box::new(FinalAnswer))
            .build()
            .unwrap();

        let result = agent.run_task("do stuff").await;

        assert!(matches!(result, Err(ref e) if e.is_model_service()));
    }
}
