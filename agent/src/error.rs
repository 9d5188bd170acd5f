use async_openai::error::OpenAIError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Openai error: {0}")]
    OpenaiError(#[from] OpenAIError),

    #[error("Http error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("No response from llm: {0}")]
    LLMResponseError(String),

    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(String),

    #[error("Tool {0} does not exist")]
    ToolDoesNotExist(String),

    #[error("Tool {name} failed: {reason}")]
    ToolInvocationError { name: String, reason: String },

    #[error("Missing arg: {0}")]
    MissingArg(String),

    #[error("Agent stopped after {0} iterations")]
    IterationLimit(usize),
}

impl Error {
    /// True for faults of the model backend itself, as opposed to tool or
    /// workflow errors.
    pub fn is_model_service(&self) -> bool {
        matches!(
            self,
            Error::OpenaiError(_)
                | Error::HttpError(_)
                | Error::LLMResponseError(_)
                | Error::MissingCredentials(_)
        )
    }
}
