use crate::error::{Error, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Anthropic,
    Openai,
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-3-5-sonnet-20241022",
            Provider::Openai => "gpt-4o",
        }
    }
}

/// Research assistant: reads a query from stdin, researches it and saves a
/// structured summary to a text file.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Model backend
    #[arg(long, env = "RESEARCH_PROVIDER", value_enum, default_value = "anthropic")]
    pub provider: Provider,

    /// Model name, defaults to the provider's research model
    #[arg(long, env = "RESEARCH_MODEL")]
    pub model: Option<String>,

    /// Upper bound on model turns before the agent gives up
    #[arg(long, env = "RESEARCH_MAX_ITERATIONS", default_value_t = 15)]
    pub max_iterations: usize,

    /// Directory research files are written to
    #[arg(long, env = "RESEARCH_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Character cap for encyclopedia lookups
    #[arg(long, env = "RESEARCH_WIKI_MAX_CHARS", default_value_t = 100)]
    pub wiki_max_chars: usize,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, hide = true)]
    pub anthropic_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, hide = true)]
    pub openai_api_key: Option<String>,
}

/// Settings for one run, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub max_iterations: usize,
    pub output_dir: PathBuf,
    pub wiki_max_chars: usize,
    pub verbose: u8,
}

impl Config {
    /// Loads `.env` from the working directory, if present, then parses the
    /// command line with environment fallbacks.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Result<Self> {
        if cli.max_iterations == 0 {
            return Err(Error::Config("max iterations must be at least 1".to_string()));
        }
        if !cli.output_dir.is_dir() {
            return Err(Error::Config(format!(
                "output directory {} does not exist",
                cli.output_dir.display()
            )));
        }

        let api_key = match cli.provider {
            Provider::Anthropic => cli.anthropic_api_key,
            Provider::Openai => cli.openai_api_key,
        }
        .filter(|key| !key.trim().is_empty());

        Ok(Self {
            provider: cli.provider,
            model: cli
                .model
                .unwrap_or_else(|| cli.provider.default_model().to_string()),
            api_key,
            max_iterations: cli.max_iterations,
            output_dir: cli.output_dir,
            wiki_max_chars: cli.wiki_max_chars,
            verbose: cli.verbose,
        })
    }

    pub fn llm(&self) -> Result<std::sync::Arc<dyn agent::llm::LLM + Send + Sync>> {
        let llm: std::sync::Arc<dyn agent::llm::LLM + Send + Sync> = match self.provider {
            Provider::Anthropic => {
                agent::llm::Anthropic::new(self.model.clone(), self.api_key.clone())?
            }
            Provider::Openai => agent::llm::OpenAI::new(self.model.clone(), self.api_key.clone())?,
        };
        Ok(llm)
    }
}
