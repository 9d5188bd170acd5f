use agent::Result;
use agent::llm::Message;
use agent::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Deserialize, JsonSchema)]
struct SaveArgs {
    /// the content to save
    data: String,
    /// the name of the file
    filename: String,
}

/// Writes research text files into a fixed directory. Failures are reported
/// in the returned status line, never raised.
#[derive(Clone, Debug)]
pub struct SaveToFile {
    dir: PathBuf,
}

impl SaveToFile {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn save(&self, data: &str, filename: &str) -> String {
        self.save_at(data, filename, Local::now())
    }

    pub fn save_at(&self, data: &str, filename: &str, now: DateTime<Local>) -> String {
        debug!(filename = %filename, "saving {} bytes", data.len());

        let formatted = format!(
            "--- Research Output ---\nTimestamp: {}\n\n{}\n\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            data
        );

        let path = self.dir.join(filename);
        match std::fs::write(&path, formatted) {
            Ok(()) => {
                info!(path = %path.display(), "research output written");
                format!("Data successfully saved to {}", filename)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write research output");
                format!("Error writing to {}: {}", filename, e)
            }
        }
    }
}

#[async_trait]
impl FunctionalTool for SaveToFile {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<SaveArgs>(
            "save_text_to_file",
            "Saves structured research data to a text file. Requires 'data' (the content to save) and 'filename' (the name of the file).",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: SaveArgs = call.args()?;
        Ok(call.reply(self.save(&args.data, &args.filename)))
    }
}
