use crate::response::{self, SchemaError};
use crate::sanitize::sanitize_filename;
use crate::save::SaveToFile;
use agent::llm::Content;
use chrono::{DateTime, Local};
use tracing::{info, warn};

const FILENAME_PREFIX: &str = "research_output";

/// Turns the agent's final answer into a research file and returns the save
/// status. Never fails: anything that goes wrong while parsing produces an
/// error report file instead.
pub fn handle(query: &str, raw: &Content, saver: &SaveToFile) -> String {
    handle_at(query, raw, saver, Local::now())
}

pub fn handle_at(query: &str, raw: &Content, saver: &SaveToFile, now: DateTime<Local>) -> String {
    let timestamp = now.format("%Y%m%d_%H%M%S").to_string();

    let (text, filename) = match render(query, raw) {
        Ok((text, topic)) => {
            let filename = format!(
                "{}_{}_{}.txt",
                FILENAME_PREFIX,
                sanitize_filename(&topic),
                timestamp
            );
            info!(filename = %filename, "generated filename");
            (text, filename)
        }
        Err(e) => {
            warn!(error = %e, "could not parse agent output");
            let filename = format!("{}_error_{}.txt", FILENAME_PREFIX, timestamp);
            info!(filename = %filename, "fallback filename");
            (error_report(query, raw, &e), filename)
        }
    };

    let status = saver.save_at(&text, &filename, now);
    info!("save result: {}", status);
    status
}

/// Formatted response text and the topic to name the file after.
fn render(query: &str, raw: &Content) -> Result<(String, String), SchemaError> {
    if let Ok(text) = response::output_text(raw) {
        info!("raw output text: {}", text);
    }

    let parsed = response::parse(raw)?;
    info!(topic = %parsed.topic, "parsed response");

    let topic = if parsed.topic.trim().is_empty() {
        query.to_string()
    } else {
        parsed.topic.clone()
    };

    Ok((parsed.to_text(), topic))
}

fn error_report(query: &str, raw: &Content, error: &SchemaError) -> String {
    let dump = serde_json::json!({ "query": query, "output": raw });
    // a json value of strings always serializes
    let dump = serde_json::to_string_pretty(&dump).unwrap_or_default();
    format!("Error occurred: {}\nRaw Response: {}", error, dump)
}

#[cfg(test)]
mod tests {
    use super::{handle, handle_at};
    use crate::save::SaveToFile;
    use agent::llm::{Content, ContentBlock};
    use chrono::{Local, TimeZone};
    use regex::Regex;
    use std::path::Path;

    fn files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn payload(topic: &str) -> Content {
        Content::Text(format!(
            "```\n{{\"topic\":\"{}\",\"summary\":\"A supply chain is...\",\"sources\":[\"wikipedia.org\"],\"tools_used\":[\"wikipedia\"]}}\n```",
            topic
        ))
    }

    #[test]
    fn test_success_file_named_after_topic() {
        let dir = tempfile::tempdir().unwrap();
        let saver = SaveToFile::new(dir.path().to_path_buf());
        let now = Local.with_ymd_and_hms(2025, 4, 1, 9, 5, 7).unwrap();

        let status = handle_at("What is supply chain?", &payload("Supply Chain"), &saver, now);

        let name = "research_output_supply_chain_20250401_090507.txt";
        assert_eq!(status, format!("Data successfully saved to {}", name));
        assert_eq!(files(dir.path()), vec![name]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(name)).unwrap(),
            "--- Research Output ---\nTimestamp: 2025-04-01 09:05:07\n\n\
             Topic: Supply Chain\nSummary: A supply chain is...\nSources:\n  - wikipedia.org\nTools Used: wikipedia\n\n"
        );
    }

    #[test]
    fn test_blank_topic_falls_back_to_query() {
        let dir = tempfile::tempdir().unwrap();
        let saver = SaveToFile::new(dir.path().to_path_buf());
        let now = Local.with_ymd_and_hms(2025, 4, 1, 9, 5, 7).unwrap();

        handle_at("What is supply chain?", &payload("  "), &saver, now);

        assert_eq!(
            files(dir.path()),
            vec!["research_output_what_is_supply_chain_20250401_090507.txt"]
        );
    }

    #[test]
    fn test_parse_failure_writes_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let saver = SaveToFile::new(dir.path().to_path_buf());
        let now = Local.with_ymd_and_hms(2025, 4, 1, 9, 5, 7).unwrap();
        let raw = Content::Blocks(vec![ContentBlock::text(
            r#"```{"topic":"Supply Chain","summary":"...","sources":[]}```"#,
        )]);

        let status = handle_at("What is supply chain?", &raw, &saver, now);

        let name = "research_output_error_20250401_090507.txt";
        assert_eq!(status, format!("Data successfully saved to {}", name));
        assert_eq!(files(dir.path()), vec![name]);

        let written = std::fs::read_to_string(dir.path().join(name)).unwrap();
        let body = written
            .strip_prefix("--- Research Output ---\nTimestamp: 2025-04-01 09:05:07\n\n")
            .unwrap();
        assert!(body.starts_with("Error occurred: "), "{body}");
        assert!(body.contains("tools_used"));
        assert!(body.contains("Raw Response: {"));
        assert!(body.contains("\"query\": \"What is supply chain?\""));
        assert!(body.contains("\"type\": \"text\""));
    }

    #[test]
    fn test_failure_to_save_is_returned_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let saver = SaveToFile::new(dir.path().join("gone"));

        let status = handle("q", &Content::Text("no json here".to_string()), &saver);

        assert!(status.starts_with("Error writing to research_output_error_"), "{status}");
    }

    #[test]
    fn test_filename_uses_local_clock() {
        let dir = tempfile::tempdir().unwrap();
        let saver = SaveToFile::new(dir.path().to_path_buf());

        handle("What is supply chain?", &payload("Supply Chain"), &saver);

        let pattern = Regex::new(r"^research_output_supply_chain_\d{8}_\d{6}\.txt$").unwrap();
        let names = files(dir.path());
        assert_eq!(names.len(), 1);
        assert!(pattern.is_match(&names[0]), "{}", names[0]);
    }

    #[tokio::test]
    async fn test_end_to_end_supply_chain() -> agent::Result<()> {
        use crate::research::Orchestrator;
        use crate::research::tests::{ScriptedLLM, answer, test_config};

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let saver = SaveToFile::new(dir.path().to_path_buf());
        let llm = ScriptedLLM::new(vec![answer(payload("Supply Chain"))]);

        let query = "What is supply chain?";
        let raw = Orchestrator::new(llm, &config, saver.clone())?.run(query).await?;
        let status = handle(query, &raw, &saver);

        let names = files(dir.path());
        assert_eq!(names.len(), 1);
        assert_eq!(status, format!("Data successfully saved to {}", names[0]));
        let pattern = Regex::new(r"^research_output_supply_chain_\d{8}_\d{6}\.txt$").unwrap();
        assert!(pattern.is_match(&names[0]), "{}", names[0]);

        let written = std::fs::read_to_string(dir.path().join(&names[0])).unwrap();
        assert!(written.lines().any(|line| line == "Tools Used: wikipedia"));

        Ok(())
    }
}
