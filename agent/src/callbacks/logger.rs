use crate::Result;
use crate::callbacks::Callback;
use crate::llm::Message;
use async_trait::async_trait;
use tracing::info;

const MAX_OBSERVATION_CHARS: usize = 500;

/// Logs the messages each agent step appended to the history.
pub struct MessageLogger {
    name: String,
    logged: usize,
    step: u32,
}

impl MessageLogger {
    pub fn new(name: &str) -> Box<Self> {
        Box::new(Self {
            name: name.to_string(),
            logged: 0,
            step: 0,
        })
    }

    fn display_message(&self, message: &Message) {
        match message {
            Message::Tool { name, result, .. } => {
                let observation = truncate(result, MAX_OBSERVATION_CHARS);
                info!(agent = %self.name, step = self.step, tool = %name, "observation: {}", observation);
            }
            other => info!(agent = %self.name, step = self.step, "{}", other),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl Callback for MessageLogger {
    async fn call(&mut self, messages: Vec<Message>) -> Result<Vec<Message>> {
        // history is append-only, anything shorter means it was replaced
        if messages.len() < self.logged {
            info!(agent = %self.name, "[history replaced]");
            self.logged = 0;
        }

        for message in &messages[self.logged..] {
            self.display_message(message);
        }

        self.step += 1;
        self.logged = messages.len();

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageLogger, truncate};
    use crate::Result;
    use crate::callbacks::Callback;
    use crate::llm::Message;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ääää", 2), "ää...");
    }

    #[tokio::test]
    async fn test_logger_tracks_logged_prefix() -> Result<()> {
        let mut logger = MessageLogger::new("test");

        let messages = vec![Message::User("hi".to_string())];
        let messages = logger.call(messages).await?;
        assert_eq!(logger.logged, 1);
        assert_eq!(logger.step, 1);

        let mut messages = messages;
        messages.push(Message::Assistant("hello".into(), vec![]));
        let messages = logger.call(messages).await?;
        assert_eq!(logger.logged, 2);
        assert_eq!(messages.len(), 2);

        logger.call(vec![]).await?;
        assert_eq!(logger.logged, 0);
        assert_eq!(logger.step, 3);

        Ok(())
    }
}
