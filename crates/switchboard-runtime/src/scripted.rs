//! Static provider
//!
//! Replays a fixed list of completions. Once the list runs out the last
//! reply repeats. With no replies at all it echoes the last user message.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use switchboard_core::{
    error::Result,
    message::{Message, Role},
    provider::{Completion, GenerationOptions, LlmProvider},
};

#[derive(Debug, Default)]
pub struct StaticProvider {
    replies: Mutex<VecDeque<String>>,
}

impl StaticProvider {
    /// Echo the latest user message back
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }

    fn next_reply(&self, messages: &[Message]) -> String {
        let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        match replies.len() {
            0 => messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| format!("FINAL ANSWER: {}", m.content))
                .unwrap_or_default(),
            1 => replies[0].clone(),
            _ => replies.pop_front().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl LlmProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        Ok(Completion::text(self.next_reply(messages), &options.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_repeats_last() {
        let provider = StaticProvider::new(["one", "two"]);
        let opts = GenerationOptions::default();
        let messages = [Message::user("hi")];

        for expected in ["one", "two", "two"] {
            let completion = provider.complete(&messages, &opts).await.unwrap();
            assert_eq!(completion.content, expected);
        }
    }

    #[tokio::test]
    async fn test_echo_uses_latest_user_message() {
        let provider = StaticProvider::echo();
        let messages = [
            Message::system("sys"),
            Message::user("first"),
            Message::user("second"),
        ];
        let completion = provider
            .complete(&messages, &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.content, "FINAL ANSWER: second");
        assert!(provider.health_check().await.unwrap());
    }
}
