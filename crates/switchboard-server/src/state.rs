//! Application State

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

use switchboard_core::{InMemoryMetrics, LlmProvider, Message, TurnRunner};

/// Conversations kept before the least recently used one is evicted
pub const MAX_CONVERSATIONS: usize = 1024;

/// Messages kept per conversation; older ones are dropped first
pub const MAX_HISTORY_MESSAGES: usize = 200;

#[derive(Default)]
struct Store {
    histories: HashMap<String, Vec<Message>>,
    /// Least recently used first
    recency: VecDeque<String>,
}

impl Store {
    fn touch(&mut self, id: &str) {
        if let Some(pos) = self.recency.iter().position(|known| known == id) {
            self.recency.remove(pos);
        }
        self.recency.push_back(id.to_string());
    }
}

/// Bounded conversation histories by id
#[derive(Clone)]
pub struct Conversations {
    inner: Arc<Mutex<Store>>,
    max_conversations: usize,
    max_messages: usize,
}

impl Default for Conversations {
    fn default() -> Self {
        Self::with_limits(MAX_CONVERSATIONS, MAX_HISTORY_MESSAGES)
    }
}

impl Conversations {
    pub fn with_limits(max_conversations: usize, max_messages: usize) -> Self {
        Self {
            inner: Arc::default(),
            max_conversations: max_conversations.max(1),
            max_messages,
        }
    }

    pub async fn history(&self, id: &str) -> Vec<Message> {
        self.inner
            .lock()
            .await
            .histories
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append one turn's new messages. Concurrent turns on the same id both
    /// land; neither overwrites the other.
    pub async fn append(&self, id: &str, messages: Vec<Message>) {
        let mut store = self.inner.lock().await;

        let history = store.histories.entry(id.to_string()).or_default();
        history.extend(messages);
        let excess = history.len().saturating_sub(self.max_messages);
        history.drain(..excess);

        store.touch(id);
        while store.recency.len() > self.max_conversations {
            if let Some(evicted) = store.recency.pop_front() {
                tracing::debug!(conversation = %evicted, "Evicting conversation");
                store.histories.remove(&evicted);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.histories.len()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// LLM provider behind every agent
    pub provider: Arc<dyn LlmProvider>,

    /// Agent and tool registries plus the turn loop
    pub runner: Arc<TurnRunner>,

    /// Per-agent call statistics fed by the dispatcher
    pub metrics: Arc<InMemoryMetrics>,

    pub conversations: Conversations,
}

impl AppState {
    pub fn new(provider: Arc<dyn LlmProvider>, runner: TurnRunner, metrics: Arc<InMemoryMetrics>) -> Self {
        Self {
            provider,
            runner: Arc::new(runner),
            metrics,
            conversations: Conversations::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_turns_both_kept() {
        let conversations = Conversations::default();
        let first = conversations.clone();
        let second = conversations.clone();

        tokio::join!(
            first.append("c1", vec![Message::user("one"), Message::assistant("1")]),
            second.append("c1", vec![Message::user("two"), Message::assistant("2")]),
        );

        let history = conversations.history("c1").await;
        assert_eq!(history.len(), 4);
        assert!(history.iter().any(|m| m.content == "one"));
        assert!(history.iter().any(|m| m.content == "two"));
    }

    #[tokio::test]
    async fn test_least_recent_conversation_evicted() {
        let conversations = Conversations::with_limits(2, 10);
        conversations.append("a", vec![Message::user("a")]).await;
        conversations.append("b", vec![Message::user("b")]).await;
        conversations.append("a", vec![Message::user("a again")]).await;
        conversations.append("c", vec![Message::user("c")]).await;

        assert_eq!(conversations.len().await, 2);
        assert!(conversations.history("b").await.is_empty());
        assert_eq!(conversations.history("a").await.len(), 2);
    }

    #[tokio::test]
    async fn test_history_trimmed_oldest_first() {
        let conversations = Conversations::with_limits(4, 3);
        let messages = (0..5).map(|i| Message::user(i.to_string())).collect();
        conversations.append("long", messages).await;

        let contents: Vec<_> = conversations
            .history("long")
            .await
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["2", "3", "4"]);
    }
}
