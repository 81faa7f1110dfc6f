//! Conversation history with a bounded window
//!
//! The history starts with a seeded assistant greeting, only ever grows at the
//! back, and is truncated from the front once it holds more than `limit`
//! messages. The greeting counts toward the limit like any other message.

use super::types::Message;
use crate::llm::ModelId;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Opening line of every conversation
pub const DEFAULT_GREETING: &str = "Hi! I'm your AI friend. I'm here to listen and chat with you about anything on your mind. How are you feeling today?";

/// Number of messages kept in history
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: VecDeque<Message>,
    model: ModelId,
    limit: usize,
    greeting: String,
}

impl Conversation {
    /// Create a conversation seeded with the default greeting
    pub fn new(model: ModelId, limit: usize) -> Self {
        Self::with_greeting(model, limit, DEFAULT_GREETING)
    }

    /// Create a conversation seeded with a custom greeting
    ///
    /// A limit of zero is raised to one so the greeting always fits.
    pub fn with_greeting(model: ModelId, limit: usize, greeting: impl Into<String>) -> Self {
        let limit = limit.max(1);
        let mut conversation = Self {
            messages: VecDeque::with_capacity(limit + 1),
            model,
            limit,
            greeting: greeting.into(),
        };
        conversation.seed();
        conversation
    }

    fn seed(&mut self) {
        self.messages.clear();
        self.messages
            .push_back(Message::assistant(self.greeting.clone()));
    }

    /// Append a user message
    pub fn append_user(&mut self, content: impl Into<String>) -> Message {
        self.append(Message::user(content))
    }

    /// Append an assistant message (real answer or fallback alike)
    pub fn append_assistant(&mut self, content: impl Into<String>) -> Message {
        self.append(Message::assistant(content))
    }

    fn append(&mut self, message: Message) -> Message {
        self.messages.push_back(message.clone());
        self.trim();
        message
    }

    fn trim(&mut self) {
        while self.messages.len() > self.limit {
            if let Some(evicted) = self.messages.pop_front() {
                debug!("Evicted oldest {} message from history", evicted.role());
            }
        }
    }

    /// Ordered copy of the history, safe to hold across an await
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    /// Truncate back to the single seeded greeting
    pub fn reset(&mut self) {
        self.seed();
    }

    /// Switch model and start over
    pub fn reset_with_model(&mut self, model: ModelId) {
        self.model = model;
        self.seed();
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the greeting is never removed by a reset
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }
}

/// Conversation shared between the turn controller (the only writer) and
/// readers such as a front end.
#[derive(Debug, Clone)]
pub struct SharedConversation {
    inner: Arc<RwLock<Conversation>>,
}

impl SharedConversation {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            inner: Arc::new(RwLock::new(conversation)),
        }
    }

    /// Get a read lock on the conversation
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Conversation> {
        self.inner.read()
    }

    /// Get a write lock on the conversation
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Conversation> {
        self.inner.write()
    }

    /// Get a snapshot of the history (no lock held after return)
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.read().snapshot()
    }

    pub fn model(&self) -> ModelId {
        self.inner.read().model()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn last(&self) -> Option<Message> {
        self.inner.read().last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;

    #[test]
    fn test_seeded_with_greeting() {
        let conversation = Conversation::new(ModelId::DeepseekChat, DEFAULT_HISTORY_LIMIT);
        assert_eq!(conversation.len(), 1);
        let first = conversation.last().unwrap();
        assert_eq!(first.role(), Role::Assistant);
        assert_eq!(first.content(), DEFAULT_GREETING);
    }

    #[test]
    fn test_bound_evicts_oldest_first() {
        let mut conversation = Conversation::new(ModelId::DeepseekChat, 10);
        for i in 0..12 {
            conversation.append_user(format!("Message {}", i));
            assert!(conversation.len() <= 10);
        }

        let history = conversation.snapshot();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].content(), "Message 2");
        assert_eq!(history[9].content(), "Message 11");
    }

    #[test]
    fn test_greeting_counts_toward_limit() {
        let mut conversation = Conversation::new(ModelId::DeepseekChat, 3);
        conversation.append_user("one");
        conversation.append_assistant("two");
        assert_eq!(conversation.snapshot()[0].content(), DEFAULT_GREETING);

        conversation.append_user("three");
        let history = conversation.snapshot();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content(), "one");
    }

    #[test]
    fn test_reset_keeps_only_greeting() {
        let mut conversation = Conversation::new(ModelId::DeepseekChat, 10);
        conversation.append_user("hello");
        conversation.append_assistant("hi there");

        conversation.reset();
        for _ in 0..3 {
            let history = conversation.snapshot();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].content(), DEFAULT_GREETING);
        }
    }

    #[test]
    fn test_reset_with_model() {
        let mut conversation = Conversation::new(ModelId::DeepseekChat, 10);
        conversation.append_user("hello");

        conversation.reset_with_model(ModelId::Glm4);
        assert_eq!(conversation.model(), ModelId::Glm4);
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_zero_limit_still_holds_greeting() {
        let conversation = Conversation::with_greeting(ModelId::Glm4, 0, "Hello!");
        assert_eq!(conversation.limit(), 1);
        assert_eq!(conversation.last().unwrap().content(), "Hello!");
    }

    #[test]
    fn test_snapshot_is_independent() {
        let shared = SharedConversation::new(Conversation::new(ModelId::DeepseekChat, 10));

        let before = shared.snapshot();
        shared.write().append_user("after the snapshot");

        assert_eq!(before.len(), 1);
        assert_eq!(shared.len(), 2);
        assert_eq!(shared.last().unwrap().content(), "after the snapshot");
    }
}
