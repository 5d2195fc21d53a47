use serde::{Deserialize, Serialize};

use slide_protocol::{ChatMessage, Role};

/// Transcript of one project's conversation, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    items: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Returns a clone of the contents in the transcript.
    pub fn contents(&self) -> Vec<ChatMessage> {
        self.items.clone()
    }

    /// The most recent `max` messages, as sent with a request.
    pub fn window(&self, max: usize) -> &[ChatMessage] {
        let start = self.items.len().saturating_sub(max);
        &self.items[start..]
    }

    /// Record items in the conversation history
    pub fn record_items<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        for item in items {
            self.add_item(item);
        }
    }

    /// Add a single item to the history
    pub fn add_item(&mut self, item: ChatMessage) {
        if is_api_message(&item) {
            self.items.push(item);
        }
    }

    /// Replaces the transcript, e.g. with a reconciled history.
    pub fn replace(&mut self, items: Vec<ChatMessage>) {
        self.items.clear();
        self.record_items(items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// System prompts are rebuilt per request and never stored.
fn is_api_message(item: &ChatMessage) -> bool {
    item.role != Role::System && !(item.content.trim().is_empty() && item.images.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_system_and_empty_messages() {
        let mut history = ConversationHistory::new();
        history.record_items([
            ChatMessage {
                role: Role::System,
                content: "rules".into(),
                images: Vec::new(),
            },
            ChatMessage::user("   "),
            ChatMessage::user("").with_images(vec!["aGk=".into()]),
            ChatMessage::assistant("ok"),
        ]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn window_keeps_the_newest() {
        let mut history = ConversationHistory::new();
        history.record_items((1..=5).map(|i| ChatMessage::user(format!("m{i}"))));
        let window = history.window(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "m4");
        assert_eq!(history.window(10).len(), 5);
    }
}
