use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::new_id;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn in a conversation. `audio_url` is reserved for voice replies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::stamped(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::stamped(MessageRole::Assistant, content)
    }

    fn stamped(role: MessageRole, content: impl Into<String>) -> Self {
        Self { id: new_id(), role, content: content.into(), timestamp: Utc::now(), audio_url: None }
    }
}

/// One visitor conversation, unique per (agent_slug, session_id) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    pub id: String,
    pub agent_slug: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_thread_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default)]
pub struct NewChatThread {
    pub agent_slug: String,
    pub session_id: String,
    pub openai_thread_id: Option<String>,
}

impl ChatThread {
    pub fn open(new: NewChatThread) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            agent_slug: new.agent_slug,
            session_id: new.session_id,
            openai_thread_id: new.openai_thread_id,
            messages: Vec::new(),
            created_at: now,
            last_message_at: now,
        }
    }

    /// Appends a turn; `last_message_at` never moves backwards.
    pub fn append(&mut self, message: ChatMessage) {
        if message.timestamp > self.last_message_at {
            self.last_message_at = message.timestamp;
        }
        self.messages.push(message);
    }
}
