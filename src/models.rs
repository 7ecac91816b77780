use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Role of a message stored in a chat log. The system role only exists at
/// prompt-assembly time and is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub edited: bool,
    /// File name of a document attached to this user turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            edited: false,
            attachment: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn with_attachment(mut self, file_name: impl Into<String>) -> Self {
        self.attachment = Some(file_name.into());
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

/// Token counts reported by the inference engine for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One conversation thread. `id` stays empty until the first completion binds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub usage: TokenUsage,
    /// Set once the title was derived from an answer or chosen by the user.
    #[serde(default)]
    pub titled: bool,
}

impl Chat {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            messages: Vec::new(),
            created_at: Utc::now(),
            usage: TokenUsage::default(),
            titled: false,
        }
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_user())
    }

    pub fn count_role(&self, role: MessageRole) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}

/// Ordered chats plus the active pointer. Whenever `chats` is non-empty the
/// pointer refers to a valid index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatHistory {
    chats: Vec<Chat>,
    active: Option<usize>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active(&self) -> Option<&Chat> {
        self.active.and_then(|i| self.chats.get(i))
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Chat, AppError> {
        self.chats.get_mut(index).ok_or(AppError::ChatNotFound { index })
    }

    /// Appends `chat` and makes it the active one.
    pub fn push_active(&mut self, chat: Chat) -> usize {
        self.chats.push(chat);
        let index = self.chats.len() - 1;
        self.active = Some(index);
        index
    }

    pub fn activate(&mut self, index: usize) -> Result<&Chat, AppError> {
        if index >= self.chats.len() {
            return Err(AppError::ChatNotFound { index });
        }
        self.active = Some(index);
        Ok(&self.chats[index])
    }

    /// Removes chat `index` and re-points `active` at the same logical chat,
    /// or at the chat now occupying the same (or prior) slot when the active
    /// one was removed. Leaves `active` as `None` only if no chats remain.
    pub fn remove(&mut self, index: usize) -> Result<Chat, AppError> {
        if index >= self.chats.len() {
            return Err(AppError::ChatNotFound { index });
        }
        let removed = self.chats.remove(index);
        self.active = match self.active {
            _ if self.chats.is_empty() => None,
            Some(active) if active == index => Some(index.min(self.chats.len() - 1)),
            Some(active) if index < active => Some(active - 1),
            other => other,
        };
        Ok(removed)
    }
}

/// Where retrieved context comes from when augmentation is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    Upload,
    #[default]
    DirectText,
    IndexedStore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub source: RetrievalSource,
}
