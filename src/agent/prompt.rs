use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageRole};

/// Role tag on a message sent to the inference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl From<MessageRole> for PromptRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => PromptRole::User,
            MessageRole::Assistant => PromptRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: PromptRole::Assistant, content: content.into() }
    }
}

impl From<&Message> for PromptMessage {
    fn from(m: &Message) -> Self {
        Self { role: m.role.into(), content: m.content.clone() }
    }
}

/// Joins retrieved context and the user's question: context first, question last.
pub fn with_context(context: &str, user_message: &str) -> String {
    format!("{context}\n\n{user_message}")
}

/// Turns a user message, the prior turns and optional context into the
/// message sequence sent to the engine. The system instruction is fixed for
/// the lifetime of the assembler.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_instruction: Arc<str>,
}

impl PromptAssembler {
    pub fn new(system_instruction: impl Into<Arc<str>>) -> Self {
        Self { system_instruction: system_instruction.into() }
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn assemble(
        &self,
        user_message: &str,
        history: &[Message],
        retrieved_context: &str,
    ) -> Vec<PromptMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(PromptMessage::system(&*self.system_instruction));

        messages.extend(
            history
                .iter()
                .filter(|m| !m.content.trim().is_empty())
                .map(PromptMessage::from),
        );

        let final_turn = if retrieved_context.trim().is_empty() {
            user_message.to_string()
        } else {
            with_context(retrieved_context, user_message)
        };
        if !final_turn.trim().is_empty() {
            messages.push(PromptMessage::user(final_turn));
        }

        messages
    }
}
