pub mod ollama;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::TokenUsage;

pub use ollama::OllamaEngine;
pub use prompt::{PromptAssembler, PromptMessage, PromptRole};

/// Stop sequences that keep the model from writing the next user turn.
pub const STOP_SEQUENCES: [&str; 3] = ["\nUsuário:", "###", "</s>"];

pub const FALLBACK_ANSWER: &str =
    "Ocorreu um erro ao processar sua solicitação. Por favor, tente novamente.";
pub const EMPTY_ANSWER: &str =
    "Para ajudá-lo melhor, preciso de mais informações. Pode descrever o problema em detalhes?";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_tokens: u64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self { temperature: 0.3, top_p: 0.7, top_k: 30, max_tokens: 900 }
    }
}

/// Raw engine output: the generated text of every choice plus token usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineResponse {
    pub choices: Vec<String>,
    pub usage: TokenUsage,
}

/// The local inference engine behind the invoker.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn complete(
        &self,
        messages: &[PromptMessage],
        params: &SamplingParams,
        stop: &[&str],
    ) -> Result<EngineResponse, AppError>;
}

/// Failure carried inside a [`Completion`]; never returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum InvocationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("model error: {0}")]
    Model(String),
}

/// Normalized result of one invocation. `answer` is always displayable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub answer: String,
    pub session_id: String,
    pub usage: TokenUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
}

impl Completion {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn failed(session_id: String, error: InvocationError, answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            session_id,
            usage: TokenUsage::default(),
            error: Some(error),
        }
    }
}

fn fresh_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Stateless wrapper around an [`InferenceEngine`] that turns every outcome
/// into a [`Completion`].
#[derive(Clone)]
pub struct ModelInvoker {
    engine: Arc<dyn InferenceEngine>,
    defaults: SamplingParams,
}

impl ModelInvoker {
    pub fn new(engine: Arc<dyn InferenceEngine>, defaults: SamplingParams) -> Self {
        Self { engine, defaults }
    }

    pub fn defaults(&self) -> &SamplingParams {
        &self.defaults
    }

    /// Sends `messages` to the engine. An empty `session_id` means the chat
    /// is not bound yet and a fresh id is generated.
    pub async fn invoke(
        &self,
        messages: &[PromptMessage],
        session_id: &str,
        params: Option<SamplingParams>,
    ) -> Completion {
        let session_id = if session_id.is_empty() {
            fresh_session_id()
        } else {
            session_id.to_string()
        };

        if messages.is_empty() {
            warn!("Rejected invocation with an empty message list");
            return Completion::failed(
                session_id,
                InvocationError::InvalidInput("message list is empty".to_string()),
                FALLBACK_ANSWER,
            );
        }

        let params = params.unwrap_or(self.defaults);
        debug!(
            messages = messages.len(),
            temperature = params.temperature,
            max_tokens = params.max_tokens,
            "Invoking inference engine"
        );

        let response = match self.engine.complete(messages, &params, &STOP_SEQUENCES).await {
            Ok(r) => r,
            Err(e) => {
                error!("Inference failed for session {session_id}: {e}");
                return Completion::failed(
                    session_id,
                    InvocationError::Model(e.to_string()),
                    FALLBACK_ANSWER,
                );
            }
        };

        let Some(text) = response.choices.first() else {
            error!("Inference engine returned no choices for session {session_id}");
            return Completion::failed(
                session_id,
                InvocationError::Model("engine returned no choices".to_string()),
                FALLBACK_ANSWER,
            );
        };

        let answer = text.trim();
        if answer.is_empty() {
            warn!("Inference engine returned empty text for session {session_id}");
            let mut completion = Completion::failed(
                session_id,
                InvocationError::Model("engine returned empty text".to_string()),
                EMPTY_ANSWER,
            );
            completion.usage = response.usage;
            return completion;
        }

        Completion {
            answer: answer.to_string(),
            session_id,
            usage: response.usage,
            error: None,
        }
    }
}
