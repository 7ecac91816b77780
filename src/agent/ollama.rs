use async_trait::async_trait;
use rig::client::Nothing;
use rig::completion::CompletionModel;
use rig::message::{AssistantContent, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::ollama;
use serde_json::json;
use tracing::error;

use crate::agent::prompt::{PromptMessage, PromptRole};
use crate::agent::{EngineResponse, InferenceEngine, SamplingParams};
use crate::errors::AppError;
use crate::models::TokenUsage;

/// Splits an assembled message list into the rig request parts: the system
/// preamble, the replayed history and the final user prompt.
fn split_prompt(
    messages: &[PromptMessage],
) -> Result<(String, Vec<RigMessage>, String), AppError> {
    let (last, earlier) = messages.split_last().ok_or_else(|| AppError::InferenceError {
        message: "no messages to send".to_string(),
    })?;
    if last.role != PromptRole::User {
        return Err(AppError::InferenceError {
            message: "prompt must end with a user turn".to_string(),
        });
    }

    let mut preamble = Vec::new();
    let mut history = Vec::with_capacity(earlier.len());
    for m in earlier {
        match m.role {
            PromptRole::System => preamble.push(m.content.as_str()),
            PromptRole::User => history.push(RigMessage::user(&m.content)),
            PromptRole::Assistant => history.push(RigMessage::assistant(&m.content)),
        }
    }
    Ok((preamble.join("\n\n"), history, last.content.clone()))
}

/// Extra Ollama `options` merged by rig next to `temperature`. Ollama reads
/// the output limit from `num_predict`, not `max_tokens`.
fn sampling_options(params: &SamplingParams, stop: &[&str]) -> serde_json::Value {
    json!({
        "top_p": params.top_p,
        "top_k": params.top_k,
        "num_predict": params.max_tokens,
        "stop": stop,
    })
}

/// [`InferenceEngine`] backed by a local Ollama server through rig.
#[derive(Clone)]
pub struct OllamaEngine {
    client: ollama::Client,
    base_url: String,
    model: String,
}

impl OllamaEngine {
    pub fn new(base_url: &str, model: &str) -> Result<Self, AppError> {
        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(base_url)
            .build()
            .map_err(|e| AppError::Unexpected(format!("Failed to build Ollama client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }

    fn classify(&self, msg: String) -> AppError {
        if msg.contains("Connection refused") || msg.contains("connect") {
            AppError::OllamaUnavailable { host: self.base_url.clone() }
        } else if msg.contains("model") {
            AppError::ModelNotFound { model_name: self.model.clone() }
        } else {
            AppError::InferenceError { message: msg }
        }
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    async fn complete(
        &self,
        messages: &[PromptMessage],
        params: &SamplingParams,
        stop: &[&str],
    ) -> Result<EngineResponse, AppError> {
        let (preamble, history, prompt) = split_prompt(messages)?;
        let model = self.client.completion_model(&self.model);

        let response = model
            .completion_request(RigMessage::user(prompt))
            .preamble(preamble)
            .messages(history)
            .temperature(params.temperature)
            .additional_params(sampling_options(params, stop))
            .send()
            .await
            .map_err(|e| {
                error!("Ollama inference failed with model {}: {e}", self.model);
                self.classify(e.to_string())
            })?;

        let text: Vec<String> = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect();

        Ok(EngineResponse {
            choices: if text.is_empty() { Vec::new() } else { vec![text.concat()] },
            usage: TokenUsage {
                prompt_tokens: response.usage.input_tokens,
                completion_tokens: response.usage.output_tokens,
                total_tokens: response.usage.total_tokens,
            },
        })
    }
}
