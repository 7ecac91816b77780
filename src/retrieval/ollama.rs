use async_trait::async_trait;
use rig::client::Nothing;
use rig::embeddings::EmbeddingModel;
use rig::prelude::EmbeddingsClient;
use rig::providers::ollama;
use tracing::error;

use crate::errors::AppError;
use crate::retrieval::Embedder;

/// [`Embedder`] backed by an Ollama embedding model through rig.
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: ollama::Client,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Result<Self, AppError> {
        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(base_url)
            .build()
            .map_err(|e| AppError::Unexpected(format!("Failed to build Ollama client: {e}")))?;
        Ok(Self { client, model: model.to_string() })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let model = self.client.embedding_model(&self.model);
        let embedding = model.embed_text(text).await.map_err(|e| {
            error!("Embedding with model {} failed: {e}", self.model);
            AppError::EmbeddingError { message: e.to_string() }
        })?;
        Ok(embedding.vec.into_iter().map(|v| v as f32).collect())
    }
}
