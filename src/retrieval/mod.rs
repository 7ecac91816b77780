pub mod builder;
pub mod chunker;
pub mod index;
pub mod ollama;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::errors::AppError;

pub use index::{IndexedChunk, VectorIndex};
pub use ollama::OllamaEmbedder;

/// Returned instead of chunks when no knowledge base is loaded.
pub const UNAVAILABLE: &str = "Base de conhecimento não disponível.";
pub const CHUNK_SEPARATOR: &str = "\n\n---\n\n";
pub const DEFAULT_TOP_K: usize = 4;

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

/// Similarity lookup over the persisted knowledge base.
#[derive(Clone)]
pub struct RetrievalAdapter {
    store: Option<(Arc<VectorIndex>, Arc<dyn Embedder>)>,
}

impl RetrievalAdapter {
    pub fn new(index: VectorIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self { store: Some((Arc::new(index), embedder)) }
    }

    /// An adapter with no index; every lookup yields [`UNAVAILABLE`].
    pub fn unavailable() -> Self {
        Self { store: None }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// Top-`k` chunks for `query`, most similar first, joined by
    /// [`CHUNK_SEPARATOR`]. A blank query skips embedding and returns the
    /// first `k` chunks in stored order.
    pub async fn retrieve(&self, query: &str, k: usize) -> String {
        let Some((index, embedder)) = &self.store else {
            return UNAVAILABLE.to_string();
        };
        let k = k.max(1);

        if query.trim().is_empty() {
            return join_chunks(index.head(k).map(|c| c.text.as_str()));
        }

        let vector = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to embed retrieval query: {e}");
                return UNAVAILABLE.to_string();
            }
        };

        let hits = index.search(&vector, k);
        debug!(hits = hits.len(), top_score = ?hits.first().map(|h| h.1), "Retrieved chunks");
        join_chunks(hits.into_iter().map(|(c, _)| c.text.as_str()))
    }
}

fn join_chunks<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    texts.collect::<Vec<_>>().join(CHUNK_SEPARATOR)
}
