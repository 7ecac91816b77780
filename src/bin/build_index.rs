use std::time::Instant;

use anyhow::Context;
use rag_chat::config::AppConfig;
use rag_chat::retrieval::builder::build_index;
use rag_chat::retrieval::chunker::ChunkerConfig;
use rag_chat::retrieval::OllamaEmbedder;
use tracing::info;

/// Rebuilds the knowledge-base index from `KNOWLEDGE_BASE_DIR` and writes it
/// to `INDEX_PATH`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_chat=info,build_index=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let started = Instant::now();
    info!(
        "Indexing {} with {}",
        config.knowledge_base_dir.display(),
        config.embedding_model
    );

    let embedder = OllamaEmbedder::new(&config.ollama_base_url, &config.embedding_model)?;
    let chunking = ChunkerConfig { chunk_size: config.chunk_size, overlap: config.chunk_overlap };
    let index = build_index(
        &config.knowledge_base_dir,
        &embedder,
        embedder.model_name(),
        chunking,
    )
    .await
    .with_context(|| format!("building index from {}", config.knowledge_base_dir.display()))?;

    index
        .save(&config.index_path)
        .with_context(|| format!("saving index to {}", config.index_path.display()))?;

    info!(
        chunks = index.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Index written to {}",
        config.index_path.display()
    );
    Ok(())
}
