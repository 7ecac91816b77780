use std::sync::Arc;

use rag_chat::agent::{ModelInvoker, OllamaEngine, PromptAssembler};
use rag_chat::config::AppConfig;
use rag_chat::retrieval::{OllamaEmbedder, RetrievalAdapter, VectorIndex};
use rag_chat::routes::{router, AppState};
use rag_chat::service::ChatService;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_chat=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // ── Inference engine ──────────────────────────────────────────────────────
    let engine = OllamaEngine::new(&config.ollama_base_url, &config.chat_model)?;
    info!(
        "Using chat model {} at {}",
        config.chat_model, config.ollama_base_url
    );
    let invoker = ModelInvoker::new(Arc::new(engine), config.sampling);
    let assembler = PromptAssembler::new(config.system_instruction.as_str());

    // ── Knowledge base ────────────────────────────────────────────────────────
    let retrieval = match VectorIndex::load_if_present(&config.index_path) {
        Ok(Some(index)) => {
            if index.embedding_model != config.embedding_model {
                warn!(
                    "Index at {} was built with {} but EMBEDDING_MODEL is {}",
                    config.index_path.display(),
                    index.embedding_model,
                    config.embedding_model
                );
            }
            info!("Loaded {} chunks from {}", index.len(), config.index_path.display());
            let embedder = OllamaEmbedder::new(&config.ollama_base_url, &config.embedding_model)?;
            RetrievalAdapter::new(index, Arc::new(embedder))
        }
        Ok(None) => {
            warn!(
                "No index at {}; run build_index to enable the knowledge base",
                config.index_path.display()
            );
            RetrievalAdapter::unavailable()
        }
        Err(e) => {
            error!("Failed to load index: {e}");
            RetrievalAdapter::unavailable()
        }
    };

    let service = ChatService::new(invoker, assembler, retrieval, config.retrieval_top_k);
    let state = AppState::new(service, config.username.as_str(), config.password.as_str());
    let app = router(state);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
