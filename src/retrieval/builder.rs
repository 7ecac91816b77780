use std::path::Path;
use std::time::Instant;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::documents::{read_path, DocumentKind};
use crate::errors::AppError;
use crate::retrieval::chunker::{split_text, ChunkerConfig};
use crate::retrieval::{Embedder, IndexedChunk, VectorIndex};

/// Embedding requests kept in flight while building.
const EMBED_CONCURRENCY: usize = 4;

/// Reads every PDF/TXT file under `dir`, chunks it, embeds the chunks and
/// returns the resulting index. Unreadable files are skipped with a warning.
pub async fn build_index(
    dir: &Path,
    embedder: &dyn Embedder,
    embedding_model: &str,
    chunking: ChunkerConfig,
) -> Result<VectorIndex, AppError> {
    if !dir.is_dir() {
        return Err(AppError::index_io(
            dir.display().to_string(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "knowledge base directory not found"),
        ));
    }

    let started = Instant::now();
    let mut pieces: Vec<(String, String)> = Vec::new();
    let mut documents = 0usize;

    let entries = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !matches!(DocumentKind::from_file_name(&name), DocumentKind::Pdf | DocumentKind::Txt) {
            continue;
        }
        match read_path(path) {
            Ok(text) => {
                info!("Loaded {name}");
                documents += 1;
                pieces.extend(split_text(&text, chunking).into_iter().map(|c| (name.clone(), c)));
            }
            Err(e) => warn!("Failed to load {}: {e}", path.display()),
        }
    }

    if documents == 0 {
        return Err(AppError::EmptyKnowledgeBase { dir: dir.display().to_string() });
    }
    info!(
        documents,
        chunks = pieces.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Documents loaded and split"
    );

    let started = Instant::now();
    let chunks: Vec<IndexedChunk> = stream::iter(pieces)
        .map(|(source, text)| async move {
            let embedding = embedder.embed(&text).await?;
            Ok::<_, AppError>(IndexedChunk { text, source, embedding })
        })
        .buffered(EMBED_CONCURRENCY)
        .try_collect()
        .await?;
    info!(
        chunks = chunks.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Embeddings computed"
    );

    let mut index = VectorIndex::new(embedding_model);
    for chunk in chunks {
        index.push(chunk);
    }
    Ok(index)
}
