use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub text: String,
    /// File the chunk was extracted from.
    pub source: String,
    pub embedding: Vec<f32>,
}

/// Flat similarity index over embedded text chunks, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    pub embedding_model: String,
    pub chunks: Vec<IndexedChunk>,
}

/// Cosine similarity between two vectors; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex {
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self { embedding_model: embedding_model.into(), chunks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn push(&mut self, chunk: IndexedChunk) {
        self.chunks.push(chunk);
    }

    /// Returns up to `k` chunks ordered by descending similarity to `query`.
    /// Ties keep index order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(&IndexedChunk, f32)> {
        let mut scored: Vec<(&IndexedChunk, f32)> = self
            .chunks
            .iter()
            .map(|c| (c, cosine_similarity(query, &c.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// The first `k` chunks in stored order.
    pub fn head(&self, k: usize) -> impl Iterator<Item = &IndexedChunk> {
        self.chunks.iter().take(k)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AppError::index_io(path.display().to_string(), e))?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Loads the index if the file exists; `Ok(None)` when it does not.
    pub fn load_if_present(path: &Path) -> Result<Option<Self>, AppError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::index_io(parent.display().to_string(), e))?;
        }
        let data = serde_json::to_string(self)?;
        std::fs::write(path, data).map_err(|e| AppError::index_io(path.display().to_string(), e))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn chunk(text: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk { text: text.to_string(), source: "doc.txt".to_string(), embedding }
    }

    fn sample() -> VectorIndex {
        let mut index = VectorIndex::new("all-minilm");
        index.push(chunk("vpn", vec![1.0, 0.0]));
        index.push(chunk("firewall", vec![0.0, 1.0]));
        index.push(chunk("firewall e vpn", vec![0.7, 0.7]));
        index
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn search_orders_by_similarity_and_truncates() {
        let index = sample();
        let hits = index.search(&[0.0, 1.0], 2);
        let texts: Vec<&str> = hits.iter().map(|(c, _)| c.text.as_str()).collect();
        assert_eq!(texts, vec!["firewall", "firewall e vpn"]);
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn save_then_load_preserves_chunks() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("index.json");
        let index = sample();
        index.save(&path).unwrap();
        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempdir().expect("tempdir");
        assert!(VectorIndex::load_if_present(&dir.path().join("none.json")).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_a_format_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(VectorIndex::load(&path), Err(AppError::IndexFormat(_))));
    }
}
