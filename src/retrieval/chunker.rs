//! Recursive character splitter used when building the knowledge base.

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, overlap: 150 }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits `text` into chunks of at most `chunk_size` characters, preferring
/// paragraph, then line, then word boundaries. Consecutive chunks share up
/// to `overlap` characters of trailing context.
pub fn split_text(text: &str, cfg: ChunkerConfig) -> Vec<String> {
    let size = cfg.chunk_size.max(1);
    let overlap = cfg.overlap.min(size / 2);
    split_recursive(text, &SEPARATORS, size, overlap)
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn split_recursive(text: &str, separators: &[&str], size: usize, overlap: usize) -> Vec<String> {
    if char_len(text) <= size {
        return vec![text.to_string()];
    }

    // First separator present in the text; "" always matches.
    let pos = separators
        .iter()
        .position(|s| s.is_empty() || text.contains(s))
        .unwrap_or(separators.len().saturating_sub(1));
    let Some(sep) = separators.get(pos).copied() else {
        return vec![text.to_string()];
    };
    let finer = &separators[pos + 1..];

    let pieces: Vec<String> = if sep.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(sep).map(str::to_string).collect()
    };

    let mut chunks = Vec::new();
    let mut fitting = Vec::new();
    for piece in pieces {
        if char_len(&piece) <= size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            chunks.extend(merge(std::mem::take(&mut fitting), sep, size, overlap));
        }
        if finer.is_empty() {
            chunks.push(piece);
        } else {
            chunks.extend(split_recursive(&piece, finer, size, overlap));
        }
    }
    if !fitting.is_empty() {
        chunks.extend(merge(fitting, sep, size, overlap));
    }
    chunks
}

/// Greedily packs pieces into windows of at most `size` characters, carrying
/// up to `overlap` characters of the previous window into the next.
fn merge(pieces: Vec<String>, sep: &str, size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(sep);
    let mut chunks = Vec::new();
    let mut window: Vec<String> = Vec::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(&piece);
        let joiner = if window.is_empty() { 0 } else { sep_len };

        if total + len + joiner > size && !window.is_empty() {
            chunks.push(window.join(sep));
            loop {
                let joiner = if window.is_empty() { 0 } else { sep_len };
                let too_long = total > overlap || (total > 0 && total + len + joiner > size);
                if !too_long || window.is_empty() {
                    break;
                }
                let first = window.remove(0);
                let dropped = char_len(&first) + if window.is_empty() { 0 } else { sep_len };
                total = total.saturating_sub(dropped);
            }
        }

        let joiner = if window.is_empty() { 0 } else { sep_len };
        window.push(piece);
        total += len + joiner;
    }

    if !window.is_empty() {
        chunks.push(window.join(sep));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("firewall bloqueando a porta 443", ChunkerConfig::default());
        assert_eq!(chunks, vec!["firewall bloqueando a porta 443"]);
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = "palavra ".repeat(500);
        let cfg = ChunkerConfig { chunk_size: 100, overlap: 20 };
        let chunks = split_text(&text, cfg);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = split_text(&text, ChunkerConfig { chunk_size: 80, overlap: 0 });
        assert_eq!(chunks, vec!["a".repeat(60), "b".repeat(60)]);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = (0..40).map(|i| format!("w{i:02}")).collect::<Vec<_>>().join(" ");
        let chunks = split_text(&text, ChunkerConfig { chunk_size: 20, overlap: 8 });
        assert!(chunks.len() > 2);
        assert_eq!(chunks[0], "w00 w01 w02 w03 w04");
        assert!(chunks[1].starts_with("w03 w04"));
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(250);
        let chunks = split_text(&text, ChunkerConfig { chunk_size: 100, overlap: 0 });
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }
}
