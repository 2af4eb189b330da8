//! Embedding-breakpoint chunking.
//!
//! Sentences are grouped with their neighbours, the groups are embedded, and
//! the text is cut wherever the cosine distance between consecutive groups is
//! an outlier: above `mean + multiplier * IQR` of all distances.

use tracing::debug;

use chatscribe_llm::Embedder;
use chatscribe_shared::{ChatscribeError, Chunk, Result};

use crate::sentence::split_sentences;

/// Chunk `text` at semantic breakpoints found with `embedder`.
pub async fn semantic_chunks(
    text: &str,
    embedder: &dyn Embedder,
    buffer_size: usize,
    multiplier: f32,
) -> Result<Vec<Chunk>> {
    let sentences = split_sentences(text);
    if sentences.len() < 2 {
        return Ok(sentences.into_iter().map(Chunk::new).collect());
    }

    let windows = sentence_windows(&sentences, buffer_size);
    let embeddings = embedder.embed_batch(&windows).await?;
    if embeddings.len() != windows.len() {
        return Err(ChatscribeError::Embedding(format!(
            "expected {} embeddings, got {}",
            windows.len(),
            embeddings.len()
        )));
    }

    let distances: Vec<f32> = embeddings
        .windows(2)
        .map(|pair| cosine_distance(&pair[0], &pair[1]))
        .collect();
    let cuts = breakpoints(&distances, multiplier);
    debug!(sentences = sentences.len(), cuts = cuts.len(), "semantic breakpoints");

    let mut chunks = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        chunks.push(Chunk::new(sentences[start..=cut].join(" ")));
        start = cut + 1;
    }
    chunks.push(Chunk::new(sentences[start..].join(" ")));

    Ok(chunks)
}

/// Each sentence joined with up to `buffer_size` neighbours on either side.
pub fn sentence_windows(sentences: &[&str], buffer_size: usize) -> Vec<String> {
    (0..sentences.len())
        .map(|i| {
            let lo = i.saturating_sub(buffer_size);
            let hi = (i + buffer_size).min(sentences.len() - 1);
            sentences[lo..=hi].join(" ")
        })
        .collect()
}

/// Indices `i` such that the text should be cut after sentence `i`.
pub fn breakpoints(distances: &[f32], multiplier: f32) -> Vec<usize> {
    if distances.is_empty() {
        return Vec::new();
    }

    let mean = distances.iter().sum::<f32>() / distances.len() as f32;
    let iqr = percentile(distances, 75.0) - percentile(distances, 25.0);
    let threshold = mean + multiplier * iqr;

    distances
        .iter()
        .enumerate()
        .filter(|(_, d)| **d > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f32], pct: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);

    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// `1 - cos(a, b)`. Zero vectors count as orthogonal.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}
