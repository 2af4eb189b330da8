//! Optional chunk reduction by k-means over chunk embeddings.
//!
//! One representative chunk is kept per cluster, so the article covers each
//! topic once. This is lossy by construction: chunks that are not the closest
//! to any centroid are dropped.

use tracing::{debug, instrument};

use chatscribe_llm::Embedder;
use chatscribe_shared::{ChatscribeError, Chunk, GenerationConfig, Result};

/// K-means parameters.
#[derive(Debug, Clone, Copy)]
pub struct ClusterOptions {
    pub max_clusters: usize,
    pub iterations: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            max_clusters: 10,
            iterations: 20,
        }
    }
}

impl From<&GenerationConfig> for ClusterOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_clusters: config.max_clusters,
            iterations: config.kmeans_iterations,
        }
    }
}

/// Embed `chunks` and keep one representative per cluster, in original order.
#[instrument(skip_all, fields(chunks = chunks.len()))]
pub async fn cluster_chunks(
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    options: &ClusterOptions,
) -> Result<Vec<Chunk>> {
    if chunks.is_empty() {
        return Err(ChatscribeError::empty_input());
    }

    let inputs: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embedder.embed_batch(&inputs).await?;
    if embeddings.len() != chunks.len() {
        return Err(ChatscribeError::Embedding(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            embeddings.len()
        )));
    }

    let keep = select_representatives(&embeddings, options)?;
    debug!(kept = keep.len(), "representative chunks selected");

    let mut chunks: Vec<Option<Chunk>> = chunks.into_iter().map(Some).collect();
    Ok(keep.into_iter().filter_map(|i| chunks[i].take()).collect())
}

/// Indices of the chunk nearest each k-means centroid, de-duplicated and ascending.
///
/// `k = max(1, min(n / 3, max_clusters))`. Seeds are evenly spaced over the
/// input, so the result is deterministic.
pub fn select_representatives(
    embeddings: &[Vec<f32>],
    options: &ClusterOptions,
) -> Result<Vec<usize>> {
    let n = embeddings.len();
    if n == 0 {
        return Err(ChatscribeError::empty_input());
    }
    let dim = embeddings[0].len();
    if dim == 0 {
        return Err(ChatscribeError::clustering("embeddings have zero dimensions"));
    }
    if let Some(bad) = embeddings.iter().position(|e| e.len() != dim) {
        return Err(ChatscribeError::clustering(format!(
            "embedding {bad} has {} dimensions, expected {dim}",
            embeddings[bad].len()
        )));
    }

    let k = (n / 3).min(options.max_clusters).max(1);
    let mut centroids: Vec<Vec<f32>> = (0..k).map(|j| embeddings[j * n / k].clone()).collect();
    let mut assignment = vec![usize::MAX; n];

    for _ in 0..options.iterations {
        let mut changed = false;
        for (i, point) in embeddings.iter().enumerate() {
            let nearest = nearest(point, &centroids);
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (point, &cluster) in embeddings.iter().zip(&assignment) {
            counts[cluster] += 1;
            for (sum, x) in sums[cluster].iter_mut().zip(point) {
                *sum += x;
            }
        }
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            // Empty clusters keep their previous centroid.
            if count > 0 {
                *centroid = sum.into_iter().map(|s| s / count as f32).collect();
            }
        }
    }

    let mut picks: Vec<usize> = centroids
        .iter()
        .map(|centroid| nearest(centroid, embeddings))
        .collect();
    picks.sort_unstable();
    picks.dedup();
    Ok(picks)
}

/// Index of the candidate closest to `point` by L2 distance (first on ties).
fn nearest(point: &[f32], candidates: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, candidate) in candidates.iter().enumerate() {
        let dist = squared_l2(point, candidate);
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
