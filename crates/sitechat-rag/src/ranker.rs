//! Cosine-similarity ranking of stored chunks against a query embedding.

use sitechat_core::config::RetrievalConfig;
use sitechat_store::StoredChunk;

/// Cosine similarity of two vectors. Returns 0.0 on length mismatch or when
/// either vector has zero magnitude, so malformed rows rank last instead of
/// failing the query.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a.sqrt() * mag_b.sqrt())
}

/// Rank `chunks` against the query embedding and return the contents of the
/// best matches: those at or above the similarity threshold, best first,
/// capped at `top_k`. Ties keep their stored order.
pub fn rank_chunks(
    query: &[f32],
    chunks: &[StoredChunk],
    config: &RetrievalConfig,
) -> Vec<String> {
    let mut scored: Vec<(f32, &StoredChunk)> = chunks
        .iter()
        .map(|c| (cosine_similarity(query, &c.embedding), c))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .filter(|(score, chunk)| *score >= config.similarity_threshold && !chunk.content.is_empty())
        .take(config.top_k)
        .map(|(_, chunk)| chunk.content.clone())
        .collect()
}
