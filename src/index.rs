//! Partitioned in-memory vector index.
//!
//! Brute-force cosine similarity over per-conversation chunk collections
//! behind a single `RwLock`. Partitions are fully isolated: every operation
//! takes an explicit partition key and only ever touches that partition's
//! chunks. Linear scans are acceptable here because a partition is bounded
//! by one conversation's uploads; no approximate indexing is in scope.
//!
//! Ranking is computed in a single pass per query ([`VectorIndex::search_ranked`])
//! so the chunk order and the score mapping can never disagree, even while
//! other tasks mutate the partition between calls.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{Chunk, RetrievalResult};

/// In-memory chunk index keyed by partition (conversation id).
pub struct VectorIndex {
    partitions: RwLock<HashMap<String, Vec<Chunk>>>,
    top_k: usize,
}

impl VectorIndex {
    pub fn new(top_k: usize) -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            top_k,
        }
    }

    /// Append a chunk to its partition.
    ///
    /// No id deduplication happens here; callers generate unique ids.
    pub fn add(&self, partition: &str, chunk: Chunk) {
        let mut partitions = self.partitions.write().unwrap();
        partitions
            .entry(partition.to_string())
            .or_default()
            .push(chunk);
    }

    /// Top-K chunks by descending cosine similarity.
    pub fn search(&self, partition: &str, query: &[f32]) -> Vec<Chunk> {
        self.search_ranked(partition, query).chunks
    }

    /// Top-K `(chunk id, score)` pairs, ordered by rank.
    pub fn search_with_scores(&self, partition: &str, query: &[f32]) -> Vec<(String, f64)> {
        self.search_ranked(partition, query).scores
    }

    /// One ranked pass producing both the chunk order and the score mapping.
    ///
    /// Sorting is stable, so equal similarities keep insertion order. An
    /// empty partition short-circuits without computing any similarity.
    pub fn search_ranked(&self, partition: &str, query: &[f32]) -> RetrievalResult {
        let partitions = self.partitions.read().unwrap();
        let chunks = match partitions.get(partition) {
            Some(chunks) if !chunks.is_empty() => chunks,
            _ => return RetrievalResult::default(),
        };

        let mut scored: Vec<(&Chunk, f64)> = chunks
            .iter()
            .map(|chunk| (chunk, cosine_similarity(query, &chunk.embedding) as f64))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.top_k);

        RetrievalResult {
            chunks: scored.iter().map(|(c, _)| (*c).clone()).collect(),
            scores: scored
                .iter()
                .map(|(c, score)| (c.id.clone(), *score))
                .collect(),
        }
    }

    /// Remove every chunk of `document_id` from the partition in one step.
    ///
    /// Readers either see all of a document's chunks or none of them. No-op
    /// when nothing matches.
    pub fn remove_by_document(&self, partition: &str, document_id: &str) {
        let mut partitions = self.partitions.write().unwrap();
        if let Some(chunks) = partitions.get_mut(partition) {
            chunks.retain(|c| c.document_id != document_id);
        }
    }

    /// Drop an entire partition (conversation teardown).
    pub fn remove_partition(&self, partition: &str) {
        let mut partitions = self.partitions.write().unwrap();
        partitions.remove(partition);
    }

    /// Number of chunks currently held for a partition.
    ///
    /// Callers use this to skip query embedding entirely when a partition
    /// is empty.
    pub fn count(&self, partition: &str) -> usize {
        let partitions = self.partitions.read().unwrap();
        partitions.get(partition).map(|c| c.len()).unwrap_or(0)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a zero
/// norm on either side — similarity degrades, it never errors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, doc: &str, partition: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: doc.to_string(),
            document_name: format!("{}.txt", doc),
            section: "Introduction".to_string(),
            content: format!("content of {}", id),
            chunk_index: 0,
            conversation_id: partition.to_string(),
            embedding,
        }
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degrades_to_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_in_bounds() {
        let a = vec![0.3, -0.7, 0.2, 0.9];
        let b = vec![-0.5, 0.1, 0.8, -0.2];
        let sim = cosine_similarity(&a, &b);
        assert!((-1.0..=1.0).contains(&sim));
    }

    #[test]
    fn empty_partition_returns_empty() {
        let index = VectorIndex::new(5);
        index.add("a", chunk("c1", "d1", "a", vec![1.0, 0.0]));
        assert!(index.search("b", &[1.0, 0.0]).is_empty());
        assert!(index.search_with_scores("b", &[1.0, 0.0]).is_empty());
        assert_eq!(index.count("b"), 0);
    }

    #[test]
    fn partitions_are_isolated() {
        let index = VectorIndex::new(5);
        index.add("a", chunk("c1", "d1", "a", vec![1.0, 0.0]));
        index.add("b", chunk("c2", "d2", "b", vec![1.0, 0.0]));

        let hits = index.search("a", &[1.0, 0.0]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c1");
        assert_eq!(index.count("a"), 1);
        assert_eq!(index.count("b"), 1);
    }

    #[test]
    fn top_k_truncates_and_ranks_descending() {
        let index = VectorIndex::new(5);
        // 10 chunks with decreasing similarity to the x axis.
        for i in 0..10 {
            let angle = i as f32 * 0.15;
            index.add(
                "conv",
                chunk(
                    &format!("c{}", i),
                    "doc",
                    "conv",
                    vec![angle.cos(), angle.sin()],
                ),
            );
        }

        let result = index.search_ranked("conv", &[1.0, 0.0]);
        assert_eq!(result.chunks.len(), 5);
        assert_eq!(result.scores.len(), 5);

        for pair in result.scores.windows(2) {
            assert!(pair[0].1 >= pair[1].1, "scores must be descending");
        }
        // Rank order and score order describe the same chunks.
        for (chunk, (id, _)) in result.chunks.iter().zip(result.scores.iter()) {
            assert_eq!(&chunk.id, id);
        }
        assert_eq!(result.chunks[0].id, "c0");
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = VectorIndex::new(3);
        index.add("conv", chunk("first", "doc", "conv", vec![1.0, 0.0]));
        index.add("conv", chunk("second", "doc", "conv", vec![1.0, 0.0]));
        index.add("conv", chunk("third", "doc", "conv", vec![1.0, 0.0]));

        let hits = index.search("conv", &[1.0, 0.0]);
        let ids: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn mismatched_embedding_scores_zero() {
        let index = VectorIndex::new(5);
        index.add("conv", chunk("bad", "doc", "conv", vec![1.0, 0.0, 0.0]));
        let result = index.search_ranked("conv", &[1.0, 0.0]);
        assert_eq!(result.score_for("bad"), 0.0);
    }

    #[test]
    fn remove_by_document_cascades() {
        let index = VectorIndex::new(10);
        index.add("conv", chunk("c1", "keep", "conv", vec![1.0, 0.0]));
        index.add("conv", chunk("c2", "drop", "conv", vec![1.0, 0.0]));
        index.add("conv", chunk("c3", "drop", "conv", vec![0.0, 1.0]));
        assert_eq!(index.count("conv"), 3);

        index.remove_by_document("conv", "drop");
        assert_eq!(index.count("conv"), 1);
        let hits = index.search("conv", &[1.0, 0.0]);
        assert!(hits.iter().all(|c| c.document_id != "drop"));

        // No-op when nothing matches.
        index.remove_by_document("conv", "drop");
        assert_eq!(index.count("conv"), 1);
    }

    #[test]
    fn remove_partition_drops_everything() {
        let index = VectorIndex::new(5);
        index.add("conv", chunk("c1", "d1", "conv", vec![1.0, 0.0]));
        index.remove_partition("conv");
        assert_eq!(index.count("conv"), 0);
    }
}
