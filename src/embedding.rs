//! Deterministic feature-hash embeddings.
//!
//! Maps arbitrary text to a fixed-dimension, L2-normalized `Vec<f32>` using
//! the hashing trick: word frequencies and character-trigram frequencies are
//! folded into hash-addressed vector slots. No model weights, no network, no
//! randomness — the embedding of a text is a pure function of its content
//! and the configured dimensionality, so re-embedding the same text yields a
//! bit-identical vector.
//!
//! Trigrams act as a sub-word channel at half weight: texts sharing word
//! morphology (typos, inflections) pick up partial similarity even when no
//! full token matches.

use std::collections::BTreeMap;

/// Weight applied to the trigram channel relative to whole tokens.
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashing embedder with a fixed output dimensionality.
#[derive(Debug, Clone)]
pub struct FeatureHashEmbedder {
    dims: usize,
}

impl FeatureHashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    /// Output vector dimensionality.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed one text.
    ///
    /// Blank text returns the all-zero vector (normalizing it would divide
    /// by zero). Anything else is lowercased, stripped to Latin/Cyrillic
    /// letters and digits, tokenized on whitespace, and folded into the
    /// vector slot by slot before L2 normalization.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        if text.trim().is_empty() {
            return vector;
        }

        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| if is_token_char(c) { c } else { ' ' })
            .collect();

        // BTreeMap keeps the fold order deterministic so repeated embeddings
        // of the same text are bit-identical.
        let mut frequencies: BTreeMap<&str, f32> = BTreeMap::new();
        for token in cleaned.split_whitespace() {
            if token.chars().count() > 1 {
                *frequencies.entry(token).or_insert(0.0) += 1.0;
            }
        }

        for (token, freq) in &frequencies {
            let slot = (fnv1a(token.as_bytes()) % self.dims as u64) as usize;
            vector[slot] += *freq;

            let chars: Vec<char> = token.chars().collect();
            if chars.len() >= 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    let slot = (fnv1a(trigram.as_bytes()) % self.dims as u64) as usize;
                    vector[slot] += TRIGRAM_WEIGHT * *freq;
                }
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }

    /// Embed a batch of texts, order-preserving.
    pub fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Characters that survive tokenization after lowercasing: ASCII
/// alphanumerics plus the lowercase Cyrillic alphabet.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ('а'..='я').contains(&c) || c == 'ё'
}

/// FNV-1a 64-bit over raw bytes; non-negative by construction.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 14695981039346656037u64;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(1099511628211u64);
    }
    hash
}
