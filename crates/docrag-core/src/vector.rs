//! Vector math and the local fallback embedding.
//!
//! Pure functions with no I/O: similarity metrics, normalization, the
//! BLOB encoding used by the SQLite store, and
//! [`generate_fallback_embedding`], the deterministic bag-of-hashed-features
//! vector used whenever no embedding provider is reachable.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Dimension of every vector produced by [`generate_fallback_embedding`].
pub const FALLBACK_DIMENSION: usize = 1024;

/// Weights of the three hashed positions each token is scattered into.
const HASH_WEIGHTS: [f32; 3] = [1.0, 0.5, 0.3];

/// Per-position magnitude of the seeded vector returned for empty input.
const EMPTY_TEXT_SCALE: f32 = 0.01;

/// Similarity metric for [`batch_similarity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Euclidean,
}

/// Cosine similarity over the first `min(a.len(), b.len())` positions.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` when either side is empty or
/// has zero norm over the aligned prefix. Vectors of different lengths are
/// compared on their shared prefix rather than rejected, so stored
/// embeddings from different providers never make a search fail.
///
/// Accumulates in `f64`; the result is exactly symmetric in its arguments.
///
/// ```rust
/// use docrag_core::vector::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
/// assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a[..len].iter().zip(&b[..len]) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0) as f32
}

/// Scale `v` to unit L2 norm. A zero vector is returned unchanged.
pub fn normalize_vector(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| (*x as f64 / norm) as f32).collect()
}

/// Euclidean distance, or `None` when the lengths differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum();
    Some(sum.sqrt() as f32)
}

/// Map a distance in `[0, ∞)` to a similarity in `(0, 1]`.
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Score `query` against every vector in `vectors`.
///
/// With [`SimilarityMetric::Euclidean`] a length mismatch scores `0.0`.
pub fn batch_similarity(query: &[f32], vectors: &[Vec<f32>], metric: SimilarityMetric) -> Vec<f32> {
    vectors
        .iter()
        .map(|v| match metric {
            SimilarityMetric::Cosine => cosine_similarity(query, v),
            SimilarityMetric::Euclidean => euclidean_distance(query, v)
                .map(distance_to_similarity)
                .unwrap_or(0.0),
        })
        .collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use docrag_core::vector::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing partial words are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// CJK unified ideographs in the basic block.
pub(crate) fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Lowercase, strip everything but letters, digits and CJK ideographs, and
/// keep whitespace-separated tokens of at least two characters.
fn fallback_tokens(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || is_cjk(c) || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Three independent bucket indices for a token, from disjoint words of its
/// SHA-256 digest.
fn hash_positions(token: &str) -> [usize; 3] {
    let digest = Sha256::digest(token.as_bytes());
    let word = |i: usize| {
        u32::from_le_bytes([digest[i], digest[i + 1], digest[i + 2], digest[i + 3]]) as usize
            % FALLBACK_DIMENSION
    };
    [word(0), word(4), word(8)]
}

/// Deterministic local embedding of `text`, always [`FALLBACK_DIMENSION`] long.
///
/// # Algorithm
///
/// 1. Tokenize (see `fallback_tokens`) and compute term frequencies.
/// 2. Add each token's frequency into three hashed positions with weights
///    `1.0`, `0.5` and `0.3`.
/// 3. Overwrite positions 0..3 with length (`chars / 1000`), token density
///    (`tokens / chars`) and CJK ratio (`cjk / chars`).
/// 4. L2-normalize.
///
/// Text that yields an all-zero vector (the empty string) gets a
/// low-magnitude pseudo-random vector seeded from the text's digest, so the
/// output is never degenerate and still identical across calls.
pub fn generate_fallback_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; FALLBACK_DIMENSION];
    let tokens = fallback_tokens(text);

    if !tokens.is_empty() {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }
        let total = tokens.len() as f32;
        for (token, count) in counts {
            let tf = count as f32 / total;
            for (pos, weight) in hash_positions(token).into_iter().zip(HASH_WEIGHTS) {
                vector[pos] += tf * weight;
            }
        }
    }

    let char_count = text.chars().count();
    if char_count > 0 {
        let chars = char_count as f32;
        let cjk = text.chars().filter(|c| is_cjk(*c)).count() as f32;
        vector[0] = chars / 1000.0;
        vector[1] = tokens.len() as f32 / chars;
        vector[2] = cjk / chars;
    }

    let normalized = normalize_vector(&vector);
    if normalized.iter().any(|x| *x != 0.0) {
        return normalized;
    }

    let seed: [u8; 32] = Sha256::digest(text.as_bytes()).into();
    let mut rng = StdRng::from_seed(seed);
    (0..FALLBACK_DIMENSION)
        .map(|_| (rng.gen::<f32>() - 0.5) * EMPTY_TEXT_SCALE)
        .collect()
}
