//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, a deterministic offline provider ([`HashingEmbedder`]), and
//! pure helpers for vector serialization and similarity.
//!
//! Network-backed providers (OpenAI, Ollama) and local model inference
//! live in the `resume-index` app crate, along with retry handling.

use async_trait::async_trait;

/// Failure reported by a provider for one batch.
///
/// The distinction drives retries: transient failures (rate limits, server
/// errors, timeouts) are retried with backoff, permanent ones are not.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("permanent: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Trait for embedding providers.
///
/// `dims` is fixed for the lifetime of a provider and must match the
/// dimensionality recorded in the index.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(parts: &[&[u8]]) -> u64 {
    let mut hash = FNV_OFFSET;
    for part in parts {
        for &b in *part {
            hash ^= b as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase word contributes a unigram feature (weight 1.0) and each
/// character trigram of `#word#` contributes a sub-word feature (weight 0.5).
/// Features are hashed with FNV-1a into `dims` signed buckets and the
/// result is L2-normalized. Needs no model download or network, which
/// makes it the default provider and the one used in tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    /// Embed one text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return v;
        }
        let lower = text.to_lowercase();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add(&mut v, &[b"w:".as_slice(), word.as_bytes()], 1.0);

            let marked: Vec<char> = std::iter::once('#')
                .chain(word.chars())
                .chain(std::iter::once('#'))
                .collect();
            for tri in marked.windows(3) {
                let s: String = tri.iter().collect();
                self.add(&mut v, &[b"t:".as_slice(), s.as_bytes()], 0.5);
            }
        }
        l2_normalize(&mut v);
        v
    }

    fn add(&self, v: &mut [f32], parts: &[&[u8]], weight: f32) {
        let h = fnv1a(parts);
        let idx = (h % self.dims as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-trigram-v1"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Collapse whitespace and cap the input at `max_chars` characters.
pub fn preprocess(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => collapsed[..cut].to_string(),
        None => collapsed,
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Component-wise mean of the vectors sharing the first one's length, or
/// `None` if there are none.
pub fn mean_vector(vectors: &[&[f32]]) -> Option<Vec<f32>> {
    let dims = vectors.first()?.len();
    let mut out = vec![0.0f32; dims];
    let mut n = 0usize;
    for v in vectors.iter().filter(|v| v.len() == dims) {
        for (o, x) in out.iter_mut().zip(v.iter()) {
            *o += x;
        }
        n += 1;
    }
    for o in out.iter_mut() {
        *o /= n as f32;
    }
    Some(out)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use resume_index_core::embedding::{vec_to_blob, blob_to_vec};
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

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, and zero vectors.
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

/// Similarity score as exposed to callers: cosine clamped into `[0.0, 1.0]`.
pub fn similarity_score(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite_clamps_to_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
        assert_eq!(similarity_score(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(384);
        let a = e.embed_one("Python developer with Django experience");
        let b = e.embed_one("Python developer with Django experience");
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hashing_similarity_tracks_overlap() {
        let e = HashingEmbedder::new(384);
        let q = e.embed_one("python developer");
        let close = e.embed_one("Experienced Python developer building APIs");
        let far = e.embed_one("Certified nurse, intensive care unit, night shifts");
        assert!(cosine_similarity(&q, &close) > cosine_similarity(&q, &far));
        assert!(cosine_similarity(&q, &close) > 0.3);
    }

    #[test]
    fn test_hashing_empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(16);
        assert!(e.embed_one("  ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_preprocess() {
        assert_eq!(preprocess("  a \n\n b\tc  ", 100), "a b c");
        assert_eq!(preprocess("ñandú ñandú", 5), "ñandú");
    }

    #[test]
    fn test_mean_vector() {
        let a: &[f32] = &[1.0, 0.0];
        let b: &[f32] = &[0.0, 1.0];
        assert_eq!(mean_vector(&[a, b]), Some(vec![0.5, 0.5]));
        assert_eq!(mean_vector(&[]), None);
    }

    #[test]
    fn test_mean_vector_skips_mismatched_lengths() {
        let a: &[f32] = &[2.0, 0.0];
        let short: &[f32] = &[9.0];
        let b: &[f32] = &[0.0, 2.0];
        assert_eq!(mean_vector(&[a, short, b]), Some(vec![1.0, 1.0]));
    }
}
