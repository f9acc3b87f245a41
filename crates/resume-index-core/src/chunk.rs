//! Sliding-window text chunker.
//!
//! Splits anonymized text into windows of `window_size` characters where
//! consecutive windows share exactly `overlap` characters. Sizes are counted
//! in Unicode scalar values, not bytes.
//!
//! # Placeholder safety
//!
//! A window never begins or ends strictly inside a redaction placeholder
//! such as `[EMAIL]`. The end of each window is the largest position no
//! further than `window_size` from its start where both the end and the
//! next start (`end - overlap`) fall outside placeholders, so a window may
//! come out slightly shorter than `window_size`. When placeholders are too
//! dense for any such position to exist, the window ends at the last
//! placeholder boundary and the overlap with its successor shrinks.
//!
//! # Example
//!
//! ```rust
//! use resume_index_core::chunk::{split, ChunkingParams};
//!
//! let params = ChunkingParams::new(20, 4).unwrap();
//! let chunks = split("abcdefghijklmnopqrstuvwxyz", &params);
//! assert_eq!(chunks, vec!["abcdefghijklmnopqrst", "qrstuvwxyz"]);
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::anonymize::{max_placeholder_chars, PiiCategory};
use crate::error::{Error, Result};
use crate::models::{Chunk, DocumentId};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = PiiCategory::ALL
        .iter()
        .map(|c| regex::escape(c.placeholder()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternatives).expect("static regex")
});

/// Window geometry shared by every document in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    window_size: usize,
    overlap: usize,
}

impl ChunkingParams {
    /// Validate window geometry.
    ///
    /// The step (`window_size - overlap`) must be longer than the longest
    /// placeholder, otherwise a window could find no boundary to end on.
    pub fn new(window_size: usize, overlap: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::Validation("chunk window_size must be > 0".to_string()));
        }
        if overlap >= window_size {
            return Err(Error::Validation(format!(
                "chunk overlap ({overlap}) must be smaller than window_size ({window_size})"
            )));
        }
        if window_size - overlap <= max_placeholder_chars() {
            return Err(Error::Validation(format!(
                "chunk window_size - overlap must exceed {} characters",
                max_placeholder_chars()
            )));
        }
        Ok(Self {
            window_size,
            overlap,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

/// Split `text` into overlapping windows.
///
/// Whitespace-only text yields no chunks; text no longer than one window
/// yields exactly one.
pub fn split(text: &str, params: &ChunkingParams) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // Char index -> byte offset, with a trailing sentinel at text.len().
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = offsets.len() - 1;
    let inside = placeholder_interior(text, &offsets);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let natural = (start + params.window_size).min(n);
        if natural == n {
            chunks.push(text[offsets[start]..].to_string());
            break;
        }
        let (end, next) = boundary(start, natural, params.overlap, &inside);
        chunks.push(text[offsets[start]..offsets[end]].to_string());
        start = next;
    }
    chunks
}

/// `mask[i]` is true when char position `i` lies strictly inside a placeholder.
fn placeholder_interior(text: &str, offsets: &[usize]) -> Vec<bool> {
    let mut mask = vec![false; offsets.len()];
    for m in PLACEHOLDER.find_iter(text) {
        let (Ok(start), Ok(end)) = (
            offsets.binary_search(&m.start()),
            offsets.binary_search(&m.end()),
        ) else {
            continue;
        };
        for slot in &mut mask[start + 1..end] {
            *slot = true;
        }
    }
    mask
}

/// Pick `(end, next_start)` for the window beginning at `start`.
fn boundary(start: usize, natural: usize, overlap: usize, inside: &[bool]) -> (usize, usize) {
    let exact = (start + overlap + 1..=natural)
        .rev()
        .find(|&e| !inside[e] && !inside[e - overlap]);
    if let Some(end) = exact {
        return (end, end - overlap);
    }

    let end = (start + 1..=natural)
        .rev()
        .find(|&e| !inside[e])
        .unwrap_or(natural);
    let next = (end.saturating_sub(overlap).max(start + 1)..=end)
        .find(|&p| !inside[p])
        .unwrap_or(end);
    (end, next)
}

/// Build a stored [`Chunk`] with a fresh UUID and SHA-256 content hash.
pub fn make_chunk(
    document_id: &DocumentId,
    sequence: u32,
    text: String,
    embedding: Vec<f32>,
    created_at: DateTime<Utc>,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.clone(),
        sequence,
        text,
        hash,
        embedding,
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(window: usize, overlap: usize) -> ChunkingParams {
        ChunkingParams::new(window, overlap).unwrap()
    }

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    fn tail(s: &str, n: usize) -> String {
        let len = char_len(s);
        s.chars().skip(len - n).collect()
    }

    fn head(s: &str, n: usize) -> String {
        s.chars().take(n).collect()
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split("Rust developer, 5 years.", &params(100, 20));
        assert_eq!(chunks, vec!["Rust developer, 5 years."]);
    }

    #[test]
    fn test_whitespace_only_yields_nothing() {
        assert!(split("", &params(100, 20)).is_empty());
        assert!(split("  \n\t \n ", &params(100, 20)).is_empty());
    }

    #[test]
    fn test_exact_overlap_and_full_windows() {
        let text: String = (0..500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let p = params(120, 30);
        let chunks = split(&text, &p);
        assert!(chunks.len() > 1);
        for (i, pair) in chunks.windows(2).enumerate() {
            assert_eq!(char_len(&pair[0]), 120, "chunk {i} is short");
            assert_eq!(tail(&pair[0], 30), head(&pair[1], 30));
        }
        assert!(char_len(chunks.last().unwrap()) <= 120);

        // Dropping each chunk's overlap prefix reconstructs the input.
        let mut rebuilt = chunks[0].clone();
        for c in &chunks[1..] {
            rebuilt.extend(c.chars().skip(30));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_multibyte_counted_as_chars() {
        let text = "ñ".repeat(50) + &"€".repeat(50);
        let chunks = split(&text, &params(40, 10));
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(char_len(c), 40);
        }
    }

    #[test]
    fn test_sparse_placeholders_keep_exact_overlap() {
        let body = "Senior engineer [PERSON] led the migration of the billing services to Rust \
                    and mentored four engineers across two offices. Contact [EMAIL] for \
                    references about the payments platform and on-call tooling work. ";
        let text = body.repeat(8);
        for (window, overlap) in [(40, 10), (64, 16), (120, 30), (64, 0)] {
            let chunks = split(&text, &params(window, overlap));
            for c in &chunks {
                assert_eq!(c.matches('[').count(), c.matches(']').count(), "{c:?}");
                assert!(char_len(c) <= window);
            }
            for pair in chunks.windows(2) {
                assert_eq!(tail(&pair[0], overlap), head(&pair[1], overlap));
            }
            let mut rebuilt = chunks[0].clone();
            for c in &chunks[1..] {
                rebuilt.extend(c.chars().skip(overlap));
            }
            assert_eq!(rebuilt, text);
        }
    }

    #[test]
    fn test_dense_placeholders_never_split() {
        let body = "Worked with [PERSON] at [ORGANIZATION] in [LOCATION]; reach [EMAIL] or [PHONE]. ";
        let text = body.repeat(12);
        for (window, overlap) in [(40, 10), (50, 25), (33, 7)] {
            let chunks = split(&text, &params(window, overlap));
            for c in &chunks {
                assert_eq!(c.matches('[').count(), c.matches(']').count(), "{c:?}");
                assert!(char_len(c) <= window);
            }
            assert!(text.starts_with(chunks[0].as_str()));
            assert!(text.ends_with(chunks[chunks.len() - 1].as_str()));
        }
    }

    #[test]
    fn test_back_to_back_placeholders() {
        let text = "[ORGANIZATION]".repeat(20);
        let chunks = split(&text, &params(20, 5));
        assert_eq!(chunks.len(), 20);
        assert!(chunks.iter().all(|c| c == "[ORGANIZATION]"));
    }

    #[test]
    fn test_invalid_params() {
        assert!(ChunkingParams::new(0, 0).is_err());
        assert!(ChunkingParams::new(100, 100).is_err());
        assert!(ChunkingParams::new(20, 10).is_err());
        assert!(ChunkingParams::new(800, 100).is_ok());
    }

    #[test]
    fn test_make_chunk_hash() {
        let id = DocumentId::new("doc-1");
        let a = make_chunk(&id, 0, "same text".to_string(), vec![0.1], Utc::now());
        let b = make_chunk(&id, 1, "same text".to_string(), vec![0.2], Utc::now());
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.id, b.id);
        assert_eq!(a.hash.len(), 64);
    }
}
