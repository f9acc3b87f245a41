//! Search options and result ranking.
//!
//! The store returns candidate chunks already filtered by owner, status,
//! and minimum score. This module turns them into [`SearchResult`]s:
//!
//! 1. Sort by score (desc), document upload time (desc), chunk id (asc).
//! 2. Drop chunks whose text repeats a better-ranked chunk (same hash).
//! 3. Truncate to the requested limit.
//! 4. Cut each preview at a whitespace boundary.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{DocumentKind, SearchResult};
use crate::store::ChunkCandidate;

/// How many candidates to request from the store per result slot, leaving
/// room for duplicates removed during ranking.
const CANDIDATE_FACTOR: usize = 4;

/// Caller-supplied search options. Omitted fields take the configured
/// defaults; unknown fields are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
    pub kind: Option<DocumentKind>,
}

/// Startup defaults for [`SearchOptions`].
#[derive(Debug, Clone, Copy)]
pub struct SearchDefaults {
    pub limit: usize,
    pub max_limit: usize,
    pub min_score: f32,
    pub preview_chars: usize,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            limit: 5,
            max_limit: 50,
            min_score: 0.3,
            preview_chars: 300,
        }
    }
}

/// Options with defaults applied and ranges checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedSearch {
    pub limit: usize,
    pub min_score: f32,
    pub kind: Option<DocumentKind>,
}

impl ResolvedSearch {
    /// Number of candidates to ask the store for.
    pub fn candidate_pool(&self) -> usize {
        self.limit.saturating_mul(CANDIDATE_FACTOR)
    }
}

impl SearchOptions {
    pub fn resolve(&self, defaults: &SearchDefaults) -> Result<ResolvedSearch> {
        let limit = self.limit.unwrap_or(defaults.limit);
        if limit == 0 || limit > defaults.max_limit {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}, got {}",
                defaults.max_limit, limit
            )));
        }
        let min_score = self.min_score.unwrap_or(defaults.min_score);
        if !(0.0..=1.0).contains(&min_score) {
            return Err(Error::Validation(format!(
                "min_score must be in [0.0, 1.0], got {min_score}"
            )));
        }
        Ok(ResolvedSearch {
            limit,
            min_score,
            kind: self.kind,
        })
    }
}

/// Total order used for results: score desc, upload time desc, chunk id asc.
pub fn compare_candidates(a: &ChunkCandidate, b: &ChunkCandidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.uploaded_at.cmp(&a.uploaded_at))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Order, deduplicate, and truncate candidates into display results.
pub fn rank(
    mut candidates: Vec<ChunkCandidate>,
    limit: usize,
    preview_chars: usize,
) -> Vec<SearchResult> {
    candidates.sort_by(compare_candidates);
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.hash.clone()))
        .take(limit)
        .map(|c| SearchResult {
            preview: truncate_preview(&c.text, preview_chars),
            chunk_id: c.chunk_id,
            document_id: c.document_id,
            document_name: c.document_name,
            sequence: c.sequence,
            score: c.score,
            uploaded_at: c.uploaded_at,
        })
        .collect()
}

/// Collapse whitespace and cut to at most `max_chars` characters, backing
/// up to the last whitespace so no word is split. Appends `…` when cut.
/// If even the first word does not fit, the preview is just `…`.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut = collapsed
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(collapsed.len());
    let head = &collapsed[..cut];
    // The char right after the cut being a space means `head` ends on a word.
    let head = if collapsed[cut..].starts_with(' ') {
        head
    } else {
        // A first word longer than the budget leaves only the ellipsis.
        head.rfind(' ').map_or("", |space| &head[..space])
    };
    format!("{}…", head.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentId;
    use chrono::{Duration, Utc};

    fn cand(id: &str, doc: &str, score: f32, age_days: i64, text: &str) -> ChunkCandidate {
        ChunkCandidate {
            chunk_id: id.to_string(),
            document_id: DocumentId::new(doc),
            document_name: format!("{doc}.pdf"),
            sequence: 0,
            text: text.to_string(),
            hash: crate::validate::sha256_hex(text.as_bytes()),
            score,
            uploaded_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_resolve_defaults_and_bounds() {
        let d = SearchDefaults::default();
        let r = SearchOptions::default().resolve(&d).unwrap();
        assert_eq!(r.limit, 5);
        assert_eq!(r.min_score, 0.3);

        let bad_limit = SearchOptions {
            limit: Some(0),
            ..Default::default()
        };
        assert!(matches!(bad_limit.resolve(&d), Err(Error::Validation(_))));
        let too_many = SearchOptions {
            limit: Some(51),
            ..Default::default()
        };
        assert!(too_many.resolve(&d).is_err());
        let bad_score = SearchOptions { min_score: Some(1.5), ..Default::default() };
        assert!(bad_score.resolve(&d).is_err());
        let nan = SearchOptions {
            min_score: Some(f32::NAN),
            ..Default::default()
        };
        assert!(nan.resolve(&d).is_err());
    }

    #[test]
    fn test_options_reject_unknown_fields() {
        let ok: SearchOptions =
            serde_json::from_str(r#"{"limit": 3, "kind": "cover_letter"}"#).unwrap();
        assert_eq!(ok.limit, Some(3));
        assert_eq!(ok.kind, Some(DocumentKind::CoverLetter));
        assert!(serde_json::from_str::<SearchOptions>(r#"{"limt": 3}"#).is_err());
    }

    #[test]
    fn test_rank_orders_and_breaks_ties_by_recency() {
        let results = rank(
            vec![
                cand("c1", "old", 0.8, 10, "alpha"),
                cand("c2", "new", 0.8, 1, "beta"),
                cand("c3", "mid", 0.9, 5, "gamma"),
            ],
            10,
            100,
        );
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c3", "c2", "c1"]);
    }

    #[test]
    fn test_rank_dedupes_identical_text_and_truncates() {
        let results = rank(
            vec![
                cand("c1", "a", 0.9, 1, "Python developer"),
                cand("c2", "b", 0.9, 2, "Python developer"),
                cand("c3", "b", 0.7, 2, "Rust developer"),
                cand("c4", "b", 0.6, 2, "Go developer"),
            ],
            2,
            100,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "c1");
        assert_eq!(results[1].chunk_id, "c3");
    }

    #[test]
    fn test_truncate_preview_on_word_boundary() {
        assert_eq!(truncate_preview("short  text\n", 50), "short text");
        assert_eq!(truncate_preview("hello wonderful world", 12), "hello…");
        assert_eq!(truncate_preview("hello wonderful world", 15), "hello wonderful…");
    }

    #[test]
    fn test_truncate_preview_never_splits_a_long_first_word() {
        assert_eq!(
            truncate_preview("supercalifragilisticexpialidocious rest", 10),
            "…"
        );
        assert_eq!(truncate_preview("supercalifragilistic", 5), "…");
        assert_eq!(truncate_preview("a supercalifragilistic", 5), "a…");
    }
}
