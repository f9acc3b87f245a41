//! Owner-scoped semantic retrieval.
//!
//! [`Retriever::search`] embeds the query text with the same embedder used
//! at ingestion, asks the store for a candidate pool restricted to the
//! owner's indexed documents, and hands the candidates to the core ranker
//! for ordering, deduplication, and preview truncation.
//!
//! [`Retriever::similar`] does the same with the centroid of an existing
//! document's chunk vectors in place of a query embedding.

use std::sync::Arc;

use resume_index_core::embedding::{l2_normalize, mean_vector};
use resume_index_core::models::{OwnerId, SearchResult};
use resume_index_core::search::{rank, ResolvedSearch, SearchDefaults, SearchOptions};
use resume_index_core::store::{DocumentGrant, VectorQuery, VectorStore};
use resume_index_core::Result;

use crate::embedding::RetryingEmbedder;

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: RetryingEmbedder,
    defaults: SearchDefaults,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: RetryingEmbedder,
        defaults: SearchDefaults,
    ) -> Self {
        Self {
            store,
            embedder,
            defaults,
        }
    }

    /// Search `owner`'s indexed chunks for `query`.
    ///
    /// Options are validated before anything else; a blank query then
    /// yields an empty list without calling the embedder.
    pub async fn search(
        &self,
        owner: &OwnerId,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let resolved = options.resolve(&self.defaults)?;
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(query).await?;
        let results = self.ranked(owner, &vector, &resolved, None).await?;
        tracing::debug!(
            owner_id = %owner,
            results = results.len(),
            limit = resolved.limit,
            min_score = resolved.min_score,
            "search completed"
        );
        Ok(results)
    }

    /// Chunks from the owner's other documents closest to the centroid of
    /// `grant`'s chunks. A document without chunks has no neighbours.
    pub async fn similar(
        &self,
        grant: &DocumentGrant,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let resolved = options.resolve(&self.defaults)?;
        let chunks = self.store.chunks_for(grant.id()).await?;
        let vectors: Vec<&[f32]> = chunks.iter().map(|c| c.embedding.as_slice()).collect();
        let Some(mut centroid) = mean_vector(&vectors) else {
            return Ok(Vec::new());
        };
        l2_normalize(&mut centroid);
        self.ranked(grant.owner_id(), &centroid, &resolved, Some(grant))
            .await
    }

    async fn ranked(
        &self,
        owner: &OwnerId,
        vector: &[f32],
        resolved: &ResolvedSearch,
        exclude: Option<&DocumentGrant>,
    ) -> Result<Vec<SearchResult>> {
        let candidates = self
            .store
            .search(&VectorQuery {
                owner_id: owner,
                vector,
                limit: resolved.candidate_pool(),
                min_score: resolved.min_score,
                kind: resolved.kind,
                exclude: exclude.map(|g| g.id()),
            })
            .await?;
        Ok(rank(candidates, resolved.limit, self.defaults.preview_chars))
    }
}
