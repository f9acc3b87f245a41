//! In-memory [`VectorStore`] implementation for tests and embedding.
//!
//! All state sits behind one `std::sync::RwLock`, so every compare-and-set
//! and every chunk replacement is atomic with respect to readers. Vector
//! search is brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::embedding::similarity_score;
use crate::models::{
    AnonymizationNote, Chunk, Document, DocumentId, DocumentStatus, Failure, OwnerId,
};
use crate::search::compare_candidates;

use super::{
    ensure_transition, ChunkCandidate, DocumentGrant, OwnerStats, VectorQuery, VectorStore,
};

#[derive(Default)]
struct State {
    docs: HashMap<DocumentId, Document>,
    chunks: HashMap<DocumentId, Vec<Chunk>>,
}

impl State {
    /// Compare-and-set `id` from `from` to `to`, applying `update` on success.
    fn cas(
        &mut self,
        id: &DocumentId,
        from: &[DocumentStatus],
        to: DocumentStatus,
        update: impl FnOnce(&mut Document),
    ) -> Result<bool> {
        let Some(doc) = self.docs.get_mut(id) else {
            return Ok(false);
        };
        if !from.contains(&doc.status) {
            return Ok(false);
        }
        ensure_transition(doc.status, to)?;
        doc.status = to;
        doc.updated_at = Utc::now();
        update(doc);
        Ok(true)
    }
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut state = self.write()?;
        if state.docs.contains_key(&doc.id) {
            bail!("document {} already exists", doc.id);
        }
        state.docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self.read()?.docs.get(id).cloned())
    }

    async fn list_documents(&self, owner: &OwnerId) -> Result<Vec<Document>> {
        let state = self.read()?;
        let mut docs: Vec<Document> = state
            .docs
            .values()
            .filter(|d| &d.owner_id == owner && d.status != DocumentStatus::Deleted)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn count_live_documents(&self, owner: &OwnerId) -> Result<usize> {
        let state = self.read()?;
        Ok(state
            .docs
            .values()
            .filter(|d| {
                &d.owner_id == owner
                    && !matches!(
                        d.status,
                        DocumentStatus::Deleted
                            | DocumentStatus::Failed
                            | DocumentStatus::Quarantined
                    )
            })
            .count())
    }

    async fn transition(
        &self,
        id: &DocumentId,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<bool> {
        self.write()?.cas(id, &[from], to, |_| {})
    }

    async fn quarantine(&self, id: &DocumentId, reason: &str) -> Result<bool> {
        self.write()?
            .cas(id, &[DocumentStatus::Received], DocumentStatus::Quarantined, |d| {
                d.quarantine_reason = Some(reason.to_string());
            })
    }

    async fn fail(&self, id: &DocumentId, from: DocumentStatus, failure: &Failure) -> Result<bool> {
        self.write()?.cas(id, &[from], DocumentStatus::Failed, |d| {
            d.failure = Some(failure.clone());
        })
    }

    async fn mark_anonymized(&self, id: &DocumentId, note: &AnonymizationNote) -> Result<bool> {
        self.write()?.cas(
            id,
            &[DocumentStatus::Extracted],
            DocumentStatus::Anonymized,
            |d| d.anonymization = Some(*note),
        )
    }

    async fn commit_index(&self, id: &DocumentId, chunks: &[Chunk]) -> Result<bool> {
        if chunks.is_empty() {
            bail!("refusing to index document {} without chunks", id);
        }
        let mut state = self.write()?;
        let moved = state.cas(
            id,
            &[DocumentStatus::Anonymized],
            DocumentStatus::Indexed,
            |_| {},
        )?;
        if moved {
            state.chunks.insert(id.clone(), chunks.to_vec());
        }
        Ok(moved)
    }

    async fn reset_for_reprocess(&self, grant: &DocumentGrant) -> Result<bool> {
        let mut state = self.write()?;
        let moved = state.cas(
            grant.id(),
            &[
                DocumentStatus::Failed,
                DocumentStatus::Indexed,
                DocumentStatus::Extracted,
                DocumentStatus::Anonymized,
            ],
            DocumentStatus::Validated,
            |d| {
                d.failure = None;
                d.anonymization = None;
            },
        )?;
        if moved {
            state.chunks.remove(grant.id());
        }
        Ok(moved)
    }

    async fn delete_document(&self, grant: &DocumentGrant) -> Result<bool> {
        let mut state = self.write()?;
        let Some(doc) = state.docs.get(grant.id()) else {
            return Ok(false);
        };
        let from = doc.status;
        if from == DocumentStatus::Deleted {
            return Ok(false);
        }
        let moved = state.cas(grant.id(), &[from], DocumentStatus::Deleted, |_| {})?;
        if moved {
            state.chunks.remove(grant.id());
        }
        Ok(moved)
    }

    async fn unfinished_documents(&self) -> Result<Vec<Document>> {
        let state = self.read()?;
        let mut docs: Vec<Document> = state
            .docs
            .values()
            .filter(|d| d.status.is_in_progress())
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn stats(&self, owner: &OwnerId) -> Result<OwnerStats> {
        let state = self.read()?;
        let mut stats = OwnerStats::default();
        for doc in state
            .docs
            .values()
            .filter(|d| &d.owner_id == owner && d.status != DocumentStatus::Deleted)
        {
            stats.add(doc);
            if doc.status == DocumentStatus::Indexed {
                stats.chunks += state.chunks.get(&doc.id).map_or(0, Vec::len);
            }
        }
        Ok(stats)
    }

    async fn chunks_for(&self, id: &DocumentId) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        let mut chunks = state.chunks.get(id).cloned().unwrap_or_default();
        chunks.sort_by_key(|c| c.sequence);
        Ok(chunks)
    }

    async fn search(&self, query: &VectorQuery<'_>) -> Result<Vec<ChunkCandidate>> {
        let state = self.read()?;
        let mut candidates: Vec<ChunkCandidate> = state
            .docs
            .values()
            .filter(|d| {
                &d.owner_id == query.owner_id
                    && d.status == DocumentStatus::Indexed
                    && query.kind.is_none_or(|k| d.kind == k)
                    && query.exclude != Some(&d.id)
            })
            .flat_map(|d| {
                state
                    .chunks
                    .get(&d.id)
                    .into_iter()
                    .flatten()
                    .map(move |c| (d, c))
            })
            .filter_map(|(d, c)| {
                let score = similarity_score(query.vector, &c.embedding);
                (score >= query.min_score).then(|| ChunkCandidate {
                    chunk_id: c.id.clone(),
                    document_id: d.id.clone(),
                    document_name: d.original_filename.clone(),
                    sequence: c.sequence,
                    text: c.text.clone(),
                    hash: c.hash.clone(),
                    score,
                    uploaded_at: d.uploaded_at,
                })
            })
            .collect();
        candidates.sort_by(compare_candidates);
        candidates.truncate(query.limit);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::make_chunk;
    use crate::models::{DeclaredType, DocumentKind, FailureKind};
    use crate::store::authorize;
    use crate::Error;
    use chrono::Duration;

    fn doc(owner: &str, name: &str, status: DocumentStatus) -> Document {
        let now = Utc::now();
        Document {
            id: DocumentId::generate(),
            owner_id: OwnerId::new(owner),
            original_filename: name.to_string(),
            stored_filename: name.to_string(),
            blob_ref: format!("holding/{name}"),
            declared_type: DeclaredType::Pdf,
            kind: DocumentKind::Cv,
            size_bytes: 10,
            sha256: String::new(),
            uploaded_at: now,
            updated_at: now,
            status,
            failure: None,
            quarantine_reason: None,
            anonymization: None,
        }
    }

    async fn indexed(store: &InMemoryStore, d: &Document, vectors: &[Vec<f32>]) {
        store.insert_document(d).await.unwrap();
        store
            .transition(&d.id, DocumentStatus::Received, DocumentStatus::Validated)
            .await
            .unwrap();
        store
            .transition(&d.id, DocumentStatus::Validated, DocumentStatus::Extracted)
            .await
            .unwrap();
        let note = AnonymizationNote {
            redactions: 0,
            degraded: false,
        };
        assert!(store.mark_anonymized(&d.id, &note).await.unwrap());
        let chunks: Vec<Chunk> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| make_chunk(&d.id, i as u32, format!("chunk {i}"), v.clone(), Utc::now()))
            .collect();
        assert!(store.commit_index(&d.id, &chunks).await.unwrap());
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_from() {
        let store = InMemoryStore::new();
        let d = doc("a", "cv.pdf", DocumentStatus::Received);
        store.insert_document(&d).await.unwrap();
        assert!(store
            .transition(&d.id, DocumentStatus::Received, DocumentStatus::Validated)
            .await
            .unwrap());
        assert!(!store
            .transition(&d.id, DocumentStatus::Received, DocumentStatus::Validated)
            .await
            .unwrap());
        assert!(store
            .transition(&d.id, DocumentStatus::Validated, DocumentStatus::Indexed)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_search_is_owner_scoped() {
        let store = InMemoryStore::new();
        let a = doc("alice", "a.pdf", DocumentStatus::Received);
        let b = doc("bob", "b.pdf", DocumentStatus::Received);
        indexed(&store, &a, &[vec![1.0, 0.0]]).await;
        indexed(&store, &b, &[vec![1.0, 0.0]]).await;

        let alice = OwnerId::new("alice");
        let hits = store
            .search(&VectorQuery {
                owner_id: &alice,
                vector: &[1.0, 0.0],
                limit: 10,
                min_score: 0.0,
                kind: None,
                exclude: None,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, a.id);
    }

    #[tokio::test]
    async fn test_search_threshold_and_order() {
        let store = InMemoryStore::new();
        let mut older = doc("a", "old.pdf", DocumentStatus::Received);
        older.uploaded_at = Utc::now() - Duration::days(3);
        let newer = doc("a", "new.pdf", DocumentStatus::Received);
        indexed(&store, &older, &[vec![1.0, 0.0], vec![0.0, 1.0]]).await;
        indexed(&store, &newer, &[vec![1.0, 0.0], vec![-1.0, 0.0]]).await;

        let owner = OwnerId::new("a");
        let hits = store
            .search(&VectorQuery {
                owner_id: &owner,
                vector: &[1.0, 0.0],
                limit: 10,
                min_score: 0.5,
                kind: None,
                exclude: None,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score >= 0.5));
        // Equal scores: newer upload first.
        assert_eq!(hits[0].document_id, newer.id);
        assert_eq!(hits[1].document_id, older.id);
    }

    #[tokio::test]
    async fn test_delete_cascades_and_hides() {
        let store = InMemoryStore::new();
        let d = doc("a", "cv.pdf", DocumentStatus::Received);
        indexed(&store, &d, &[vec![1.0]]).await;
        let owner = OwnerId::new("a");

        let grant = authorize(&store, &owner, &d.id).await.unwrap();
        assert!(store.delete_document(&grant).await.unwrap());
        assert!(store.chunks_for(&d.id).await.unwrap().is_empty());
        assert_eq!(
            store.get_document(&d.id).await.unwrap().unwrap().status,
            DocumentStatus::Deleted
        );
        assert!(matches!(
            authorize(&store, &owner, &d.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(store.list_documents(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorize_rejects_other_owner() {
        let store = InMemoryStore::new();
        let d = doc("a", "cv.pdf", DocumentStatus::Received);
        store.insert_document(&d).await.unwrap();
        assert!(matches!(
            authorize(&store, &OwnerId::new("b"), &d.id).await,
            Err(Error::Authorization(_))
        ));
        assert!(matches!(
            authorize(&store, &OwnerId::new("a"), &DocumentId::new("missing")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_after_delete_is_discarded() {
        let store = InMemoryStore::new();
        let d = doc("a", "cv.pdf", DocumentStatus::Received);
        store.insert_document(&d).await.unwrap();
        store
            .transition(&d.id, DocumentStatus::Received, DocumentStatus::Validated)
            .await
            .unwrap();
        store
            .transition(&d.id, DocumentStatus::Validated, DocumentStatus::Extracted)
            .await
            .unwrap();
        let note = AnonymizationNote {
            redactions: 1,
            degraded: false,
        };
        store.mark_anonymized(&d.id, &note).await.unwrap();

        let grant = authorize(&store, &OwnerId::new("a"), &d.id).await.unwrap();
        store.delete_document(&grant).await.unwrap();

        let chunk = make_chunk(&d.id, 0, "late".to_string(), vec![1.0], Utc::now());
        assert!(!store.commit_index(&d.id, &[chunk]).await.unwrap());
        assert!(store.chunks_for(&d.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reprocess_drops_chunks_and_quota_ignores_failed() {
        let store = InMemoryStore::new();
        let owner = OwnerId::new("a");
        let d = doc("a", "cv.pdf", DocumentStatus::Received);
        indexed(&store, &d, &[vec![1.0]]).await;
        assert_eq!(store.count_live_documents(&owner).await.unwrap(), 1);

        let grant = authorize(&store, &owner, &d.id).await.unwrap();
        assert!(store.reset_for_reprocess(&grant).await.unwrap());
        assert!(store.chunks_for(&d.id).await.unwrap().is_empty());
        assert!(!store.reset_for_reprocess(&grant).await.unwrap());

        let failure = Failure {
            kind: FailureKind::Extraction,
            message: "corrupt".into(),
        };
        assert!(store.fail(&d.id, DocumentStatus::Validated, &failure).await.unwrap());
        assert_eq!(store.count_live_documents(&owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unfinished_documents_can_restart() {
        let store = InMemoryStore::new();
        let stuck = doc("a", "stuck.pdf", DocumentStatus::Anonymized);
        let done = doc("b", "done.pdf", DocumentStatus::Indexed);
        let queued = Document {
            uploaded_at: stuck.uploaded_at + Duration::seconds(1),
            ..doc("b", "queued.pdf", DocumentStatus::Validated)
        };
        for d in [&stuck, &done, &queued] {
            store.insert_document(d).await.unwrap();
        }

        let unfinished = store.unfinished_documents().await.unwrap();
        let ids: Vec<_> = unfinished.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec![stuck.id.clone(), queued.id.clone()]);

        let grant = authorize(&store, &OwnerId::new("a"), &stuck.id).await.unwrap();
        assert!(store.reset_for_reprocess(&grant).await.unwrap());
        let reset = store.get_document(&stuck.id).await.unwrap().unwrap();
        assert_eq!(reset.status, DocumentStatus::Validated);
        assert!(reset.anonymization.is_none());
    }

    #[tokio::test]
    async fn test_stats_by_status_and_kind() {
        let store = InMemoryStore::new();
        let owner = OwnerId::new("a");
        let cv = doc("a", "cv.pdf", DocumentStatus::Received);
        indexed(&store, &cv, &[vec![1.0], vec![0.5]]).await;
        let letter = Document {
            kind: DocumentKind::CoverLetter,
            size_bytes: 32,
            ..doc("a", "letter.pdf", DocumentStatus::Quarantined)
        };
        store.insert_document(&letter).await.unwrap();
        store
            .insert_document(&doc("a", "gone.pdf", DocumentStatus::Deleted))
            .await
            .unwrap();
        store
            .insert_document(&doc("b", "other.pdf", DocumentStatus::Indexed))
            .await
            .unwrap();

        let stats = store.stats(&owner).await.unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.count(DocumentStatus::Indexed), 1);
        assert_eq!(stats.count(DocumentStatus::Quarantined), 1);
        assert_eq!(stats.count(DocumentStatus::Deleted), 0);
        assert_eq!(stats.count_kind(DocumentKind::Cv), 1);
        assert_eq!(stats.count_kind(DocumentKind::CoverLetter), 1);
        assert_eq!(stats.total_bytes, 42);
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.pending(), 0);
        assert!(stats.last_upload.is_some());

        let empty = store.stats(&OwnerId::new("nobody")).await.unwrap();
        assert_eq!(empty, OwnerStats::default());
    }
}
