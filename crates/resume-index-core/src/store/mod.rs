//! Storage abstraction for resume-index.
//!
//! The [`VectorStore`] trait persists documents, their chunks, and chunk
//! vectors, and answers owner-scoped nearest-neighbour queries. Every
//! status change is a compare-and-set: an operation names the status it
//! expects to move *from* and reports `false` when the document has moved
//! on (for example, deleted mid-pipeline). Callers discard their work in
//! that case.
//!
//! Operations that act on behalf of an owner take a [`DocumentGrant`],
//! which can only be obtained from [`authorize`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AnonymizationNote, Chunk, Document, DocumentId, DocumentKind, DocumentStatus, Failure, OwnerId,
};

/// A chunk matched by [`VectorStore::search`], with its document metadata.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub document_id: DocumentId,
    pub document_name: String,
    pub sequence: u32,
    pub text: String,
    pub hash: String,
    /// Cosine similarity clamped into `[0.0, 1.0]`.
    pub score: f32,
    pub uploaded_at: DateTime<Utc>,
}

/// Parameters of a nearest-neighbour query.
#[derive(Debug, Clone, Copy)]
pub struct VectorQuery<'a> {
    pub owner_id: &'a OwnerId,
    pub vector: &'a [f32],
    pub limit: usize,
    pub min_score: f32,
    pub kind: Option<DocumentKind>,
    /// Leave this document's chunks out (used by similar-document lookup).
    pub exclude: Option<&'a DocumentId>,
}

/// Per-owner totals over every document that is not deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerStats {
    pub documents: usize,
    pub by_status: HashMap<DocumentStatus, usize>,
    pub by_kind: HashMap<DocumentKind, usize>,
    pub total_bytes: u64,
    /// Chunks of the owner's indexed documents.
    pub chunks: usize,
    pub last_upload: Option<DateTime<Utc>>,
}

impl OwnerStats {
    pub fn count(&self, status: DocumentStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn count_kind(&self, kind: DocumentKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Documents the pipeline has not finished with yet.
    pub fn pending(&self) -> usize {
        self.by_status
            .iter()
            .filter(|(status, _)| status.is_in_progress())
            .map(|(_, n)| n)
            .sum()
    }

    /// Fold one document into the totals.
    pub fn add(&mut self, doc: &Document) {
        self.documents += 1;
        *self.by_status.entry(doc.status).or_default() += 1;
        *self.by_kind.entry(doc.kind).or_default() += 1;
        self.total_bytes += doc.size_bytes;
        self.last_upload = self.last_upload.max(Some(doc.uploaded_at));
    }
}

/// Proof that a document exists, is not deleted, and belongs to the owner
/// that asked for it.
///
/// The only constructor is [`authorize`], so an owner-scoped operation
/// cannot be reached without the ownership check.
#[derive(Debug, Clone)]
pub struct DocumentGrant {
    document: Document,
}

impl DocumentGrant {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn id(&self) -> &DocumentId {
        &self.document.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.document.owner_id
    }
}

/// Resolve `id` for `owner`.
///
/// Fails with [`Error::NotFound`](crate::Error::NotFound) when the
/// document does not exist or is deleted, and with
/// [`Error::Authorization`](crate::Error::Authorization) when it belongs
/// to someone else.
pub async fn authorize<S: VectorStore + ?Sized>(
    store: &S,
    owner: &OwnerId,
    id: &DocumentId,
) -> crate::Result<DocumentGrant> {
    let document = store
        .get_document(id)
        .await?
        .filter(|d| d.status != DocumentStatus::Deleted)
        .ok_or_else(|| crate::Error::NotFound(id.clone()))?;
    if &document.owner_id != owner {
        return Err(crate::Error::Authorization(id.clone()));
    }
    Ok(DocumentGrant { document })
}

/// Reject transitions that are not edges of the lifecycle graph.
pub fn ensure_transition(from: DocumentStatus, to: DocumentStatus) -> Result<()> {
    if !from.can_transition_to(to) {
        anyhow::bail!("illegal status transition {} -> {}", from, to);
    }
    Ok(())
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](VectorStore::insert_document) | Create a document row in `received` |
/// | [`transition`](VectorStore::transition) | Compare-and-set a plain status change |
/// | [`quarantine`](VectorStore::quarantine) | `received → quarantined` with a reason |
/// | [`fail`](VectorStore::fail) | `* → failed` with a failure record |
/// | [`mark_anonymized`](VectorStore::mark_anonymized) | `extracted → anonymized` with the redaction note |
/// | [`commit_index`](VectorStore::commit_index) | `anonymized → indexed` plus chunk insert, atomically |
/// | [`reset_for_reprocess`](VectorStore::reset_for_reprocess) | `failed/indexed/extracted/anonymized → validated`, dropping chunks |
/// | [`delete_document`](VectorStore::delete_document) | `* → deleted`, dropping chunks, atomically |
/// | [`unfinished_documents`](VectorStore::unfinished_documents) | Documents left mid-pipeline, any owner |
/// | [`stats`](VectorStore::stats) | Per-owner document and chunk totals |
/// | [`search`](VectorStore::search) | Owner-scoped cosine search over indexed documents |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert_document(&self, doc: &Document) -> Result<()>;

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// The owner's documents that are not deleted, newest first.
    async fn list_documents(&self, owner: &OwnerId) -> Result<Vec<Document>>;

    /// Documents counting against the owner's quota: everything except
    /// deleted, failed, and quarantined.
    async fn count_live_documents(&self, owner: &OwnerId) -> Result<usize>;

    /// Move `id` from `from` to `to`. Returns `false` if the document is no
    /// longer in `from`.
    async fn transition(&self, id: &DocumentId, from: DocumentStatus, to: DocumentStatus)
        -> Result<bool>;

    async fn quarantine(&self, id: &DocumentId, reason: &str) -> Result<bool>;

    async fn fail(&self, id: &DocumentId, from: DocumentStatus, failure: &Failure) -> Result<bool>;

    async fn mark_anonymized(&self, id: &DocumentId, note: &AnonymizationNote) -> Result<bool>;

    /// Store `chunks` and move the document to `indexed` in one atomic step.
    /// `chunks` must be non-empty.
    async fn commit_index(&self, id: &DocumentId, chunks: &[Chunk]) -> Result<bool>;

    /// Move the document back to `validated` from `failed`, `indexed`,
    /// `extracted`, or `anonymized`, clearing its failure, redaction note,
    /// and chunks.
    async fn reset_for_reprocess(&self, grant: &DocumentGrant) -> Result<bool>;

    async fn delete_document(&self, grant: &DocumentGrant) -> Result<bool>;

    /// Documents in `received`, `validated`, `extracted`, or `anonymized`,
    /// oldest upload first.
    async fn unfinished_documents(&self) -> Result<Vec<Document>>;

    async fn stats(&self, owner: &OwnerId) -> Result<OwnerStats>;

    /// All chunks of a document, ordered by sequence.
    async fn chunks_for(&self, id: &DocumentId) -> Result<Vec<Chunk>>;

    /// At most `query.limit` chunks scoring at least `query.min_score`,
    /// best first, drawn only from the owner's `indexed` documents.
    async fn search(&self, query: &VectorQuery<'_>) -> Result<Vec<ChunkCandidate>>;
}
