//! Staged ingestion pipeline.
//!
//! Drives one accepted document from `validated` to `indexed`:
//!
//! ```text
//! validated ─▶ extract ─▶ extracted ─▶ anonymize ─▶ anonymized ─▶ chunk + embed ─▶ indexed
//! ```
//!
//! Each arrow is a compare-and-set on the document's status. When one fails
//! the document was moved by someone else (deleted, most likely) and the
//! stage's output is dropped. Errors are recorded on the document as a
//! `failed` status with a [`Failure`]; they are never returned to the
//! submitter.
//!
//! Raw extracted text exists only inside [`Pipeline::advance`]; it is
//! neither persisted nor logged.

use std::sync::Arc;

use chrono::Utc;

use resume_index_core::anonymize::Anonymizer;
use resume_index_core::chunk::{make_chunk, split, ChunkingParams};
use resume_index_core::models::{
    AnonymizationNote, Chunk, Document, DocumentId, DocumentStatus, Failure, FailureKind,
};
use resume_index_core::store::VectorStore;

use crate::blob::BlobStore;
use crate::embedding::RetryingEmbedder;
use crate::extract::extract_text;

/// A stage failure waiting to be recorded, with the status the document
/// was in when it happened.
struct Halt {
    from: DocumentStatus,
    failure: Failure,
}

impl Halt {
    fn new(from: DocumentStatus, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            from,
            failure: Failure {
                kind,
                message: message.into(),
            },
        }
    }

    fn storage(from: DocumentStatus, e: anyhow::Error) -> Self {
        Self::new(from, FailureKind::Storage, format!("{e:#}"))
    }
}

/// The ingestion stages with their injected collaborators. Cheap to clone;
/// each accepted upload runs on its own clone.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn VectorStore>,
    blobs: BlobStore,
    anonymizer: Anonymizer,
    embedder: RetryingEmbedder,
    chunking: ChunkingParams,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn VectorStore>,
        blobs: BlobStore,
        anonymizer: Anonymizer,
        embedder: RetryingEmbedder,
        chunking: ChunkingParams,
    ) -> Self {
        Self {
            store,
            blobs,
            anonymizer,
            embedder,
            chunking,
        }
    }

    /// Run every remaining stage for `id` and return the status it ends in.
    pub async fn run(&self, id: &DocumentId) -> DocumentStatus {
        match self.advance(id).await {
            Ok(status) => status,
            Err(halt) => self.record_failure(id, halt).await,
        }
    }

    async fn advance(&self, id: &DocumentId) -> Result<DocumentStatus, Halt> {
        use DocumentStatus::*;

        let doc = self
            .store
            .get_document(id)
            .await
            .map_err(|e| Halt::storage(Validated, e))?;
        let Some(doc) = doc.filter(|d| d.status == Validated) else {
            tracing::debug!(document_id = %id, "document not awaiting ingestion; skipping");
            return Ok(self.current_status(id).await);
        };

        // Extract
        let text = self.extract(&doc).await?;
        if !self.cas(id, Validated, Extracted).await? {
            return Ok(self.superseded(id, "extract").await);
        }

        // Anonymize
        let redaction = self.anonymizer.redact(&text).await;
        drop(text);
        let note = AnonymizationNote {
            redactions: redaction.total(),
            degraded: redaction.degraded,
        };
        let moved = self
            .store
            .mark_anonymized(id, &note)
            .await
            .map_err(|e| Halt::storage(Extracted, e))?;
        if !moved {
            return Ok(self.superseded(id, "anonymize").await);
        }
        tracing::debug!(
            document_id = %id,
            redactions = note.redactions,
            degraded = note.degraded,
            "document anonymized"
        );

        // Chunk
        let pieces = split(&redaction.text, &self.chunking);
        if pieces.is_empty() {
            return Err(Halt::new(
                Anonymized,
                FailureKind::Extraction,
                "no text left to index after anonymization",
            ));
        }

        // Embed
        let vectors = self
            .embedder
            .embed_texts(&pieces)
            .await
            .map_err(|e| Halt::new(Anonymized, FailureKind::Embedding, e.to_string()))?;

        // Store
        let now = Utc::now();
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| make_chunk(id, i as u32, text, vector, now))
            .collect();
        let committed = self
            .store
            .commit_index(id, &chunks)
            .await
            .map_err(|e| Halt::storage(Anonymized, e))?;
        if !committed {
            return Ok(self.superseded(id, "index").await);
        }

        tracing::info!(
            document_id = %id,
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "document indexed"
        );
        Ok(Indexed)
    }

    async fn extract(&self, doc: &Document) -> Result<String, Halt> {
        let bytes = self
            .blobs
            .read(&doc.blob_ref)
            .await
            .map_err(|e| Halt::storage(DocumentStatus::Validated, e))?;
        let declared = doc.declared_type;
        let joined = tokio::task::spawn_blocking(move || extract_text(&bytes, declared)).await;
        match joined {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(Halt::new(
                DocumentStatus::Validated,
                FailureKind::Extraction,
                e.to_string(),
            )),
            Err(e) => Err(Halt::new(
                DocumentStatus::Validated,
                FailureKind::Extraction,
                if e.is_panic() {
                    "extractor crashed on this document".to_string()
                } else {
                    format!("extraction task failed: {e}")
                },
            )),
        }
    }

    async fn cas(
        &self,
        id: &DocumentId,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<bool, Halt> {
        self.store
            .transition(id, from, to)
            .await
            .map_err(|e| Halt::storage(from, e))
    }

    async fn superseded(&self, id: &DocumentId, stage: &str) -> DocumentStatus {
        let status = self.current_status(id).await;
        tracing::info!(
            document_id = %id,
            stage,
            status = %status,
            "document changed during ingestion; discarding stage output"
        );
        status
    }

    /// Best-effort status read; a document that cannot be found is gone.
    async fn current_status(&self, id: &DocumentId) -> DocumentStatus {
        match self.store.get_document(id).await {
            Ok(Some(doc)) => doc.status,
            Ok(None) => DocumentStatus::Deleted,
            Err(e) => {
                tracing::error!(document_id = %id, error = %e, "failed to read document status");
                DocumentStatus::Failed
            }
        }
    }

    async fn record_failure(&self, id: &DocumentId, halt: Halt) -> DocumentStatus {
        tracing::warn!(
            document_id = %id,
            stage_status = %halt.from,
            kind = halt.failure.kind.as_str(),
            reason = %halt.failure.message,
            "ingestion failed"
        );
        match self.store.fail(id, halt.from, &halt.failure).await {
            Ok(true) => DocumentStatus::Failed,
            Ok(false) => self.superseded(id, "fail").await,
            Err(e) => {
                tracing::error!(document_id = %id, error = %e, "failed to record ingestion failure");
                self.current_status(id).await
            }
        }
    }
}
