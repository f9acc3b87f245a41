//! The caller-facing service: every ingest, search, and document
//! management operation goes through [`ResumeIndex`].
//!
//! | Operation | Owner check | Result |
//! |-----------|-------------|--------|
//! | [`submit`](ResumeIndex::submit) | n/a (owner is the uploader) | document id + status, ingestion runs in the background |
//! | [`get_status`](ResumeIndex::get_status) | none | current status |
//! | [`document`](ResumeIndex::document) / [`list`](ResumeIndex::list) | yes | document records |
//! | [`search`](ResumeIndex::search) / [`similar`](ResumeIndex::similar) | scoped inside the store | ranked results |
//! | [`delete`](ResumeIndex::delete) | yes | chunks removed, status `deleted` |
//! | [`download`](ResumeIndex::download) | yes | original bytes |
//! | [`reprocess`](ResumeIndex::reprocess) | yes | pipeline restarted |
//! | [`stats`](ResumeIndex::stats) | scoped inside the store | per-owner totals |
//! | [`resume_interrupted`](ResumeIndex::resume_interrupted) | n/a (maintenance) | unfinished ingestion restarted |
//!
//! Ownership checks go through [`authorize`], which is the only way to
//! obtain the `DocumentGrant` that owner-scoped store operations require.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::task::JoinHandle;

use resume_index_core::anonymize::{Anonymizer, EntityRecognizer};
use resume_index_core::embedding::EmbeddingProvider;
use resume_index_core::models::{
    Document, DocumentId, DocumentKind, DocumentStatus, OwnerId, SearchResult,
};
use resume_index_core::search::SearchOptions;
use resume_index_core::store::{authorize, OwnerStats, VectorStore};
use resume_index_core::validate::{self as validation, Upload, UploadPolicy, Verdict};
use resume_index_core::{Error, Result};

use crate::blob::{BlobArea, BlobStore, QuarantineRecord};
use crate::config::Config;
use crate::embedding::{create_provider, RetryingEmbedder};
use crate::entities::create_recognizer;
use crate::ingest::Pipeline;
use crate::search::Retriever;
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

/// A raw upload.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub owner_id: OwnerId,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
}

/// Outcome of an accepted upload.
///
/// `status` is the status at the moment `submit` returned: `validated`
/// (ingestion running) or `quarantined` (nothing further will run). Await
/// [`finished`](Submission::finished) to wait for ingestion to settle, or
/// drop the submission to let it run detached.
#[derive(Debug)]
pub struct Submission {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    task: Option<JoinHandle<DocumentStatus>>,
}

impl Submission {
    /// Wait for the pipeline and return the status it settled in.
    pub async fn finished(self) -> Result<DocumentStatus> {
        match self.task {
            Some(task) => task
                .await
                .map_err(|e| Error::Storage(anyhow::anyhow!("ingestion task failed: {e}"))),
            None => Ok(self.status),
        }
    }
}

/// An original upload as returned by [`ResumeIndex::download`].
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub struct ResumeIndex {
    store: Arc<dyn VectorStore>,
    blobs: BlobStore,
    policy: UploadPolicy,
    pipeline: Pipeline,
    retriever: Retriever,
}

impl ResumeIndex {
    /// Open the configured SQLite database (creating and migrating it if
    /// needed) and build every collaborator from `config`.
    ///
    /// The database is pinned to the embedding provider and model that
    /// first wrote to it; opening it with another one fails. Documents left
    /// mid-pipeline by an earlier process are not touched here; call
    /// [`resume_interrupted`](Self::resume_interrupted) for that.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool, config.embedding.dims).await?;
        let provider = create_provider(&config.embedding)?;
        migrate::pin_embedding_model(&pool, &config.embedding.provider, provider.model_name())
            .await?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::new(pool));
        let recognizer = create_recognizer(&config.anonymizer)?;
        Self::with_components(config, store, provider, recognizer)
    }

    /// Assemble the service from explicit collaborators (used by tests to
    /// inject an in-memory store or failing providers).
    pub fn with_components(
        config: &Config,
        store: Arc<dyn VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        recognizer: Option<Arc<dyn EntityRecognizer>>,
    ) -> anyhow::Result<Self> {
        if provider.dims() != config.embedding.dims {
            anyhow::bail!(
                "embedding provider '{}' produces {}-dimensional vectors but embedding.dims is {}",
                provider.model_name(),
                provider.dims(),
                config.embedding.dims
            );
        }
        let chunking = config.chunking_params()?;
        let blobs = BlobStore::new(&config.storage.root);
        let embedder = RetryingEmbedder::new(provider, &config.embedding);
        let pipeline = Pipeline::new(
            Arc::clone(&store),
            blobs.clone(),
            Anonymizer::new(recognizer),
            embedder.clone(),
            chunking,
        );
        let retriever = Retriever::new(Arc::clone(&store), embedder, config.search_defaults());
        Ok(Self {
            store,
            blobs,
            policy: config.upload_policy(),
            pipeline,
            retriever,
        })
    }

    /// Validate and accept an upload.
    ///
    /// Rejections return [`Error::Validation`] and leave no trace. Accepted
    /// uploads get exactly one document; its ingestion runs on a spawned
    /// task and failures there are recorded on the document.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Submission> {
        let now = Utc::now();
        let live = self.store.count_live_documents(&request.owner_id).await?;
        let upload = Upload {
            owner_id: &request.owner_id,
            filename: &request.filename,
            content_type: &request.content_type,
            bytes: &request.bytes,
        };
        let accepted = validation::validate(&upload, &self.policy, live, now)?;

        let id = DocumentId::generate();
        let area = match accepted.verdict {
            Verdict::Clean => BlobArea::Holding,
            Verdict::Quarantine(_) => BlobArea::Quarantine,
        };
        let blob_ref = self
            .blobs
            .put(area, &id, &accepted.stored_filename, &request.bytes)
            .await?;

        let doc = Document {
            id: id.clone(),
            owner_id: request.owner_id.clone(),
            original_filename: request.filename.clone(),
            stored_filename: accepted.stored_filename.clone(),
            blob_ref: blob_ref.clone(),
            declared_type: accepted.declared_type,
            kind: request.kind,
            size_bytes: request.bytes.len() as u64,
            sha256: accepted.sha256.clone(),
            uploaded_at: now,
            updated_at: now,
            status: DocumentStatus::Received,
            failure: None,
            quarantine_reason: None,
            anonymization: None,
        };
        if let Err(e) = self.store.insert_document(&doc).await {
            if let Err(cleanup) = self.blobs.remove(&blob_ref).await {
                tracing::warn!(document_id = %id, error = %cleanup, "failed to remove orphaned blob");
            }
            return Err(e.into());
        }

        match self.route(&doc, &accepted.verdict).await {
            Ok(submission) => Ok(submission),
            Err(e) => {
                self.discard(&doc).await;
                Err(e)
            }
        }
    }

    /// Move a freshly inserted document out of `received`: into quarantine
    /// with its review record, or on to `validated` and the pipeline.
    async fn route(&self, doc: &Document, verdict: &Verdict) -> Result<Submission> {
        let id = &doc.id;
        if let Verdict::Quarantine(reason) = verdict {
            if !self.store.quarantine(id, reason).await? {
                return self.moved_elsewhere(id).await;
            }
            self.blobs
                .write_quarantine_record(
                    &doc.blob_ref,
                    &QuarantineRecord {
                        document_id: id,
                        original_filename: &doc.original_filename,
                        reason,
                        quarantined_at: Utc::now(),
                        sha256: &doc.sha256,
                        size_bytes: doc.size_bytes,
                    },
                )
                .await?;
            tracing::warn!(
                document_id = %id,
                owner_id = %doc.owner_id,
                reason = %reason,
                "upload quarantined"
            );
            return Ok(Submission {
                document_id: id.clone(),
                status: DocumentStatus::Quarantined,
                task: None,
            });
        }

        if !self
            .store
            .transition(id, DocumentStatus::Received, DocumentStatus::Validated)
            .await?
        {
            return self.moved_elsewhere(id).await;
        }
        tracing::info!(
            document_id = %id,
            owner_id = %doc.owner_id,
            declared_type = doc.declared_type.as_str(),
            size_bytes = doc.size_bytes,
            "upload accepted"
        );
        Ok(self.spawn_ingestion(id.clone()))
    }

    /// Someone else (a delete, or recovery in another process) moved the
    /// document first; report where it is now and start nothing.
    async fn moved_elsewhere(&self, id: &DocumentId) -> Result<Submission> {
        let status = self.get_status(id).await?;
        tracing::info!(document_id = %id, status = %status, "document moved during submit");
        Ok(Submission {
            document_id: id.clone(),
            status,
            task: None,
        })
    }

    /// Take back an upload whose routing failed after the row was written:
    /// the row goes to `deleted`, then the bytes are removed. If the row
    /// cannot be deleted the bytes stay so that
    /// [`resume_interrupted`](Self::resume_interrupted) can finish it.
    async fn discard(&self, doc: &Document) {
        let deleted = match authorize(self.store.as_ref(), &doc.owner_id, &doc.id).await {
            Ok(grant) => self.store.delete_document(&grant).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        if let Err(e) = deleted {
            tracing::error!(document_id = %doc.id, error = %e, "failed to discard rejected upload");
            return;
        }
        if let Err(e) = self.blobs.remove(&doc.blob_ref).await {
            tracing::warn!(document_id = %doc.id, error = %e, "failed to remove discarded blob");
        }
    }

    fn spawn_ingestion(&self, id: DocumentId) -> Submission {
        let pipeline = self.pipeline.clone();
        let task_id = id.clone();
        let task = tokio::spawn(async move { pipeline.run(&task_id).await });
        Submission {
            document_id: id,
            status: DocumentStatus::Validated,
            task: Some(task),
        }
    }

    /// Restart ingestion for documents an earlier process left unfinished
    /// (it exited with the pipeline still running, or crashed).
    ///
    /// `extracted` and `anonymized` documents go back to `validated`;
    /// `validated` ones are picked up as they are. A `received` document
    /// never had its verdict applied, so the area its bytes were written to
    /// decides: quarantine area means quarantined, holding area means
    /// validated. Every restarted document is returned as a [`Submission`].
    pub async fn resume_interrupted(&self) -> Result<Vec<Submission>> {
        let mut resumed = Vec::new();
        for doc in self.store.unfinished_documents().await? {
            if let Some(submission) = self.resume(&doc).await? {
                resumed.push(submission);
            }
        }
        if !resumed.is_empty() {
            tracing::info!(documents = resumed.len(), "resuming interrupted ingestion");
        }
        Ok(resumed)
    }

    async fn resume(&self, doc: &Document) -> Result<Option<Submission>> {
        use DocumentStatus::*;
        let id = &doc.id;
        let moved = match doc.status {
            Validated => true,
            Extracted | Anonymized => self.store.transition(id, doc.status, Validated).await?,
            Received => match BlobArea::of(&doc.blob_ref) {
                Some(BlobArea::Holding) => self.store.transition(id, Received, Validated).await?,
                _ => {
                    let reason = "upload interrupted before review; held for inspection";
                    if self.store.quarantine(id, reason).await? {
                        tracing::warn!(document_id = %id, "interrupted upload quarantined");
                    }
                    false
                }
            },
            _ => false,
        };
        if !moved {
            return Ok(None);
        }
        tracing::debug!(document_id = %id, previous_status = %doc.status, "restarting ingestion");
        Ok(Some(self.spawn_ingestion(id.clone())))
    }

    /// Current status of a document, including `deleted`.
    pub async fn get_status(&self, id: &DocumentId) -> Result<DocumentStatus> {
        self.store
            .get_document(id)
            .await?
            .map(|d| d.status)
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    pub async fn document(&self, owner: &OwnerId, id: &DocumentId) -> Result<Document> {
        Ok(authorize(self.store.as_ref(), owner, id).await?.document().clone())
    }

    /// The owner's documents, newest first. Deleted documents are omitted.
    pub async fn list(&self, owner: &OwnerId) -> Result<Vec<Document>> {
        Ok(self.store.list_documents(owner).await?)
    }

    pub async fn search(
        &self,
        owner: &OwnerId,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        self.retriever.search(owner, query, options).await
    }

    /// Chunks from the owner's other documents that resemble `id`.
    pub async fn similar(
        &self,
        owner: &OwnerId,
        id: &DocumentId,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let grant = authorize(self.store.as_ref(), owner, id).await?;
        self.retriever.similar(&grant, options).await
    }

    /// Mark the document deleted and drop its chunks in one step, then
    /// remove the original bytes.
    pub async fn delete(&self, owner: &OwnerId, id: &DocumentId) -> Result<()> {
        let grant = authorize(self.store.as_ref(), owner, id).await?;
        if !self.store.delete_document(&grant).await? {
            return Err(Error::NotFound(id.clone()));
        }
        if let Err(e) = self.blobs.remove(&grant.document().blob_ref).await {
            tracing::warn!(document_id = %id, error = %e, "document deleted but blob removal failed");
        }
        tracing::info!(document_id = %id, owner_id = %owner, "document deleted");
        Ok(())
    }

    pub async fn download(&self, owner: &OwnerId, id: &DocumentId) -> Result<Download> {
        let grant = authorize(self.store.as_ref(), owner, id).await?;
        let doc = grant.document();
        let bytes = self
            .blobs
            .read(&doc.blob_ref)
            .await
            .with_context(|| format!("original upload for document {id} is unavailable"))?;
        Ok(Download {
            filename: doc.original_filename.clone(),
            content_type: doc.declared_type.mime().to_string(),
            bytes,
        })
    }

    /// Run ingestion again from the stored original.
    ///
    /// `failed` and `indexed` documents lose their chunks and failure
    /// record first. Documents stuck in `validated`, `extracted`, or
    /// `anonymized` (their pipeline died with an earlier process) are
    /// restarted from `validated`. Quarantined uploads are never released
    /// this way.
    pub async fn reprocess(&self, owner: &OwnerId, id: &DocumentId) -> Result<Submission> {
        use DocumentStatus::*;
        let grant = authorize(self.store.as_ref(), owner, id).await?;
        let doc = grant.document();
        let status = doc.status;
        if BlobArea::of(&doc.blob_ref) != Some(BlobArea::Holding) {
            return Err(Error::Validation(format!(
                "document {id} was quarantined and cannot be reprocessed"
            )));
        }
        let moved = match status {
            Validated => true,
            Failed | Indexed | Extracted | Anonymized => {
                self.store.reset_for_reprocess(&grant).await?
            }
            _ => {
                return Err(Error::Validation(format!(
                    "document {id} is {status}; only failed, indexed, or unfinished documents \
                     can be reprocessed"
                )))
            }
        };
        if !moved {
            return Err(Error::Validation(format!(
                "document {id} changed status; try again"
            )));
        }
        tracing::info!(
            document_id = %id,
            previous_status = %status,
            "document queued for reprocessing"
        );
        Ok(self.spawn_ingestion(id.clone()))
    }

    /// Document and chunk totals for `owner`.
    pub async fn stats(&self, owner: &OwnerId) -> Result<OwnerStats> {
        Ok(self.store.stats(owner).await?)
    }

    /// Underlying store, for callers that need direct access (tests, tooling).
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }
}
