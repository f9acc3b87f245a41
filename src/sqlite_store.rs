//! SQLite-backed [`VectorStore`] implementation.
//!
//! Status changes are conditional `UPDATE ... WHERE id = ? AND status = ?`
//! statements; a zero row count means another writer (usually a delete)
//! got there first. Chunk writes that must be atomic with a status change
//! share one transaction with it.
//!
//! Vectors are stored as little-endian f32 BLOBs and scored in Rust after
//! the owner/status filter has been applied in SQL.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use resume_index_core::embedding::{blob_to_vec, similarity_score, vec_to_blob};
use resume_index_core::models::{
    AnonymizationNote, Chunk, DeclaredType, Document, DocumentId, DocumentKind, DocumentStatus,
    Failure, FailureKind, OwnerId,
};
use resume_index_core::search::compare_candidates;
use resume_index_core::store::{
    ensure_transition, ChunkCandidate, DocumentGrant, OwnerStats, VectorQuery, VectorStore,
};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let status: String = row.get("status");
    let declared_type: String = row.get("declared_type");
    let kind: String = row.get("kind");
    let failure_kind: Option<String> = row.get("failure_kind");
    let failure_message: Option<String> = row.get("failure_message");
    let redactions: Option<i64> = row.get("redactions");
    let degraded: Option<bool> = row.get("degraded");
    let size_bytes: i64 = row.get("size_bytes");

    let failure = match failure_kind {
        Some(k) => Some(Failure {
            kind: k.parse::<FailureKind>().map_err(|e| anyhow!(e))?,
            message: failure_message.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Document {
        id: DocumentId::new(row.get::<String, _>("id")),
        owner_id: OwnerId::new(row.get::<String, _>("owner_id")),
        original_filename: row.get("original_filename"),
        stored_filename: row.get("stored_filename"),
        blob_ref: row.get("blob_ref"),
        declared_type: declared_type.parse::<DeclaredType>().map_err(|e| anyhow!(e))?,
        kind: kind.parse::<DocumentKind>().map_err(|e| anyhow!(e))?,
        size_bytes: u64::try_from(size_bytes)?,
        sha256: row.get("sha256"),
        uploaded_at: from_millis(row.get("uploaded_at"))?,
        updated_at: from_millis(row.get("updated_at"))?,
        status: status.parse::<DocumentStatus>().map_err(|e| anyhow!(e))?,
        failure,
        quarantine_reason: row.get("quarantine_reason"),
        anonymization: redactions.map(|r| AnonymizationNote {
            redactions: u32::try_from(r).unwrap_or(u32::MAX),
            degraded: degraded.unwrap_or(false),
        }),
    })
}

const DOCUMENT_COLUMNS: &str = "id, owner_id, original_filename, stored_filename, blob_ref, \
     declared_type, kind, size_bytes, sha256, uploaded_at, updated_at, status, failure_kind, \
     failure_message, quarantine_reason, redactions, degraded";

#[async_trait]
impl VectorStore for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, original_filename, stored_filename, blob_ref,
                                   declared_type, kind, size_bytes, sha256, uploaded_at,
                                   updated_at, status, failure_kind, failure_message,
                                   quarantine_reason, redactions, degraded)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.id.as_str())
        .bind(doc.owner_id.as_str())
        .bind(&doc.original_filename)
        .bind(&doc.stored_filename)
        .bind(&doc.blob_ref)
        .bind(doc.declared_type.as_str())
        .bind(doc.kind.as_str())
        .bind(i64::try_from(doc.size_bytes)?)
        .bind(&doc.sha256)
        .bind(to_millis(doc.uploaded_at))
        .bind(to_millis(doc.updated_at))
        .bind(doc.status.as_str())
        .bind(doc.failure.as_ref().map(|f| f.kind.as_str()))
        .bind(doc.failure.as_ref().map(|f| f.message.as_str()))
        .bind(doc.quarantine_reason.as_deref())
        .bind(doc.anonymization.map(|a| i64::from(a.redactions)))
        .bind(doc.anonymization.map(|a| a.degraded))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self, owner: &OwnerId) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE owner_id = ? AND status != 'deleted' \
             ORDER BY uploaded_at DESC, id ASC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn count_live_documents(&self, owner: &OwnerId) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents \
             WHERE owner_id = ? AND status NOT IN ('deleted', 'failed', 'quarantined')",
        )
        .bind(owner.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(usize::try_from(count)?)
    }

    async fn transition(
        &self,
        id: &DocumentId,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<bool> {
        ensure_transition(from, to)?;
        let result = sqlx::query(
            "UPDATE documents SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(to_millis(Utc::now()))
        .bind(id.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn quarantine(&self, id: &DocumentId, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET status = 'quarantined', quarantine_reason = ?, updated_at = ? \
             WHERE id = ? AND status = 'received'",
        )
        .bind(reason)
        .bind(to_millis(Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail(&self, id: &DocumentId, from: DocumentStatus, failure: &Failure) -> Result<bool> {
        ensure_transition(from, DocumentStatus::Failed)?;
        let result = sqlx::query(
            "UPDATE documents SET status = 'failed', failure_kind = ?, failure_message = ?, \
             updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(failure.kind.as_str())
        .bind(&failure.message)
        .bind(to_millis(Utc::now()))
        .bind(id.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_anonymized(&self, id: &DocumentId, note: &AnonymizationNote) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET status = 'anonymized', redactions = ?, degraded = ?, \
             updated_at = ? WHERE id = ? AND status = 'extracted'",
        )
        .bind(i64::from(note.redactions))
        .bind(note.degraded)
        .bind(to_millis(Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit_index(&self, id: &DocumentId, chunks: &[Chunk]) -> Result<bool> {
        if chunks.is_empty() {
            bail!("refusing to index document {} without chunks", id);
        }
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            "UPDATE documents SET status = 'indexed', updated_at = ? \
             WHERE id = ? AND status = 'anonymized'",
        )
        .bind(to_millis(Utc::now()))
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;
        if !moved {
            tx.rollback().await?;
            return Ok(false);
        }

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, sequence, text, hash, embedding, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(chunk.document_id.as_str())
            .bind(i64::from(chunk.sequence))
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(to_millis(chunk.created_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn reset_for_reprocess(&self, grant: &DocumentGrant) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            "UPDATE documents SET status = 'validated', failure_kind = NULL, \
             failure_message = NULL, redactions = NULL, degraded = NULL, updated_at = ? \
             WHERE id = ? AND status IN ('failed', 'indexed', 'extracted', 'anonymized')",
        )
        .bind(to_millis(Utc::now()))
        .bind(grant.id().as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;
        if !moved {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(grant.id().as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_document(&self, grant: &DocumentGrant) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            "UPDATE documents SET status = 'deleted', updated_at = ? \
             WHERE id = ? AND status != 'deleted'",
        )
        .bind(to_millis(Utc::now()))
        .bind(grant.id().as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;
        if !moved {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(grant.id().as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn unfinished_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE status IN ('received', 'validated', 'extracted', 'anonymized') \
             ORDER BY uploaded_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn stats(&self, owner: &OwnerId) -> Result<OwnerStats> {
        let rows = sqlx::query(
            r#"
            SELECT status, kind, COUNT(*) AS doc_count,
                   SUM(size_bytes) AS total_bytes, MAX(uploaded_at) AS last_upload
            FROM documents
            WHERE owner_id = ? AND status != 'deleted'
            GROUP BY status, kind
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut stats = OwnerStats::default();
        for row in &rows {
            let status: String = row.get("status");
            let kind: String = row.get("kind");
            let count = usize::try_from(row.get::<i64, _>("doc_count"))?;
            let status = status.parse::<DocumentStatus>().map_err(|e| anyhow!(e))?;
            let kind = kind.parse::<DocumentKind>().map_err(|e| anyhow!(e))?;
            *stats.by_status.entry(status).or_default() += count;
            *stats.by_kind.entry(kind).or_default() += count;
            stats.documents += count;
            stats.total_bytes += u64::try_from(row.get::<i64, _>("total_bytes"))?;
            let last = from_millis(row.get("last_upload"))?;
            stats.last_upload = stats.last_upload.max(Some(last));
        }

        let chunks: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chunks c JOIN documents d ON d.id = c.document_id \
             WHERE d.owner_id = ? AND d.status = 'indexed'",
        )
        .bind(owner.as_str())
        .fetch_one(&self.pool)
        .await?;
        stats.chunks = usize::try_from(chunks)?;
        Ok(stats)
    }

    async fn chunks_for(&self, id: &DocumentId) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, sequence, text, hash, embedding, created_at \
             FROM chunks WHERE document_id = ? ORDER BY sequence ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let sequence: i64 = row.get("sequence");
                Ok(Chunk {
                    id: row.get("id"),
                    document_id: DocumentId::new(row.get::<String, _>("document_id")),
                    sequence: u32::try_from(sequence)?,
                    text: row.get("text"),
                    hash: row.get("hash"),
                    embedding: blob_to_vec(&blob),
                    created_at: from_millis(row.get("created_at"))?,
                })
            })
            .collect()
    }

    async fn search(&self, query: &VectorQuery<'_>) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.document_id, c.sequence, c.text, c.hash, c.embedding,
                   d.original_filename, d.uploaded_at
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.owner_id = ?
              AND d.status = 'indexed'
              AND (? IS NULL OR d.kind = ?)
              AND (? IS NULL OR d.id != ?)
            "#,
        )
        .bind(query.owner_id.as_str())
        .bind(query.kind.map(|k| k.as_str()))
        .bind(query.kind.map(|k| k.as_str()))
        .bind(query.exclude.map(|id| id.as_str()))
        .bind(query.exclude.map(|id| id.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::new();
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let score = similarity_score(query.vector, &blob_to_vec(&blob));
            if score < query.min_score {
                continue;
            }
            let sequence: i64 = row.get("sequence");
            candidates.push(ChunkCandidate {
                chunk_id: row.get("chunk_id"),
                document_id: DocumentId::new(row.get::<String, _>("document_id")),
                document_name: row.get("original_filename"),
                sequence: u32::try_from(sequence)?,
                text: row.get("text"),
                hash: row.get("hash"),
                score,
                uploaded_at: from_millis(row.get("uploaded_at"))?,
            });
        }

        candidates.sort_by(compare_candidates);
        candidates.truncate(query.limit);
        Ok(candidates)
    }
}
