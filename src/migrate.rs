use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema in the configured database (`ridx init`).
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool, config.embedding.dims).await?;
    pool.close().await;
    Ok(())
}

/// Idempotently create tables and indexes, then pin the embedding
/// dimensionality (see also [`pin_embedding_model`]). A database created for a different `dims` is refused:
/// its stored vectors would not be comparable with new ones.
pub async fn apply(pool: &SqlitePool, dims: usize) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            stored_filename TEXT NOT NULL,
            blob_ref TEXT NOT NULL,
            declared_type TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'cv',
            size_bytes INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            status TEXT NOT NULL,
            failure_kind TEXT,
            failure_message TEXT,
            quarantine_reason TEXT,
            redactions INTEGER,
            degraded INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create chunks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(document_id, sequence),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_owner_status ON documents(owner_id, status)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_uploaded_at ON documents(uploaded_at DESC)",
    )
    .execute(pool)
    .await?;

    let stored = pin(pool, "embedding_dims", &dims.to_string()).await?;
    if stored != dims.to_string() {
        bail!(
            "database was created for {}-dimensional embeddings but embedding.dims is {}; \
             re-create the database to change dimensionality",
            stored,
            dims
        );
    }

    Ok(())
}

/// Record which embedding model produced the stored vectors, as
/// `<provider>:<model>`, and refuse any other. Vectors from two models
/// share no space even at equal dimensionality.
pub async fn pin_embedding_model(pool: &SqlitePool, provider: &str, model: &str) -> Result<()> {
    let wanted = format!("{provider}:{model}");
    let stored = pin(pool, "embedding_model", &wanted).await?;
    if stored != wanted {
        bail!(
            "database was indexed with embedding model '{}' but the configuration selects '{}'; \
             re-create the database to switch models",
            stored,
            wanted
        );
    }
    Ok(())
}

/// Store `value` under `key` unless a value is already there, and return
/// whichever value is now stored.
async fn pin(pool: &SqlitePool, key: &str, value: &str) -> Result<String> {
    sqlx::query("INSERT OR IGNORE INTO index_meta (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    let stored: String = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;
    Ok(stored)
}
