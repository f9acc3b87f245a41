//! Filesystem storage for original upload bytes.
//!
//! ```text
//! <storage.root>/
//!   holding/<document_id>/<stored_filename>
//!   quarantine/<document_id>/<stored_filename>
//!   quarantine/<document_id>/<stored_filename>.json   (metadata sidecar)
//! ```
//!
//! Documents refer to their bytes by a `blob_ref` relative to the root, so
//! the root can move without rewriting the database.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use resume_index_core::models::DocumentId;

const HOLDING: &str = "holding";
const QUARANTINE: &str = "quarantine";

/// Which area a blob is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobArea {
    Holding,
    Quarantine,
}

impl BlobArea {
    fn dir(self) -> &'static str {
        match self {
            Self::Holding => HOLDING,
            Self::Quarantine => QUARANTINE,
        }
    }

    /// The area a `blob_ref` returned by [`BlobStore::put`] points into.
    pub fn of(blob_ref: &str) -> Option<Self> {
        match blob_ref.split('/').next()? {
            HOLDING => Some(Self::Holding),
            QUARANTINE => Some(Self::Quarantine),
            _ => None,
        }
    }
}

/// Metadata written next to a quarantined blob for later review.
#[derive(Debug, Serialize)]
pub struct QuarantineRecord<'a> {
    pub document_id: &'a DocumentId,
    pub original_filename: &'a str,
    pub reason: &'a str,
    pub quarantined_at: DateTime<Utc>,
    pub sha256: &'a str,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write `bytes` and return the new blob's reference.
    pub async fn put(
        &self,
        area: BlobArea,
        id: &DocumentId,
        stored_filename: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let blob_ref = format!("{}/{}/{}", area.dir(), id, stored_filename);
        let path = self.resolve(&blob_ref)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write blob {}", path.display()))?;
        Ok(blob_ref)
    }

    /// Write the JSON sidecar for a quarantined blob.
    pub async fn write_quarantine_record(
        &self,
        blob_ref: &str,
        record: &QuarantineRecord<'_>,
    ) -> Result<()> {
        let path = self.resolve(&format!("{blob_ref}.json"))?;
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub async fn read(&self, blob_ref: &str) -> Result<Vec<u8>> {
        let path = self.resolve(blob_ref)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read blob {}", path.display()))
    }

    /// Remove a blob's directory (bytes plus any sidecar). Missing blobs
    /// are not an error.
    pub async fn remove(&self, blob_ref: &str) -> Result<()> {
        let path = self.resolve(blob_ref)?;
        let Some(dir) = path.parent() else {
            return Ok(());
        };
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", dir.display())),
        }
    }

    fn resolve(&self, blob_ref: &str) -> Result<PathBuf> {
        let rel = Path::new(blob_ref);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("invalid blob reference: {blob_ref}");
        }
        Ok(self.root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_read_remove() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());
        let id = DocumentId::new("doc-1");

        let r = blobs.put(BlobArea::Holding, &id, "cv.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(r, "holding/doc-1/cv.pdf");
        assert_eq!(BlobArea::of(&r), Some(BlobArea::Holding));
        assert_eq!(blobs.read(&r).await.unwrap(), b"%PDF-1.4");

        blobs.remove(&r).await.unwrap();
        assert!(blobs.read(&r).await.is_err());
        blobs.remove(&r).await.unwrap();
    }

    #[tokio::test]
    async fn test_quarantine_sidecar() {
        let tmp = TempDir::new().unwrap();
        let blobs = BlobStore::new(tmp.path());
        let id = DocumentId::new("doc-2");

        let r = blobs.put(BlobArea::Quarantine, &id, "cv.pdf", b"MZ").await.unwrap();
        assert_eq!(BlobArea::of(&r), Some(BlobArea::Quarantine));
        blobs
            .write_quarantine_record(
                &r,
                &QuarantineRecord {
                    document_id: &id,
                    original_filename: "cv.pdf",
                    reason: "declared application/pdf but content is an executable",
                    quarantined_at: Utc::now(),
                    sha256: "abc",
                    size_bytes: 2,
                },
            )
            .await
            .unwrap();

        let sidecar = tmp.path().join("quarantine/doc-2/cv.pdf.json");
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(sidecar).unwrap()).unwrap();
        assert_eq!(json["document_id"], "doc-2");
        assert_eq!(json["size_bytes"], 2);
    }

    #[test]
    fn test_rejects_traversal() {
        let blobs = BlobStore::new("/tmp/blobs");
        assert!(blobs.resolve("../etc/passwd").is_err());
        assert!(blobs.resolve("/etc/passwd").is_err());
        assert!(blobs.resolve("holding/a/b.pdf").is_ok());
        assert_eq!(BlobArea::of("elsewhere/a/b.pdf"), None);
    }
}
