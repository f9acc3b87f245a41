//! Core data models used throughout resume-index.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the ingestion and retrieval pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated identity of the user who owns a document.
///
/// Issued by the surrounding application; the core never creates one from
/// document data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// The closed set of upload types the system accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    Pdf,
    Doc,
    Docx,
}

impl DeclaredType {
    pub const ALL: [DeclaredType; 3] = [DeclaredType::Pdf, DeclaredType::Doc, DeclaredType::Docx];

    /// Parse a MIME type, ignoring parameters such as `; charset=...`.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            MIME_PDF => Some(Self::Pdf),
            MIME_DOC => Some(Self::Doc),
            MIME_DOCX => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Pdf => MIME_PDF,
            Self::Doc => MIME_DOC,
            Self::Docx => MIME_DOCX,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
        }
    }

    pub fn as_str(self) -> &'static str {
        self.extension()
    }
}

impl FromStr for DeclaredType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("unknown declared type: {s}"))
    }
}

/// What the document is, as declared by the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Cv,
    CoverLetter,
    Certificate,
    Other,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Cv,
        DocumentKind::CoverLetter,
        DocumentKind::Certificate,
        DocumentKind::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cv => "cv",
            Self::CoverLetter => "cover_letter",
            Self::Certificate => "certificate",
            Self::Other => "other",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cv" => Ok(Self::Cv),
            "cover_letter" => Ok(Self::CoverLetter),
            "certificate" => Ok(Self::Certificate),
            "other" => Ok(Self::Other),
            other => Err(format!(
                "unknown document kind: '{other}'. Must be cv, cover_letter, certificate, or other."
            )),
        }
    }
}

/// Document lifecycle.
///
/// ```text
/// received ─┬─▶ quarantined
///           └─▶ validated ─▶ extracted ─▶ anonymized ─▶ indexed
///                  │             │             │
///                  └─────────────┴─────────────┴──▶ failed
/// failed | indexed ─▶ validated                (reprocess)
/// extracted | anonymized ─▶ validated        (interrupted ingestion restarts)
/// any ─▶ deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Received,
    Quarantined,
    Validated,
    Extracted,
    Anonymized,
    Indexed,
    Failed,
    Deleted,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 8] = [
        DocumentStatus::Received,
        DocumentStatus::Quarantined,
        DocumentStatus::Validated,
        DocumentStatus::Extracted,
        DocumentStatus::Anonymized,
        DocumentStatus::Indexed,
        DocumentStatus::Failed,
        DocumentStatus::Deleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Quarantined => "quarantined",
            Self::Validated => "validated",
            Self::Extracted => "extracted",
            Self::Anonymized => "anonymized",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }

    /// Whether the pipeline still has work to do for this document.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::Received | Self::Validated | Self::Extracted | Self::Anonymized
        )
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match (self, next) {
            (Deleted, _) => false,
            (_, Deleted) => true,
            (Received, Quarantined | Validated | Failed) => true,
            (Validated, Extracted | Failed) => true,
            (Extracted, Anonymized | Failed) => true,
            (Anonymized, Indexed | Failed) => true,
            (Failed | Indexed | Extracted | Anonymized, Validated) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "quarantined" => Ok(Self::Quarantined),
            "validated" => Ok(Self::Validated),
            "extracted" => Ok(Self::Extracted),
            "anonymized" => Ok(Self::Anonymized),
            "indexed" => Ok(Self::Indexed),
            "failed" => Ok(Self::Failed),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

/// Which pipeline stage put a document into `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Extraction,
    Embedding,
    Storage,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Embedding => "embedding",
            Self::Storage => "storage",
        }
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extraction" => Ok(Self::Extraction),
            "embedding" => Ok(Self::Embedding),
            "storage" => Ok(Self::Storage),
            other => Err(format!("unknown failure kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of anonymization, kept on the document for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizationNote {
    /// Number of spans replaced with placeholders.
    pub redactions: u32,
    /// True when the entity layer failed and only patterns ran.
    pub degraded: bool,
}

/// One uploaded file belonging to exactly one owner.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: OwnerId,
    pub original_filename: String,
    pub stored_filename: String,
    /// Location of the original bytes, relative to the blob root.
    pub blob_ref: String,
    pub declared_type: DeclaredType,
    pub kind: DocumentKind,
    pub size_bytes: u64,
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub failure: Option<Failure>,
    pub quarantine_reason: Option<String>,
    pub anonymization: Option<AnonymizationNote>,
}

/// One embeddable unit of a document's anonymized text.
///
/// Ownership is derived from the parent document; it is never stored here.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: DocumentId,
    /// 0-based and contiguous within a document.
    pub sequence: u32,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// A ranked search hit, ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: DocumentId,
    pub document_name: String,
    pub sequence: u32,
    pub preview: String,
    /// Cosine similarity clamped into `[0.0, 1.0]`.
    pub score: f32,
    pub uploaded_at: DateTime<Utc>,
}
