//! # resume-index
//!
//! Résumé ingestion with PII anonymization and owner-scoped semantic
//! retrieval.
//!
//! Uploaded PDF, DOC, and DOCX files are validated, stored as originals,
//! converted to plain text, stripped of personal data, split into
//! overlapping chunks, embedded, and indexed in SQLite. Searches only ever
//! see the caller's own documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────┐   ┌──────────┐
//! │  submit  │──▶│ Pipeline                      │──▶│  SQLite   │
//! │ validate │   │ extract ▸ anonymize ▸ chunk ▸ │   │ docs+vecs │
//! └────┬─────┘   │ embed ▸ commit                │   └────┬─────┘
//!      │         └──────────────────────────────┘        │
//!      ▼                                                  ▼
//! ┌──────────┐                                     ┌──────────┐
//! │  blobs   │                                     │ Retriever │
//! │ holding/ │                                     │ rank+dedup│
//! │quarantine│                                     └──────────┘
//! └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ridx init
//! ridx submit ./cv.pdf --owner alice
//! ridx search "kubernetes migration" --owner alice --limit 5
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the vector store |
//! | [`blob`] | Original-upload storage and quarantine |
//! | [`extract`] | PDF / DOCX / DOC text extraction |
//! | [`entities`] | External entity-recognition backend |
//! | [`embedding`] | Embedding providers and retry policy |
//! | [`ingest`] | Staged ingestion pipeline |
//! | [`search`] | Owner-scoped retrieval |
//! | [`service`] | Caller-facing operations |
//! | [`stats`] | Per-owner summary report |
//!
//! Storage-agnostic logic (models, validation, anonymization, chunking,
//! ranking) lives in the `resume-index-core` crate.

pub mod blob;
pub mod config;
pub mod db;
pub mod embedding;
pub mod entities;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod search;
pub mod service;
pub mod sqlite_store;
pub mod stats;
