//! # resume-index core
//!
//! Storage-agnostic logic for resume-index: data models, upload validation,
//! PII anonymization, chunking, the embedding trait, the vector store trait,
//! and result ranking.
//!
//! This crate does no filesystem or database I/O and carries no async
//! runtime. Binary text extraction, SQLite persistence, and the concrete
//! embedding backends live in the `resume-index` app crate.

pub mod anonymize;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod search;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
