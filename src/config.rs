//! Configuration loading and validation.
//!
//! resume-index is configured with a single TOML file. Only `[db]` and
//! `[storage]` are required; every other section falls back to the
//! defaults documented on its fields.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/ridx.sqlite"
//!
//! [storage]
//! root = "./data/blobs"
//!
//! [upload]
//! max_file_size_bytes = 5242880
//! max_documents_per_owner = 10
//! sniff_tolerance = "family"
//!
//! [chunking]
//! window_size = 800
//! overlap = 100
//!
//! [embedding]
//! provider = "hashing"   # "hashing" | "openai" | "ollama" | "local"
//! dims = 384
//!
//! [anonymizer]
//! entity_provider = "heuristic"   # "heuristic" | "http" | "disabled"
//!
//! [retrieval]
//! default_limit = 5
//! default_min_score = 0.3
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use resume_index_core::chunk::ChunkingParams;
use resume_index_core::models::DeclaredType;
use resume_index_core::search::SearchDefaults;
use resume_index_core::validate::{SniffTolerance, UploadPolicy};

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub anonymizer: AnonymizerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Where original upload bytes are kept.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UploadConfig {
    /// Default: 5 MiB.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Default: PDF, DOC, and DOCX MIME types.
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
    #[serde(default = "default_max_documents")]
    pub max_documents_per_owner: usize,
    #[serde(default)]
    pub sniff_tolerance: SniffTolerance,
    #[serde(default = "default_true")]
    pub scan_active_content: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            allowed_content_types: default_allowed_content_types(),
            max_documents_per_owner: default_max_documents(),
            sniff_tolerance: SniffTolerance::default(),
            scan_active_content: true,
        }
    }
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}
fn default_allowed_content_types() -> Vec<String> {
    DeclaredType::ALL.iter().map(|t| t.mime().to_string()).collect()
}
fn default_max_documents() -> usize {
    10
}
fn default_true() -> bool {
    true
}

/// Sliding-window geometry, in characters.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_window_size() -> usize {
    800
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Required for `openai`, `ollama`, and `local`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL for `ollama` (default `http://localhost:11434`) or an
    /// OpenAI-compatible endpoint (default `https://api.openai.com`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Total attempts per batch, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    32
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    2048
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AnonymizerConfig {
    #[serde(default = "default_entity_provider")]
    pub entity_provider: String,
    /// NER endpoint for `entity_provider = "http"`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_ner_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnonymizerConfig {
    fn default() -> Self {
        Self {
            entity_provider: default_entity_provider(),
            url: None,
            timeout_secs: default_ner_timeout_secs(),
        }
    }
}

fn default_entity_provider() -> String {
    "heuristic".to_string()
}
fn default_ner_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_min_score")]
    pub default_min_score: f32,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_min_score: default_min_score(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_max_limit() -> usize {
    50
}
fn default_min_score() -> f32 {
    0.3
}
fn default_preview_chars() -> usize {
    300
}

impl Config {
    /// Upload policy derived from `[upload]`.
    ///
    /// Content types are checked by [`load_config`], so unknown entries can
    /// only reach here through a hand-built `Config`; they are skipped.
    pub fn upload_policy(&self) -> UploadPolicy {
        let mut allowed_types: Vec<DeclaredType> = self
            .upload
            .allowed_content_types
            .iter()
            .filter_map(|ct| DeclaredType::from_mime(ct))
            .collect();
        allowed_types.dedup();
        UploadPolicy {
            max_size_bytes: self.upload.max_file_size_bytes,
            allowed_types,
            max_documents_per_owner: self.upload.max_documents_per_owner,
            sniff_tolerance: self.upload.sniff_tolerance,
            scan_active_content: self.upload.scan_active_content,
        }
    }

    pub fn chunking_params(&self) -> Result<ChunkingParams> {
        ChunkingParams::new(self.chunking.window_size, self.chunking.overlap)
            .map_err(|e| anyhow::anyhow!("invalid [chunking] section: {e}"))
    }

    pub fn search_defaults(&self) -> SearchDefaults {
        SearchDefaults {
            limit: self.retrieval.default_limit,
            max_limit: self.retrieval.max_limit,
            min_score: self.retrieval.default_min_score,
            preview_chars: self.retrieval.preview_chars,
        }
    }
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

fn validate(config: &Config) -> Result<()> {
    // Upload
    if config.upload.max_file_size_bytes == 0 {
        bail!("upload.max_file_size_bytes must be > 0");
    }
    if config.upload.allowed_content_types.is_empty() {
        bail!("upload.allowed_content_types must not be empty");
    }
    for ct in &config.upload.allowed_content_types {
        if DeclaredType::from_mime(ct).is_none() {
            bail!(
                "Unsupported content type in upload.allowed_content_types: '{}'. Must be one of: {}",
                ct,
                DeclaredType::ALL.map(|t| t.mime()).join(", ")
            );
        }
    }
    if config.upload.max_documents_per_owner == 0 {
        bail!("upload.max_documents_per_owner must be > 0");
    }

    // Chunking
    config.chunking_params()?;

    // Embedding
    let e = &config.embedding;
    if e.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if e.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if e.max_attempts == 0 {
        bail!("embedding.max_attempts must be >= 1");
    }
    if e.base_delay_ms > e.max_delay_ms {
        bail!("embedding.base_delay_ms must not exceed embedding.max_delay_ms");
    }
    if e.max_input_chars == 0 {
        bail!("embedding.max_input_chars must be > 0");
    }
    match e.provider.as_str() {
        "hashing" => {}
        "openai" | "ollama" | "local" => {
            if e.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    e.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hashing, openai, ollama, or local.",
            other
        ),
    }

    // Anonymizer
    match config.anonymizer.entity_provider.as_str() {
        "heuristic" | "disabled" => {}
        "http" => {
            if config.anonymizer.url.is_none() {
                bail!("anonymizer.url must be specified when entity_provider is 'http'");
            }
        }
        other => bail!(
            "Unknown anonymizer.entity_provider: '{}'. Must be heuristic, http, or disabled.",
            other
        ),
    }

    // Retrieval
    let r = &config.retrieval;
    if r.max_limit == 0 {
        bail!("retrieval.max_limit must be >= 1");
    }
    if r.default_limit == 0 || r.default_limit > r.max_limit {
        bail!(
            "retrieval.default_limit must be between 1 and retrieval.max_limit ({})",
            r.max_limit
        );
    }
    if !(0.0..=1.0).contains(&r.default_min_score) {
        bail!("retrieval.default_min_score must be in [0.0, 1.0]");
    }
    if r.preview_chars == 0 {
        bail!("retrieval.preview_chars must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [db]
        path = "/tmp/ridx.sqlite"

        [storage]
        root = "/tmp/ridx-blobs"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.upload.max_file_size_bytes, 5_242_880);
        assert_eq!(config.upload.max_documents_per_owner, 10);
        assert_eq!(config.upload.sniff_tolerance, SniffTolerance::Family);
        assert!(config.upload.scan_active_content);
        assert_eq!(config.chunking.window_size, 800);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.embedding.dims, 384);
        assert_eq!(config.embedding.max_attempts, 5);
        assert_eq!(config.anonymizer.entity_provider, "heuristic");
        assert_eq!(config.retrieval.default_limit, 5);
        assert_eq!(config.retrieval.default_min_score, 0.3);

        let policy = config.upload_policy();
        assert_eq!(policy.allowed_types, DeclaredType::ALL.to_vec());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let toml = format!("{MINIMAL}\n[retrieval]\nhybrid_alpha = 0.5\n");
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn test_invalid_chunking_rejected() {
        let toml = format!("{MINIMAL}\n[chunking]\nwindow_size = 100\noverlap = 100\n");
        let err = parse_config(&toml).unwrap_err();
        assert!(format!("{err:#}").contains("overlap"));
    }

    #[test]
    fn test_unsupported_content_type_rejected() {
        let toml = format!("{MINIMAL}\n[upload]\nallowed_content_types = [\"text/plain\"]\n");
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn test_remote_provider_requires_model() {
        let toml = format!("{MINIMAL}\n[embedding]\nprovider = \"ollama\"\n");
        assert!(parse_config(&toml).is_err());
        let toml = format!(
            "{MINIMAL}\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n"
        );
        assert_eq!(parse_config(&toml).unwrap().embedding.dims, 768);
    }

    #[test]
    fn test_http_recognizer_requires_url() {
        let toml = format!("{MINIMAL}\n[anonymizer]\nentity_provider = \"http\"\n");
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn test_retrieval_bounds() {
        let toml = format!("{MINIMAL}\n[retrieval]\ndefault_limit = 60\n");
        assert!(parse_config(&toml).is_err());
        let toml = format!("{MINIMAL}\n[retrieval]\ndefault_min_score = 1.2\n");
        assert!(parse_config(&toml).is_err());
    }
}
