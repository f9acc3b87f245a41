//! # resume-index CLI (`ridx`)
//!
//! Command-line front end for the résumé ingestion and retrieval service.
//! Every command acts on behalf of an owner passed with `--owner`; the CLI
//! trusts it the way the service trusts an authenticated caller.
//!
//! ## Usage
//!
//! ```bash
//! ridx --config ./config/ridx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ridx init` | Create the SQLite database and run schema migrations |
//! | `ridx submit <file> --owner <id>` | Upload a document and wait for ingestion |
//! | `ridx stats --owner <id>` | Summarize the owner's documents |
//! | `ridx status <id>` | Show a document's status |
//! | `ridx list --owner <id>` | List the owner's documents |
//! | `ridx search "<query>" --owner <id>` | Semantic search over the owner's documents |
//! | `ridx similar <id> --owner <id>` | Find passages resembling one of the owner's documents |
//! | `ridx delete <id> --owner <id>` | Delete a document and its chunks |
//! | `ridx download <id> --owner <id>` | Write the original upload to disk |
//! | `ridx reprocess <id> --owner <id>` | Re-run ingestion for a failed, indexed, or unfinished document |
//!
//! Every command except `init` first finishes ingestion that an earlier
//! run left incomplete (for example after `submit --no-wait`).
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use resume_index::config;
use resume_index::migrate;
use resume_index::service::{ResumeIndex, SubmitRequest, Submission};
use resume_index::stats;
use resume_index_core::models::{
    DeclaredType, Document, DocumentId, DocumentKind, OwnerId, SearchResult,
};
use resume_index_core::search::SearchOptions;

/// resume-index: anonymized résumé ingestion with owner-scoped semantic search.
#[derive(Parser)]
#[command(name = "ridx", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ridx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; refuses a database created for a different embedding
    /// dimensionality.
    Init,

    /// Upload a document.
    Submit {
        /// File to upload (.pdf, .doc, or .docx).
        path: PathBuf,

        #[arg(long)]
        owner: String,

        /// Declared MIME type. Inferred from the file extension when omitted.
        #[arg(long)]
        content_type: Option<String>,

        /// Document kind: cv, cover_letter, certificate, or other.
        #[arg(long, default_value = "cv")]
        kind: DocumentKind,

        /// Return as soon as the upload is accepted instead of waiting for
        /// indexing. Ingestion then finishes the next time ridx runs.
        #[arg(long)]
        no_wait: bool,
    },

    /// Show a document's status.
    Status {
        id: String,
    },

    /// List an owner's documents, newest first.
    List {
        #[arg(long)]
        owner: String,
    },

    /// Show document counts by status and kind, stored size, and chunk count.
    Stats {
        #[arg(long)]
        owner: String,
    },

    /// Search an owner's indexed documents.
    Search {
        query: String,

        #[arg(long)]
        owner: String,

        #[command(flatten)]
        options: SearchArgs,
    },

    /// Find passages in the owner's other documents that resemble a document.
    Similar {
        id: String,

        #[arg(long)]
        owner: String,

        #[command(flatten)]
        options: SearchArgs,
    },

    /// Delete a document and all of its chunks.
    Delete {
        id: String,

        #[arg(long)]
        owner: String,
    },

    /// Write the original upload to disk.
    Download {
        id: String,

        #[arg(long)]
        owner: String,

        /// Output path. Defaults to the original filename in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Re-run ingestion for a failed, indexed, or unfinished document.
    Reprocess {
        id: String,

        #[arg(long)]
        owner: String,

        /// Return without waiting; ingestion finishes the next time ridx runs.
        #[arg(long)]
        no_wait: bool,
    },
}

#[derive(clap::Args)]
struct SearchArgs {
    /// Maximum number of results.
    #[arg(long)]
    limit: Option<usize>,

    /// Minimum similarity score in [0.0, 1.0].
    #[arg(long)]
    min_score: Option<f32>,

    /// Restrict to one document kind.
    #[arg(long)]
    kind: Option<DocumentKind>,
}

impl From<SearchArgs> for SearchOptions {
    fn from(args: SearchArgs) -> Self {
        SearchOptions {
            limit: args.limit,
            min_score: args.min_score,
            kind: args.kind,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let index = ResumeIndex::open(&cfg).await?;
    for pending in index.resume_interrupted().await? {
        let id = pending.document_id.clone();
        let status = pending.finished().await?;
        tracing::info!(document_id = %id, status = %status, "interrupted ingestion finished");
    }

    match cli.command {
        Commands::Init => {}
        Commands::Submit {
            path,
            owner,
            content_type,
            kind,
            no_wait,
        } => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| anyhow::anyhow!("not a file: {}", path.display()))?;
            let content_type = match content_type {
                Some(ct) => ct,
                None => infer_content_type(&filename)?,
            };
            let bytes = std::fs::read(&path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
            let owner = OwnerId::new(owner);
            let submission = index
                .submit(SubmitRequest {
                    owner_id: owner.clone(),
                    filename,
                    content_type,
                    bytes,
                    kind,
                })
                .await?;
            println!("Submitted {}", submission.document_id);
            report_submission(&index, &owner, submission, no_wait).await?;
        }
        Commands::Status { id } => {
            let status = index.get_status(&DocumentId::new(id)).await?;
            println!("{status}");
        }
        Commands::List { owner } => {
            let docs = index.list(&OwnerId::new(owner)).await?;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in &docs {
                print_document_line(doc);
            }
        }
        Commands::Stats { owner } => {
            let owner = OwnerId::new(owner);
            let summary = index.stats(&owner).await?;
            print!("{}", stats::render(&owner, &summary, chrono::Utc::now()));
        }
        Commands::Search {
            query,
            owner,
            options,
        } => {
            let results = index
                .search(&OwnerId::new(owner), &query, &options.into())
                .await?;
            print_results(&results);
        }
        Commands::Similar { id, owner, options } => {
            let results = index
                .similar(&OwnerId::new(owner), &DocumentId::new(id), &options.into())
                .await?;
            print_results(&results);
        }
        Commands::Delete { id, owner } => {
            let id = DocumentId::new(id);
            index.delete(&OwnerId::new(owner), &id).await?;
            println!("Deleted {id}");
        }
        Commands::Download { id, owner, out } => {
            let download = index
                .download(&OwnerId::new(owner), &DocumentId::new(id))
                .await?;
            let out = match out {
                Some(path) => path,
                None => PathBuf::from(safe_file_name(&download.filename)),
            };
            std::fs::write(&out, &download.bytes)
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", out.display(), e))?;
            println!(
                "Wrote {} ({}, {} bytes)",
                out.display(),
                download.content_type,
                download.bytes.len()
            );
        }
        Commands::Reprocess { id, owner, no_wait } => {
            let owner = OwnerId::new(owner);
            let submission = index.reprocess(&owner, &DocumentId::new(id)).await?;
            println!("Reprocessing {}", submission.document_id);
            report_submission(&index, &owner, submission, no_wait).await?;
        }
    }

    Ok(())
}

fn infer_content_type(filename: &str) -> anyhow::Result<String> {
    filename
        .rsplit_once('.')
        .and_then(|(_, ext)| DeclaredType::from_extension(ext))
        .map(|t| t.mime().to_string())
        .ok_or_else(|| {
            anyhow::anyhow!("cannot infer content type of '{filename}'; pass --content-type")
        })
}

/// Last path component only, so a stored filename can never escape the
/// current directory.
fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." {
        "download".to_string()
    } else {
        base.to_string()
    }
}

async fn report_submission(
    index: &ResumeIndex,
    owner: &OwnerId,
    submission: Submission,
    no_wait: bool,
) -> anyhow::Result<()> {
    let id = submission.document_id.clone();
    let status = if no_wait {
        submission.status
    } else {
        submission.finished().await?
    };
    println!("status: {status}");
    let doc = index.document(owner, &id).await?;
    if let Some(failure) = &doc.failure {
        println!("failure: {} ({})", failure.kind.as_str(), failure.message);
    }
    if let Some(reason) = &doc.quarantine_reason {
        println!("quarantine reason: {reason}");
    }
    if let Some(note) = &doc.anonymization {
        println!(
            "redactions: {}{}",
            note.redactions,
            if note.degraded { " (degraded: entity recognition unavailable)" } else { "" }
        );
    }
    Ok(())
}

fn print_document_line(doc: &Document) {
    println!(
        "{}  {:<11}  {:<12}  {}  {}",
        doc.id,
        doc.status.as_str(),
        doc.kind.as_str(),
        doc.uploaded_at.format("%Y-%m-%d %H:%M"),
        doc.original_filename
    );
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} (chunk {}, document {})",
            i + 1,
            r.score,
            r.document_name,
            r.sequence,
            r.document_id
        );
        println!("   {}", r.preview);
        println!();
    }
}
