//! # Grant Index CLI (`gidx`)
//!
//! Operator interface for the grant document index: schema setup, document
//! ingestion, inspection, deletion, attachment reconciliation, and the HTTP
//! server.
//!
//! ## Usage
//!
//! ```bash
//! gidx --config ./config/gidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gidx init` | Create the SQLite database and run schema migrations |
//! | `gidx ingest <file> --user <id>` | Extract, chunk, embed, and index a file |
//! | `gidx extract <file>` | Dry run: show extracted characters, pages, and chunk count |
//! | `gidx documents --user <id>` | List a user's indexed documents |
//! | `gidx vectors --user <id> --document-id <id>` | Show a document's records |
//! | `gidx delete --user <id> --document-id <id>` | Delete one document's records |
//! | `gidx delete --user <id> --file-name <name>` | Delete every document with that file name |
//! | `gidx attach <project> <slot> <document>` | Record an attachment slot |
//! | `gidx complete <project> <document>` | Record a completed document |
//! | `gidx reconcile <project>` | Repair attachment completion flags |
//! | `gidx serve` | Start the HTTP API |
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use grant_index::commands::{self, IngestArgs};
use grant_index::{config, migrate, server};

/// Grant Index CLI: a per-user vector index of grant application documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gidx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gidx",
    about = "Grant Index: chunk, embed, and index grant documents per user",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gidx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Extract, chunk, embed, and index a file for a user.
    ///
    /// Re-ingesting with the same document id replaces the previous records.
    Ingest {
        /// File to ingest (`.pdf`, `.docx`, `.txt`, `.md`).
        path: PathBuf,

        /// Owner of the document.
        #[arg(long)]
        user: String,

        /// Document id. A UUID is generated when omitted.
        #[arg(long)]
        document_id: Option<String>,

        /// Content type, overriding the one inferred from the extension.
        #[arg(long)]
        file_type: Option<String>,

        /// Display name, defaulting to the file's own name.
        #[arg(long)]
        file_name: Option<String>,
    },

    /// Extract and chunk a file without embedding or writing anything.
    Extract {
        path: PathBuf,

        #[arg(long)]
        file_type: Option<String>,
    },

    /// List a user's indexed documents, newest first.
    Documents {
        #[arg(long)]
        user: String,
    },

    /// Show every record stored for one document.
    Vectors {
        #[arg(long)]
        user: String,

        #[arg(long)]
        document_id: String,
    },

    /// Delete a document's records, by id or by file name.
    #[command(group(ArgGroup::new("target").required(true).args(["document_id", "file_name"])))]
    Delete {
        #[arg(long)]
        user: String,

        #[arg(long)]
        document_id: Option<String>,

        /// Deletes every document of the user carrying this file name.
        #[arg(long)]
        file_name: Option<String>,
    },

    /// Put a document into a project's attachment slot.
    Attach {
        project: String,
        slot: String,
        document_id: String,
    },

    /// Record that a document finished processing for a project.
    Complete { project: String, document_id: String },

    /// Repair attachment completion flags from completed-document rows.
    Reconcile { project: String },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            user,
            document_id,
            file_type,
            file_name,
        } => {
            commands::run_ingest(
                &cfg,
                IngestArgs {
                    path: &path,
                    user_id: &user,
                    document_id,
                    file_name,
                    file_type,
                },
            )
            .await?;
        }
        Commands::Extract { path, file_type } => {
            commands::run_extract(&cfg, &path, file_type)?;
        }
        Commands::Documents { user } => {
            commands::run_documents(&cfg, &user).await?;
        }
        Commands::Vectors { user, document_id } => {
            commands::run_vectors(&cfg, &user, &document_id).await?;
        }
        Commands::Delete {
            user,
            document_id,
            file_name,
        } => {
            commands::run_delete(&cfg, &user, document_id.as_deref(), file_name.as_deref()).await?;
        }
        Commands::Attach {
            project,
            slot,
            document_id,
        } => {
            commands::run_attach(&cfg, &project, &slot, &document_id).await?;
        }
        Commands::Complete {
            project,
            document_id,
        } => {
            commands::run_complete(&cfg, &project, &document_id).await?;
        }
        Commands::Reconcile { project } => {
            commands::run_reconcile(&cfg, &project).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
