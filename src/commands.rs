//! Implementations of the `gidx` subcommands.
//!
//! Each command prints a short `key: value` report to stdout and ends with
//! `ok` on success. Diagnostics go through `tracing` to stderr.

use anyhow::{Context, Result};
use std::path::Path;

use grant_index_core::chunk::Chunker;
use grant_index_core::ingest::IngestRequest;
use grant_index_core::reconcile::ReconcileState;

use crate::attachments::SqliteAttachmentStore;
use crate::config::Config;
use crate::db;
use crate::extract::{content_type_for_path, extract_document};
use crate::services::Services;

pub struct IngestArgs<'a> {
    pub path: &'a Path,
    pub user_id: &'a str,
    pub document_id: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

fn resolve_file_type(path: &Path, explicit: Option<String>) -> Result<String> {
    match explicit {
        Some(ft) => Ok(ft),
        None => content_type_for_path(path)
            .map(str::to_string)
            .with_context(|| {
                format!(
                    "Cannot infer file type of {}; pass --file-type",
                    path.display()
                )
            }),
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Invalid file name: {}", path.display()))
}

pub async fn run_ingest(config: &Config, args: IngestArgs<'_>) -> Result<()> {
    let bytes = std::fs::read(args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let file_type = resolve_file_type(args.path, args.file_type)?;
    let file_name = match args.file_name {
        Some(name) => name,
        None => file_name_of(args.path)?,
    };
    let document_id = args
        .document_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let extracted = extract_document(&bytes, &file_type)?;
    let services = Services::from_config(config).await?;
    let request = IngestRequest {
        user_id: args.user_id.to_string(),
        document_id,
        file_name,
        file_type,
        text: extracted.text,
        pages: extracted.pages,
    };
    let report = services.ingest(&request).await?;

    println!("ingest {}", args.path.display());
    println!("  document: {}", report.document_id);
    println!("  chunks: {}", report.total_chunks);
    println!("  records written: {}", report.records_written);
    println!("  stale records pruned: {}", report.stale_pruned);
    println!("ok");
    Ok(())
}

/// Extract and chunk a file without embedding or writing anything.
pub fn run_extract(config: &Config, path: &Path, file_type: Option<String>) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_type = resolve_file_type(path, file_type)?;
    let extracted = extract_document(&bytes, &file_type)?;
    let chunker = Chunker::new(config.chunking.max_chars, config.chunking.min_chars)?;
    let chunks = chunker.chunks(&extracted.text, &extracted.pages)?.count();

    println!("extract {} ({})", path.display(), file_type);
    println!("  characters: {}", extracted.text.chars().count());
    println!("  pages: {}", extracted.pages.len());
    println!("  chunks: {}", chunks);
    println!("ok");
    Ok(())
}

pub async fn run_documents(config: &Config, user_id: &str) -> Result<()> {
    let services = Services::from_config(config).await?;
    let documents = services.list_documents(user_id).await?;
    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in &documents {
        let created = doc
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}  {}", doc.id, doc.file_name);
        println!("    type: {}", doc.file_type);
        println!("    chunks: {}", doc.chunks);
        println!("    created: {}", created);
    }
    Ok(())
}

pub async fn run_vectors(config: &Config, user_id: &str, document_id: &str) -> Result<()> {
    let services = Services::from_config(config).await?;
    let vectors = services.list_vectors(user_id, document_id).await?;
    println!("--- Vectors ({}) ---", vectors.len());
    for v in &vectors {
        match v.metadata.as_ref() {
            Some(meta) if meta.is_metadata => {
                println!("{}  [metadata] totalChunks={}", v.id, meta.total_chunks.unwrap_or(0));
            }
            Some(meta) => {
                let preview: String = meta
                    .text
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .take(80)
                    .collect();
                let page = meta
                    .page_number
                    .map(|p| format!(" p.{}", p))
                    .unwrap_or_default();
                println!("{}{}  {}", v.id, page, preview.replace('\n', " "));
            }
            None => println!("{}", v.id),
        }
    }
    Ok(())
}

pub async fn run_delete(
    config: &Config,
    user_id: &str,
    document_id: Option<&str>,
    file_name: Option<&str>,
) -> Result<()> {
    let services = Services::from_config(config).await?;
    let report = match (document_id, file_name) {
        (Some(doc), _) => services.delete_document(user_id, doc).await?,
        (None, Some(name)) => services.delete_by_file_name(user_id, name).await?,
        (None, None) => anyhow::bail!("either --document-id or --file-name is required"),
    };
    println!("delete");
    println!("  records deleted: {}", report.deleted);
    println!("  documents: {}", report.document_ids.join(", "));
    println!("ok");
    Ok(())
}

async fn attachment_store(config: &Config) -> Result<SqliteAttachmentStore> {
    let pool = db::connect(config).await?;
    Ok(SqliteAttachmentStore::new(pool))
}

pub async fn run_attach(config: &Config, project_id: &str, slot: &str, document_id: &str) -> Result<()> {
    let store = attachment_store(config).await?;
    store.attach(project_id, slot, document_id).await?;
    println!("attached {} to {}/{}", document_id, project_id, slot);
    Ok(())
}

pub async fn run_complete(config: &Config, project_id: &str, document_id: &str) -> Result<()> {
    let store = attachment_store(config).await?;
    if store.mark_completed(project_id, document_id).await? {
        println!("completed {} in {}", document_id, project_id);
    } else {
        println!("already completed: {} in {}", document_id, project_id);
    }
    Ok(())
}

pub async fn run_reconcile(config: &Config, project_id: &str) -> Result<()> {
    let store = attachment_store(config).await?;
    let outcome = grant_index_core::reconcile::reconcile(&store, project_id).await?;
    let state = match outcome.state {
        ReconcileState::Clean => "clean",
        ReconcileState::Drifted => "drifted",
    };
    println!("reconcile {}", project_id);
    println!("  state: {}", state);
    println!("  repaired: {}", outcome.repaired.len());
    for slot in &outcome.repaired {
        println!("    {}", slot);
    }
    println!("  needs refresh: {}", outcome.needs_refresh());
    println!("ok");
    Ok(())
}
