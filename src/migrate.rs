//! Relational schema for attachment completion state.
//!
//! `projects.attachments_json` holds the per-project attachment map (slot →
//! `{documentId, completed, updatedAt, ...}`); `completed_documents` holds
//! one row per document the product has marked complete. Every statement
//! is idempotent.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            attachments_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS completed_documents (
            project_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            completed_at INTEGER NOT NULL,
            PRIMARY KEY (project_id, document_id),
            FOREIGN KEY (project_id) REFERENCES projects(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_completed_documents_project ON completed_documents(project_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
