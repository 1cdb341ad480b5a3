//! SQLite-backed [`AttachmentStore`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;

use grant_index_core::models::{validate_id_part, AttachmentMap, AttachmentRecord};
use grant_index_core::reconcile::AttachmentStore;

#[derive(Clone)]
pub struct SqliteAttachmentStore {
    pool: SqlitePool,
}

impl SqliteAttachmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Put `document_id` into `slot` of the project's attachment map,
    /// creating the project if needed.
    ///
    /// A slot that already holds the same document is left untouched; a
    /// slot pointing at a different document is replaced and starts out
    /// not completed.
    pub async fn attach(&self, project_id: &str, slot: &str, document_id: &str) -> Result<()> {
        validate_id_part("projectId", project_id)?;
        validate_id_part("documentId", document_id)?;
        if slot.trim().is_empty() {
            bail!("attachment slot must not be empty");
        }

        let mut attachments = self.load_attachments(project_id).await?.unwrap_or_default();
        let unchanged = attachments
            .get(slot)
            .map_or(false, |existing| existing.document_id == document_id);
        if unchanged {
            return Ok(());
        }
        let mut record = AttachmentRecord::new(document_id);
        record.updated_at = Some(Utc::now());
        attachments.insert(slot.to_string(), record);

        let json = serde_json::to_string(&attachments)?;
        sqlx::query(
            r#"
            INSERT INTO projects (id, attachments_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                attachments_json = excluded.attachments_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project_id)
        .bind(json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a completed-document row. Returns `false` if it already existed.
    pub async fn mark_completed(&self, project_id: &str, document_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            bail!("project not found: {}", project_id);
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO completed_documents (project_id, document_id, completed_at) VALUES (?, ?, ?)",
        )
        .bind(project_id)
        .bind(document_id)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AttachmentStore for SqliteAttachmentStore {
    async fn load_attachments(&self, project_id: &str) -> Result<Option<AttachmentMap>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT attachments_json FROM projects WHERE id = ?")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|json| {
            serde_json::from_str(&json)
                .with_context(|| format!("Invalid attachments_json for project {}", project_id))
        })
        .transpose()
    }

    async fn completed_document_ids(&self, project_id: &str) -> Result<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT document_id FROM completed_documents WHERE project_id = ?")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn save_attachments(&self, project_id: &str, attachments: &AttachmentMap) -> Result<()> {
        let json = serde_json::to_string(attachments)?;
        let result =
            sqlx::query("UPDATE projects SET attachments_json = ?, updated_at = ? WHERE id = ?")
                .bind(json)
                .bind(Utc::now().timestamp())
                .bind(project_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            bail!("project not found: {}", project_id);
        }
        Ok(())
    }
}
