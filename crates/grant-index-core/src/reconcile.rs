//! Repair drift between a project's attachment map and completed-document
//! rows.
//!
//! The relational side records completion in two places: a row per
//! completed `(project, document)` pair, and a `completed` flag inside the
//! project's JSON attachment map. They are written separately and can
//! diverge. Reconciliation trusts the rows: any attachment whose document
//! has a completion row but whose flag is still `false` is flipped to
//! `true`. The repair is one-directional and a clean map is never written.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::error::{IndexError, IndexResult};
use crate::models::AttachmentMap;

/// Relational storage the reconciliation job reads and repairs.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// The project's attachment map, or `None` for an unknown project.
    async fn load_attachments(&self, project_id: &str) -> Result<Option<AttachmentMap>>;

    /// Document ids with a completion row for the project.
    async fn completed_document_ids(&self, project_id: &str) -> Result<HashSet<String>>;

    /// Replace the project's attachment map in a single write.
    async fn save_attachments(&self, project_id: &str, attachments: &AttachmentMap) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    Clean,
    Drifted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub state: ReconcileState,
    /// Attachment slots whose `completed` flag was set.
    pub repaired: Vec<String>,
}

impl ReconcileOutcome {
    /// Whether callers holding a copy of the map should reload it.
    pub fn needs_refresh(&self) -> bool {
        self.state == ReconcileState::Drifted
    }
}

/// Bring `project_id`'s attachment map in line with its completion rows.
///
/// # Errors
///
/// [`IndexError::NotFound`] for an unknown project and
/// [`IndexError::Relational`] for store failures.
pub async fn reconcile(store: &dyn AttachmentStore, project_id: &str) -> IndexResult<ReconcileOutcome> {
    let mut attachments = store
        .load_attachments(project_id)
        .await
        .map_err(IndexError::Relational)?
        .ok_or_else(|| IndexError::NotFound(format!("project '{}'", project_id)))?;
    let completed = store
        .completed_document_ids(project_id)
        .await
        .map_err(IndexError::Relational)?;

    let now = Utc::now();
    let mut repaired = Vec::new();
    for (slot, record) in attachments.iter_mut() {
        if !record.completed && completed.contains(&record.document_id) {
            record.completed = true;
            record.updated_at = Some(now);
            repaired.push(slot.clone());
        }
    }

    if repaired.is_empty() {
        tracing::debug!(project_id, "attachments consistent");
        return Ok(ReconcileOutcome {
            state: ReconcileState::Clean,
            repaired,
        });
    }

    tracing::warn!(
        project_id,
        repaired = ?repaired,
        "ConsistencyWarning: completed documents not marked in attachments; repairing"
    );
    store
        .save_attachments(project_id, &attachments)
        .await
        .map_err(IndexError::Relational)?;

    Ok(ReconcileOutcome {
        state: ReconcileState::Drifted,
        repaired,
    })
}

#[derive(Default)]
struct ProjectRow {
    attachments: AttachmentMap,
    completed: HashSet<String>,
}

/// In-memory [`AttachmentStore`] for tests.
#[derive(Default)]
pub struct InMemoryAttachmentStore {
    projects: Mutex<std::collections::HashMap<String, ProjectRow>>,
    saves: Mutex<usize>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, project_id: &str, attachments: AttachmentMap) {
        let mut projects = self.projects.lock().unwrap();
        projects.entry(project_id.to_string()).or_default().attachments = attachments;
    }

    pub fn mark_completed(&self, project_id: &str, document_id: &str) {
        let mut projects = self.projects.lock().unwrap();
        projects
            .entry(project_id.to_string())
            .or_default()
            .completed
            .insert(document_id.to_string());
    }

    pub fn attachments(&self, project_id: &str) -> Option<AttachmentMap> {
        self.projects
            .lock()
            .unwrap()
            .get(project_id)
            .map(|p| p.attachments.clone())
    }

    /// Number of `save_attachments` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn load_attachments(&self, project_id: &str) -> Result<Option<AttachmentMap>> {
        Ok(self.attachments(project_id))
    }

    async fn completed_document_ids(&self, project_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .get(project_id)
            .map(|p| p.completed.clone())
            .unwrap_or_default())
    }

    async fn save_attachments(&self, project_id: &str, attachments: &AttachmentMap) -> Result<()> {
        *self.saves.lock().unwrap() += 1;
        self.insert_project(project_id, attachments.clone());
        Ok(())
    }
}
