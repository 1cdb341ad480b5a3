//! Core data models for the vectorization index.
//!
//! These types describe chunks on their way into the store, the records
//! the store holds, the metadata tag set attached to every record, and the
//! read-side projections assembled from query results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};

/// Discriminator stored in every record's `type` tag.
pub const RECORD_TYPE: &str = "vectorized_document";

/// Suffix used in place of a chunk index for the metadata record id.
pub const METADATA_ID_SUFFIX: &str = "meta";

/// Separator between the components of a record id.
const ID_SEPARATOR: char = ':';

/// Location of one source page within the extracted text.
///
/// Offsets are character offsets, `[start_index, end_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOffset {
    pub page_number: u32,
    pub start_index: usize,
    pub end_index: usize,
}

/// One retrievable unit of a document, produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub chunk_index: usize,
    pub text: String,
    pub start_offset: Option<usize>,
    pub end_offset: Option<usize>,
    pub page_number: Option<u32>,
}

/// Values of the `type` tag. Only one kind is written by this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    VectorizedDocument,
}

/// The tag set attached to every [`VectorRecord`].
///
/// Content records carry `text` and `chunk_index`; the single metadata
/// record per document carries `total_chunks` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub user_id: String,
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub is_metadata: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_offset: Option<usize>,
}

/// The unit stored in the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// A single hit returned by a vector store query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecordMetadata>,
}

/// Read-side projection of a document's metadata record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentIndexEntry {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub created_at: Option<DateTime<Utc>>,
    pub chunks: usize,
}

impl DocumentIndexEntry {
    /// Projects a metadata record. Returns `None` for content records.
    pub fn from_metadata(metadata: &RecordMetadata) -> Option<Self> {
        if !metadata.is_metadata {
            return None;
        }
        Some(Self {
            id: metadata.document_id.clone(),
            file_name: metadata.file_name.clone(),
            file_type: metadata.file_type.clone(),
            created_at: metadata.created_at,
            chunks: metadata.total_chunks.unwrap_or(0),
        })
    }
}

/// One attachment slot inside a project's attachment map.
///
/// Fields other than the three the index layer owns are kept verbatim in
/// `extra` so a round trip through reconciliation never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    pub document_id: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AttachmentRecord {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            completed: false,
            updated_at: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// A project's attachments, keyed by slot name.
pub type AttachmentMap = BTreeMap<String, AttachmentRecord>;

/// Identity of a record, from which its id is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSlot {
    Chunk(usize),
    Metadata,
}

/// Derive the deterministic record id for `(user, document, slot)`.
///
/// Callers must have validated the components with [`validate_id_part`];
/// the encoding is only injective when neither contains `:`.
pub fn record_id(user_id: &str, document_id: &str, slot: RecordSlot) -> String {
    match slot {
        RecordSlot::Chunk(i) => format!("{}:{}:{}", user_id, document_id, i),
        RecordSlot::Metadata => format!("{}:{}:{}", user_id, document_id, METADATA_ID_SUFFIX),
    }
}

/// Reject identifiers that would break the record id encoding.
pub fn validate_id_part(field: &str, value: &str) -> IndexResult<()> {
    if value.trim().is_empty() {
        return Err(IndexError::Validation(format!("{} must not be empty", field)));
    }
    if value.contains(ID_SEPARATOR) {
        return Err(IndexError::Validation(format!(
            "{} must not contain '{}': {}",
            field, ID_SEPARATOR, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_metadata() -> RecordMetadata {
        RecordMetadata {
            user_id: "u1".into(),
            document_id: "d1".into(),
            file_name: "budget.pdf".into(),
            file_type: "application/pdf".into(),
            record_type: RecordType::VectorizedDocument,
            is_metadata: false,
            total_chunks: None,
            created_at: None,
            text: Some("hello".into()),
            chunk_index: Some(0),
            page_number: Some(2),
            start_offset: None,
            end_offset: None,
        }
    }

    #[test]
    fn test_record_id_format() {
        assert_eq!(record_id("u1", "d1", RecordSlot::Chunk(0)), "u1:d1:0");
        assert_eq!(record_id("u1", "d1", RecordSlot::Chunk(12)), "u1:d1:12");
        assert_eq!(record_id("u1", "d1", RecordSlot::Metadata), "u1:d1:meta");
    }

    #[test]
    fn test_distinct_documents_never_collide() {
        let a = record_id("u", "doc1", RecordSlot::Chunk(1));
        let b = record_id("u", "doc11", RecordSlot::Chunk(1));
        let c = record_id("u", "doc1", RecordSlot::Chunk(11));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_validate_id_part() {
        assert!(validate_id_part("userId", "abc").is_ok());
        assert!(validate_id_part("userId", "").is_err());
        assert!(validate_id_part("userId", "   ").is_err());
        assert!(validate_id_part("documentId", "a:b").is_err());
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let json = serde_json::to_value(content_metadata()).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["type"], "vectorized_document");
        assert_eq!(json["isMetadata"], false);
        assert_eq!(json["chunkIndex"], 0);
        assert!(json.get("totalChunks").is_none());
    }

    #[test]
    fn test_index_entry_only_from_metadata_record() {
        let mut meta = content_metadata();
        assert!(DocumentIndexEntry::from_metadata(&meta).is_none());
        meta.is_metadata = true;
        meta.text = None;
        meta.total_chunks = Some(3);
        let entry = DocumentIndexEntry::from_metadata(&meta).unwrap();
        assert_eq!(entry.id, "d1");
        assert_eq!(entry.chunks, 3);
    }

    #[test]
    fn test_attachment_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "documentId": "d9",
            "completed": false,
            "fileName": "letter.pdf"
        });
        let rec: AttachmentRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(rec.document_id, "d9");
        let back = serde_json::to_value(&rec).unwrap();
        assert_eq!(back["fileName"], "letter.pdf");
    }
}
