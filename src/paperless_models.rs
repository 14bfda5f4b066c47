//! # Paperless Data Model
//!
//! View models for the resources owned by Paperless-NGX. Nothing here is a
//! source of truth: documents and reference entities are fetched, displayed and
//! dropped again.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// The three kinds of reference entity that can be attached to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Tag,
    Correspondent,
    DocumentType,
}

/// How a selection keyboard treats clicks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// A click toggles the item; any number may be selected
    Multi,
    /// A click replaces the current choice
    Single,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Tag,
        EntityKind::Correspondent,
        EntityKind::DocumentType,
    ];

    /// REST collection path for this kind
    pub fn endpoint(self) -> &'static str {
        match self {
            EntityKind::Tag => "/api/tags/",
            EntityKind::Correspondent => "/api/correspondents/",
            EntityKind::DocumentType => "/api/document_types/",
        }
    }

    pub fn selection_mode(self) -> SelectionMode {
        match self {
            EntityKind::Tag => SelectionMode::Multi,
            EntityKind::Correspondent | EntityKind::DocumentType => SelectionMode::Single,
        }
    }

    /// Single-letter code used in callback payloads
    pub fn code(self) -> &'static str {
        match self {
            EntityKind::Tag => "t",
            EntityKind::Correspondent => "c",
            EntityKind::DocumentType => "d",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "t" => Some(EntityKind::Tag),
            "c" => Some(EntityKind::Correspondent),
            "d" => Some(EntityKind::DocumentType),
            _ => None,
        }
    }
}

/// A tag, correspondent or document type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u32,
    pub name: String,
    /// Only ever set on tags
    #[serde(default)]
    pub is_inbox_tag: bool,
}

impl Entity {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_inbox_tag: false,
        }
    }
}

/// A Paperless document as returned by `/api/documents/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub correspondent: Option<u32>,
    #[serde(default)]
    pub document_type: Option<u32>,
    #[serde(default)]
    pub tags: Vec<u32>,
    #[serde(default)]
    pub added: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub content: Option<String>,
}

impl Document {
    pub fn is_in_inbox(&self, inbox_tag_id: u32) -> bool {
        self.tags.contains(&inbox_tag_id)
    }

    /// Date the document was added, formatted for display
    pub fn added_date(&self) -> Option<String> {
        self.added.map(|added| added.format("%Y-%m-%d").to_string())
    }

    /// Cut the OCR content down so listings stay small
    pub fn truncate_content(&mut self, max_chars: usize) {
        if let Some(content) = self.content.take() {
            let content = content.trim();
            if content.is_empty() {
                return;
            }
            let mut truncated: String = content.chars().take(max_chars).collect();
            if content.chars().count() > max_chars {
                truncated.push_str("...");
            }
            self.content = Some(truncated);
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Total number of matches across all pages
    pub total: u64,
    pub items: Vec<T>,
}

/// Paperless' paginated envelope
#[derive(Debug, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<T>,
}

/// Counters reported by `/api/statistics/`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub documents_total: Option<u64>,
    #[serde(default)]
    pub documents_inbox: Option<u64>,
    #[serde(default)]
    pub tag_count: Option<u64>,
    #[serde(default)]
    pub correspondent_count: Option<u64>,
    #[serde(default)]
    pub document_type_count: Option<u64>,
}

/// What happened to an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// A new document was consumed
    Created(u32),
    /// The file's checksum matches an existing document, whose id is known when
    /// Paperless names it
    Duplicate(Option<u32>),
}

/// Partial update sent with `PATCH /api/documents/{id}/`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correspondent: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<u32>,
}

/// A downloaded original file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_parsing() {
        let doc: Document = serde_json::from_value(serde_json::json!({
            "id": 42,
            "title": "Test Invoice",
            "correspondent": 1,
            "document_type": null,
            "tags": [1, 7],
            "created": "2025-01-15",
            "added": "2025-01-15T12:00:00.123456+01:00",
            "content": "This is a test invoice content"
        }))
        .unwrap();

        assert_eq!(doc.id, 42);
        assert_eq!(doc.correspondent, Some(1));
        assert_eq!(doc.document_type, None);
        assert!(doc.is_in_inbox(7));
        assert!(!doc.is_in_inbox(2));
        assert_eq!(doc.added_date().as_deref(), Some("2025-01-15"));
    }

    #[test]
    fn test_truncate_content() {
        let mut doc: Document = serde_json::from_value(serde_json::json!({
            "id": 1,
            "content": "  äöü and a long tail  "
        }))
        .unwrap();
        doc.truncate_content(3);
        assert_eq!(doc.content.as_deref(), Some("äöü..."));

        doc.content = Some("   ".to_string());
        doc.truncate_content(3);
        assert_eq!(doc.content, None);
    }

    #[test]
    fn test_metadata_update_skips_unset_fields() {
        let update = MetadataUpdate {
            tags: Some(vec![1, 2]),
            correspondent: None,
            document_type: Some(4),
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"tags": [1, 2], "document_type": 4})
        );
    }

    #[test]
    fn test_entity_kind_codes() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(EntityKind::from_code("x"), None);
        assert_eq!(EntityKind::Tag.selection_mode(), SelectionMode::Multi);
        assert_eq!(EntityKind::DocumentType.selection_mode(), SelectionMode::Single);
    }
}
