//! Per-chat conversation state for the upload and listing flows.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};

use crate::config::MAX_ENTITY_NAME_LENGTH;
use crate::paperless_models::{Document, EntityKind, MetadataUpdate};

/// Everything the bot remembers about one chat
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatState {
    pub upload: UploadState,
    /// The most recently rendered document listing
    pub listing: Option<ListingView>,
}

/// Upload and metadata-assignment flow
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum UploadState {
    #[default]
    Idle,
    AwaitingMetadataChoice {
        session: PendingUpload,
    },
    Editing {
        kind: EntityKind,
        offset: usize,
        session: PendingUpload,
    },
    AwaitingName {
        kind: EntityKind,
        offset: usize,
        session: PendingUpload,
    },
}

impl UploadState {
    pub fn session(&self) -> Option<&PendingUpload> {
        match self {
            UploadState::Idle => None,
            UploadState::AwaitingMetadataChoice { session }
            | UploadState::Editing { session, .. }
            | UploadState::AwaitingName { session, .. } => Some(session),
        }
    }
}

/// A just-uploaded document and its tentative metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    pub document_id: u32,
    pub title: String,
    pub tags: BTreeSet<u32>,
    pub correspondent: Option<u32>,
    pub document_type: Option<u32>,
}

impl PendingUpload {
    /// Start from whatever Paperless already assigned during consumption
    pub fn new(document: &Document) -> Self {
        Self {
            document_id: document.id,
            title: document.title.clone(),
            tags: document.tags.iter().copied().collect(),
            correspondent: document.correspondent,
            document_type: document.document_type,
        }
    }

    /// Flip a tag in or out of the selection, returning whether it is now selected
    pub fn toggle_tag(&mut self, tag_id: u32) -> bool {
        if self.tags.remove(&tag_id) {
            false
        } else {
            self.tags.insert(tag_id);
            true
        }
    }

    /// Select an entity: tags are added, single-valued kinds are replaced
    pub fn choose(&mut self, kind: EntityKind, id: u32) {
        match kind {
            EntityKind::Tag => {
                self.tags.insert(id);
            }
            EntityKind::Correspondent => self.correspondent = Some(id),
            EntityKind::DocumentType => self.document_type = Some(id),
        }
    }

    /// Currently selected ids for a kind
    pub fn selected(&self, kind: EntityKind) -> BTreeSet<u32> {
        match kind {
            EntityKind::Tag => self.tags.clone(),
            EntityKind::Correspondent => self.correspondent.into_iter().collect(),
            EntityKind::DocumentType => self.document_type.into_iter().collect(),
        }
    }

    /// The single update sent when the user presses Done
    pub fn metadata_update(&self) -> MetadataUpdate {
        MetadataUpdate {
            tags: Some(self.tags.iter().copied().collect()),
            correspondent: self.correspondent,
            document_type: self.document_type,
        }
    }
}

/// Which document listing a page belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Listing {
    Search,
    Recent,
    Inbox,
}

impl Listing {
    pub fn code(self) -> &'static str {
        match self {
            Listing::Search => "s",
            Listing::Recent => "r",
            Listing::Inbox => "i",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "s" => Some(Listing::Search),
            "r" => Some(Listing::Recent),
            "i" => Some(Listing::Inbox),
            _ => None,
        }
    }
}

/// The page of documents currently on screen
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListingView {
    pub listing: Listing,
    /// Search text; only set for search listings
    pub query: Option<String>,
    pub offset: usize,
    pub total: u64,
    pub documents: Vec<Document>,
    /// Rows dropped from this page since it was fetched
    #[serde(default)]
    pub removed: usize,
}

impl ListingView {
    /// Drop a document from the page, returning whether it was shown
    pub fn remove_document(&mut self, document_id: u32) -> bool {
        let before = self.documents.len();
        self.documents.retain(|doc| doc.id != document_id);
        let removed = self.documents.len() != before;
        if removed {
            self.total = self.total.saturating_sub(1);
            self.removed += 1;
        }
        removed
    }

    /// Offset of the following page
    ///
    /// Removed rows no longer exist on the server, so everything after them
    /// has shifted back by that many positions.
    pub fn next_offset(&self, page_size: usize) -> usize {
        (self.offset + page_size.max(1)).saturating_sub(self.removed)
    }

    pub fn has_next(&self, page_size: usize) -> bool {
        (self.next_offset(page_size) as u64) < self.total
    }
}

/// Type alias for our chat dialogue
pub type ChatDialogue = Dialogue<ChatState, InMemStorage<ChatState>>;

/// Validates the name typed for a new tag, correspondent or document type
pub fn validate_entity_name(name: &str) -> Result<String, &'static str> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.chars().count() > MAX_ENTITY_NAME_LENGTH {
        return Err("too_long");
    }

    Ok(trimmed.to_string())
}
