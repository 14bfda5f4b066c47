//! Shared test fixtures: an in-memory Paperless that records every call

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use paperless_bot::bot::{BotSettings, Interaction};
use paperless_bot::dialogue::{ChatState, PendingUpload, UploadState};
use paperless_bot::paperless::{ApiResult, PaperlessApi};
use paperless_bot::paperless_errors::PaperlessError;
use paperless_bot::paperless_models::{
    Document, DownloadedFile, Entity, EntityKind, MetadataUpdate, Page, Statistics, UploadOutcome,
};

pub const INBOX_TAG_ID: u32 = 99;
pub const ALLOWED_USER: u64 = 1000;

/// One recorded API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search(String, usize),
    ListRecent(usize),
    ListInbox(usize),
    Document(u32),
    Upload(String),
    SetMetadata(u32, MetadataUpdate),
    RemoveTag(u32, u32),
    Entities(EntityKind),
    CreateEntity(EntityKind, String),
    Download(u32),
    Statistics,
    ResolveInboxTag,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    entities: HashMap<EntityKind, Vec<Entity>>,
    documents: Vec<Document>,
    upload_outcome: Option<UploadOutcome>,
    inbox_tag: Option<Entity>,
    failure: Option<PaperlessError>,
    entities_failure: Option<PaperlessError>,
    next_id: u32,
}

/// Fake Paperless server state behind the `PaperlessApi` trait
#[derive(Clone, Default)]
pub struct FakePaperless {
    inner: Arc<Mutex<Inner>>,
}

impl FakePaperless {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.inner.lock().unwrap().next_id = 500;
        fake
    }

    pub fn with_tags(self, count: u32) -> Self {
        let tags = (1..=count)
            .map(|i| Entity::new(i, format!("tag {i:02}")))
            .collect();
        self.inner
            .lock()
            .unwrap()
            .entities
            .insert(EntityKind::Tag, tags);
        self
    }

    pub fn with_entities(self, kind: EntityKind, entities: Vec<Entity>) -> Self {
        self.inner.lock().unwrap().entities.insert(kind, entities);
        self
    }

    pub fn with_inbox_tag(self) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let mut inbox = Entity::new(INBOX_TAG_ID, "Inbox");
            inbox.is_inbox_tag = true;
            inner
                .entities
                .entry(EntityKind::Tag)
                .or_default()
                .push(inbox.clone());
            inner.inbox_tag = Some(inbox);
        }
        self
    }

    pub fn with_document(self, document: Document) -> Self {
        self.inner.lock().unwrap().documents.push(document);
        self
    }

    pub fn with_upload_outcome(self, outcome: UploadOutcome) -> Self {
        self.inner.lock().unwrap().upload_outcome = Some(outcome);
        self
    }

    /// Make every following call fail
    pub fn fail_with(&self, error: PaperlessError) {
        self.inner.lock().unwrap().failure = Some(error);
    }

    /// Make only entity list reads fail
    pub fn fail_entity_lists_with(&self, error: PaperlessError) {
        self.inner.lock().unwrap().entities_failure = Some(error);
    }

    pub fn recover(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure = None;
        inner.entities_failure = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    pub fn document_tags(&self, document_id: u32) -> Vec<u32> {
        let inner = self.inner.lock().unwrap();
        inner
            .documents
            .iter()
            .find(|doc| doc.id == document_id)
            .map(|doc| doc.tags.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: Call) -> ApiResult<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        if let Some(error) = inner.failure.clone() {
            return Err(error);
        }
        Ok(inner)
    }

    fn page(documents: Vec<Document>, offset: usize, limit: usize) -> Page<Document> {
        Page {
            total: documents.len() as u64,
            items: documents.into_iter().skip(offset).take(limit).collect(),
        }
    }
}

#[async_trait]
impl PaperlessApi for FakePaperless {
    async fn search(&self, query: &str, offset: usize, limit: usize) -> ApiResult<Page<Document>> {
        let inner = self.record(Call::Search(query.to_string(), offset))?;
        let needle = query.to_lowercase();
        let matches = inner
            .documents
            .iter()
            .filter(|doc| doc.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        Ok(Self::page(matches, offset, limit))
    }

    async fn list_recent(&self, offset: usize, limit: usize) -> ApiResult<Page<Document>> {
        let inner = self.record(Call::ListRecent(offset))?;
        let mut documents = inner.documents.clone();
        documents.reverse();
        Ok(Self::page(documents, offset, limit))
    }

    async fn list_inbox(&self, offset: usize, limit: usize) -> ApiResult<Page<Document>> {
        let inner = self.record(Call::ListInbox(offset))?;
        let inbox = inner
            .inbox_tag
            .clone()
            .ok_or_else(|| PaperlessError::NotFound("inbox tag".to_string()))?;
        let documents = inner
            .documents
            .iter()
            .filter(|doc| doc.is_in_inbox(inbox.id))
            .cloned()
            .collect();
        Ok(Self::page(documents, offset, limit))
    }

    async fn document(&self, document_id: u32) -> ApiResult<Document> {
        let inner = self.record(Call::Document(document_id))?;
        inner
            .documents
            .iter()
            .find(|doc| doc.id == document_id)
            .cloned()
            .ok_or_else(|| PaperlessError::NotFound(format!("document #{document_id}")))
    }

    async fn upload(&self, _bytes: Vec<u8>, filename: &str) -> ApiResult<UploadOutcome> {
        let mut inner = self.record(Call::Upload(filename.to_string()))?;
        if let Some(outcome) = inner.upload_outcome {
            return Ok(outcome);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.documents.push(document(id, filename, &[]));
        Ok(UploadOutcome::Created(id))
    }

    async fn set_metadata(&self, document_id: u32, update: &MetadataUpdate) -> ApiResult<Document> {
        let mut inner = self.record(Call::SetMetadata(document_id, update.clone()))?;
        let doc = inner
            .documents
            .iter_mut()
            .find(|doc| doc.id == document_id)
            .ok_or_else(|| PaperlessError::NotFound(format!("document #{document_id}")))?;
        if let Some(tags) = &update.tags {
            doc.tags = tags.clone();
        }
        if update.correspondent.is_some() {
            doc.correspondent = update.correspondent;
        }
        if update.document_type.is_some() {
            doc.document_type = update.document_type;
        }
        Ok(doc.clone())
    }

    async fn remove_tag(&self, document_id: u32, tag_id: u32) -> ApiResult<()> {
        let mut inner = self.record(Call::RemoveTag(document_id, tag_id))?;
        if let Some(doc) = inner.documents.iter_mut().find(|doc| doc.id == document_id) {
            doc.tags.retain(|t| *t != tag_id);
        }
        Ok(())
    }

    async fn entities(&self, kind: EntityKind) -> ApiResult<Arc<Vec<Entity>>> {
        let inner = self.record(Call::Entities(kind))?;
        if let Some(error) = inner.entities_failure.clone() {
            return Err(error);
        }
        let mut list = inner.entities.get(&kind).cloned().unwrap_or_default();
        list.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(Arc::new(list))
    }

    async fn create_entity(&self, kind: EntityKind, name: &str) -> ApiResult<Entity> {
        let mut inner = self.record(Call::CreateEntity(kind, name.to_string()))?;
        let id = inner.next_id;
        inner.next_id += 1;
        let entity = Entity::new(id, name);
        inner.entities.entry(kind).or_default().push(entity.clone());
        Ok(entity)
    }

    async fn download(&self, document_id: u32) -> ApiResult<DownloadedFile> {
        let _inner = self.record(Call::Download(document_id))?;
        Ok(DownloadedFile {
            filename: format!("document_{document_id}.pdf"),
            bytes: b"%PDF-1.7".to_vec(),
        })
    }

    async fn statistics(&self) -> ApiResult<Statistics> {
        let inner = self.record(Call::Statistics)?;
        Ok(Statistics {
            documents_total: Some(inner.documents.len() as u64),
            ..Statistics::default()
        })
    }

    async fn resolve_inbox_tag(&self) -> ApiResult<Entity> {
        let inner = self.record(Call::ResolveInboxTag)?;
        inner
            .inbox_tag
            .clone()
            .ok_or_else(|| PaperlessError::NotFound("inbox tag".to_string()))
    }
}

pub fn document(id: u32, title: &str, tags: &[u32]) -> Document {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": title,
        "tags": tags,
        "added": "2025-01-15T12:00:00+01:00"
    }))
    .unwrap()
}

pub fn settings() -> BotSettings {
    BotSettings {
        allowed_users: [ALLOWED_USER].into_iter().collect(),
        page_size: 10,
        keyboard_page_size: 8,
        remove_inbox_on_done: false,
        public_url: "https://paperless.example.org".to_string(),
    }
}

pub fn interaction(fake: &FakePaperless, settings: BotSettings) -> Interaction {
    Interaction::new(Arc::new(fake.clone()), settings)
}

/// The pending upload, whatever screen the flow is on
pub fn session(state: &ChatState) -> PendingUpload {
    state
        .upload
        .session()
        .cloned()
        .expect("no pending upload")
}

pub fn is_idle(state: &ChatState) -> bool {
    matches!(state.upload, UploadState::Idle)
}
