//! # Paperless-NGX API Client
//!
//! Every call to the document service goes through this module. The
//! [`PaperlessApi`] trait is the seam used by the interaction handlers;
//! [`PaperlessClient`] implements it over HTTP with `reqwest`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_DISPOSITION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::RecoveryConfig;
use crate::entity_cache::EntityCache;
use crate::paperless_errors::PaperlessError;
use crate::paperless_models::{
    Document, DownloadedFile, Entity, EntityKind, MetadataUpdate, Page, Paginated, Statistics,
    UploadOutcome,
};

/// Page size used when walking entity collections
const ENTITY_FETCH_PAGE_SIZE: usize = 100;
/// Characters of OCR content kept on listed documents
const CONTENT_SNIPPET_CHARS: usize = 200;

lazy_static! {
    /// Paperless names the existing document as `... duplicate of Invoice April (#42).`
    static ref DUPLICATE_DOC_ID_RE: Regex = Regex::new(r"#(\d+)").unwrap();
}

pub type ApiResult<T> = Result<T, PaperlessError>;

/// Operations the bot needs from the document service
#[async_trait]
pub trait PaperlessApi: Send + Sync {
    /// Full-text search
    async fn search(&self, query: &str, offset: usize, limit: usize) -> ApiResult<Page<Document>>;

    /// Most recently added documents first
    async fn list_recent(&self, offset: usize, limit: usize) -> ApiResult<Page<Document>>;

    /// Documents carrying the inbox tag, newest first
    async fn list_inbox(&self, offset: usize, limit: usize) -> ApiResult<Page<Document>>;

    async fn document(&self, document_id: u32) -> ApiResult<Document>;

    /// Upload a file and wait for Paperless to consume it
    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> ApiResult<UploadOutcome>;

    async fn set_metadata(&self, document_id: u32, update: &MetadataUpdate) -> ApiResult<Document>;

    /// Remove one tag from a document, leaving the others in place
    async fn remove_tag(&self, document_id: u32, tag_id: u32) -> ApiResult<()>;

    /// All entities of a kind, served from the cache when possible
    async fn entities(&self, kind: EntityKind) -> ApiResult<Arc<Vec<Entity>>>;

    /// Create an entity and invalidate the cached list for its kind
    async fn create_entity(&self, kind: EntityKind, name: &str) -> ApiResult<Entity>;

    async fn download(&self, document_id: u32) -> ApiResult<DownloadedFile>;

    async fn statistics(&self) -> ApiResult<Statistics>;

    /// The inbox tag: configured by name or flagged `is_inbox_tag`, memoized once found
    async fn resolve_inbox_tag(&self) -> ApiResult<Entity>;

    async fn create_tag(&self, name: &str) -> ApiResult<Entity> {
        self.create_entity(EntityKind::Tag, name).await
    }

    async fn create_correspondent(&self, name: &str) -> ApiResult<Entity> {
        self.create_entity(EntityKind::Correspondent, name).await
    }

    async fn create_document_type(&self, name: &str) -> ApiResult<Entity> {
        self.create_entity(EntityKind::DocumentType, name).await
    }
}

/// Status record from `/api/tasks/`
#[derive(Debug, Deserialize)]
struct TaskRecord {
    status: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    related_document: Option<serde_json::Value>,
}

/// HTTP client for the Paperless-NGX REST API
pub struct PaperlessClient {
    http: Client,
    base_url: String,
    inbox_tag_name: Option<String>,
    recovery: RecoveryConfig,
    cache: EntityCache,
}

impl PaperlessClient {
    /// Create a client authenticating with `Authorization: Token <token>`
    pub fn new(
        base_url: &str,
        token: &SecretString,
        inbox_tag_name: Option<String>,
        recovery: RecoveryConfig,
    ) -> ApiResult<Self> {
        let mut auth = HeaderValue::from_str(&format!("Token {}", token.expose_secret()))
            .map_err(|_| PaperlessError::Unauthorized)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(recovery.request_timeout())
            .build()
            .map_err(|e| PaperlessError::RemoteUnavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            inbox_tag_name,
            recovery,
            cache: EntityCache::new(),
        })
    }

    /// The cache owned by this client
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into a typed error
    async fn check(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PaperlessError::from_status(status, &body))
    }

    async fn try_get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ApiResult<T> {
        let response = self.http.get(self.url(path)).query(query).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// GET with retries on transient failures
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ApiResult<T> {
        let mut attempt = 0;
        loop {
            match self.try_get_json(path, query).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.recovery.max_retries => {
                    let delay = self.recovery.retry_delay(attempt);
                    warn!(
                        path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Paperless request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One page of documents starting at `offset`
    ///
    /// Paperless pages by number. An offset that is not a multiple of `limit`
    /// (a listing whose earlier rows were reviewed away) is served from the
    /// two pages that straddle it.
    async fn list_documents(
        &self,
        query: Vec<(&str, String)>,
        offset: usize,
        limit: usize,
    ) -> ApiResult<Page<Document>> {
        let limit = limit.max(1);
        let skip = offset % limit;
        let first = page_for_offset(offset, limit);

        let page = self.document_page(&query, first, limit).await?;
        let total = page.count;
        let mut results = page.results;
        if skip > 0 && ((first * limit) as u64) < total {
            let next = self.document_page(&query, first + 1, limit).await?;
            results.extend(next.results);
        }

        let items = results
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|mut doc| {
                doc.truncate_content(CONTENT_SNIPPET_CHARS);
                doc
            })
            .collect();
        Ok(Page { total, items })
    }

    async fn document_page(
        &self,
        query: &[(&str, String)],
        page: usize,
        page_size: usize,
    ) -> ApiResult<Paginated<Document>> {
        let mut query = query.to_vec();
        query.push(("page", page.to_string()));
        query.push(("page_size", page_size.to_string()));
        self.get_json("/api/documents/", &query).await
    }

    async fn fetch_all(&self, kind: EntityKind) -> ApiResult<Vec<Entity>> {
        let mut results = Vec::new();
        let mut page = 1;
        loop {
            let query = [
                ("page", page.to_string()),
                ("page_size", ENTITY_FETCH_PAGE_SIZE.to_string()),
            ];
            let batch: Paginated<Entity> = self.get_json(kind.endpoint(), &query).await?;
            results.extend(batch.results);
            if batch.next.is_none() {
                break;
            }
            page += 1;
        }
        Ok(results)
    }

    /// Poll the consumption task until it settles or the deadline passes
    async fn wait_for_task(&self, task_id: &str) -> ApiResult<UploadOutcome> {
        let started = Instant::now();
        let query = [("task_id", task_id.to_string())];

        while started.elapsed() < self.recovery.task_timeout() {
            tokio::time::sleep(self.recovery.task_poll_interval()).await;

            let tasks: Vec<TaskRecord> = match self.try_get_json("/api/tasks/", &query).await {
                Ok(tasks) => tasks,
                Err(e) if e.is_transient() => {
                    warn!(task_id, error = %e, "Error polling upload task");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some(task) = tasks.into_iter().next() else {
                continue;
            };
            let result = task.result.unwrap_or_default();
            match task.status.as_str() {
                "SUCCESS" => {
                    return match task.related_document.as_ref().and_then(id_from_value) {
                        Some(id) => Ok(UploadOutcome::Created(id)),
                        None if is_duplicate_message(&result) => {
                            Ok(UploadOutcome::Duplicate(extract_duplicate_id(&result)))
                        }
                        None => Err(PaperlessError::InvalidResponse(format!(
                            "task {task_id} finished without a document"
                        ))),
                    };
                }
                "FAILURE" | "REVOKED" => {
                    if is_duplicate_message(&result) {
                        return Ok(UploadOutcome::Duplicate(extract_duplicate_id(&result)));
                    }
                    warn!(task_id, result = %result, "Upload task failed");
                    return Err(PaperlessError::UploadFailed(result));
                }
                status => debug!(task_id, status, "Upload task still running"),
            }
        }

        Err(PaperlessError::RemoteUnavailable(format!(
            "task {task_id} did not finish within {} seconds",
            self.recovery.task_timeout_secs
        )))
    }
}

#[async_trait]
impl PaperlessApi for PaperlessClient {
    async fn search(&self, query: &str, offset: usize, limit: usize) -> ApiResult<Page<Document>> {
        debug!(query, offset, limit, "Searching documents");
        self.list_documents(vec![("query", query.to_string())], offset, limit)
            .await
    }

    async fn list_recent(&self, offset: usize, limit: usize) -> ApiResult<Page<Document>> {
        self.list_documents(vec![("ordering", "-added".to_string())], offset, limit)
            .await
    }

    async fn list_inbox(&self, offset: usize, limit: usize) -> ApiResult<Page<Document>> {
        let inbox = self.resolve_inbox_tag().await?;
        self.list_documents(
            vec![
                ("tags__id__all", inbox.id.to_string()),
                ("ordering", "-added".to_string()),
            ],
            offset,
            limit,
        )
        .await
    }

    async fn document(&self, document_id: u32) -> ApiResult<Document> {
        self.get_json(&format!("/api/documents/{document_id}/"), &[])
            .await
            .map_err(|e| match e {
                PaperlessError::NotFound(_) => {
                    PaperlessError::NotFound(format!("document #{document_id}"))
                }
                other => other,
            })
    }

    async fn upload(&self, bytes: Vec<u8>, filename: &str) -> ApiResult<UploadOutcome> {
        info!(filename, size = bytes.len(), "Uploading document to Paperless");
        let form = Form::new().part("document", Part::bytes(bytes).file_name(filename.to_string()));

        let response = self
            .http
            .post(self.url("/api/documents/post_document/"))
            .multipart(form)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let task_id = response
            .text()
            .await?
            .trim()
            .trim_matches('"')
            .to_string();
        if task_id.is_empty() {
            return Err(PaperlessError::InvalidResponse(
                "upload returned no task id".to_string(),
            ));
        }

        debug!(task_id = %task_id, "Upload accepted, waiting for consumption");
        let outcome = self.wait_for_task(&task_id).await?;
        info!(task_id = %task_id, outcome = ?outcome, "Upload task finished");
        Ok(outcome)
    }

    async fn set_metadata(&self, document_id: u32, update: &MetadataUpdate) -> ApiResult<Document> {
        info!(document_id, update = ?update, "Updating document metadata");
        let response = self
            .http
            .patch(self.url(&format!("/api/documents/{document_id}/")))
            .json(update)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json::<Document>().await?)
    }

    async fn remove_tag(&self, document_id: u32, tag_id: u32) -> ApiResult<()> {
        let document = self.document(document_id).await?;
        if !document.tags.contains(&tag_id) {
            debug!(document_id, tag_id, "Tag already absent");
            return Ok(());
        }

        let tags: Vec<u32> = document.tags.into_iter().filter(|t| *t != tag_id).collect();
        let update = MetadataUpdate {
            tags: Some(tags),
            ..MetadataUpdate::default()
        };
        let response = self
            .http
            .patch(self.url(&format!("/api/documents/{document_id}/")))
            .json(&update)
            .send()
            .await?;
        Self::check(response).await?;
        info!(document_id, tag_id, "Removed tag from document");
        Ok(())
    }

    async fn entities(&self, kind: EntityKind) -> ApiResult<Arc<Vec<Entity>>> {
        if let Some(list) = self.cache.get(kind) {
            return Ok(list);
        }
        let generation = self.cache.generation(kind);
        let fetched = self.fetch_all(kind).await?;
        Ok(self.cache.store(kind, fetched, generation))
    }

    async fn create_entity(&self, kind: EntityKind, name: &str) -> ApiResult<Entity> {
        let response = self
            .http
            .post(self.url(kind.endpoint()))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        let response = Self::check(response).await?;
        let entity: Entity = response.json().await?;

        self.cache.invalidate(kind);
        info!(kind = ?kind, id = entity.id, name = %entity.name, "Created entity");
        Ok(entity)
    }

    async fn download(&self, document_id: u32) -> ApiResult<DownloadedFile> {
        let response = self
            .http
            .get(self.url(&format!("/api/documents/{document_id}/download/")))
            .send()
            .await?;
        let response = Self::check(response).await?;
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| format!("document_{document_id}.pdf"));
        let bytes = response.bytes().await?.to_vec();
        debug!(document_id, filename = %filename, size = bytes.len(), "Downloaded document");
        Ok(DownloadedFile { filename, bytes })
    }

    async fn statistics(&self) -> ApiResult<Statistics> {
        self.get_json("/api/statistics/", &[]).await
    }

    async fn resolve_inbox_tag(&self) -> ApiResult<Entity> {
        if let Some(tag) = self.cache.inbox_tag() {
            return Ok(tag);
        }

        let tags = self.entities(EntityKind::Tag).await?;
        let found = match &self.inbox_tag_name {
            Some(name) => tags.iter().find(|t| t.name.eq_ignore_ascii_case(name)),
            None => tags.iter().find(|t| t.is_inbox_tag),
        };

        match found {
            Some(tag) => {
                info!(id = tag.id, name = %tag.name, "Resolved inbox tag");
                Ok(self.cache.remember_inbox_tag(tag.clone()))
            }
            None => Err(PaperlessError::NotFound(match &self.inbox_tag_name {
                Some(name) => format!("inbox tag '{name}'"),
                None => "inbox tag".to_string(),
            })),
        }
    }
}

/// Paperless pages are 1-based; offsets are rounded down to a page boundary
pub fn page_for_offset(offset: usize, limit: usize) -> usize {
    offset / limit.max(1) + 1
}

fn is_duplicate_message(message: &str) -> bool {
    message.to_lowercase().contains("duplicate")
}

/// Extract the existing document id from a duplicate failure message
pub fn extract_duplicate_id(message: &str) -> Option<u32> {
    DUPLICATE_DOC_ID_RE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `related_document` is a string in some Paperless versions and a number in others
fn id_from_value(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|id| u32::try_from(id).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Filename from a `Content-Disposition` header
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut extended = None;
    for part in header.split(';').map(str::trim) {
        if let Some(value) = part.strip_prefix("filename=") {
            let name = value.trim_matches('"').trim_matches('\'');
            if !name.is_empty() {
                return Some(name.to_string());
            }
        } else if let Some(value) = part.strip_prefix("filename*=") {
            // RFC 5987: charset'lang'value
            extended = value.rsplit('\'').next().map(str::to_string);
        }
    }
    extended.filter(|name| !name.is_empty())
}
