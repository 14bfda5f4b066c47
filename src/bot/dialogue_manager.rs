//! Dialogue Manager module driving the upload and listing flows
//!
//! [`Interaction::handle`] takes the chat's current state and one inbound event
//! and returns the next state plus the replies to send. It never touches
//! Telegram directly, which keeps every transition testable against a fake
//! [`PaperlessApi`].

use std::collections::HashSet;
use std::sync::Arc;

use teloxide::utils::html;
use tracing::{debug, info, warn};

use super::actions::Action;
use super::commands::Command;
use super::ui_builder::{
    clamp_offset, document_list_keyboard, download_keyboard, format_document_list,
    metadata_menu_keyboard, name_prompt_keyboard, page_count, page_offset_for,
    selection_keyboard, EntityNames, Keyboard,
};
use crate::config::{Config, MAX_ENTITY_NAME_LENGTH, TELEGRAM_UPLOAD_LIMIT_BYTES};
use crate::dialogue::{validate_entity_name, ChatState, Listing, ListingView, PendingUpload, UploadState};
use crate::localization::{t, t_args};
use crate::paperless::{ApiResult, PaperlessApi};
use crate::paperless_errors::PaperlessError;
use crate::paperless_models::{DownloadedFile, Entity, EntityKind, Statistics, UploadOutcome};

/// An event coming in from the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    /// Plain text: a pending entity name or an implicit search
    Text(String),
    Upload { bytes: Vec<u8>, filename: String },
    Callback(Action),
}

impl Inbound {
    fn label(&self) -> &'static str {
        match self {
            Inbound::Command(_) => "command",
            Inbound::Text(_) => "text",
            Inbound::Upload { .. } => "upload",
            Inbound::Callback(_) => "callback",
        }
    }
}

/// Something to show the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A new HTML message
    Send {
        text: String,
        keyboard: Option<Keyboard>,
    },
    /// Replace the message whose button was pressed
    Edit {
        text: String,
        keyboard: Option<Keyboard>,
    },
    File(DownloadedFile),
    /// Short notice shown as the callback answer
    Toast(String),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Send {
            text: text.into(),
            keyboard: None,
        }
    }
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub state: ChatState,
    pub replies: Vec<Reply>,
}

impl Outcome {
    fn new(state: ChatState, reply: Reply) -> Self {
        Self {
            state,
            replies: vec![reply],
        }
    }

    fn stale(state: ChatState) -> Self {
        Self::new(state, Reply::Toast(t("toast-stale")))
    }
}

/// Behaviour settings the handlers need from the configuration
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Empty means everyone may use the bot
    pub allowed_users: HashSet<u64>,
    pub page_size: usize,
    pub keyboard_page_size: usize,
    pub remove_inbox_on_done: bool,
    pub public_url: String,
}

impl BotSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_users: config.allowed_users.clone(),
            page_size: config.page_size,
            keyboard_page_size: config.keyboard_page_size,
            remove_inbox_on_done: config.remove_inbox_on_done,
            public_url: config.paperless_public_url.clone(),
        }
    }

    pub fn is_authorized(&self, user_id: u64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }

    /// Link to a document in the Paperless web UI
    pub fn document_url(&self, document_id: u32) -> String {
        format!("{}/documents/{}/details", self.public_url, document_id)
    }
}

/// How a rendered screen reaches the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Send,
    Edit,
}

impl Delivery {
    fn reply(self, text: String, keyboard: Option<Keyboard>) -> Reply {
        match self {
            Delivery::Send => Reply::Send { text, keyboard },
            Delivery::Edit => Reply::Edit { text, keyboard },
        }
    }
}

/// Drives conversations against a Paperless instance
///
/// # Thread Safety
///
/// Holds no per-chat state; the dispatcher owns chat state and hands it in with
/// every event, so one `Interaction` is shared by all chats.
#[derive(Clone)]
pub struct Interaction {
    api: Arc<dyn PaperlessApi>,
    settings: BotSettings,
}

impl Interaction {
    pub fn new(api: Arc<dyn PaperlessApi>, settings: BotSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// Handle one inbound event for a user
    ///
    /// Unauthorized users are turned away before any Paperless call. Errors
    /// from Paperless leave the state as it was and become an error message,
    /// so the user can retry the same action.
    pub async fn handle(&self, user_id: u64, state: ChatState, event: Inbound) -> Outcome {
        if !self.settings.is_authorized(user_id) {
            warn!(user_id, event = event.label(), "Rejected event from unauthorized user");
            let reply = match event {
                Inbound::Callback(_) => Reply::Toast(t("access-denied")),
                _ => Reply::text(t("access-denied")),
            };
            return Outcome::new(state, reply);
        }

        debug!(user_id, event = event.label(), upload_state = ?state.upload, "Handling event");
        let previous = state.clone();
        match self.dispatch(state, event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(user_id, error = %e, "Paperless call failed");
                Outcome::new(previous, Reply::text(error_message(&e)))
            }
        }
    }

    async fn dispatch(&self, state: ChatState, event: Inbound) -> ApiResult<Outcome> {
        match event {
            Inbound::Command(Command::Start | Command::Help) => {
                Ok(Outcome::new(state, Reply::text(t("help-text"))))
            }
            Inbound::Command(Command::Search(query)) => {
                let query = query.trim().to_string();
                if query.is_empty() {
                    return Ok(Outcome::new(state, Reply::text(t("search-usage"))));
                }
                self.show_listing(state, Listing::Search, Some(query), 0, Delivery::Send)
                    .await
            }
            Inbound::Command(Command::Recent) => {
                self.show_listing(state, Listing::Recent, None, 0, Delivery::Send)
                    .await
            }
            Inbound::Command(Command::Inbox) => {
                self.show_listing(state, Listing::Inbox, None, 0, Delivery::Send)
                    .await
            }
            Inbound::Command(Command::Stats) => {
                let stats = self.api.statistics().await?;
                Ok(Outcome::new(state, Reply::text(format_statistics(&stats))))
            }
            Inbound::Text(text) => self.on_text(state, text).await,
            Inbound::Upload { bytes, filename } => self.on_upload(state, bytes, filename).await,
            Inbound::Callback(action) => self.on_callback(state, action).await,
        }
    }

    async fn on_text(&self, mut state: ChatState, text: String) -> ApiResult<Outcome> {
        match std::mem::take(&mut state.upload) {
            UploadState::AwaitingName {
                kind,
                offset,
                session,
            } => self.create_named(state, kind, offset, session, &text).await,
            upload => {
                state.upload = upload;
                let query = text.trim().to_string();
                if query.is_empty() {
                    return Ok(Outcome {
                        state,
                        replies: Vec::new(),
                    });
                }
                self.show_listing(state, Listing::Search, Some(query), 0, Delivery::Send)
                    .await
            }
        }
    }

    async fn on_upload(
        &self,
        mut state: ChatState,
        bytes: Vec<u8>,
        filename: String,
    ) -> ApiResult<Outcome> {
        match self.api.upload(bytes, &filename).await? {
            UploadOutcome::Created(document_id) => {
                let document = self.api.document(document_id).await?;
                let session = PendingUpload::new(&document);
                info!(document_id, filename = %filename, "Upload consumed, starting metadata flow");

                let text = t_args("upload-created", &[("title", &html::escape(&session.title))]);
                let keyboard = metadata_menu_keyboard(session.tags.len());
                state.upload = UploadState::AwaitingMetadataChoice { session };
                Ok(Outcome::new(state, Reply::Send { text, keyboard: Some(keyboard) }))
            }
            UploadOutcome::Duplicate(Some(document_id)) => {
                info!(document_id, filename = %filename, "Upload is a duplicate");
                let title = match self.api.document(document_id).await {
                    Ok(existing) => existing.title,
                    Err(e) => {
                        warn!(document_id, error = %e, "Could not fetch existing document");
                        format!("#{document_id}")
                    }
                };
                let text = t_args(
                    "upload-duplicate-id",
                    &[
                        ("id", &document_id.to_string()),
                        ("url", &html::escape(&self.settings.document_url(document_id))),
                    ],
                );
                state.upload = UploadState::Idle;
                Ok(Outcome::new(
                    state,
                    Reply::Send {
                        text,
                        keyboard: Some(download_keyboard(document_id, &title)),
                    },
                ))
            }
            UploadOutcome::Duplicate(None) => {
                info!(filename = %filename, "Upload is a duplicate of an unnamed document");
                state.upload = UploadState::Idle;
                Ok(Outcome::new(state, Reply::text(t("upload-duplicate"))))
            }
        }
    }

    async fn on_callback(&self, state: ChatState, action: Action) -> ApiResult<Outcome> {
        match action {
            Action::Download(document_id) => self.download(state, document_id).await,
            Action::Reviewed(document_id) => self.mark_reviewed(state, document_id).await,
            Action::ListPage { listing, offset } => {
                let query = match (&state.listing, listing) {
                    (Some(view), Listing::Search) if view.listing == Listing::Search => {
                        view.query.clone()
                    }
                    (_, Listing::Search) => return Ok(Outcome::stale(state)),
                    _ => None,
                };
                self.show_listing(state, listing, query, offset, Delivery::Edit)
                    .await
            }
            _ => self.on_upload_action(state, action).await,
        }
    }

    /// Button presses belonging to the metadata flow
    async fn on_upload_action(&self, mut state: ChatState, action: Action) -> ApiResult<Outcome> {
        let upload = std::mem::take(&mut state.upload);
        let (upload, reply) = match (upload, action) {
            (
                UploadState::AwaitingMetadataChoice { session }
                | UploadState::Editing { session, .. }
                | UploadState::AwaitingName { session, .. },
                Action::Edit(kind),
            ) => self.selection_screen(kind, 0, session).await?,
            (
                UploadState::Editing {
                    kind: EntityKind::Tag,
                    mut session,
                    ..
                },
                Action::Toggle { tag_id, offset },
            ) => {
                let selected = session.toggle_tag(tag_id);
                debug!(document_id = session.document_id, tag_id, selected, "Toggled tag");
                self.selection_screen(EntityKind::Tag, offset, session).await?
            }
            (UploadState::Editing { kind, mut session, .. }, Action::Pick { kind: picked, id })
                if picked == kind =>
            {
                session.choose(kind, id);
                debug!(document_id = session.document_id, kind = ?kind, id, "Picked entity");
                self.menu_screen(session).await
            }
            (UploadState::Editing { kind, session, .. }, Action::Page { kind: paged, offset })
                if paged == kind =>
            {
                self.selection_screen(kind, offset, session).await?
            }
            (UploadState::Editing { kind, offset, session }, Action::New(requested))
                if requested == kind =>
            {
                let text = t_args("new-name-prompt", &[("kind", &kind_name(kind))]);
                let reply = Reply::Edit {
                    text,
                    keyboard: Some(name_prompt_keyboard(kind)),
                };
                (UploadState::AwaitingName { kind, offset, session }, reply)
            }
            (UploadState::AwaitingName { kind, offset, session }, Action::CancelNew(cancelled))
                if cancelled == kind =>
            {
                self.selection_screen(kind, offset, session).await?
            }
            (
                UploadState::Editing { session, .. } | UploadState::AwaitingName { session, .. },
                Action::Menu,
            ) => self.menu_screen(session).await,
            (UploadState::AwaitingMetadataChoice { session }, Action::Done) => {
                self.finish(session).await?
            }
            (upload, action) => {
                debug!(upload_state = ?upload, action = ?action, "Callback does not match the flow");
                state.upload = upload;
                return Ok(Outcome::stale(state));
            }
        };

        state.upload = upload;
        Ok(Outcome::new(state, reply))
    }

    /// Create the entity named by the user and show it selected
    async fn create_named(
        &self,
        mut state: ChatState,
        kind: EntityKind,
        offset: usize,
        mut session: PendingUpload,
        text: &str,
    ) -> ApiResult<Outcome> {
        let name = match validate_entity_name(text) {
            Ok(name) => name,
            Err(reason) => {
                let message = match reason {
                    "too_long" => t_args(
                        "name-too-long",
                        &[("max", &MAX_ENTITY_NAME_LENGTH.to_string())],
                    ),
                    _ => t("name-empty"),
                };
                state.upload = UploadState::AwaitingName {
                    kind,
                    offset,
                    session,
                };
                return Ok(Outcome::new(state, Reply::text(message)));
            }
        };

        let entity = match kind {
            EntityKind::Tag => self.api.create_tag(&name).await?,
            EntityKind::Correspondent => self.api.create_correspondent(&name).await?,
            EntityKind::DocumentType => self.api.create_document_type(&name).await?,
        };
        session.choose(kind, entity.id);
        info!(document_id = session.document_id, kind = ?kind, id = entity.id, "Created and selected entity");

        // The entity exists now; a failed refresh must not send the user back to the prompt
        let items = match self.selectable(kind).await {
            Ok(items) => items,
            Err(e) => {
                warn!(kind = ?kind, id = entity.id, error = %e, "Created entity but could not refresh the keyboard");
                state.upload = UploadState::Editing {
                    kind,
                    offset,
                    session,
                };
                return Ok(Outcome::new(state, Reply::text(error_message(&e))));
            }
        };
        let offset = items
            .iter()
            .position(|item| item.id == entity.id)
            .map(|index| page_offset_for(index, self.settings.keyboard_page_size))
            .unwrap_or(offset);
        let (text, keyboard, offset) = self.render_selection(kind, &items, offset, &session);

        state.upload = UploadState::Editing {
            kind,
            offset,
            session,
        };
        Ok(Outcome::new(
            state,
            Reply::Send {
                text,
                keyboard: Some(keyboard),
            },
        ))
    }

    /// Save the accumulated metadata in one update
    async fn finish(&self, session: PendingUpload) -> ApiResult<(UploadState, Reply)> {
        let document_id = session.document_id;
        self.api
            .set_metadata(document_id, &session.metadata_update())
            .await?;

        if self.settings.remove_inbox_on_done {
            match self.api.resolve_inbox_tag().await {
                Ok(inbox) => self.api.remove_tag(document_id, inbox.id).await?,
                Err(e) => warn!(
                    document_id,
                    error = %e,
                    "Inbox tag could not be resolved, leaving it on the document"
                ),
            }
        }

        info!(document_id, "Metadata saved");
        let text = t_args(
            "metadata-saved",
            &[
                ("title", &html::escape(&session.title)),
                ("url", &html::escape(&self.settings.document_url(document_id))),
            ],
        );
        Ok((
            UploadState::Idle,
            Reply::Edit {
                text,
                keyboard: None,
            },
        ))
    }

    async fn menu_screen(&self, session: PendingUpload) -> (UploadState, Reply) {
        let names = self.entity_names().await;
        let text = t_args(
            "metadata-menu",
            &[
                ("title", &html::escape(&session.title)),
                ("tags", &html::escape(&names.join(EntityKind::Tag, &session.tags))),
                (
                    "correspondent",
                    &html::escape(&names.join(EntityKind::Correspondent, &session.correspondent)),
                ),
                (
                    "document_type",
                    &html::escape(&names.join(EntityKind::DocumentType, &session.document_type)),
                ),
            ],
        );
        let reply = Reply::Edit {
            text,
            keyboard: Some(metadata_menu_keyboard(session.tags.len())),
        };
        (UploadState::AwaitingMetadataChoice { session }, reply)
    }

    async fn selection_screen(
        &self,
        kind: EntityKind,
        offset: usize,
        session: PendingUpload,
    ) -> ApiResult<(UploadState, Reply)> {
        let items = self.selectable(kind).await?;
        let (text, keyboard, offset) = self.render_selection(kind, &items, offset, &session);
        let reply = Reply::Edit {
            text,
            keyboard: Some(keyboard),
        };
        Ok((
            UploadState::Editing {
                kind,
                offset,
                session,
            },
            reply,
        ))
    }

    fn render_selection(
        &self,
        kind: EntityKind,
        items: &[Entity],
        offset: usize,
        session: &PendingUpload,
    ) -> (String, Keyboard, usize) {
        let page_size = self.settings.keyboard_page_size;
        let offset = clamp_offset(offset, items.len(), page_size);
        let key = match kind {
            EntityKind::Tag => "select-tags",
            EntityKind::Correspondent => "select-correspondent",
            EntityKind::DocumentType => "select-document-type",
        };

        let mut text = t_args(key, &[("title", &html::escape(&session.title))]);
        let pages = page_count(items.len(), page_size);
        if items.is_empty() {
            text.push_str("\n\n");
            text.push_str(&t("selection-empty"));
        } else if pages > 1 {
            text.push_str("\n\n");
            text.push_str(&page_indicator(offset / page_size.max(1) + 1, pages));
        }

        let keyboard = selection_keyboard(
            kind,
            items,
            offset,
            page_size,
            &session.selected(kind),
            kind.selection_mode(),
        );
        (text, keyboard, offset)
    }

    /// Entities offered on a selection keyboard; the inbox tag is never offered
    async fn selectable(&self, kind: EntityKind) -> ApiResult<Vec<Entity>> {
        let entities = self.api.entities(kind).await?;
        if kind != EntityKind::Tag {
            return Ok(entities.to_vec());
        }
        let inbox_id = match self.api.resolve_inbox_tag().await {
            Ok(inbox) => Some(inbox.id),
            Err(e) => {
                debug!(error = %e, "No inbox tag to hide from the tag keyboard");
                None
            }
        };
        Ok(entities
            .iter()
            .filter(|tag| Some(tag.id) != inbox_id)
            .cloned()
            .collect())
    }

    /// Names for rendering; lookups that fail fall back to `#id`
    async fn entity_names(&self) -> EntityNames {
        let mut names = EntityNames::default();
        for kind in EntityKind::ALL {
            match self.api.entities(kind).await {
                Ok(entities) => names.insert_all(kind, &entities),
                Err(e) => debug!(kind = ?kind, error = %e, "Entity names unavailable"),
            }
        }
        names
    }

    async fn show_listing(
        &self,
        mut state: ChatState,
        listing: Listing,
        query: Option<String>,
        offset: usize,
        delivery: Delivery,
    ) -> ApiResult<Outcome> {
        let limit = self.settings.page_size;
        let page = match listing {
            Listing::Search => {
                let query = query.as_deref().unwrap_or_default();
                self.api.search(query, offset, limit).await?
            }
            Listing::Recent => self.api.list_recent(offset, limit).await?,
            Listing::Inbox => self.api.list_inbox(offset, limit).await?,
        };
        debug!(listing = ?listing, offset, total = page.total, shown = page.items.len(), "Fetched listing");

        let view = ListingView {
            listing,
            query,
            offset,
            total: page.total,
            documents: page.items,
            removed: 0,
        };
        let (text, keyboard) = self.render_listing(&view).await;
        state.listing = Some(view);
        Ok(Outcome::new(state, delivery.reply(text, keyboard)))
    }

    async fn render_listing(&self, view: &ListingView) -> (String, Option<Keyboard>) {
        let query = html::escape(view.query.as_deref().unwrap_or_default());
        let total = view.total.to_string();

        if view.total == 0 {
            let text = match view.listing {
                Listing::Search => t_args("listing-empty-search", &[("query", &query)]),
                Listing::Recent => t("listing-empty-recent"),
                Listing::Inbox => t("listing-empty-inbox"),
            };
            return (text, None);
        }

        let mut text = match view.listing {
            Listing::Search => t_args("listing-search", &[("query", &query), ("total", &total)]),
            Listing::Recent => t_args("listing-recent", &[("total", &total)]),
            Listing::Inbox => t_args("listing-inbox", &[("total", &total)]),
        };
        let page_size = self.settings.page_size.max(1);
        let pages = usize::try_from(view.total).map_or(1, |total| page_count(total, page_size));
        if pages > 1 {
            text.push('\n');
            let page = (view.offset.div_ceil(page_size) + 1).min(pages);
            text.push_str(&page_indicator(page, pages));
        }
        if !view.documents.is_empty() {
            let names = self.entity_names().await;
            text.push_str("\n\n");
            text.push_str(&format_document_list(&view.documents, &names));
        }

        let keyboard = document_list_keyboard(view, page_size);
        (text, (!keyboard.is_empty()).then_some(keyboard))
    }

    async fn mark_reviewed(&self, mut state: ChatState, document_id: u32) -> ApiResult<Outcome> {
        let inbox = self.api.resolve_inbox_tag().await?;
        self.api.remove_tag(document_id, inbox.id).await?;
        info!(document_id, "Document marked as reviewed");

        let mut replies = vec![Reply::Toast(t("toast-reviewed"))];
        if let Some(view) = state.listing.as_mut() {
            if view.listing == Listing::Inbox && view.remove_document(document_id) {
                let view = view.clone();
                let (text, keyboard) = self.render_listing(&view).await;
                replies.push(Reply::Edit { text, keyboard });
            }
        }
        Ok(Outcome { state, replies })
    }

    async fn download(&self, state: ChatState, document_id: u32) -> ApiResult<Outcome> {
        let file = self.api.download(document_id).await?;
        let size = file.bytes.len() as u64;
        if size > TELEGRAM_UPLOAD_LIMIT_BYTES {
            warn!(document_id, size, "Document too large to send");
            let text = t_args("download-too-large", &[("size", &megabytes(size))]);
            return Ok(Outcome::new(state, Reply::text(text)));
        }
        Ok(Outcome::new(state, Reply::File(file)))
    }
}

fn kind_name(kind: EntityKind) -> String {
    match kind {
        EntityKind::Tag => t("kind-tag"),
        EntityKind::Correspondent => t("kind-correspondent"),
        EntityKind::DocumentType => t("kind-document-type"),
    }
}

fn page_indicator(page: usize, pages: usize) -> String {
    t_args(
        "page-indicator",
        &[("page", &page.to_string()), ("pages", &pages.to_string())],
    )
}

/// Size in megabytes with one decimal
pub fn megabytes(bytes: u64) -> String {
    format!("{:.1}", bytes as f64 / (1024.0 * 1024.0))
}

fn format_statistics(stats: &Statistics) -> String {
    let value = |count: Option<u64>| count.map_or_else(|| t("stats-missing"), |n| n.to_string());
    t_args(
        "stats-text",
        &[
            ("total", &value(stats.documents_total)),
            ("inbox", &value(stats.documents_inbox)),
            ("correspondents", &value(stats.correspondent_count)),
            ("tags", &value(stats.tag_count)),
            ("document_types", &value(stats.document_type_count)),
        ],
    )
}

/// User-facing message for a failed Paperless call
pub fn error_message(err: &PaperlessError) -> String {
    match err {
        PaperlessError::Unauthorized => t("error-unauthorized"),
        PaperlessError::NotFound(what) => t_args("error-not-found", &[("what", &html::escape(what))]),
        PaperlessError::RemoteUnavailable(_) => t("error-unavailable"),
        PaperlessError::Rejected { message, .. } => {
            t_args("error-rejected", &[("message", &html::escape(message))])
        }
        PaperlessError::UploadFailed(reason) => {
            t_args("upload-failed", &[("reason", &html::escape(reason))])
        }
        PaperlessError::InvalidResponse(_) => t("error-invalid-response"),
    }
}
