//! UI Builder module for creating keyboards and formatting messages
//!
//! Everything here is pure: keyboards are described as [`Keyboard`] values and
//! only turned into Telegram markup at the delivery edge.

use std::collections::{BTreeSet, HashMap};

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::html;

use super::actions::Action;
use crate::dialogue::{Listing, ListingView};
use crate::localization::{t, t_args};
use crate::paperless_models::{Document, Entity, EntityKind, SelectionMode};

/// Longest button label before truncation
const MAX_LABEL_CHARS: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// An inline keyboard described independently of Telegram
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    /// Every action on the keyboard, row by row
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.rows.iter().flatten().map(|button| button.action)
    }

    pub fn has_action(&self, action: Action) -> bool {
        self.actions().any(|a| a == action)
    }

    pub fn to_markup(&self) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::new(self.rows.iter().map(|row| {
            row.iter()
                .map(|button| InlineKeyboardButton::callback(&button.label, button.action.encode()))
                .collect::<Vec<_>>()
        }))
    }
}

/// Number of pages needed for `item_count` items
pub fn page_count(item_count: usize, page_size: usize) -> usize {
    item_count.div_ceil(page_size.max(1))
}

/// Clamp an offset into `[0, item_count)` and align it to the start of its page
pub fn clamp_offset(offset: usize, item_count: usize, page_size: usize) -> usize {
    if item_count == 0 {
        return 0;
    }
    let page_size = page_size.max(1);
    let offset = offset.min(item_count - 1);
    offset - offset % page_size
}

/// Offset of the page that shows the item at `index`
pub fn page_offset_for(index: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    index - index % page_size
}

/// Cut a label to a button-friendly length on a character boundary
pub fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_string();
    }
    let mut truncated: String = label.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Build a paginated selection keyboard for entities of one kind
///
/// # Arguments
///
/// * `items` - All selectable entities, already ordered
/// * `offset` - First item to show; clamped to the list
/// * `selected` - Ids currently selected in the pending upload
/// * `mode` - Multi-select keyboards get checkboxes and a Done button,
///   single-select keyboards mark the current choice and get a Skip button
pub fn selection_keyboard(
    kind: EntityKind,
    items: &[Entity],
    offset: usize,
    page_size: usize,
    selected: &BTreeSet<u32>,
    mode: SelectionMode,
) -> Keyboard {
    let page_size = page_size.max(1);
    let offset = clamp_offset(offset, items.len(), page_size);
    let end = (offset + page_size).min(items.len());

    let mut rows: Vec<Vec<Button>> = items[offset..end]
        .iter()
        .map(|item| {
            let is_selected = selected.contains(&item.id);
            let (label, action) = match mode {
                SelectionMode::Multi => (
                    format!("{} {}", if is_selected { "[x]" } else { "[ ]" }, item.name),
                    Action::Toggle {
                        tag_id: item.id,
                        offset,
                    },
                ),
                SelectionMode::Single => (
                    if is_selected {
                        format!("✓ {}", item.name)
                    } else {
                        item.name.clone()
                    },
                    Action::Pick { kind, id: item.id },
                ),
            };
            vec![Button::new(truncate_label(&label, MAX_LABEL_CHARS), action)]
        })
        .collect();

    let mut nav = Vec::new();
    if offset > 0 {
        nav.push(Button::new(
            t("button-prev"),
            Action::Page {
                kind,
                offset: offset.saturating_sub(page_size),
            },
        ));
    }
    if end < items.len() {
        nav.push(Button::new(t("button-next"), Action::Page { kind, offset: end }));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    let closing = match mode {
        SelectionMode::Multi => Button::new(t("button-done"), Action::Menu),
        SelectionMode::Single => Button::new(t("button-skip"), Action::Menu),
    };
    rows.push(vec![Button::new(t("button-new"), Action::New(kind)), closing]);

    Keyboard { rows }
}

/// Menu shown after a successful upload
pub fn metadata_menu_keyboard(selected_tags: usize) -> Keyboard {
    Keyboard {
        rows: vec![
            vec![
                Button::new(
                    t_args("button-tags", &[("count", &selected_tags.to_string())]),
                    Action::Edit(EntityKind::Tag),
                ),
                Button::new(
                    t("button-correspondent"),
                    Action::Edit(EntityKind::Correspondent),
                ),
            ],
            vec![
                Button::new(
                    t("button-document-type"),
                    Action::Edit(EntityKind::DocumentType),
                ),
                Button::new(t("button-done"), Action::Done),
            ],
        ],
    }
}

/// Keyboard attached to the "type a name" prompt
pub fn name_prompt_keyboard(kind: EntityKind) -> Keyboard {
    Keyboard {
        rows: vec![vec![Button::new(t("button-cancel"), Action::CancelNew(kind))]],
    }
}

/// Single download button, used for duplicate uploads
pub fn download_keyboard(document_id: u32, title: &str) -> Keyboard {
    Keyboard {
        rows: vec![vec![download_button(document_id, title)]],
    }
}

fn download_button(document_id: u32, title: &str) -> Button {
    Button::new(
        t_args(
            "button-download",
            &[("title", &truncate_label(title, MAX_LABEL_CHARS / 2))],
        ),
        Action::Download(document_id),
    )
}

/// Keyboard for a page of documents
///
/// Inbox listings get a Reviewed button next to each download button.
pub fn document_list_keyboard(view: &ListingView, page_size: usize) -> Keyboard {
    let page_size = page_size.max(1);
    let (listing, offset) = (view.listing, view.offset);
    let mut rows: Vec<Vec<Button>> = view
        .documents
        .iter()
        .map(|doc| {
            let mut row = vec![download_button(doc.id, &doc.title)];
            if listing == Listing::Inbox {
                row.push(Button::new(
                    t_args(
                        "button-reviewed",
                        &[("title", &truncate_label(&doc.title, MAX_LABEL_CHARS / 3))],
                    ),
                    Action::Reviewed(doc.id),
                ));
            }
            row
        })
        .collect();

    let mut nav = Vec::new();
    if offset > 0 {
        nav.push(Button::new(
            t("button-prev"),
            Action::ListPage {
                listing,
                offset: offset.saturating_sub(page_size),
            },
        ));
    }
    if view.has_next(page_size) {
        nav.push(Button::new(
            t("button-next"),
            Action::ListPage {
                listing,
                offset: view.next_offset(page_size),
            },
        ));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    Keyboard { rows }
}

/// Id to name lookup for the entities referenced by documents
#[derive(Debug, Clone, Default)]
pub struct EntityNames {
    names: HashMap<(EntityKind, u32), String>,
}

impl EntityNames {
    pub fn insert_all(&mut self, kind: EntityKind, entities: &[Entity]) {
        for entity in entities {
            self.names.insert((kind, entity.id), entity.name.clone());
        }
    }

    /// Name for an id, or `#id` when the entity is unknown
    pub fn name(&self, kind: EntityKind, id: u32) -> String {
        self.names
            .get(&(kind, id))
            .cloned()
            .unwrap_or_else(|| format!("#{id}"))
    }

    /// Comma-separated names, `none` for an empty selection
    pub fn join<'a>(&self, kind: EntityKind, ids: impl IntoIterator<Item = &'a u32>) -> String {
        let names: Vec<String> = ids.into_iter().map(|id| self.name(kind, *id)).collect();
        if names.is_empty() {
            t("metadata-none")
        } else {
            names.join(", ")
        }
    }
}

/// Format documents for an HTML message
pub fn format_document_list(documents: &[Document], names: &EntityNames) -> String {
    documents
        .iter()
        .map(|doc| format_document(doc, names))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_document(doc: &Document, names: &EntityNames) -> String {
    let mut text = format!("<b>{}</b>", html::escape(&doc.title));

    let mut details = Vec::new();
    if let Some(id) = doc.correspondent {
        details.push(t_args(
            "document-correspondent",
            &[("name", &names.name(EntityKind::Correspondent, id))],
        ));
    }
    if let Some(id) = doc.document_type {
        details.push(t_args(
            "document-type",
            &[("name", &names.name(EntityKind::DocumentType, id))],
        ));
    }
    if !doc.tags.is_empty() {
        details.push(t_args(
            "document-tags",
            &[("names", &names.join(EntityKind::Tag, &doc.tags))],
        ));
    }
    if !details.is_empty() {
        text.push_str("\n  ");
        text.push_str(&html::escape(&details.join(" | ")));
    }
    if let Some(date) = doc.added_date() {
        text.push_str("\n  ");
        text.push_str(&t_args("document-added", &[("date", &date)]));
    }
    if let Some(content) = &doc.content {
        text.push_str(&format!("\n  <i>{}</i>", html::escape(content)));
    }
    text
}
