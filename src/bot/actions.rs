//! Callback actions carried by inline keyboard buttons
//!
//! Telegram limits `callback_data` to 64 bytes, so every action has a compact
//! colon-separated encoding: a short tag followed by its payload fields.

use crate::dialogue::Listing;
use crate::paperless_models::EntityKind;

/// Every button press the bot understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open the selection keyboard for a kind
    Edit(EntityKind),
    /// Flip a tag on the tag keyboard page starting at `offset`
    Toggle { tag_id: u32, offset: usize },
    /// Choose a correspondent or document type
    Pick { kind: EntityKind, id: u32 },
    /// Navigate a selection keyboard
    Page { kind: EntityKind, offset: usize },
    /// Ask for the name of a new entity
    New(EntityKind),
    /// Abandon the name prompt
    CancelNew(EntityKind),
    /// Back to the metadata menu
    Menu,
    /// Save the pending upload's metadata
    Done,
    /// Navigate a document listing
    ListPage { listing: Listing, offset: usize },
    Download(u32),
    /// Remove the inbox tag from a document
    Reviewed(u32),
}

impl Action {
    pub fn encode(&self) -> String {
        match self {
            Action::Edit(kind) => format!("e:{}", kind.code()),
            Action::Toggle { tag_id, offset } => format!("x:{tag_id}:{offset}"),
            Action::Pick { kind, id } => format!("p:{}:{id}", kind.code()),
            Action::Page { kind, offset } => format!("g:{}:{offset}", kind.code()),
            Action::New(kind) => format!("n:{}", kind.code()),
            Action::CancelNew(kind) => format!("z:{}", kind.code()),
            Action::Menu => "m".to_string(),
            Action::Done => "d".to_string(),
            Action::ListPage { listing, offset } => format!("l:{}:{offset}", listing.code()),
            Action::Download(id) => format!("dl:{id}"),
            Action::Reviewed(id) => format!("rv:{id}"),
        }
    }

    /// Parse callback data; unknown or malformed payloads yield `None`
    pub fn decode(data: &str) -> Option<Self> {
        let mut parts = data.split(':');
        let tag = parts.next()?;
        let a = parts.next();
        let b = parts.next();
        if parts.next().is_some() {
            return None;
        }

        let kind = |code: Option<&str>| code.and_then(EntityKind::from_code);
        let number = |value: Option<&str>| value.and_then(|v| v.parse::<usize>().ok());
        let id = |value: Option<&str>| value.and_then(|v| v.parse::<u32>().ok());

        let action = match (tag, b.is_some()) {
            ("e", false) => Action::Edit(kind(a)?),
            ("x", true) => Action::Toggle {
                tag_id: id(a)?,
                offset: number(b)?,
            },
            ("p", true) => Action::Pick {
                kind: kind(a)?,
                id: id(b)?,
            },
            ("g", true) => Action::Page {
                kind: kind(a)?,
                offset: number(b)?,
            },
            ("n", false) => Action::New(kind(a)?),
            ("z", false) => Action::CancelNew(kind(a)?),
            ("m", false) if a.is_none() => Action::Menu,
            ("d", false) if a.is_none() => Action::Done,
            ("l", true) => Action::ListPage {
                listing: a.and_then(Listing::from_code)?,
                offset: number(b)?,
            },
            ("dl", false) => Action::Download(id(a)?),
            ("rv", false) => Action::Reviewed(id(a)?),
            _ => return None,
        };
        Some(action)
    }
}
