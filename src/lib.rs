//! # Paperless Telegram Bot
//!
//! A Telegram bot that fronts a Paperless-NGX instance: upload documents and
//! photos, assign tags, correspondents and document types, search, review the
//! inbox and download originals from a chat.

pub mod bot;
pub mod config;
pub mod dialogue;
pub mod entity_cache;
pub mod health;
pub mod localization;
pub mod paperless;
pub mod paperless_errors;
pub mod paperless_models;
