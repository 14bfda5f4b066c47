//! # Localization Module
//!
//! User-facing strings live in a Fluent resource compiled into the binary.
//! Handlers look messages up with [`t`] and [`t_args`]; a missing key renders
//! as `Missing translation: <key>` instead of failing the request.

use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use tracing::{error, warn};
use unic_langid::LanguageIdentifier;

const EN_RESOURCE: &str = include_str!("../locales/en/main.ftl");

/// Localization manager for the bot
pub struct LocalizationManager {
    bundle: FluentBundle<FluentResource>,
}

impl LocalizationManager {
    /// Create a manager holding the English bundle
    pub fn new() -> Result<Self> {
        let locale: LanguageIdentifier = "en".parse()?;
        let resource = FluentResource::try_new(EN_RESOURCE.to_string())
            .map_err(|(_, errors)| anyhow!("invalid Fluent resource: {errors:?}"))?;

        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // Unicode isolation marks show up as garbage in Telegram clients
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("duplicate Fluent messages: {errors:?}"))?;

        Ok(Self { bundle })
    }

    /// Get a localized message
    pub fn get_message(&self, key: &str, args: Option<&FluentArgs>) -> String {
        let Some(pattern) = self.bundle.get_message(key).and_then(|msg| msg.value()) else {
            warn!(key, "Missing translation");
            return format!("Missing translation: {key}");
        };

        let mut errors = Vec::new();
        let value = self.bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            warn!(key, errors = ?errors, "Errors while formatting message");
        }
        value.into_owned()
    }

    /// Get a localized message with simple string arguments
    pub fn get_message_with_args(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (name, value) in args {
            fluent_args.set(*name, FluentValue::from(*value));
        }
        self.get_message(key, Some(&fluent_args))
    }
}

static LOCALIZATION: LazyLock<Option<LocalizationManager>> =
    LazyLock::new(|| match LocalizationManager::new() {
        Ok(manager) => Some(manager),
        Err(e) => {
            error!(error = %e, "Failed to load localization resources");
            None
        }
    });

/// Load the bundle eagerly so resource errors surface at startup
pub fn init_localization() -> Result<()> {
    LOCALIZATION
        .as_ref()
        .map(|_| ())
        .ok_or_else(|| anyhow!("localization resources failed to load"))
}

/// Convenience function to get a localized message
pub fn t(key: &str) -> String {
    match LOCALIZATION.as_ref() {
        Some(manager) => manager.get_message(key, None),
        None => key.to_string(),
    }
}

/// Convenience function to get a localized message with arguments
pub fn t_args(key: &str, args: &[(&str, &str)]) -> String {
    match LOCALIZATION.as_ref() {
        Some(manager) => manager.get_message_with_args(key, args),
        None => key.to_string(),
    }
}
