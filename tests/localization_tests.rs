//! # Localization Tests
//!
//! Message lookup and argument formatting against the bundled English resource.

use paperless_bot::localization::{t, t_args, LocalizationManager};

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        LocalizationManager::new().expect("Failed to create localization manager")
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message("help-text", None);
        for command in ["/search", "/recent", "/inbox", "/stats"] {
            assert!(message.contains(command), "help text lacks {command}");
        }
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message("nonexistent-key", None);
        assert_eq!(message, "Missing translation: nonexistent-key");
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let message = manager.get_message_with_args(
            "stats-text",
            &[
                ("total", "120"),
                ("inbox", "4"),
                ("correspondents", "7"),
                ("tags", "12"),
                ("document_types", "3"),
            ],
        );
        assert!(message.contains("Documents: 120"));
        assert!(message.contains("In inbox: 4"));
        assert!(message.contains("Document types: 3"));
    }

    #[test]
    fn test_missing_argument_keeps_placeholder_name() {
        let manager = setup_localization();

        // Fluent renders an unresolved variable as `{$name}` rather than failing
        let message = manager.get_message_with_args("error-not-found", &[]);
        assert!(message.starts_with("Not found: "));
        assert!(message.contains("what"));
    }

    #[test]
    fn test_global_helpers_match_manager() {
        let manager = setup_localization();

        assert_eq!(t("toast-stale"), manager.get_message("toast-stale", None));
        assert_eq!(
            t_args("name-too-long", &[("max", "128")]),
            "The name is longer than 128 characters. Try again or press Cancel."
        );
    }

    #[test]
    fn test_multiline_message_keeps_lines() {
        let text = t_args(
            "upload-duplicate-id",
            &[("id", "42"), ("url", "https://paperless.example.org/documents/42/details")],
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("document #42."));
        assert_eq!(lines[1], "https://paperless.example.org/documents/42/details");
    }
}
