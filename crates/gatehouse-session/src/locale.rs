//! Translation of server-initiated text into a session's locale.

use std::collections::HashMap;

/// Turns a message (or translation key) into text for one locale.
///
/// The registry only calls this during
/// [`broadcast_disconnect`](crate::SessionRegistry::broadcast_disconnect);
/// it never interprets the result.
pub trait Localizer: Send + Sync + 'static {
    fn localize(&self, message: &str, locale: &str) -> String;
}

/// Returns every message untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Localizer for Passthrough {
    fn localize(&self, message: &str, _locale: &str) -> String {
        message.to_string()
    }
}

/// In-memory translation table keyed by locale, then message key.
///
/// Lookup order: the requested locale, then the default locale, then the
/// key itself. Locale tags are matched case-insensitively (`en_US` and
/// `en_us` are the same locale).
#[derive(Debug, Clone)]
pub struct LocaleTable {
    default_locale: String,
    entries: HashMap<String, HashMap<String, String>>,
}

impl LocaleTable {
    pub fn new(default_locale: &str) -> Self {
        Self {
            default_locale: default_locale.to_lowercase(),
            entries: HashMap::new(),
        }
    }

    /// Adds (or replaces) one translation.
    pub fn with(mut self, locale: &str, key: &str, text: &str) -> Self {
        self.entries
            .entry(locale.to_lowercase())
            .or_default()
            .insert(key.to_string(), text.to_string());
        self
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        self.entries
            .get(locale)
            .and_then(|texts| texts.get(key))
            .map(String::as_str)
    }
}

impl Localizer for LocaleTable {
    fn localize(&self, message: &str, locale: &str) -> String {
        self.lookup(&locale.to_lowercase(), message)
            .or_else(|| self.lookup(&self.default_locale, message))
            .unwrap_or(message)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LocaleTable {
        LocaleTable::new("en_us")
            .with("en_us", "gatehouse.shutdown", "Server is shutting down")
            .with("de_DE", "gatehouse.shutdown", "Server wird heruntergefahren")
    }

    #[test]
    fn test_passthrough_returns_message() {
        assert_eq!(Passthrough.localize("bye", "fr_fr"), "bye");
    }

    #[test]
    fn test_locale_table_uses_requested_locale() {
        assert_eq!(
            table().localize("gatehouse.shutdown", "de_de"),
            "Server wird heruntergefahren"
        );
    }

    #[test]
    fn test_locale_table_matches_case_insensitively() {
        assert_eq!(
            table().localize("gatehouse.shutdown", "DE_de"),
            "Server wird heruntergefahren"
        );
    }

    #[test]
    fn test_locale_table_falls_back_to_default_locale() {
        assert_eq!(
            table().localize("gatehouse.shutdown", "ja_jp"),
            "Server is shutting down"
        );
    }

    #[test]
    fn test_locale_table_unknown_key_returns_key() {
        assert_eq!(
            table().localize("Maintenance in 5 minutes", "de_de"),
            "Maintenance in 5 minutes"
        );
    }
}
