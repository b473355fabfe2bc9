//! Localized strings.
//!
//! One flat key-to-string table per language, embedded at compile time.
//! Lookups fall back to English, then to the key itself.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::CoreError;
use crate::models::Locale;

type Table = HashMap<String, String>;

static TABLES: OnceLock<HashMap<&'static str, Table>> = OnceLock::new();

const FALLBACK_LANGUAGE: &str = "en";

fn raw_table(language: &str) -> Option<&'static str> {
    match language {
        "en" => Some(include_str!("../locales/en.json")),
        "fi" => Some(include_str!("../locales/fi.json")),
        "sv" => Some(include_str!("../locales/sv.json")),
        "nb" => Some(include_str!("../locales/nb.json")),
        _ => None,
    }
}

/// Parses one embedded table.
pub fn parse_table(language: &str) -> Result<HashMap<String, String>, CoreError> {
    let raw = raw_table(language)
        .ok_or_else(|| CoreError::UnsupportedLocale(language.to_string()))?;
    Ok(serde_json::from_str(raw)?)
}

fn tables() -> &'static HashMap<&'static str, Table> {
    TABLES.get_or_init(|| {
        Locale::ALL
            .iter()
            .map(|locale| {
                let language = locale.language();
                (language, parse_table(language).unwrap_or_default())
            })
            .collect()
    })
}

/// Translates `key` for `locale`.
pub fn translate(locale: Locale, key: &str) -> String {
    let tables = tables();
    tables
        .get(locale.language())
        .and_then(|t| t.get(key))
        .or_else(|| tables.get(FALLBACK_LANGUAGE).and_then(|t| t.get(key)))
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

/// Returns true if `locale` has its own entry for `key`.
pub fn has_translation(locale: Locale, key: &str) -> bool {
    tables()
        .get(locale.language())
        .is_some_and(|t| t.contains_key(key))
}
