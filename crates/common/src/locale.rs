//! Bilingual UI string bundles
//!
//! The locale table is a JSON object keyed by locale code, each value a
//! nested object of UI strings and URLs:
//!
//! ```json
//! { "en": { "urls": { "signup": "https://..." }, "errors": { "required": "Required" } },
//!   "fr": { "urls": { "signup": "https://..." }, "errors": { "required": "Requis" } } }
//! ```
//!
//! Keys are addressed with dots (`errors.required`).

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::{Error, Result};

pub const DEFAULT_LOCALE: &str = "en";

/// All locales loaded from the table file.
#[derive(Debug, Clone)]
pub struct LocaleTable {
    locales: BTreeMap<String, Value>,
}

impl LocaleTable {
    pub fn from_json(json: &str) -> Result<Self> {
        let locales: BTreeMap<String, Value> = serde_json::from_str(json)?;
        Ok(Self { locales })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Locale codes joined for error messages, e.g. `en | fr`.
    pub fn available(&self) -> String {
        self.locales.keys().cloned().collect::<Vec<_>>().join(" | ")
    }

    fn bundle(&self, locale: &str) -> Result<LocaleBundle> {
        match self.locales.get(locale) {
            Some(Value::Object(strings)) => Ok(LocaleBundle {
                locale: locale.to_string(),
                strings: Arc::new(strings.clone()),
            }),
            _ => Err(Error::UnknownLocale {
                locale: locale.to_string(),
                available: self.available(),
            }),
        }
    }
}

/// UI strings for one language. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct LocaleBundle {
    locale: String,
    strings: Arc<Map<String, Value>>,
}

impl LocaleBundle {
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Look up a dotted key. Only string leaves are returned.
    pub fn get(&self, key: &str) -> Option<&str> {
        let mut parts = key.split('.');
        let mut node = self.strings.get(parts.next()?)?;
        for part in parts {
            node = node.as_object()?.get(part)?;
        }
        node.as_str()
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::MissingLocaleKey {
            locale: self.locale.clone(),
            key: key.to_string(),
        })
    }

    /// String leaves directly under `section`, e.g. every province name
    /// under `provinces`.
    pub fn section(&self, section: &str) -> Vec<(&str, &str)> {
        self.strings
            .get(section)
            .and_then(Value::as_object)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Active and opposite language bundles for one test run.
#[derive(Debug, Clone)]
pub struct LocaleContext {
    active: LocaleBundle,
    opposite: LocaleBundle,
}

impl LocaleContext {
    /// Load the active bundle and its opposite. `en` pairs with `fr`; every
    /// other locale pairs with `en`.
    pub fn load(table: &LocaleTable, locale: &str) -> Result<Self> {
        let locale = locale.trim().to_lowercase();
        let active = table.bundle(&locale)?;
        let opposite = table.bundle(opposite_locale(&locale))?;
        info!("Locale {} (opposite {})", active.locale(), opposite.locale());
        Ok(Self { active, opposite })
    }

    pub fn active(&self) -> &LocaleBundle {
        &self.active
    }

    pub fn opposite(&self) -> &LocaleBundle {
        &self.opposite
    }

    /// The signup page opens in the default locale; anything else needs a
    /// language toggle first.
    pub fn is_default(&self) -> bool {
        self.active.locale() == DEFAULT_LOCALE
    }
}

fn opposite_locale(locale: &str) -> &'static str {
    if locale == DEFAULT_LOCALE {
        "fr"
    } else {
        DEFAULT_LOCALE
    }
}
