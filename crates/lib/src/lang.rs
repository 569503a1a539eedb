//! Translation lookup for the fixed set of user-facing strings.
//!
//! Tables ship in `crates/lib/lang/<code>.json` and are embedded at build time.
//! Config `translations` entries override bundled strings key by key.

use include_dir::{include_dir, Dir};
use std::collections::HashMap;

static BUNDLED_LANGS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/lang");

#[derive(Debug, thiserror::Error)]
pub enum LangError {
    #[error("language '{0}' not found")]
    UnknownLanguage(String),
    #[error("language string '{0}' not found")]
    UnknownKey(String),
    #[error("invalid translation table for '{code}': {source}")]
    Parse {
        code: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Translation table for one language.
#[derive(Debug, Clone)]
pub struct Lang {
    code: String,
    strings: HashMap<String, String>,
}

impl Lang {
    /// Load the bundled table for `code` and apply `overrides` on top.
    pub fn load(code: &str, overrides: &HashMap<String, String>) -> Result<Self, LangError> {
        let file = BUNDLED_LANGS
            .get_file(format!("{}.json", code))
            .ok_or_else(|| LangError::UnknownLanguage(code.to_string()))?;
        let mut strings: HashMap<String, String> =
            serde_json::from_slice(file.contents()).map_err(|source| LangError::Parse {
                code: code.to_string(),
                source,
            })?;
        for (key, value) in overrides {
            strings.insert(key.clone(), value.clone());
        }
        Ok(Self {
            code: code.to_string(),
            strings,
        })
    }

    /// Build a table directly from key/value pairs.
    pub fn from_strings(code: &str, strings: HashMap<String, String>) -> Self {
        Self {
            code: code.to_string(),
            strings,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn has(&self, key: &str) -> bool {
        self.strings.contains_key(key)
    }

    /// Translate `key`, replacing each `$name` placeholder with its value from `params`.
    pub fn translate(&self, key: &str, params: &[(&str, &str)]) -> Result<String, LangError> {
        let mut text = self
            .strings
            .get(key)
            .cloned()
            .ok_or_else(|| LangError::UnknownKey(key.to_string()))?;
        for (name, value) in params {
            text = text.replace(&format!("${}", name), value);
        }
        Ok(text)
    }

    /// Translate `label` when it is a known key; otherwise return it unchanged.
    /// Bot-provided option labels are usually display text, not keys.
    pub fn label(&self, label: &str) -> String {
        self.strings
            .get(label)
            .cloned()
            .unwrap_or_else(|| label.to_string())
    }
}

/// Language codes with a bundled table.
pub fn bundled_languages() -> Vec<String> {
    BUNDLED_LANGS
        .files()
        .filter_map(|f| {
            let path = f.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            } else {
                None
            }
        })
        .collect()
}
