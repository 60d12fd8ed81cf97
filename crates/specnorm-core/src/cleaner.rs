//! Raw field-name cleaning.
//!
//! `"Wavelength (nm) 1"` → `"wavelength"` (unit hint: nm). The original key is
//! carried alongside so residual storage can always show what the vendor wrote.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::schema::Unit;

/// A cleaned key plus everything the cleaner learned from the raw one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedKey {
    /// Case-folded, footnote-free, whitespace-collapsed key used for lookup.
    pub cleaned: String,
    /// The key exactly as extracted.
    pub original: String,
    /// Unit named in a stripped parenthetical, e.g. `(nm)`.
    pub unit_hint: Option<Unit>,
}

pub struct SpecNameCleaner {
    bracketed: Regex,
    footnote_symbols: Regex,
    superscript_marker: Regex,
    embedded_marker: Regex,
    trailing_marker: Regex,
    whitespace: Regex,
}

impl SpecNameCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bracketed: Regex::new(r"[\(\[]([^\)\]]*)[\)\]]")?,
            footnote_symbols: Regex::new(r"[*†‡§¶#]+")?,
            superscript_marker: Regex::new(r"([A-Za-z]{2,})[¹²³⁴⁵⁶⁷⁸⁹⁰]+")?,
            embedded_marker: Regex::new(r"\b([A-Za-z]{3,})\d\b")?,
            trailing_marker: Regex::new(r"\s+\d{1,2}$")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    pub fn standard() -> &'static SpecNameCleaner {
        static CLEANER: OnceLock<SpecNameCleaner> = OnceLock::new();
        CLEANER.get_or_init(|| SpecNameCleaner::new().expect("built-in cleaner patterns are valid"))
    }

    pub fn clean(&self, raw: &str) -> CleanedKey {
        let original = raw.to_string();
        let text = raw.replace(['\u{a0}', '\u{202f}'], " ");

        let mut unit_hint = None;
        for caps in self.bracketed.captures_iter(&text) {
            if unit_hint.is_some() {
                break;
            }
            let inner = caps.get(1).map_or("", |m| m.as_str()).trim();
            let inner = inner.strip_prefix("in ").unwrap_or(inner);
            unit_hint = Unit::parse(inner);
        }

        let text = self.bracketed.replace_all(&text, " ");
        let text = self.footnote_symbols.replace_all(&text, "");
        let text = self.superscript_marker.replace_all(&text, "$1");
        let text = self.embedded_marker.replace_all(&text, "$1");
        let mut text = self.whitespace.replace_all(text.trim(), " ").into_owned();
        // "Power 1 2" style stacked markers
        while self.trailing_marker.is_match(&text) {
            text = self.trailing_marker.replace(&text, "").into_owned();
        }
        let text = text
            .trim_end_matches(|c: char| c == ':' || c.is_whitespace())
            .to_lowercase();

        let cleaned = if text.is_empty() {
            self.whitespace
                .replace_all(original.trim(), " ")
                .to_lowercase()
        } else {
            text
        };

        CleanedKey {
            cleaned,
            original,
            unit_hint,
        }
    }
}

/// Clean with the process-wide cleaner.
pub fn clean_key(raw: &str) -> CleanedKey {
    SpecNameCleaner::standard().clean(raw)
}
