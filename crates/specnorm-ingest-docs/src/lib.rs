//! Document extraction for specnorm
//!
//! Turns already-fetched bytes into a raw spec map:
//! - Markup pages: tables (with merged cells expanded), definition lists,
//!   and `key: value` lines in the visible text as a last resort
//! - Document text (PDF-derived): pipe tables and `key: value` lines
//! - Concatenated family blobs: split into per-model records
//!
//! **Untrusted boundary**: everything here parses vendor content; a part that
//! cannot be read contributes nothing and a warning, never an error.

use specnorm_core::{ContentKind, Extraction, RawSpecMap};

pub mod markup;
pub mod models;
pub mod table;
pub mod text;

pub use markup::{read_markup, MarkupReading};
pub use models::{clean_model_token, ModelExtractor, ModelGroup};
pub use table::{SpecTable, TableError, TableExtractor, TableLayout, TableReading, TablesSummary};
pub use text::{read_text, split_key_value, TextReading};

/// Full document extraction: tables, pairs, model families.
#[derive(Default)]
pub struct DocumentExtractor {
    tables: TableExtractor,
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract(&self, kind: ContentKind, content: &str) -> Extraction {
        let (tables, pairs, text) = match kind {
            ContentKind::Markup => {
                let r = read_markup(content);
                (r.tables, r.definitions, r.text)
            }
            ContentKind::DocumentText => {
                let r = read_text(content);
                (r.tables, r.pairs, content.to_string())
            }
        };

        let summary = self.tables.read_all(&tables);

        // pairs first; structured tables override them per key
        let mut raw_specs = RawSpecMap::new();
        for (key, value) in &pairs {
            raw_specs.insert(key, value.as_str());
        }
        raw_specs.merge_from(&summary.specs);

        if kind == ContentKind::Markup && raw_specs.is_empty() {
            for (key, value) in text.lines().filter_map(split_key_value) {
                raw_specs.insert(&key, value);
            }
        }

        let mut models = summary.models;
        for (model, specs) in ModelExtractor::standard().extract(&raw_specs, &text) {
            models.entry(model).or_default().merge_from(&specs);
        }

        tracing::debug!(
            kind = ?kind,
            tables = tables.len(),
            cells = summary.cells,
            keys = raw_specs.len(),
            models = models.len(),
            "document extracted"
        );

        Extraction {
            raw_specs,
            models,
            text,
            warnings: summary.warnings,
        }
    }
}

/// Decode `bytes` (lossily, as UTF-8) and extract.
pub fn extract_document(kind: ContentKind, bytes: &[u8]) -> Extraction {
    let content = String::from_utf8_lossy(bytes);
    DocumentExtractor::new().extract(kind, &content)
}
