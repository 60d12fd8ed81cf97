//! Records produced and consumed by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::cleaner::clean_key;
use crate::digest::Fingerprint;
use crate::schema::{CanonicalField, Unit};

// ============================================================================
// Identity
// ============================================================================

/// Where a document came from: the product it describes plus its URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId {
    pub product: String,
    pub url: String,
}

impl SourceId {
    pub fn new(product: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.product, self.url)
    }
}

/// A product, or a model split out of a product family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    pub product: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProductKey {
    pub fn family(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            model: None,
        }
    }

    pub fn model(product: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            model: Some(model.into()),
        }
    }

    pub fn is_model(&self) -> bool {
        self.model.is_some()
    }
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(m) => write!(f, "{}/{}", self.product, m),
            None => f.write_str(&self.product),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Rendered page markup (HTML).
    Markup,
    /// Text (and pipe tables) derived from a PDF or similar.
    DocumentText,
}

// ============================================================================
// Raw specs
// ============================================================================

/// One raw value, or several when a key carried more than one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Single(String),
    Multi(Vec<String>),
}

impl RawValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            RawValue::Single(v) => vec![v.as_str()],
            RawValue::Multi(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawValue::Single(_) => 1,
            RawValue::Multi(vs) => vs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add another value for the same key.
    pub fn push(&mut self, value: String) {
        match self {
            RawValue::Single(first) => {
                let first = std::mem::take(first);
                *self = RawValue::Multi(vec![first, value]);
            }
            RawValue::Multi(vs) => vs.push(value),
        }
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Single(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Single(v)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.values().join(" | "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSpecEntry {
    /// Key as the vendor wrote it.
    pub original_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_hint: Option<Unit>,
    pub value: RawValue,
}

/// Cleaned key → raw value(s). Keys are cleaned on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSpecMap(BTreeMap<String, RawSpecEntry>);

impl RawSpecMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the cleaned form of `raw_key`; a later insert replaces.
    pub fn insert(&mut self, raw_key: &str, value: impl Into<RawValue>) {
        let key = clean_key(raw_key);
        self.0.insert(
            key.cleaned,
            RawSpecEntry {
                original_key: key.original,
                unit_hint: key.unit_hint,
                value: value.into(),
            },
        );
    }

    /// Add a value, turning an existing entry into a list.
    pub fn append(&mut self, raw_key: &str, value: String) {
        let key = clean_key(raw_key);
        match self.0.get_mut(&key.cleaned) {
            Some(entry) => entry.value.push(value),
            None => {
                self.0.insert(
                    key.cleaned,
                    RawSpecEntry {
                        original_key: key.original,
                        unit_hint: key.unit_hint,
                        value: RawValue::Single(value),
                    },
                );
            }
        }
    }

    /// Overlay `other` on top of `self`, per key.
    pub fn merge_from(&mut self, other: &RawSpecMap) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn get(&self, cleaned: &str) -> Option<&RawSpecEntry> {
        self.0.get(cleaned)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawSpecEntry)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `original key → display value`, as shown to the fallback oracle.
    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        self.0
            .values()
            .map(|e| (e.original_key.clone(), e.value.to_string()))
            .collect()
    }
}

/// A non-empty table cell, addressed by its true grid position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecCell {
    pub row: usize,
    pub col: usize,
    /// Flattened header of column `col`.
    pub header: String,
    pub text: String,
}

/// One SKU split out of a family document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model: String,
    pub source: SourceId,
    pub raw_specs: RawSpecMap,
}

/// A fetched document after extraction. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    pub source: SourceId,
    /// 1-based; a new version is created only when the fingerprint changes.
    pub version: u32,
    pub kind: ContentKind,
    pub fingerprint: Fingerprint,
    pub fetched_at: DateTime<Utc>,
    pub raw_specs: RawSpecMap,
    #[serde(default)]
    pub models: BTreeMap<String, ModelRecord>,
    /// Visible text, handed to the fallback oracle as an excerpt.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// What document-level extraction produced for one payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub raw_specs: RawSpecMap,
    /// Model token → that model's raw specs.
    pub models: BTreeMap<String, RawSpecMap>,
    pub text: String,
    pub warnings: Vec<String>,
}

impl RawDocument {
    pub fn from_extraction(
        source: SourceId,
        version: u32,
        kind: ContentKind,
        fingerprint: Fingerprint,
        fetched_at: DateTime<Utc>,
        extraction: Extraction,
    ) -> Self {
        let models = extraction
            .models
            .into_iter()
            .map(|(model, raw_specs)| {
                let record = ModelRecord {
                    model: model.clone(),
                    source: source.clone(),
                    raw_specs,
                };
                (model, record)
            })
            .collect();
        Self {
            source,
            version,
            kind,
            fingerprint,
            fetched_at,
            raw_specs: extraction.raw_specs,
            models,
            text: extraction.text,
            warnings: extraction.warnings,
        }
    }
}

// ============================================================================
// Canonical records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Numeric(f64),
    Boolean(bool),
    Text(String),
}

impl CanonicalValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CanonicalValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CanonicalValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CanonicalValue::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CanonicalValue::Numeric(_) => "number",
            CanonicalValue::Boolean(_) => "boolean",
            CanonicalValue::Text(_) => "string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Heuristic,
    Fallback,
    Unset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: CanonicalValue,
    pub provenance: Provenance,
    /// Raw text the value was read from (heuristic values only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbatim: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
}

/// A value whose type does not match the field's declared domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} holds {expected} values, got a {found}")]
pub struct DomainMismatch {
    pub field: CanonicalField,
    pub expected: &'static str,
    pub found: &'static str,
}

/// One typed value per canonical field; absent fields are unset. Every stored
/// value matches its field's domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSpec {
    fields: BTreeMap<CanonicalField, FieldValue>,
}

impl CanonicalSpec {
    pub fn get(&self, field: CanonicalField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn value(&self, field: CanonicalField) -> Option<&CanonicalValue> {
        self.fields.get(&field).map(|f| &f.value)
    }

    pub fn provenance(&self, field: CanonicalField) -> Provenance {
        self.fields
            .get(&field)
            .map_or(Provenance::Unset, |f| f.provenance)
    }

    pub fn is_set(&self, field: CanonicalField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn populated(&self) -> usize {
        self.fields.len()
    }

    pub fn unset_fields(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| !self.is_set(*f))
            .collect()
    }

    pub fn set(&mut self, field: CanonicalField, value: FieldValue) -> Result<(), DomainMismatch> {
        check_domain(field, &value.value)?;
        self.fields.insert(field, value);
        Ok(())
    }

    /// Store `value` only if `field` is still unset. Returns whether it was stored.
    pub fn fill_unset(
        &mut self,
        field: CanonicalField,
        value: FieldValue,
    ) -> Result<bool, DomainMismatch> {
        check_domain(field, &value.value)?;
        if self.is_set(field) {
            return Ok(false);
        }
        self.fields.insert(field, value);
        Ok(true)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalField, &FieldValue)> {
        self.fields.iter()
    }
}

fn check_domain(field: CanonicalField, value: &CanonicalValue) -> Result<(), DomainMismatch> {
    let expected = field.domain().type_name();
    if value.type_name() == expected {
        Ok(())
    } else {
        Err(DomainMismatch {
            field,
            expected,
            found: value.type_name(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualReason {
    /// No alias matched the cleaned key.
    Unmapped,
    /// Mapped, but the value has no shape usable for the field's domain.
    ParseFailure,
    /// Mapped and numeric, but the unit belongs to another dimension.
    UnitMismatch,
    /// Mapped, but the active parse policy leaves this shape uncanonicalized.
    Withheld,
    /// Mapped and parsed; the key carried further values kept here.
    AdditionalValues,
    /// Mapped to a field another key already populated.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualEntry {
    pub original_key: String,
    pub value: RawValue,
    pub reason: ResidualReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_field: Option<CanonicalField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FallbackStatus {
    /// Heuristic coverage met the threshold.
    NotNeeded,
    /// Coverage was low but no oracle is configured.
    Disabled,
    Applied { filled: usize },
    Unavailable { reason: String },
}

/// The document version a snapshot was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: SourceId,
    pub version: u32,
    pub fingerprint: Fingerprint,
}

/// Point-in-time canonical record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSnapshot {
    pub id: Uuid,
    pub product: ProductKey,
    pub taken_at: DateTime<Utc>,
    pub spec: CanonicalSpec,
    /// Cleaned key → residual pair.
    pub vendor_fields: BTreeMap<String, ResidualEntry>,
    pub source_documents: Vec<SourceRef>,
    /// Fingerprint of the merged raw spec map this snapshot was built from.
    pub input_fingerprint: Fingerprint,
    pub fallback: FallbackStatus,
}
