//! specnorm core: canonical schema, value shapes, key cleaning and mapping.
//!
//! ```text
//!   raw key ──► SpecNameCleaner ──► CanonicalMapper ──► CanonicalField
//!                                                          │
//!   raw value ─────────────────► ValueParser ◄── PatternLibrary
//!                                     │
//!                                     ▼
//!                         CanonicalValue | residual entry
//! ```
//!
//! Everything here is pure and synchronous; storage, extraction and the
//! fallback oracle live in the sibling crates.

pub mod cleaner;
pub mod digest;
pub mod mapper;
pub mod model;
pub mod patterns;
pub mod schema;
pub mod value_parser;

pub use cleaner::{clean_key, CleanedKey, SpecNameCleaner};
pub use digest::Fingerprint;
pub use mapper::{AliasConfigError, AliasMatch, AliasTable, CanonicalMapper, MappedKey};
pub use model::*;
pub use patterns::{Comparator, PatternLibrary, Quantity, Recognized, ShapeTag, ValueShape};
pub use schema::{CanonicalField, Dimension, FieldDescriptor, FieldDomain, TextForm, Unit};
pub use value_parser::{
    InequalityPolicy, ParsePolicy, ParsedValue, RangePolicy, ValueParseError, ValueParser,
};
