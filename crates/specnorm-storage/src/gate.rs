//! Content-hash dedup in front of extraction.
//!
//! The fingerprint is computed over the raw bytes before anything is parsed;
//! a payload the store has already seen for its source never reaches the
//! extractor.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use specnorm_core::{ContentKind, Extraction, Fingerprint, RawDocument, SourceId};

use crate::{InsertOutcome, RawDocumentStore};

/// A payload handed over by the (external) crawler.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub source: SourceId,
    pub kind: ContentKind,
    pub bytes: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    /// Refetch was forced by the caller. Identical bytes still dedup.
    pub force_refresh: bool,
}

impl FetchedContent {
    pub fn new(source: SourceId, kind: ContentKind, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source,
            kind,
            bytes: bytes.into(),
            fetched_at: Utc::now(),
            force_refresh: false,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdmitOutcome {
    /// First version of this source.
    New(RawDocument),
    /// A new version; `superseded` is the version it replaces as latest.
    Updated {
        document: RawDocument,
        superseded: u32,
    },
    /// Bytes already stored for this source; nothing was extracted.
    Unchanged(RawDocument),
}

impl AdmitOutcome {
    pub fn document(&self) -> &RawDocument {
        match self {
            AdmitOutcome::New(d) | AdmitOutcome::Unchanged(d) => d,
            AdmitOutcome::Updated { document, .. } => document,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, AdmitOutcome::Unchanged(_))
    }
}

pub struct DedupGate {
    store: Arc<dyn RawDocumentStore>,
}

impl DedupGate {
    pub fn new(store: Arc<dyn RawDocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RawDocumentStore> {
        &self.store
    }

    /// Store `fetched` as a new document version unless its bytes are already
    /// the current version of the source. `extract` runs only on a change.
    pub fn admit<F>(&self, fetched: &FetchedContent, extract: F) -> AdmitOutcome
    where
        F: FnOnce(ContentKind, &[u8]) -> Extraction,
    {
        let fingerprint = fetched.fingerprint();

        if let Some(existing) = self.store.find(&fetched.source, &fingerprint) {
            tracing::debug!(
                source = %fetched.source,
                version = existing.version,
                forced = fetched.force_refresh,
                "content unchanged, extraction skipped"
            );
            return AdmitOutcome::Unchanged(existing);
        }

        let extraction = extract(fetched.kind, &fetched.bytes);
        for warning in &extraction.warnings {
            tracing::warn!(source = %fetched.source, warning = %warning, "extraction warning");
        }

        // version is assigned by the store at commit
        let candidate = RawDocument::from_extraction(
            fetched.source.clone(),
            0,
            fetched.kind,
            fingerprint,
            fetched.fetched_at,
            extraction,
        );

        match self.store.insert_if_absent(candidate) {
            InsertOutcome::Inserted(document) if document.version == 1 => {
                tracing::info!(source = %document.source, "new document");
                AdmitOutcome::New(document)
            }
            InsertOutcome::Inserted(document) => {
                let superseded = document.version - 1;
                tracing::info!(
                    source = %document.source,
                    version = document.version,
                    "document changed"
                );
                AdmitOutcome::Updated {
                    document,
                    superseded,
                }
            }
            InsertOutcome::AlreadyPresent(existing) => {
                tracing::debug!(
                    source = %existing.source,
                    version = existing.version,
                    "concurrent fetch committed the same content first"
                );
                AdmitOutcome::Unchanged(existing)
            }
        }
    }
}
