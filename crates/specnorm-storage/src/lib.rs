//! specnorm storage
//!
//! Two append-only histories, both behind traits so callers can inject an
//! in-memory double or a persistent implementation:
//!
//! ```text
//!   fetched bytes ──► DedupGate ──► RawDocumentStore   (source → versions)
//!                        │  fingerprint check-and-set
//!                        ▼
//!                   extraction (only for unseen content)
//!
//!   orchestrator ──► SnapshotStore                     (product → snapshots)
//! ```
//!
//! Nothing here is ever mutated in place: a changed document is a new version,
//! a changed canonical record is a new snapshot.

pub mod gate;
pub mod persistence;

#[cfg(test)]
mod tests;

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use specnorm_core::{Fingerprint, NormalizedSnapshot, ProductKey, RawDocument, SourceId};

pub use gate::{AdmitOutcome, DedupGate, FetchedContent};
pub use persistence::JsonDirectory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot {id} is already stored")]
    DuplicateSnapshot { id: String },

    // not named `source`: thiserror would treat it as the error cause
    #[error("restored history for {origin} has version {found}, expected {expected}")]
    VersionGap {
        origin: SourceId,
        found: u32,
        expected: u32,
    },
}

// ============================================================================
// Raw documents
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// Stored with its assigned version.
    Inserted(RawDocument),
    /// A document with this fingerprint was already committed for the source.
    AlreadyPresent(RawDocument),
}

/// Append-only raw document history keyed by source.
pub trait RawDocumentStore: Send + Sync {
    /// The current version of `source` if it has exactly this fingerprint.
    /// Older versions never match: content reverting to earlier bytes is a change.
    fn find(&self, source: &SourceId, fingerprint: &Fingerprint) -> Option<RawDocument>;

    /// Atomic check-and-set against the current version of the source. The
    /// store assigns the version; the first committer wins and later ones get
    /// `AlreadyPresent`.
    fn insert_if_absent(&self, document: RawDocument) -> InsertOutcome;

    fn latest(&self, source: &SourceId) -> Option<RawDocument>;

    /// All versions, oldest first.
    fn versions(&self, source: &SourceId) -> Vec<RawDocument>;

    /// Latest version of every source of `product`.
    fn documents_for_product(&self, product: &str) -> Vec<RawDocument>;

    fn products(&self) -> Vec<String>;

    /// Every stored version of every source.
    fn all(&self) -> Vec<RawDocument>;
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    by_source: DashMap<SourceId, Vec<RawDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a saved history. Versions must be contiguous per source.
    pub fn from_documents(documents: Vec<RawDocument>) -> Result<Self, StoreError> {
        let mut grouped: BTreeMap<SourceId, Vec<RawDocument>> = BTreeMap::new();
        for doc in documents {
            grouped.entry(doc.source.clone()).or_default().push(doc);
        }

        let store = Self::new();
        for (source, mut versions) in grouped {
            versions.sort_by_key(|d| d.version);
            for (i, doc) in versions.iter().enumerate() {
                let expected = i as u32 + 1;
                if doc.version != expected {
                    return Err(StoreError::VersionGap {
                        origin: source,
                        found: doc.version,
                        expected,
                    });
                }
            }
            store.by_source.insert(source, versions);
        }
        Ok(store)
    }
}

impl RawDocumentStore for MemoryDocumentStore {
    fn find(&self, source: &SourceId, fingerprint: &Fingerprint) -> Option<RawDocument> {
        self.by_source
            .get(source)?
            .last()
            .filter(|d| &d.fingerprint == fingerprint)
            .cloned()
    }

    fn insert_if_absent(&self, mut document: RawDocument) -> InsertOutcome {
        // the entry guard holds the shard lock for this source
        let mut versions = self.by_source.entry(document.source.clone()).or_default();
        if let Some(existing) = versions
            .last()
            .filter(|d| d.fingerprint == document.fingerprint)
        {
            return InsertOutcome::AlreadyPresent(existing.clone());
        }
        document.version = versions.len() as u32 + 1;
        versions.push(document.clone());
        InsertOutcome::Inserted(document)
    }

    fn latest(&self, source: &SourceId) -> Option<RawDocument> {
        self.by_source.get(source)?.last().cloned()
    }

    fn versions(&self, source: &SourceId) -> Vec<RawDocument> {
        self.by_source
            .get(source)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    fn documents_for_product(&self, product: &str) -> Vec<RawDocument> {
        let mut docs: Vec<RawDocument> = self
            .by_source
            .iter()
            .filter(|e| e.key().product == product)
            .filter_map(|e| e.value().last().cloned())
            .collect();
        docs.sort_by(|a, b| a.source.cmp(&b.source));
        docs
    }

    fn products(&self) -> Vec<String> {
        let products: BTreeSet<String> = self
            .by_source
            .iter()
            .map(|e| e.key().product.clone())
            .collect();
        products.into_iter().collect()
    }

    fn all(&self) -> Vec<RawDocument> {
        let mut docs: Vec<RawDocument> = self
            .by_source
            .iter()
            .flat_map(|e| e.value().clone())
            .collect();
        docs.sort_by(|a, b| (&a.source, a.version).cmp(&(&b.source, b.version)));
        docs
    }
}

// ============================================================================
// Snapshots
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The latest snapshot was built from the same merged input.
    Unchanged,
}

/// Append-only canonical snapshot history keyed by product.
pub trait SnapshotStore: Send + Sync {
    fn append(&self, snapshot: NormalizedSnapshot) -> Result<(), StoreError>;

    /// Append unless the product's latest snapshot has the same input fingerprint.
    fn append_if_changed(&self, snapshot: NormalizedSnapshot) -> Result<AppendOutcome, StoreError>;

    fn latest(&self, product: &ProductKey) -> Option<NormalizedSnapshot>;

    /// Oldest first.
    fn history(&self, product: &ProductKey) -> Vec<NormalizedSnapshot>;

    fn all(&self) -> Vec<NormalizedSnapshot>;
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: RwLock<BTreeMap<ProductKey, Vec<NormalizedSnapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshots(snapshots: Vec<NormalizedSnapshot>) -> Result<Self, StoreError> {
        let store = Self::new();
        let mut sorted = snapshots;
        sorted.sort_by_key(|s| s.taken_at);
        for snapshot in sorted {
            store.append(snapshot)?;
        }
        Ok(store)
    }

    fn push(
        map: &mut BTreeMap<ProductKey, Vec<NormalizedSnapshot>>,
        snapshot: NormalizedSnapshot,
    ) -> Result<(), StoreError> {
        let history = map.entry(snapshot.product.clone()).or_default();
        if history.iter().any(|s| s.id == snapshot.id) {
            return Err(StoreError::DuplicateSnapshot {
                id: snapshot.id.to_string(),
            });
        }
        history.push(snapshot);
        Ok(())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn append(&self, snapshot: NormalizedSnapshot) -> Result<(), StoreError> {
        Self::push(&mut self.inner.write(), snapshot)
    }

    fn append_if_changed(&self, snapshot: NormalizedSnapshot) -> Result<AppendOutcome, StoreError> {
        let mut inner = self.inner.write();
        let unchanged = inner
            .get(&snapshot.product)
            .and_then(|h| h.last())
            .is_some_and(|last| last.input_fingerprint == snapshot.input_fingerprint);
        if unchanged {
            return Ok(AppendOutcome::Unchanged);
        }
        Self::push(&mut inner, snapshot)?;
        Ok(AppendOutcome::Appended)
    }

    fn latest(&self, product: &ProductKey) -> Option<NormalizedSnapshot> {
        self.inner.read().get(product)?.last().cloned()
    }

    fn history(&self, product: &ProductKey) -> Vec<NormalizedSnapshot> {
        self.inner.read().get(product).cloned().unwrap_or_default()
    }

    fn all(&self) -> Vec<NormalizedSnapshot> {
        self.inner.read().values().flatten().cloned().collect()
    }
}
