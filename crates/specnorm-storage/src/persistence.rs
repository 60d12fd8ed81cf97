//! JSON-on-disk persistence for both histories.
//!
//! Layout under the root directory:
//!
//! ```text
//!   raw_documents.json   every RawDocument version
//!   snapshots.json       every NormalizedSnapshot
//! ```
//!
//! Files are written to a sibling `.tmp` and renamed into place, so a reader
//! sees either the previous or the new contents.

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::{
    MemoryDocumentStore, MemorySnapshotStore, RawDocumentStore, SnapshotStore,
};

const DOCUMENTS_FILE: &str = "raw_documents.json";
const SNAPSHOTS_FILE: &str = "snapshots.json";

#[derive(Debug, Clone)]
pub struct JsonDirectory {
    root: PathBuf,
}

impl JsonDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn save_documents(&self, store: &dyn RawDocumentStore) -> anyhow::Result<usize> {
        let docs = store.all();
        self.write_json(DOCUMENTS_FILE, &docs)?;
        Ok(docs.len())
    }

    /// Missing file means an empty history.
    pub fn load_documents(&self) -> anyhow::Result<MemoryDocumentStore> {
        let docs = self.read_json(DOCUMENTS_FILE)?.unwrap_or_default();
        Ok(MemoryDocumentStore::from_documents(docs)?)
    }

    pub fn save_snapshots(&self, store: &dyn SnapshotStore) -> anyhow::Result<usize> {
        let snapshots = store.all();
        self.write_json(SNAPSHOTS_FILE, &snapshots)?;
        Ok(snapshots.len())
    }

    pub fn load_snapshots(&self) -> anyhow::Result<MemorySnapshotStore> {
        let snapshots = self.read_json(SNAPSHOTS_FILE)?.unwrap_or_default();
        Ok(MemorySnapshotStore::from_snapshots(snapshots)?)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;
        let path = self.root.join(name);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "saved");
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(value))
    }
}
