//! Content fingerprints (versioned).
//!
//! A fingerprint identifies the exact bytes a document (or a merged raw spec
//! set) was derived from. The dedup gate compares fingerprints before any
//! extraction work happens, so the encoding must be stable across releases:
//!
//! - algorithm: **SHA-256**
//! - input: the raw bytes as fetched (never the decoded text)
//! - output: `"sha256:<64 lowercase hex digits>"`

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix used in serialized fingerprints.
pub const FINGERPRINT_V1_PREFIX: &str = "sha256:";

/// A stable content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest arbitrary bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = String::with_capacity(FINGERPRINT_V1_PREFIX.len() + 64);
        out.push_str(FINGERPRINT_V1_PREFIX);
        for b in digest.iter() {
            out.push_str(&format!("{b:02x}"));
        }
        Self(out)
    }

    /// Digest the canonical JSON encoding of a value.
    ///
    /// Only meaningful for values with deterministic serialization
    /// (`BTreeMap`-backed maps, no floats produced from parsing).
    pub fn of_json<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::of(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex portion without the algorithm prefix.
    pub fn hex(&self) -> &str {
        self.0
            .strip_prefix(FINGERPRINT_V1_PREFIX)
            .unwrap_or(self.0.as_str())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
