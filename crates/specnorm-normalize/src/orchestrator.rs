//! NormalizationOrchestrator: stored raw documents → canonical snapshots.
//!
//! Per product key:
//!
//! ```text
//!   latest document per source ──► merge (older first, later wins per key)
//!          │                            │
//!          │                  models overlay the family map
//!          ▼                            ▼
//!     excerpts (≤ N)           HeuristicPass ── populated < threshold? ──► FallbackAdapter
//!                                       │                                  (fills unset only)
//!                                       ▼
//!                           NormalizedSnapshot ──► SnapshotStore::append_if_changed
//! ```
//!
//! A product either gets one complete snapshot or none; fallback failure only
//! downgrades the snapshot to heuristic-only.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use specnorm_core::{
    CanonicalMapper, FallbackStatus, FieldValue, Fingerprint, NormalizedSnapshot, ProductKey,
    Provenance, RawDocument, RawSpecMap, SourceRef,
};
use specnorm_storage::{AppendOutcome, RawDocumentStore, SnapshotStore, StoreError};

use crate::config::NormalizeConfig;
use crate::fallback::{FallbackAdapter, FallbackRequest};
use crate::heuristic::{HeuristicPass, HeuristicResult};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("no stored documents for {0}")]
    NoDocuments(ProductKey),

    #[error("fingerprinting merged input for {product}: {message}")]
    Fingerprint { product: ProductKey, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("product worker for {product} failed: {message}")]
    Worker { product: String, message: String },
}

/// The merged raw input for one product key.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedInput {
    pub key: ProductKey,
    pub raw_specs: RawSpecMap,
    pub sources: Vec<SourceRef>,
    /// Most recent first, each capped.
    pub excerpts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyOutcome {
    pub key: ProductKey,
    pub append: AppendOutcome,
    /// The snapshot now latest for the key.
    pub snapshot: NormalizedSnapshot,
    pub fallback_invoked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub products: usize,
    pub keys: usize,
    pub snapshots_written: usize,
    pub unchanged: usize,
    pub fallback_invocations: usize,
    pub fallback_failures: usize,
    /// Product → error message.
    pub errors: Vec<(String, String)>,
}

impl BatchReport {
    fn record(&mut self, outcome: &KeyOutcome) {
        self.keys += 1;
        match outcome.append {
            AppendOutcome::Appended => self.snapshots_written += 1,
            AppendOutcome::Unchanged => self.unchanged += 1,
        }
        if outcome.fallback_invoked {
            self.fallback_invocations += 1;
            if matches!(outcome.snapshot.fallback, FallbackStatus::Unavailable { .. }) {
                self.fallback_failures += 1;
            }
        }
    }
}

pub struct NormalizationOrchestrator {
    documents: Arc<dyn RawDocumentStore>,
    snapshots: Arc<dyn SnapshotStore>,
    heuristic: HeuristicPass,
    fallback: Option<FallbackAdapter>,
    config: NormalizeConfig,
}

impl NormalizationOrchestrator {
    pub fn new(
        documents: Arc<dyn RawDocumentStore>,
        snapshots: Arc<dyn SnapshotStore>,
        config: NormalizeConfig,
    ) -> Self {
        Self {
            documents,
            snapshots,
            heuristic: HeuristicPass::new(CanonicalMapper::default(), config.parse_policy),
            fallback: None,
            config,
        }
    }

    pub fn with_fallback(mut self, adapter: FallbackAdapter) -> Self {
        self.fallback = Some(adapter);
        self
    }

    pub fn with_mapper(mut self, mapper: CanonicalMapper) -> Self {
        self.heuristic = HeuristicPass::new(mapper, self.config.parse_policy);
        self
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    /// The family key plus one key per model found in any of its documents.
    pub fn product_keys(&self, product: &str) -> Vec<ProductKey> {
        let docs = self.documents.documents_for_product(product);
        if docs.is_empty() {
            return Vec::new();
        }
        let models: BTreeSet<&String> = docs.iter().flat_map(|d| d.models.keys()).collect();
        std::iter::once(ProductKey::family(product))
            .chain(models.into_iter().map(|m| ProductKey::model(product, m.as_str())))
            .collect()
    }

    /// Merge the latest version of every source of `key`'s product.
    pub fn merged_input(&self, key: &ProductKey) -> Option<MergedInput> {
        let mut docs = self.documents.documents_for_product(&key.product);
        if docs.is_empty() {
            return None;
        }
        docs.sort_by(|a, b| {
            a.fetched_at
                .cmp(&b.fetched_at)
                .then_with(|| a.source.cmp(&b.source))
        });

        let mut raw_specs = RawSpecMap::new();
        for doc in &docs {
            raw_specs.merge_from(&doc.raw_specs);
        }
        if let Some(model) = &key.model {
            for doc in &docs {
                if let Some(record) = doc.models.get(model) {
                    raw_specs.merge_from(&record.raw_specs);
                }
            }
        }

        let sources = docs
            .iter()
            .map(|d| SourceRef {
                source: d.source.clone(),
                version: d.version,
                fingerprint: d.fingerprint.clone(),
            })
            .collect();

        Some(MergedInput {
            key: key.clone(),
            raw_specs,
            sources,
            excerpts: self.excerpts(&docs),
        })
    }

    fn excerpts(&self, docs_oldest_first: &[RawDocument]) -> Vec<String> {
        docs_oldest_first
            .iter()
            .rev()
            .filter(|d| !d.text.trim().is_empty())
            .take(self.config.max_excerpts)
            .map(|d| d.text.chars().take(self.config.excerpt_chars).collect())
            .collect()
    }

    /// Normalize one product key and append its snapshot if the input changed.
    pub async fn normalize_key(&self, key: &ProductKey) -> Result<KeyOutcome, NormalizeError> {
        let input = self
            .merged_input(key)
            .ok_or_else(|| NormalizeError::NoDocuments(key.clone()))?;
        let input_fingerprint =
            Fingerprint::of_json(&input.raw_specs).map_err(|e| NormalizeError::Fingerprint {
                product: key.clone(),
                message: e.to_string(),
            })?;

        if let Some(latest) = self.snapshots.latest(key) {
            if latest.input_fingerprint == input_fingerprint {
                tracing::debug!(product = %key, "merged input unchanged, snapshot kept");
                return Ok(KeyOutcome {
                    key: key.clone(),
                    append: AppendOutcome::Unchanged,
                    snapshot: latest,
                    fallback_invoked: false,
                });
            }
        }

        let HeuristicResult {
            mut spec,
            vendor_fields,
        } = self.heuristic.run(&input.raw_specs);
        let populated = spec.populated();

        let mut fallback_invoked = false;
        let fallback = if populated >= self.config.critical_threshold {
            FallbackStatus::NotNeeded
        } else if let Some(adapter) = &self.fallback {
            fallback_invoked = true;
            let request = FallbackRequest::new(key.clone(), &input.raw_specs, input.excerpts.clone());
            match adapter.fill(&request).await {
                Ok(values) => {
                    let mut filled = 0;
                    for (field, value) in values {
                        let candidate = FieldValue {
                            value,
                            provenance: Provenance::Fallback,
                            verbatim: None,
                            source_key: None,
                        };
                        match spec.fill_unset(field, candidate) {
                            Ok(true) => filled += 1,
                            Ok(false) => {}
                            Err(e) => {
                                tracing::warn!(product = %key, error = %e, "fallback value dropped")
                            }
                        }
                    }
                    tracing::info!(product = %key, populated, filled, "fallback applied");
                    FallbackStatus::Applied { filled }
                }
                Err(e) => {
                    tracing::warn!(
                        product = %key,
                        oracle = adapter.oracle_name(),
                        error = %e,
                        "fallback unavailable, keeping heuristic result"
                    );
                    FallbackStatus::Unavailable {
                        reason: e.to_string(),
                    }
                }
            }
        } else {
            FallbackStatus::Disabled
        };

        let snapshot = NormalizedSnapshot {
            id: Uuid::new_v4(),
            product: key.clone(),
            taken_at: Utc::now(),
            spec,
            vendor_fields,
            source_documents: input.sources,
            input_fingerprint,
            fallback,
        };

        let append = self.snapshots.append_if_changed(snapshot.clone())?;
        let snapshot = match append {
            AppendOutcome::Appended => snapshot,
            // a concurrent run for the same key got there first
            AppendOutcome::Unchanged => self.snapshots.latest(key).unwrap_or(snapshot),
        };

        Ok(KeyOutcome {
            key: key.clone(),
            append,
            snapshot,
            fallback_invoked,
        })
    }

    /// Normalize the family and every model of `product`.
    pub async fn normalize_product(&self, product: &str) -> Result<Vec<KeyOutcome>, NormalizeError> {
        let keys = self.product_keys(product);
        if keys.is_empty() {
            return Err(NormalizeError::NoDocuments(ProductKey::family(product)));
        }
        let mut outcomes = Vec::with_capacity(keys.len());
        for key in &keys {
            outcomes.push(self.normalize_key(key).await?);
        }
        Ok(outcomes)
    }

    /// Normalize every stored product on a bounded worker pool. A failing
    /// product is reported, never fatal to the batch.
    pub async fn normalize_all(self: &Arc<Self>) -> BatchReport {
        let workers = Arc::new(Semaphore::new(self.config.product_workers.max(1)));
        let mut tasks = JoinSet::new();

        for product in self.documents.products() {
            let this = Arc::clone(self);
            let workers = Arc::clone(&workers);
            tasks.spawn(async move {
                let result = match workers.acquire_owned().await {
                    Ok(_permit) => this.normalize_product(&product).await,
                    Err(e) => Err(NormalizeError::Worker {
                        product: product.clone(),
                        message: e.to_string(),
                    }),
                };
                (product, result)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            report.products += 1;
            match joined {
                Ok((_, Ok(outcomes))) => outcomes.iter().for_each(|o| report.record(o)),
                Ok((product, Err(e))) => {
                    tracing::warn!(product = %product, error = %e, "product normalization failed");
                    report.errors.push((product, e.to_string()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "product worker panicked");
                    report.errors.push((String::new(), e.to_string()));
                }
            }
        }
        report.errors.sort();

        tracing::info!(
            products = report.products,
            written = report.snapshots_written,
            unchanged = report.unchanged,
            fallback_invocations = report.fallback_invocations,
            fallback_failures = report.fallback_failures,
            errors = report.errors.len(),
            "normalization batch finished"
        );
        report
    }
}
