//! Document-level ingestion: fetched payloads through the dedup gate and
//! extraction, in parallel. Documents share nothing but the store index.

use rayon::prelude::*;
use serde::Serialize;

use specnorm_ingest_docs::extract_document;
use specnorm_storage::{AdmitOutcome, DedupGate, FetchedContent};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Extraction warnings of newly stored versions.
    pub warnings: usize,
}

impl IngestReport {
    fn record(mut self, outcome: &AdmitOutcome) -> Self {
        match outcome {
            AdmitOutcome::New(_) => self.new += 1,
            AdmitOutcome::Updated { .. } => self.updated += 1,
            AdmitOutcome::Unchanged(_) => self.unchanged += 1,
        }
        if !outcome.is_unchanged() {
            self.warnings += outcome.document().warnings.len();
        }
        self
    }

    fn combine(mut self, other: Self) -> Self {
        self.new += other.new;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.warnings += other.warnings;
        self
    }
}

/// Admit one payload, extracting only if its bytes are new for the source.
pub fn ingest_one(gate: &DedupGate, fetched: &FetchedContent) -> AdmitOutcome {
    gate.admit(fetched, extract_document)
}

pub fn ingest_batch(gate: &DedupGate, batch: &[FetchedContent]) -> IngestReport {
    let report = batch
        .par_iter()
        .map(|fetched| ingest_one(gate, fetched))
        .fold(IngestReport::default, |acc, outcome| acc.record(&outcome))
        .reduce(IngestReport::default, IngestReport::combine);

    tracing::info!(
        documents = batch.len(),
        new = report.new,
        updated = report.updated,
        unchanged = report.unchanged,
        warnings = report.warnings,
        "ingestion batch finished"
    );
    report
}
