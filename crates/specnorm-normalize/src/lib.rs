//! specnorm normalization
//!
//! ```text
//!   FetchedContent ─► pipeline::ingest_batch (rayon) ─► DedupGate ─► RawDocumentStore
//!                                                                        │
//!   NormalizationOrchestrator::normalize_all (tokio, bounded) ◄──────────┘
//!        │  HeuristicPass (mapper + value parser)
//!        │  FallbackAdapter (only below the critical threshold)
//!        ▼
//!   SnapshotStore
//! ```
//!
//! The real fallback service lives behind [`fallback::FallbackOracle`]; the
//! OpenAI-compatible implementation needs the `openai` feature.

pub mod config;
pub mod fallback;
pub mod heuristic;
pub mod orchestrator;
pub mod pipeline;

pub use config::{ConfigError, ConfigOverrides, NormalizeConfig};
pub use fallback::{
    FallbackAdapter, FallbackError, FallbackOracle, FallbackRequest, FallbackResponse, FieldSchema,
};
pub use heuristic::{HeuristicPass, HeuristicResult};
pub use orchestrator::{
    BatchReport, KeyOutcome, MergedInput, NormalizationOrchestrator, NormalizeError,
};
pub use pipeline::{ingest_batch, ingest_one, IngestReport};
