//! Fallback oracle boundary.
//!
//! ```text
//!   orchestrator ──► FallbackAdapter ──► dyn FallbackOracle ──► external service
//!                     │ semaphore (concurrency cap)
//!                     │ timeout per attempt
//!                     │ retry on transient failures
//!                     ▼
//!                  FallbackResponse::validate (closed schema, strict types)
//! ```
//!
//! The oracle returns untyped JSON; nothing it says reaches a canonical field
//! until the whole object validates. Any failure means "fallback unavailable"
//! for that product, never a partial fill.

#[cfg(feature = "openai")]
pub mod providers;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use specnorm_core::{
    CanonicalField, CanonicalValue, FieldDomain, ProductKey, RawSpecMap, ValueParser,
};

use crate::config::NormalizeConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FallbackError {
    #[error("fallback unavailable: {0}")]
    Unavailable(String),

    #[error("fallback timed out after {0:?}")]
    Timeout(Duration),

    #[error("fallback response violates schema: {0}")]
    SchemaViolation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

impl FallbackError {
    /// Worth another attempt with the same request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FallbackError::Timeout(_) | FallbackError::Transport(_) | FallbackError::RateLimited { .. }
        )
    }
}

// ============================================================================
// Request / response contract
// ============================================================================

/// One declared canonical field as the oracle sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub id: CanonicalField,
    #[serde(rename = "type")]
    pub type_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

impl FieldSchema {
    pub fn of(field: CanonicalField) -> Self {
        let domain = field.domain();
        Self {
            id: field,
            type_name: domain.type_name(),
            unit: domain.expected_unit().map(|u| u.symbol()),
            max_len: match domain {
                FieldDomain::Text { max_len, .. } => Some(max_len),
                _ => None,
            },
        }
    }

    pub fn all() -> Vec<FieldSchema> {
        CanonicalField::ALL.iter().map(|f| Self::of(*f)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackRequest {
    pub product: ProductKey,
    /// Original key → value as displayed in the source.
    pub raw_specs: BTreeMap<String, String>,
    pub excerpts: Vec<String>,
    pub fields: Vec<FieldSchema>,
}

impl FallbackRequest {
    pub fn new(product: ProductKey, merged: &RawSpecMap, excerpts: Vec<String>) -> Self {
        Self {
            product,
            raw_specs: merged.to_display_map(),
            excerpts,
            fields: FieldSchema::all(),
        }
    }
}

/// The oracle's answer before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackResponse(Map<String, Value>);

impl FallbackResponse {
    pub fn from_value(value: Value) -> Result<Self, FallbackError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(FallbackError::SchemaViolation(format!(
                "expected an object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Every declared field must be present, typed or null; nothing else may be.
    /// Returns the non-null values.
    pub fn validate(&self) -> Result<BTreeMap<CanonicalField, CanonicalValue>, FallbackError> {
        let violation = |msg: String| Err(FallbackError::SchemaViolation(msg));

        for key in self.0.keys() {
            if key.parse::<CanonicalField>().is_err() {
                return violation(format!("unknown field {key:?}"));
            }
        }

        let parser = ValueParser::default();
        let mut values = BTreeMap::new();
        for field in CanonicalField::ALL {
            let Some(value) = self.0.get(field.id()) else {
                return violation(format!("missing field {field}"));
            };
            if value.is_null() {
                continue;
            }
            let typed = match (field.domain(), value) {
                (FieldDomain::Numeric { .. }, Value::Number(n)) => n
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .map(CanonicalValue::Numeric),
                (FieldDomain::Boolean { .. }, Value::Bool(b)) => Some(CanonicalValue::Boolean(*b)),
                (FieldDomain::Text { .. }, Value::String(s)) => {
                    // blank text carries no value
                    if s.trim().is_empty() {
                        continue;
                    }
                    // same shaping as heuristic text: ratio, token list, dimensions
                    match parser.parse(field, s, None) {
                        Ok(parsed) => Some(parsed.value),
                        Err(e) => return violation(e.to_string()),
                    }
                }
                _ => None,
            };
            match typed {
                Some(v) => {
                    values.insert(field, v);
                }
                None => {
                    return violation(format!(
                        "{field} must be {} or null, got {}",
                        field.domain().type_name(),
                        json_type(value)
                    ))
                }
            }
        }
        Ok(values)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Oracle and adapter
// ============================================================================

/// External service that fills canonical fields from raw specs and text.
#[async_trait]
pub trait FallbackOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &FallbackRequest) -> Result<Value, FallbackError>;
}

/// Wraps an oracle with the concurrency cap, timeout and retry policy.
#[derive(Clone)]
pub struct FallbackAdapter {
    oracle: Arc<dyn FallbackOracle>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    max_attempts: u32,
}

impl FallbackAdapter {
    pub fn new(oracle: Arc<dyn FallbackOracle>, config: &NormalizeConfig) -> Self {
        Self {
            oracle,
            permits: Arc::new(Semaphore::new(config.fallback_max_concurrency.max(1))),
            timeout: config.fallback_timeout(),
            max_attempts: config.fallback_max_attempts.max(1),
        }
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    /// Ask the oracle and validate its answer. The request is idempotent, so
    /// transient failures are retried with the same input.
    pub async fn fill(
        &self,
        request: &FallbackRequest,
    ) -> Result<BTreeMap<CanonicalField, CanonicalValue>, FallbackError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FallbackError::Unavailable("adapter closed".to_string()))?;

        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, self.oracle.complete(request)).await
            {
                Ok(Ok(value)) => FallbackResponse::from_value(value).and_then(|r| r.validate()),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(FallbackError::Timeout(self.timeout)),
            };

            match result {
                Ok(values) => return Ok(values),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::debug!(
                        oracle = self.oracle.name(),
                        product = %request.product,
                        attempt,
                        error = %e,
                        "fallback attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff(&e, attempt, self.timeout)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Pause before the next attempt. Never longer than one attempt's timeout,
/// whatever the service asks for; the permit is held while sleeping.
fn backoff(error: &FallbackError, attempt: u32, ceiling: Duration) -> Duration {
    let wait = match error {
        FallbackError::RateLimited { retry_after_ms } => Duration::from_millis(*retry_after_ms),
        _ => Duration::from_millis(50u64.saturating_mul(u64::from(attempt))),
    };
    wait.min(ceiling)
}
