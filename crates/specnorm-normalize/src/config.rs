//! Normalization settings.
//!
//! Precedence, highest first: explicit values passed by the caller,
//! `SPECNORM_*` environment variables, the config file (if any), defaults.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use specnorm_core::ParsePolicy;

pub const ENV_FALLBACK_TIMEOUT_SECS: &str = "SPECNORM_FALLBACK_TIMEOUT_SECS";
pub const ENV_FALLBACK_MAX_CONCURRENCY: &str = "SPECNORM_FALLBACK_MAX_CONCURRENCY";
pub const ENV_PRODUCT_WORKERS: &str = "SPECNORM_PRODUCT_WORKERS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}={value:?}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Fewer heuristically populated fields than this calls the fallback.
    pub critical_threshold: usize,
    /// Source text blobs handed to the fallback.
    pub max_excerpts: usize,
    /// Per-excerpt character cap.
    pub excerpt_chars: usize,
    pub product_workers: usize,
    pub fallback_timeout_ms: u64,
    pub fallback_max_attempts: u32,
    pub fallback_max_concurrency: usize,
    pub parse_policy: ParsePolicy,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 4,
            max_excerpts: 2,
            excerpt_chars: 8000,
            product_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            fallback_timeout_ms: 30_000,
            fallback_max_attempts: 2,
            fallback_max_concurrency: 4,
            parse_policy: ParsePolicy::default(),
        }
    }
}

/// Values set explicitly by the caller; they win over everything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub fallback_timeout_secs: Option<u64>,
    pub fallback_max_concurrency: Option<usize>,
    pub product_workers: Option<usize>,
}

impl NormalizeConfig {
    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }

    /// Defaults, then the process environment, then `explicit`.
    pub fn from_env(explicit: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve(Self::default(), explicit, |name| std::env::var(name).ok())
    }

    /// Like [`NormalizeConfig::from_env`], starting from a JSON file.
    pub fn load(path: &Path, explicit: ConfigOverrides) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let base: NormalizeConfig = serde_json::from_str(&json)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::resolve(base, explicit, |name| std::env::var(name).ok())?)
    }

    /// Layer `env` and `explicit` over `base`, then validate.
    pub fn resolve<F>(base: Self, explicit: ConfigOverrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = base;

        let timeout_secs = match explicit.fallback_timeout_secs {
            Some(v) => Some(v),
            None => env_positive(&env, ENV_FALLBACK_TIMEOUT_SECS)?,
        };
        if let Some(secs) = timeout_secs {
            config.fallback_timeout_ms = secs.saturating_mul(1000);
        }

        let concurrency = match explicit.fallback_max_concurrency {
            Some(v) => Some(v),
            None => env_positive(&env, ENV_FALLBACK_MAX_CONCURRENCY)?.map(|v| v as usize),
        };
        if let Some(v) = concurrency {
            config.fallback_max_concurrency = v;
        }

        let workers = match explicit.product_workers {
            Some(v) => Some(v),
            None => env_positive(&env, ENV_PRODUCT_WORKERS)?.map(|v| v as usize),
        };
        if let Some(v) = workers {
            config.product_workers = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("critical_threshold", self.critical_threshold as u64),
            ("product_workers", self.product_workers as u64),
            ("fallback_timeout_ms", self.fallback_timeout_ms),
            ("fallback_max_attempts", self.fallback_max_attempts as u64),
            ("fallback_max_concurrency", self.fallback_max_concurrency as u64),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name: name.to_string(),
                    value: "0".to_string(),
                    reason: "must be at least 1",
                });
            }
        }
        Ok(())
    }
}

fn env_positive<F>(env: &F, name: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = env(name) else {
        return Ok(None);
    };
    let invalid = |reason| ConfigError::Invalid {
        name: name.to_string(),
        value: raw.clone(),
        reason,
    };
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid("not a non-negative integer"))?;
    if value == 0 {
        return Err(invalid("must be at least 1"));
    }
    Ok(Some(value))
}
