//! CanonicalMapper: cleaned vendor key → canonical field.
//!
//! The alias table is closed over [`CanonicalField`]: overrides may add or
//! re-point aliases but only at fields that exist.
//!
//! Lookup precedence:
//!
//! ```text
//!   1. exact token match            "minimum power"      → output_power_mw_min
//!   2. multi-word phrase inside key "laser output power" → output_power_mw_nominal
//!      (more words first, then phrase ending the key, then longer text)
//!   3. single-word alias as the key's last word   "max. power" → nominal
//! ```
//!
//! A single-word alias never matches in the middle of a key, so `power`
//! cannot capture `power consumption`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::cleaner::{clean_key, CleanedKey};
use crate::schema::CanonicalField;

#[derive(Debug, Error)]
pub enum AliasConfigError {
    #[error("alias {alias:?} targets unknown canonical field {field:?}")]
    UnknownField { alias: String, field: String },

    #[error("alias for {field} is empty after tokenization")]
    EmptyAlias { field: CanonicalField },

    #[error("invalid alias override JSON: {0}")]
    Json(#[from] serde_json::Error),
}

const BUILTIN_ALIASES: &[(CanonicalField, &[&str])] = {
    use CanonicalField as F;
    &[
        (
            F::WavelengthNm,
            &[
                "wavelength",
                "wavelengths",
                "λ",
                "lambda",
                "emission wavelength",
                "center wavelength",
                "central wavelength",
                "peak wavelength",
            ],
        ),
        (
            F::OutputPowerMwNominal,
            &[
                "output power",
                "optical power",
                "cw power",
                "typ. power",
                "typical power",
                "nominal power",
                "maximum output power",
                "max output power",
                "output power typ",
                "laser power",
                "power",
            ],
        ),
        (
            F::OutputPowerMwMin,
            &[
                "min. power",
                "power min",
                "minimum power",
                "output power min",
                "min output power",
                "minimum output power",
            ],
        ),
        (
            F::RmsNoisePct,
            &[
                "noise",
                "rms noise",
                "intensity noise",
                "noise rms",
                "rms intensity noise",
                "optical noise",
            ],
        ),
        (
            F::PowerStabilityPct,
            &[
                "power stability",
                "long-term stability",
                "longterm stability",
                "long-term power stability",
                "ltp",
            ],
        ),
        (
            F::LinewidthMhz,
            &[
                "linewidth",
                "line width",
                "spectral linewidth",
                "spectral width",
                "spectral bandwidth",
                "fwhm",
            ],
        ),
        (
            F::M2,
            &["m2", "m²", "m 2", "beam quality", "beam quality factor"],
        ),
        (
            F::BeamDiameterMm,
            &["beam diameter", "output beam diameter", "beam size"],
        ),
        (
            F::BeamDivergenceMrad,
            &[
                "beam divergence",
                "divergence",
                "half-angle divergence",
                "full-angle divergence",
            ],
        ),
        (
            F::Polarization,
            &[
                "polarization",
                "polarisation",
                "polarization direction",
                "polarization orientation",
            ],
        ),
        (
            F::PolarizationRatio,
            &[
                "polarization ratio",
                "polarisation ratio",
                "polarization extinction ratio",
                "extinction ratio",
                "per",
            ],
        ),
        (
            F::ModulationAnalogHz,
            &[
                "analog modulation",
                "analogue modulation",
                "analog modulation bandwidth",
                "am bandwidth",
            ],
        ),
        (
            F::ModulationDigitalHz,
            &[
                "digital modulation",
                "digital modulation bandwidth",
                "ttl modulation",
                "blanking rate",
            ],
        ),
        (
            F::TtlShutter,
            &["electronic shutter", "laser inhibit", "ttl shutter", "shutter"],
        ),
        (
            F::FiberOutput,
            &["fiber output", "fibre output", "fiber delivery", "fiber coupled"],
        ),
        (F::FiberNa, &["fiber na", "fibre na", "na", "numerical aperture"]),
        (F::FiberMfdUm, &["mode field diameter", "mfd", "fiber mfd"]),
        (
            F::WarmupTimeMin,
            &["warm-up time", "warmup time", "warm-up", "warmup"],
        ),
        (
            F::Interfaces,
            &[
                "interface",
                "interfaces",
                "control interface",
                "control interfaces",
                "communication interface",
            ],
        ),
        (
            F::DimensionsMm,
            &[
                "dimension",
                "dimensions",
                "size",
                "footprint",
                "head dimensions",
                "laser head dimensions",
            ],
        ),
    ]
};

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
struct Alias {
    phrase: String,
    tokens: Vec<String>,
    field: CanonicalField,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasMatch {
    pub field: CanonicalField,
    /// The alias that fired.
    pub alias: String,
    pub exact: bool,
}

/// Closed synonym table.
#[derive(Debug, Clone)]
pub struct AliasTable {
    aliases: Vec<Alias>,
}

impl AliasTable {
    pub fn builtin() -> Self {
        let mut table = Self {
            aliases: Vec::new(),
        };
        for (field, phrases) in BUILTIN_ALIASES {
            for phrase in *phrases {
                table.push(phrase, *field);
            }
        }
        table.sort();
        table
    }

    /// Process-wide built-in table.
    pub fn standard() -> &'static AliasTable {
        static TABLE: OnceLock<AliasTable> = OnceLock::new();
        TABLE.get_or_init(AliasTable::builtin)
    }

    /// Apply `{"alias": "field_id", ...}` overrides. An alias already in the
    /// table is re-pointed; unknown field ids reject the whole override set.
    pub fn with_overrides_json(mut self, json: &str) -> Result<Self, AliasConfigError> {
        let overrides: BTreeMap<String, String> = serde_json::from_str(json)?;
        let mut parsed = Vec::with_capacity(overrides.len());
        for (alias, field) in overrides {
            let target = field
                .parse::<CanonicalField>()
                .map_err(|_| AliasConfigError::UnknownField {
                    alias: alias.clone(),
                    field: field.clone(),
                })?;
            if tokenize(&alias).is_empty() {
                return Err(AliasConfigError::EmptyAlias { field: target });
            }
            parsed.push((alias, target));
        }
        for (alias, target) in parsed {
            let tokens = tokenize(&alias);
            if let Some(prev) = self.aliases.iter().find(|a| a.tokens == tokens) {
                tracing::debug!(alias = %alias, from = %prev.field, to = %target, "alias re-pointed");
            }
            self.aliases.retain(|a| a.tokens != tokens);
            self.push(&alias, target);
        }
        self.sort();
        Ok(self)
    }

    /// Load the built-in table extended by an override file.
    pub fn from_override_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(Self::builtin().with_overrides_json(&json)?)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn aliases_for(&self, field: CanonicalField) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|a| a.field == field)
            .map(|a| a.phrase.as_str())
            .collect()
    }

    pub fn lookup(&self, cleaned: &str) -> Option<AliasMatch> {
        let key = tokenize(cleaned);
        if key.is_empty() {
            return None;
        }

        if let Some(a) = self.aliases.iter().find(|a| a.tokens == key) {
            return Some(a.to_match(true));
        }

        let mut best: Option<(&Alias, bool)> = None;
        for alias in self.aliases.iter().filter(|a| a.tokens.len() > 1) {
            let Some(end) = find_phrase(&key, &alias.tokens) else {
                continue;
            };
            let at_end = end == key.len();
            let better = match best {
                None => true,
                Some((b, b_end)) => {
                    (alias.tokens.len(), at_end, alias.phrase.len())
                        > (b.tokens.len(), b_end, b.phrase.len())
                }
            };
            if better {
                best = Some((alias, at_end));
            }
        }
        if let Some((alias, _)) = best {
            return Some(alias.to_match(false));
        }

        let last = key.last()?;
        self.aliases
            .iter()
            .find(|a| a.tokens.len() == 1 && &a.tokens[0] == last)
            .map(|a| a.to_match(false))
    }

    fn push(&mut self, phrase: &str, field: CanonicalField) {
        self.aliases.push(Alias {
            phrase: phrase.to_lowercase(),
            tokens: tokenize(phrase),
            field,
        });
    }

    fn sort(&mut self) {
        self.aliases.sort_by(|a, b| {
            b.tokens
                .len()
                .cmp(&a.tokens.len())
                .then(b.phrase.len().cmp(&a.phrase.len()))
                .then(a.phrase.cmp(&b.phrase))
        });
    }
}

impl Alias {
    fn to_match(&self, exact: bool) -> AliasMatch {
        AliasMatch {
            field: self.field,
            alias: self.phrase.clone(),
            exact,
        }
    }
}

/// End index (exclusive) of the first contiguous occurrence of `needle`.
fn find_phrase(haystack: &[String], needle: &[String]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|start| start + needle.len())
}

/// A raw key after cleaning and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedKey {
    pub key: CleanedKey,
    pub hit: Option<AliasMatch>,
}

#[derive(Debug, Clone)]
pub struct CanonicalMapper {
    aliases: AliasTable,
}

impl Default for CanonicalMapper {
    fn default() -> Self {
        Self::new(AliasTable::builtin())
    }
}

impl CanonicalMapper {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Look up an already-cleaned key.
    pub fn map_cleaned(&self, cleaned: &str) -> Option<CanonicalField> {
        self.aliases.lookup(cleaned).map(|m| m.field)
    }

    /// Clean then look up; the cleaner always runs first.
    pub fn map_raw(&self, raw_key: &str) -> MappedKey {
        let key = clean_key(raw_key);
        let hit = self.aliases.lookup(&key.cleaned);
        MappedKey { key, hit }
    }
}
