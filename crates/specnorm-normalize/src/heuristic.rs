//! The deterministic mapping pass: merged raw spec map → canonical spec plus
//! residual vendor fields.
//!
//! Every raw pair ends up in exactly one of two places, and sometimes both:
//! a canonical field (first parseable value) and/or `vendor_fields`. A pair is
//! never dropped.

use std::collections::BTreeMap;

use specnorm_core::{
    AliasMatch, CanonicalMapper, CanonicalSpec, FieldValue, ParsePolicy, Provenance,
    RawSpecEntry, RawSpecMap, ResidualEntry, ResidualReason, ValueParseError, ValueParser,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeuristicResult {
    pub spec: CanonicalSpec,
    /// Cleaned key → residual pair.
    pub vendor_fields: BTreeMap<String, ResidualEntry>,
}

impl HeuristicResult {
    pub fn populated(&self) -> usize {
        self.spec.populated()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicPass {
    mapper: CanonicalMapper,
    parser: ValueParser,
}

struct Candidate<'a> {
    cleaned: &'a str,
    entry: &'a RawSpecEntry,
    hit: AliasMatch,
}

impl HeuristicPass {
    pub fn new(mapper: CanonicalMapper, policy: ParsePolicy) -> Self {
        Self {
            mapper,
            parser: ValueParser::new(policy),
        }
    }

    pub fn mapper(&self) -> &CanonicalMapper {
        &self.mapper
    }

    pub fn run(&self, raw: &RawSpecMap) -> HeuristicResult {
        let mut result = HeuristicResult::default();
        let mut candidates = Vec::new();

        for (cleaned, entry) in raw.iter() {
            match self.mapper.aliases().lookup(cleaned) {
                Some(hit) => candidates.push(Candidate {
                    cleaned,
                    entry,
                    hit,
                }),
                None => {
                    result.vendor_fields.insert(
                        cleaned.clone(),
                        residual(entry, ResidualReason::Unmapped, None, None),
                    );
                }
            }
        }

        // when two keys compete for a field: exact alias first, then the
        // shorter (less qualified) key
        candidates.sort_by(|a, b| {
            b.hit
                .exact
                .cmp(&a.hit.exact)
                .then(a.cleaned.len().cmp(&b.cleaned.len()))
                .then(a.cleaned.cmp(b.cleaned))
        });

        for c in candidates {
            self.place(c, &mut result);
        }
        result
    }

    fn place(&self, c: Candidate<'_>, result: &mut HeuristicResult) {
        let field = c.hit.field;
        let values = c.entry.value.values();

        let mut first_error: Option<ValueParseError> = None;
        let mut parsed = None;
        for v in &values {
            match self.parser.parse(field, v, c.entry.unit_hint) {
                Ok(p) => {
                    parsed = Some(p);
                    break;
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let Some(p) = parsed else {
            let (reason, detail) = match &first_error {
                Some(e @ ValueParseError::UnitMismatch { .. }) => {
                    (ResidualReason::UnitMismatch, Some(e.to_string()))
                }
                Some(e @ ValueParseError::Withheld { .. }) => {
                    (ResidualReason::Withheld, Some(e.to_string()))
                }
                Some(e) => (ResidualReason::ParseFailure, Some(e.to_string())),
                None => (ResidualReason::ParseFailure, None),
            };
            tracing::debug!(
                key = %c.entry.original_key,
                field = %field,
                reason = ?reason,
                "value left in vendor fields"
            );
            result.vendor_fields.insert(
                c.cleaned.to_string(),
                residual(c.entry, reason, Some(field), detail),
            );
            return;
        };

        if result.spec.is_set(p.field) {
            let winner = result
                .spec
                .get(p.field)
                .and_then(|f| f.source_key.clone())
                .unwrap_or_default();
            result.vendor_fields.insert(
                c.cleaned.to_string(),
                residual(
                    c.entry,
                    ResidualReason::Duplicate,
                    Some(p.field),
                    Some(format!("{} already set from {winner:?}", p.field)),
                ),
            );
            return;
        }

        let stored = result.spec.set(
            p.field,
            FieldValue {
                value: p.value,
                provenance: Provenance::Heuristic,
                verbatim: Some(p.verbatim),
                source_key: Some(c.entry.original_key.clone()),
            },
        );
        if let Err(e) = stored {
            result.vendor_fields.insert(
                c.cleaned.to_string(),
                residual(c.entry, ResidualReason::ParseFailure, Some(p.field), Some(e.to_string())),
            );
            return;
        }
        if values.len() > 1 {
            result.vendor_fields.insert(
                c.cleaned.to_string(),
                residual(c.entry, ResidualReason::AdditionalValues, Some(p.field), None),
            );
        }
    }
}

fn residual(
    entry: &RawSpecEntry,
    reason: ResidualReason,
    mapped_field: Option<specnorm_core::CanonicalField>,
    detail: Option<String>,
) -> ResidualEntry {
    ResidualEntry {
        original_key: entry.original_key.clone(),
        value: entry.value.clone(),
        reason,
        mapped_field,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use specnorm_core::{CanonicalField as F, CanonicalValue, RawValue};

    fn run(pairs: &[(&str, &str)]) -> HeuristicResult {
        let mut map = RawSpecMap::new();
        for (k, v) in pairs {
            map.insert(k, *v);
        }
        HeuristicPass::default().run(&map)
    }

    #[test]
    fn tolerance_key_keeps_verbatim() {
        let result = run(&[("Wavelength (nm) 1", "488 ± 2")]);
        let field = result.spec.get(F::WavelengthNm).unwrap();
        assert_relative_eq!(field.value.as_f64().unwrap(), 488.0);
        assert_eq!(field.verbatim.as_deref(), Some("488 ± 2"));
        assert_eq!(field.source_key.as_deref(), Some("Wavelength (nm) 1"));
        assert!(result.vendor_fields.is_empty());
    }

    #[test]
    fn unmapped_and_unparseable_pairs_are_retained() {
        let result = run(&[
            ("Laser class", "3B"),
            ("Output power", "see datasheet"),
            ("Warm-up time", "5 nm"),
        ]);
        assert_eq!(result.populated(), 0);
        assert_eq!(
            result.vendor_fields["laser class"].reason,
            ResidualReason::Unmapped
        );
        let power = &result.vendor_fields["output power"];
        assert_eq!(power.reason, ResidualReason::ParseFailure);
        assert_eq!(power.mapped_field, Some(F::OutputPowerMwNominal));
        assert_eq!(
            result.vendor_fields["warm-up time"].reason,
            ResidualReason::UnitMismatch
        );
    }

    #[test]
    fn range_is_withheld_under_default_policy() {
        let result = run(&[("Wavelength", "400 - 410 nm")]);
        assert!(!result.spec.is_set(F::WavelengthNm));
        assert_eq!(
            result.vendor_fields["wavelength"].reason,
            ResidualReason::Withheld
        );
    }

    #[test]
    fn competing_keys_keep_the_exact_alias() {
        let result = run(&[("Output power", "100 mW"), ("Output power typical", "90 mW")]);
        assert_eq!(
            result.spec.value(F::OutputPowerMwNominal),
            Some(&CanonicalValue::Numeric(100.0))
        );
        let dup = &result.vendor_fields["output power typical"];
        assert_eq!(dup.reason, ResidualReason::Duplicate);
    }

    #[test]
    fn multi_value_takes_first_parseable_and_keeps_the_rest() {
        let mut map = RawSpecMap::new();
        map.append("Output power", "n/a".to_string());
        map.append("Output power", "50 mW".to_string());
        map.append("Output power", "100 mW".to_string());
        let result = HeuristicPass::default().run(&map);

        assert_eq!(
            result.spec.value(F::OutputPowerMwNominal),
            Some(&CanonicalValue::Numeric(50.0))
        );
        let rest = &result.vendor_fields["output power"];
        assert_eq!(rest.reason, ResidualReason::AdditionalValues);
        assert_eq!(rest.value.len(), 3);
        assert!(matches!(rest.value, RawValue::Multi(_)));
    }

    #[test]
    fn linewidth_in_nm_lands_in_sibling() {
        let result = run(&[("Linewidth", "0.1 nm")]);
        assert!(!result.spec.is_set(F::LinewidthMhz));
        assert_relative_eq!(
            result.spec.value(F::LinewidthNm).unwrap().as_f64().unwrap(),
            0.1
        );
    }

    #[test]
    fn polarization_ratio_bound_is_atomic() {
        let result = run(&[("PER", "> 100:1")]);
        assert_eq!(
            result.spec.value(F::PolarizationRatio),
            Some(&CanonicalValue::Text("100:1".to_string()))
        );
    }
}
