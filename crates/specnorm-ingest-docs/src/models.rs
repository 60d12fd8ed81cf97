//! ModelExtractor: split concatenated family blobs into per-model records.
//!
//! Vendor pages sometimes flatten a family table into one string:
//!
//! ```text
//! LuxX+ 405-100 405 nm / 100 mW LuxX+ 488-50 488 nm / 50 mW LuxX+ 638-150 638nm/150mW
//! ```
//!
//! Each repetition of `<model> <wavelength> nm / <power> mW|W` becomes its own
//! record. A single occurrence is an ordinary value, not a family.

use regex::Regex;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::OnceLock;

use specnorm_core::RawSpecMap;

/// Groups required before a blob counts as a family.
pub const MIN_FAMILY_REPETITIONS: usize = 2;

/// One `<model> <wavelength> <power>` repetition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelGroup {
    pub model: String,
    pub wavelength: String,
    pub power: String,
    pub span: Range<usize>,
}

pub struct ModelExtractor {
    family: Regex,
}

impl ModelExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            family: Regex::new(
                r"(?P<model>[A-Za-z][A-Za-z+®™]*[\s\u{a0}-]?\d[\w-]*)\s+(?P<wl>\d{3,4}(?:\.\d+)?)\s*nm\s*[/,;|]?\s*(?P<pw>\d+(?:\.\d+)?)\s*(?P<pu>mW|W)\b",
            )?,
        })
    }

    pub fn standard() -> &'static ModelExtractor {
        static EXTRACTOR: OnceLock<ModelExtractor> = OnceLock::new();
        EXTRACTOR.get_or_init(|| ModelExtractor::new().expect("built-in family pattern is valid"))
    }

    /// All groups in `text` when it repeats at least twice, otherwise `None`.
    pub fn split(&self, text: &str) -> Option<Vec<ModelGroup>> {
        let groups: Vec<ModelGroup> = self
            .family
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some(ModelGroup {
                    model: clean_model_token(caps.name("model")?.as_str()),
                    wavelength: format!("{} nm", caps.name("wl")?.as_str()),
                    power: format!("{} {}", caps.name("pw")?.as_str(), caps.name("pu")?.as_str()),
                    span: whole.range(),
                })
            })
            .collect();
        (groups.len() >= MIN_FAMILY_REPETITIONS).then_some(groups)
    }

    /// Per-model raw spec maps found in a document's raw values and text.
    /// A model seen twice keeps its last occurrence.
    pub fn extract(&self, specs: &RawSpecMap, text: &str) -> BTreeMap<String, RawSpecMap> {
        let mut models: BTreeMap<String, RawSpecMap> = BTreeMap::new();

        let blobs = specs
            .iter()
            .flat_map(|(_, entry)| entry.value.values())
            .chain(std::iter::once(text));

        for blob in blobs {
            let Some(groups) = self.split(blob) else {
                continue;
            };
            tracing::debug!(groups = groups.len(), "split concatenated model family");
            for group in groups {
                let record = models.entry(group.model).or_default();
                record.insert("Wavelength", group.wavelength);
                record.insert("Output power", group.power);
            }
        }
        models
    }
}

/// Normalize a model token: drop trademark marks, collapse whitespace.
pub fn clean_model_token(raw: &str) -> String {
    raw.replace(['®', '™'], "")
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use specnorm_core::RawValue;

    const BLOB: &str =
        "LuxX+ 405-100 405 nm / 100 mW LuxX+ 488-50 488 nm / 50 mW LuxX® 638-150 638nm/150mW";

    #[test]
    fn splits_repeated_groups() {
        let groups = ModelExtractor::standard().split(BLOB).unwrap();
        let models: Vec<&str> = groups.iter().map(|g| g.model.as_str()).collect();
        assert_eq!(models, vec!["LuxX+ 405-100", "LuxX+ 488-50", "LuxX 638-150"]);
        assert_eq!(groups[2].wavelength, "638 nm");
        assert_eq!(groups[2].power, "150 mW");
    }

    #[test]
    fn single_occurrence_is_not_a_family() {
        assert!(ModelExtractor::standard()
            .split("LBX-405 405 nm / 100 mW")
            .is_none());
        assert!(ModelExtractor::standard().split("Wavelength 488 nm").is_none());
    }

    #[test]
    fn last_occurrence_wins_within_a_document() {
        let mut specs = RawSpecMap::new();
        specs.insert("Family", BLOB);
        let text = "LuxX+ 405-100 405 nm / 120 mW and LuxX+ 488-50 488 nm / 50 mW";
        let models = ModelExtractor::standard().extract(&specs, text);
        assert_eq!(models.len(), 3);
        assert_eq!(
            models["LuxX+ 405-100"].get("output power").unwrap().value,
            RawValue::from("120 mW")
        );
        assert_eq!(
            models["LuxX 638-150"].get("wavelength").unwrap().value,
            RawValue::from("638 nm")
        );
    }

    #[test]
    fn model_tokens_are_cleaned() {
        assert_eq!(clean_model_token("OBIS\u{a0}488  LX™"), "OBIS 488 LX");
    }
}
