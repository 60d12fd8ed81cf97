//! ValueParser: raw string + canonical field → typed value.
//!
//! The field's declared domain decides what a shape means. A numeric field
//! accepts quantities (converted into the field's unit), tolerances (center)
//! and, per [`ParsePolicy`], inequalities and ranges. Boolean fields accept
//! yes/no style text plus the field's own vocabulary. Text fields are bounded
//! and shaped by their [`TextForm`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::model::CanonicalValue;
use crate::patterns::{parse_number, PatternLibrary, Quantity, ShapeTag, ValueShape};
use crate::schema::{CanonicalField, Dimension, FieldDomain, TextForm, Unit};

/// How a range reaches a numeric field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePolicy {
    /// Keep the range only as text; numeric fields stay unset.
    #[default]
    StringOnly,
    FirstBound,
    Midpoint,
}

/// How an inequality reaches a numeric field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InequalityPolicy {
    /// `< 0.2 %` → 0.2.
    #[default]
    Bound,
    Unset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsePolicy {
    #[serde(default)]
    pub range: RangePolicy,
    #[serde(default)]
    pub inequality: InequalityPolicy,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueParseError {
    #[error("{field}: no recognized value in {raw:?}")]
    NoShape { field: CanonicalField, raw: String },

    #[error("{field}: expected {expected}, found {found:?}")]
    UnitMismatch {
        field: CanonicalField,
        expected: Unit,
        found: String,
    },

    #[error("{field}: {shape:?} value {raw:?} does not fit a {expected} field")]
    WrongDomain {
        field: CanonicalField,
        raw: String,
        shape: ShapeTag,
        expected: &'static str,
    },

    #[error("{field}: {raw:?} is longer than {max_len} characters")]
    TooLong {
        field: CanonicalField,
        raw: String,
        max_len: usize,
    },

    #[error("{field}: {shape:?} value {raw:?} withheld by parse policy")]
    Withheld {
        field: CanonicalField,
        raw: String,
        shape: ShapeTag,
    },
}

/// A successfully parsed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedValue {
    /// Usually the requested field; the sibling when the unit routed it there.
    pub field: CanonicalField,
    pub value: CanonicalValue,
    pub verbatim: String,
    pub shape: Option<ShapeTag>,
}

struct TextRules {
    dimensions: Regex,
    token_split: Regex,
    whitespace: Regex,
}

fn text_rules() -> &'static TextRules {
    static RULES: OnceLock<TextRules> = OnceLock::new();
    RULES.get_or_init(|| TextRules {
        dimensions: Regex::new(
            r"(?i)(\d+(?:[.,]\d+)?)\s*(?:mm)?\s*[x×*]\s*(\d+(?:[.,]\d+)?)\s*(?:mm)?\s*[x×*]\s*(\d+(?:[.,]\d+)?)\s*(mm|cm|m)?\b",
        )
        .expect("dimension pattern is valid"),
        token_split: Regex::new(r"(?i)[,/;+]|\band\b").expect("token split pattern is valid"),
        whitespace: Regex::new(r"\s+").expect("whitespace pattern is valid"),
    })
}

#[derive(Debug, Clone)]
pub struct ValueParser {
    patterns: &'static PatternLibrary,
    policy: ParsePolicy,
}

impl Default for ValueParser {
    fn default() -> Self {
        Self::new(ParsePolicy::default())
    }
}

impl ValueParser {
    pub fn new(policy: ParsePolicy) -> Self {
        Self {
            patterns: PatternLibrary::standard(),
            policy,
        }
    }

    pub fn policy(&self) -> ParsePolicy {
        self.policy
    }

    /// Parse `raw` for `field`. `unit_hint` is the unit stripped from the key.
    pub fn parse(
        &self,
        field: CanonicalField,
        raw: &str,
        unit_hint: Option<Unit>,
    ) -> Result<ParsedValue, ValueParseError> {
        let recognized = self.patterns.recognize(raw);
        let shape = recognized.as_ref().map(|r| r.shape.clone());

        let (field, value) = match field.domain() {
            FieldDomain::Numeric { unit } => {
                self.parse_numeric(field, unit, raw, shape.as_ref(), unit_hint)?
            }
            FieldDomain::Boolean { truthy } => {
                (field, self.parse_boolean(field, truthy, raw, shape.as_ref())?)
            }
            FieldDomain::Text { max_len, form } => (
                field,
                self.parse_text(field, max_len, form, raw, shape.as_ref(), unit_hint)?,
            ),
        };

        Ok(ParsedValue {
            field,
            value,
            verbatim: raw.trim().to_string(),
            shape: shape.map(|s| s.tag()),
        })
    }

    fn parse_numeric(
        &self,
        field: CanonicalField,
        expected: Unit,
        raw: &str,
        shape: Option<&ValueShape>,
        hint: Option<Unit>,
    ) -> Result<(CanonicalField, CanonicalValue), ValueParseError> {
        let Some(shape) = shape else {
            return Err(ValueParseError::NoShape {
                field,
                raw: raw.to_string(),
            });
        };
        let withheld = || ValueParseError::Withheld {
            field,
            raw: raw.to_string(),
            shape: shape.tag(),
        };

        let (target, value) = match shape {
            ValueShape::NumericUnit(q) => self.convert(field, expected, q, hint)?,
            ValueShape::Tolerance { center, .. } => self.convert(field, expected, center, hint)?,
            ValueShape::Inequality { bound, .. } => match self.policy.inequality {
                InequalityPolicy::Bound => self.convert(field, expected, bound, hint)?,
                InequalityPolicy::Unset => return Err(withheld()),
            },
            ValueShape::Range { low, high } => match self.policy.range {
                RangePolicy::StringOnly => return Err(withheld()),
                RangePolicy::FirstBound => self.convert(field, expected, low, hint)?,
                RangePolicy::Midpoint => {
                    let (target, lo) = self.convert(field, expected, low, hint)?;
                    let (_, hi) = self.convert(field, expected, high, hint)?;
                    (target, (lo + hi) / 2.0)
                }
            },
            ValueShape::Ratio { .. } | ValueShape::BooleanLike(_) => {
                return Err(ValueParseError::WrongDomain {
                    field,
                    raw: raw.to_string(),
                    shape: shape.tag(),
                    expected: "number",
                })
            }
        };
        Ok((target, CanonicalValue::Numeric(value)))
    }

    /// Bring a quantity into the field's unit, or into the sibling's when the
    /// unit belongs to the sibling's dimension.
    fn convert(
        &self,
        field: CanonicalField,
        expected: Unit,
        q: &Quantity,
        hint: Option<Unit>,
    ) -> Result<(CanonicalField, f64), ValueParseError> {
        let unit = match (&q.unit_text, q.unit()) {
            (None, _) => hint.unwrap_or(expected),
            (Some(_), Some(u)) => u,
            (Some(text), None) => {
                return Err(ValueParseError::UnitMismatch {
                    field,
                    expected,
                    found: text.clone(),
                })
            }
        };

        if let Some(v) = unit.convert(q.value, expected) {
            return Ok((field, v));
        }
        if let Some(sibling) = field.descriptor().sibling {
            if let Some(sibling_unit) = sibling.domain().expected_unit() {
                if let Some(v) = unit.convert(q.value, sibling_unit) {
                    return Ok((sibling, v));
                }
            }
        }
        Err(ValueParseError::UnitMismatch {
            field,
            expected,
            found: unit.symbol().to_string(),
        })
    }

    fn parse_boolean(
        &self,
        field: CanonicalField,
        truthy: &[&str],
        raw: &str,
        shape: Option<&ValueShape>,
    ) -> Result<CanonicalValue, ValueParseError> {
        match shape {
            Some(ValueShape::BooleanLike(b)) => return Ok(CanonicalValue::Boolean(*b)),
            Some(ValueShape::NumericUnit(q)) if q.unit_text.is_none() => {
                if q.value == 1.0 {
                    return Ok(CanonicalValue::Boolean(true));
                }
                if q.value == 0.0 {
                    return Ok(CanonicalValue::Boolean(false));
                }
            }
            _ => {}
        }

        let lower = raw.trim().to_lowercase();
        if ["no ", "not ", "without "].iter().any(|p| lower.starts_with(p)) {
            return Ok(CanonicalValue::Boolean(false));
        }
        if truthy.iter().any(|t| contains_word(&lower, t)) {
            return Ok(CanonicalValue::Boolean(true));
        }
        Err(ValueParseError::NoShape {
            field,
            raw: raw.to_string(),
        })
    }

    fn parse_text(
        &self,
        field: CanonicalField,
        max_len: usize,
        form: TextForm,
        raw: &str,
        shape: Option<&ValueShape>,
        hint: Option<Unit>,
    ) -> Result<CanonicalValue, ValueParseError> {
        let rules = text_rules();
        let collapsed = rules.whitespace.replace_all(raw.trim(), " ").into_owned();
        if collapsed.is_empty() {
            return Err(ValueParseError::NoShape {
                field,
                raw: raw.to_string(),
            });
        }

        let text = match form {
            TextForm::Free => collapsed,
            TextForm::Ratio => match shape {
                Some(ValueShape::Ratio { text, .. }) => text.clone(),
                _ => match self.patterns.find_ratio(&collapsed) {
                    Some(ValueShape::Ratio { text, .. }) => text,
                    _ => {
                        return Err(ValueParseError::NoShape {
                            field,
                            raw: raw.to_string(),
                        })
                    }
                },
            },
            TextForm::TokenList => {
                let mut tokens: Vec<String> = Vec::new();
                for t in rules.token_split.split(&collapsed) {
                    let t = t.trim().to_uppercase().replace("RS232", "RS-232");
                    if !t.is_empty() && !tokens.contains(&t) {
                        tokens.push(t);
                    }
                }
                if tokens.is_empty() {
                    return Err(ValueParseError::NoShape {
                        field,
                        raw: raw.to_string(),
                    });
                }
                tokens.join(", ")
            }
            TextForm::Dimensions => self.parse_dimensions(field, &collapsed, hint)?,
        };

        if text.chars().count() > max_len {
            return Err(ValueParseError::TooLong {
                field,
                raw: raw.to_string(),
                max_len,
            });
        }
        Ok(CanonicalValue::Text(text))
    }

    /// `100 x 50 x 40 mm` → `"100 x 50 x 40"` (always millimetres).
    fn parse_dimensions(
        &self,
        field: CanonicalField,
        text: &str,
        hint: Option<Unit>,
    ) -> Result<String, ValueParseError> {
        let no_shape = || ValueParseError::NoShape {
            field,
            raw: text.to_string(),
        };
        let caps = text_rules().dimensions.captures(text).ok_or_else(no_shape)?;
        let unit = match caps.get(4) {
            Some(m) => Unit::parse(m.as_str()).ok_or_else(no_shape)?,
            None => hint.unwrap_or(Unit::Millimeter),
        };
        if unit.dimension() != Dimension::Length {
            return Err(ValueParseError::UnitMismatch {
                field,
                expected: Unit::Millimeter,
                found: unit.symbol().to_string(),
            });
        }

        let mut parts = Vec::with_capacity(3);
        for i in 1..=3 {
            let n = caps
                .get(i)
                .and_then(|m| parse_number(m.as_str()))
                .ok_or_else(no_shape)?;
            let mm = unit.convert(n, Unit::Millimeter).ok_or_else(no_shape)?;
            parts.push(format_number(mm));
        }
        Ok(parts.join(" x "))
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, m)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + m.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        let s = format!("{v:.3}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
