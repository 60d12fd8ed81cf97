//! Value shape recognition.
//!
//! Vendor values come in a handful of notations that must never be mangled:
//! tolerances (`488 ± 2 nm`), inequalities (`< 0.2 %`), ratios (`>100:1`),
//! ranges (`10-45°C`), plain quantities (`488 nm`) and yes/no style text.
//!
//! [`PatternLibrary`] is an explicit, ordered list of recognizers. Order is
//! part of the contract (see [`PatternLibrary::order`]): ratios are tried
//! first so `N:M` is always atomic, and inequality/tolerance shapes run before
//! plain quantities so their operators are never silently dropped.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::OnceLock;

use crate::schema::Unit;

/// Number as written by vendors: optional sign, thousands commas or decimal comma.
const NUM: &str = r"[-+]?\d[\d,]*(?:\.\d+)?";
/// Unit token following a number.
const UNIT: &str = r"(?:°\s*C|℃|%(?:\s*rms)?|[A-Za-zµμ°]+)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeTag {
    Ratio,
    Tolerance,
    Inequality,
    Range,
    NumericUnit,
    BooleanLike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn parse(op: &str) -> Option<Self> {
        let op = op.trim().to_lowercase();
        Some(match op.as_str() {
            "<" | "less than" | "below" => Comparator::Lt,
            "≤" | "<=" | "=<" | "up to" | "max" | "max." => Comparator::Le,
            ">" | "greater than" | "more than" | "above" => Comparator::Gt,
            "≥" | ">=" | "=>" | "min" | "min." => Comparator::Ge,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "≤",
            Comparator::Gt => ">",
            Comparator::Ge => "≥",
        }
    }
}

/// A number with the unit text that followed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    /// Unit token exactly as written, when present.
    pub unit_text: Option<String>,
}

impl Quantity {
    /// The recognized unit, if the unit token is one we know.
    pub fn unit(&self) -> Option<Unit> {
        self.unit_text.as_deref().and_then(Unit::parse)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ValueShape {
    Ratio {
        comparator: Option<Comparator>,
        left: f64,
        right: f64,
        /// `N:M` without comparator or inner whitespace.
        text: String,
    },
    Tolerance {
        center: Quantity,
        deviation: f64,
    },
    Inequality {
        comparator: Comparator,
        bound: Quantity,
    },
    Range {
        low: Quantity,
        high: Quantity,
    },
    NumericUnit(Quantity),
    BooleanLike(bool),
}

impl ValueShape {
    pub fn tag(&self) -> ShapeTag {
        match self {
            ValueShape::Ratio { .. } => ShapeTag::Ratio,
            ValueShape::Tolerance { .. } => ShapeTag::Tolerance,
            ValueShape::Inequality { .. } => ShapeTag::Inequality,
            ValueShape::Range { .. } => ShapeTag::Range,
            ValueShape::NumericUnit(_) => ShapeTag::NumericUnit,
            ValueShape::BooleanLike(_) => ShapeTag::BooleanLike,
        }
    }
}

/// A recognized value plus the untouched input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognized {
    pub shape: ValueShape,
    pub verbatim: String,
}

struct ShapeRecognizer {
    tag: ShapeTag,
    regex: Regex,
    extract: fn(&Captures) -> Option<ValueShape>,
}

/// Ordered catalog of value shapes.
pub struct PatternLibrary {
    recognizers: Vec<ShapeRecognizer>,
    ratio_anywhere: Regex,
    trailing_note: Regex,
    qualifier: Regex,
}

impl std::fmt::Debug for PatternLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternLibrary")
            .field("order", &self.order())
            .finish()
    }
}

impl PatternLibrary {
    pub fn new() -> Result<Self, regex::Error> {
        let cmp = r"(?P<cmp>[<>≤≥]=?|=<|=>|less than|below|up to|greater than|more than|above|max\.?|min\.?)";

        let recognizers = vec![
            ShapeRecognizer {
                tag: ShapeTag::Ratio,
                regex: Regex::new(&format!(
                    r"(?i)^(?P<cmp>[<>≤≥]=?)?\s*(?P<l>{NUM})\s*:\s*(?P<r>{NUM})$"
                ))?,
                extract: extract_ratio,
            },
            ShapeRecognizer {
                tag: ShapeTag::Tolerance,
                regex: Regex::new(&format!(
                    r"(?i)^(?P<c>{NUM})\s*(?P<cu>{UNIT})?\s*(?:±|\+/-|\+/−|\+-)\s*(?P<d>{NUM})\s*(?P<u>{UNIT})?$"
                ))?,
                extract: extract_tolerance,
            },
            ShapeRecognizer {
                tag: ShapeTag::Inequality,
                regex: Regex::new(&format!(r"(?i)^{cmp}\s*(?P<n>{NUM})\s*(?P<u>{UNIT})?$"))?,
                extract: extract_inequality,
            },
            ShapeRecognizer {
                tag: ShapeTag::Range,
                regex: Regex::new(&format!(
                    r"(?i)^(?P<lo>{NUM})\s*(?P<lu>{UNIT})?\s*(?:-|–|—|to|\.\.\.?|~)\s*(?P<hi>{NUM})\s*(?P<u>{UNIT})?$"
                ))?,
                extract: extract_range,
            },
            ShapeRecognizer {
                tag: ShapeTag::NumericUnit,
                regex: Regex::new(&format!(r"(?i)^(?P<n>{NUM})\s*(?P<u>{UNIT})?$"))?,
                extract: extract_numeric,
            },
            ShapeRecognizer {
                tag: ShapeTag::BooleanLike,
                regex: Regex::new(
                    r"(?i)^(?P<b>yes|no|true|false|y|n|n/a|na|none|on|off|included|not included|available|not available|standard|✓|✔|●|✗|✘)$",
                )?,
                extract: extract_boolean,
            },
        ];

        Ok(Self {
            recognizers,
            ratio_anywhere: Regex::new(r"(?:[<>≤≥]=?\s*)?\d+(?:\.\d+)?\s*:\s*\d+(?:\.\d+)?")?,
            trailing_note: Regex::new(r"\s*[\(\[][^\)\]]*[\)\]]\s*$")?,
            qualifier: Regex::new(
                r"(?i)^(?:~|approx\.?|approximately|ca\.|typ\.?|typical(?:ly)?|nominal)\s*|\s*(?:typ\.?|typical|nominal)$",
            )?,
        })
    }

    /// Process-wide library with the built-in recognizers.
    pub fn standard() -> &'static PatternLibrary {
        static LIBRARY: OnceLock<PatternLibrary> = OnceLock::new();
        LIBRARY.get_or_init(|| PatternLibrary::new().expect("built-in shape patterns are valid"))
    }

    /// Evaluation order, most specific first.
    pub fn order(&self) -> Vec<ShapeTag> {
        self.recognizers.iter().map(|r| r.tag).collect()
    }

    /// Recognize `raw` as the first matching shape, in library order.
    pub fn recognize(&self, raw: &str) -> Option<Recognized> {
        let prepared = self.prepare(raw);
        if prepared.is_empty() {
            return None;
        }
        self.recognizers.iter().find_map(|r| {
            let caps = r.regex.captures(&prepared)?;
            let shape = (r.extract)(&caps)?;
            Some(Recognized {
                shape,
                verbatim: raw.to_string(),
            })
        })
    }

    /// Recognize `raw` only as the given shape.
    pub fn recognize_as(&self, tag: ShapeTag, raw: &str) -> Option<ValueShape> {
        let prepared = self.prepare(raw);
        let r = self.recognizers.iter().find(|r| r.tag == tag)?;
        let caps = r.regex.captures(&prepared)?;
        (r.extract)(&caps)
    }

    /// True when `text` reads as a value rather than a label.
    pub fn looks_like_value(&self, text: &str) -> bool {
        matches!(
            self.recognize(text).map(|r| r.shape.tag()),
            Some(tag) if tag != ShapeTag::BooleanLike
        )
    }

    /// Byte spans of every ratio (including a comparator prefix) in free text.
    pub fn ratio_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.ratio_anywhere
            .find_iter(text)
            .map(|m| m.range())
            .collect()
    }

    /// First ratio anywhere in `text`, e.g. the `100:1` in `Linear, >100:1`.
    pub fn find_ratio(&self, text: &str) -> Option<ValueShape> {
        let m = self.ratio_anywhere.find(text)?;
        self.recognize_as(ShapeTag::Ratio, m.as_str())
    }

    /// Strip presentation noise that never changes the value: non-breaking
    /// spaces, a trailing parenthetical note, `typ.`/`approx.` qualifiers.
    fn prepare(&self, raw: &str) -> String {
        let text = raw.replace(['\u{a0}', '\u{202f}'], " ");
        let mut text = text.trim().to_string();
        // a note can itself follow another note: "488 nm (typ.) (1)"
        for _ in 0..2 {
            text = self.trailing_note.replace(&text, "").trim().to_string();
        }
        for _ in 0..2 {
            text = self.qualifier.replace_all(&text, "").trim().to_string();
        }
        text
    }
}

/// Parse a vendor-formatted number (`1,000`, `0,25`, `+60`).
pub fn parse_number(text: &str) -> Option<f64> {
    let t = text.trim();
    let normalized = if t.contains('.') {
        t.replace(',', "")
    } else if let Some((_, tail)) = t.rsplit_once(',') {
        if tail.len() == 3 && tail.chars().all(|c| c.is_ascii_digit()) {
            t.replace(',', "")
        } else {
            t.replacen(',', ".", 1)
        }
    } else {
        t.to_string()
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn quantity(caps: &Captures, num: &str, units: &[&str]) -> Option<Quantity> {
    let value = parse_number(caps.name(num)?.as_str())?;
    let unit_text = units
        .iter()
        .find_map(|u| caps.name(u))
        .map(|m| m.as_str().trim().to_string())
        .filter(|u| !u.is_empty());
    Some(Quantity { value, unit_text })
}

fn extract_ratio(caps: &Captures) -> Option<ValueShape> {
    let l = caps.name("l")?.as_str();
    let r = caps.name("r")?.as_str();
    Some(ValueShape::Ratio {
        comparator: caps.name("cmp").and_then(|m| Comparator::parse(m.as_str())),
        left: parse_number(l)?,
        right: parse_number(r)?,
        text: format!("{}:{}", l.trim(), r.trim()),
    })
}

fn extract_tolerance(caps: &Captures) -> Option<ValueShape> {
    Some(ValueShape::Tolerance {
        center: quantity(caps, "c", &["u", "cu"])?,
        deviation: parse_number(caps.name("d")?.as_str())?.abs(),
    })
}

fn extract_inequality(caps: &Captures) -> Option<ValueShape> {
    Some(ValueShape::Inequality {
        comparator: Comparator::parse(caps.name("cmp")?.as_str())?,
        bound: quantity(caps, "n", &["u"])?,
    })
}

fn extract_range(caps: &Captures) -> Option<ValueShape> {
    let low = quantity(caps, "lo", &["lu", "u"])?;
    let high = quantity(caps, "hi", &["u", "lu"])?;
    Some(ValueShape::Range { low, high })
}

fn extract_numeric(caps: &Captures) -> Option<ValueShape> {
    quantity(caps, "n", &["u"]).map(ValueShape::NumericUnit)
}

fn extract_boolean(caps: &Captures) -> Option<ValueShape> {
    let word = caps.name("b")?.as_str().to_lowercase();
    let truthy = matches!(
        word.as_str(),
        "yes" | "true" | "y" | "on" | "included" | "available" | "standard" | "✓" | "✔" | "●"
    );
    Some(ValueShape::BooleanLike(truthy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lib() -> &'static PatternLibrary {
        PatternLibrary::standard()
    }

    #[test]
    fn order_is_most_specific_first() {
        assert_eq!(
            lib().order(),
            vec![
                ShapeTag::Ratio,
                ShapeTag::Tolerance,
                ShapeTag::Inequality,
                ShapeTag::Range,
                ShapeTag::NumericUnit,
                ShapeTag::BooleanLike,
            ]
        );
    }

    #[test]
    fn tolerance_keeps_center_and_verbatim() {
        let r = lib().recognize("488 ± 2 nm").unwrap();
        assert_eq!(r.verbatim, "488 ± 2 nm");
        match r.shape {
            ValueShape::Tolerance { center, deviation } => {
                assert_relative_eq!(center.value, 488.0);
                assert_relative_eq!(deviation, 2.0);
                assert_eq!(center.unit(), Some(Unit::Nanometer));
            }
            other => panic!("expected tolerance, got {other:?}"),
        }
    }

    #[test]
    fn tolerance_without_unit() {
        let r = lib().recognize("488 ± 2").unwrap();
        assert_eq!(r.shape.tag(), ShapeTag::Tolerance);
    }

    #[test]
    fn inequality_takes_bound() {
        match lib().recognize("< 0.2 %").unwrap().shape {
            ValueShape::Inequality { comparator, bound } => {
                assert_eq!(comparator, Comparator::Lt);
                assert_relative_eq!(bound.value, 0.2);
                assert_eq!(bound.unit(), Some(Unit::Percent));
            }
            other => panic!("expected inequality, got {other:?}"),
        }
    }

    #[test]
    fn qualified_ratio_is_a_ratio_not_an_inequality() {
        match lib().recognize("≥ 100:1").unwrap().shape {
            ValueShape::Ratio {
                comparator, text, ..
            } => {
                assert_eq!(comparator, Some(Comparator::Ge));
                assert_eq!(text, "100:1");
            }
            other => panic!("expected ratio, got {other:?}"),
        }
    }

    #[test]
    fn range_is_not_mistaken_for_negative_number() {
        match lib().recognize("10-45°C").unwrap().shape {
            ValueShape::Range { low, high } => {
                assert_relative_eq!(low.value, 10.0);
                assert_relative_eq!(high.value, 45.0);
                assert_eq!(high.unit(), Some(Unit::Celsius));
                assert_eq!(low.unit(), Some(Unit::Celsius));
            }
            other => panic!("expected range, got {other:?}"),
        }
        assert_eq!(
            lib().recognize("-20 to +60 °C").unwrap().shape.tag(),
            ShapeTag::Range
        );
    }

    #[test]
    fn numeric_with_unit_and_notes() {
        match lib().recognize("100 mW (typ.)").unwrap().shape {
            ValueShape::NumericUnit(q) => {
                assert_relative_eq!(q.value, 100.0);
                assert_eq!(q.unit(), Some(Unit::Milliwatt));
            }
            other => panic!("expected numeric, got {other:?}"),
        }
        match lib().recognize("1,000 mW").unwrap().shape {
            ValueShape::NumericUnit(q) => assert_relative_eq!(q.value, 1000.0),
            other => panic!("expected numeric, got {other:?}"),
        }
    }

    #[test]
    fn boolean_like_text() {
        assert_eq!(
            lib().recognize("Yes").unwrap().shape,
            ValueShape::BooleanLike(true)
        );
        assert_eq!(
            lib().recognize("N/A").unwrap().shape,
            ValueShape::BooleanLike(false)
        );
        assert!(!lib().looks_like_value("Yes"));
        assert!(lib().looks_like_value("405 nm"));
    }

    #[test]
    fn free_text_matches_nothing() {
        assert!(lib().recognize("Linear, vertical").is_none());
        assert!(lib().recognize("").is_none());
    }

    #[test]
    fn ratio_spans_cover_prefixed_ratios() {
        let text = "PER: >100:1";
        let spans = lib().ratio_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].clone()], ">100:1");
    }

    #[test]
    fn decimal_comma_and_thousands() {
        assert_relative_eq!(parse_number("0,25").unwrap(), 0.25);
        assert_relative_eq!(parse_number("1,500").unwrap(), 1500.0);
        assert_relative_eq!(parse_number("+60").unwrap(), 60.0);
    }
}
