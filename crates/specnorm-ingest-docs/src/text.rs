//! Document-text reading: pipe tables and `key: value` lines.
//!
//! Text derived from PDFs keeps tables as markdown-style pipe rows. Empty
//! cells between pipes are kept as empty positions so columns never shift.

use regex::Regex;
use std::sync::OnceLock;

use specnorm_core::PatternLibrary;

use crate::table::SpecTable;

/// Lines at least this long are prose, not `key: value` pairs.
pub const MAX_PAIR_LINE_CHARS: usize = 120;
const MAX_KEY_CHARS: usize = 80;

fn separator_row() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\|?\s*:?-{3,}:?\s*(?:\|\s*:?-{3,}:?\s*)*\|?\s*$")
            .expect("separator pattern is valid")
    })
}

/// Tables and pairs found in a text document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextReading {
    pub tables: Vec<SpecTable>,
    pub pairs: Vec<(String, String)>,
}

pub fn read_text(text: &str) -> TextReading {
    let mut reading = TextReading::default();
    let mut block: Vec<&str> = Vec::new();

    for line in text.lines() {
        if is_pipe_row(line) {
            block.push(line);
            continue;
        }
        if !block.is_empty() {
            reading.tables.extend(pipe_table(&block));
            block.clear();
        }
        if let Some(pair) = split_key_value(line) {
            reading.pairs.push(pair);
        }
    }
    if !block.is_empty() {
        reading.tables.extend(pipe_table(&block));
    }
    reading
}

fn is_pipe_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') || t.matches('|').count() >= 2
}

fn pipe_cells(line: &str) -> Vec<Option<String>> {
    let t = line.trim();
    let t = t.strip_prefix('|').unwrap_or(t);
    let t = t.strip_suffix('|').unwrap_or(t);
    t.split('|')
        .map(|c| {
            let c = c.trim();
            (!c.is_empty()).then(|| c.to_string())
        })
        .collect()
}

fn pipe_table(lines: &[&str]) -> Option<SpecTable> {
    let has_header = lines.get(1).is_some_and(|l| separator_row().is_match(l));
    let mut rows = lines
        .iter()
        .filter(|l| !separator_row().is_match(l))
        .map(|l| pipe_cells(l));

    let header_levels = if has_header {
        let header = rows.next()?;
        vec![header.into_iter().map(Option::unwrap_or_default).collect()]
    } else {
        Vec::new()
    };
    let rows: Vec<Vec<Option<String>>> = rows.collect();
    if rows.is_empty() {
        return None;
    }
    Some(SpecTable {
        header_levels,
        rows,
    })
}

/// Split `key: value` at the first colon that is not inside a ratio.
///
/// `Polarization ratio: >100:1` splits once; `PER >100:1` does not split.
pub fn split_key_value(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.chars().count() >= MAX_PAIR_LINE_CHARS {
        return None;
    }
    let ratios = PatternLibrary::standard().ratio_spans(line);
    let colon = line
        .match_indices(':')
        .map(|(i, _)| i)
        .find(|i| !ratios.iter().any(|r| r.contains(i)))?;

    let key = line[..colon]
        .trim_start_matches(['-', '*', '•', '·', ' '])
        .replace(['*', '#'], "");
    let key = key.trim();
    let value = line[colon + 1..].trim();

    let plausible_key = !key.is_empty()
        && key.chars().count() <= MAX_KEY_CHARS
        && key.chars().any(char::is_alphabetic)
        && !key.to_lowercase().ends_with("http")
        && !key.to_lowercase().ends_with("https");
    if !plausible_key || value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_colon_is_never_a_separator() {
        assert_eq!(
            split_key_value("Polarization ratio: >100:1"),
            Some(("Polarization ratio".into(), ">100:1".into()))
        );
        assert_eq!(split_key_value("PER > 100:1"), None);
        assert_eq!(
            split_key_value("PER: ≥ 50 : 1"),
            Some(("PER".into(), "≥ 50 : 1".into()))
        );
    }

    #[test]
    fn prose_and_urls_are_not_pairs() {
        let long = format!("Note: {}", "very long sentence ".repeat(10));
        assert_eq!(split_key_value(&long), None);
        assert_eq!(split_key_value("see https://example.com/specs"), None);
        assert_eq!(split_key_value("Wavelength:"), None);
        assert_eq!(
            split_key_value("* Output Power: 100 mW"),
            Some(("Output Power".into(), "100 mW".into()))
        );
    }

    #[test]
    fn pipe_table_keeps_empty_cells_in_place() {
        let text = "\
Specifications
| Parameter | LBX-405 | LBX-488 |
|-----------|---------|---------|
| Wavelength | 405 nm | 488 nm |
| Power | | 50 mW |

Warm-up time: 5 min";
        let reading = read_text(text);
        assert_eq!(reading.tables.len(), 1);
        let table = &reading.tables[0];
        assert_eq!(table.header_levels[0], vec!["Parameter", "LBX-405", "LBX-488"]);
        assert_eq!(
            table.rows[1],
            vec![Some("Power".to_string()), None, Some("50 mW".to_string())]
        );
        assert_eq!(
            reading.pairs,
            vec![("Warm-up time".to_string(), "5 min".to_string())]
        );
    }

    #[test]
    fn pipe_rows_without_separator_have_no_header() {
        let reading = read_text("| Wavelength | 405 nm |\n| Power | 50 mW |");
        assert_eq!(reading.tables.len(), 1);
        assert!(reading.tables[0].header_levels.is_empty());
        assert_eq!(reading.tables[0].rows.len(), 2);
    }
}
