//! TableExtractor: position-stable cells and raw specs from a segmented table.
//!
//! A [`SpecTable`] is already a grid: every body row is indexed by column, and
//! empty positions are `None` (or blank text). Cells are never shifted to fill
//! a gap, so a value always belongs to the header of the column it sits in.
//!
//! Layouts recognized when turning cells into raw specs:
//!
//! ```text
//!   KeyValue      | Parameter   | Value  | Unit |   key = row label (+ qualifier)
//!   ModelColumns  | Parameter   | LBX-405 | LBX-488 |   one record per column
//!   ModelRows     | Model | Wavelength | Power |   one record per row
//!   RecordRows    | Wavelength | Power |   column-0 cells are values
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use specnorm_core::{PatternLibrary, RawSpecMap, RawValue, SpecCell};

use crate::models::clean_model_token;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("no header row and {width} columns; cannot tell labels from values")]
    NoHeader { width: usize },

    #[error("header level {level} has {found} columns, expected {expected}")]
    MisalignedHeaders {
        level: usize,
        found: usize,
        expected: usize,
    },

    #[error("all {width} column headers are blank")]
    BlankHeaders { width: usize },
}

/// A table already segmented from its source format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecTable {
    /// Header rows, outermost first. May be empty.
    pub header_levels: Vec<Vec<String>>,
    /// Body rows by column index; `None` is an empty cell.
    pub rows: Vec<Vec<Option<String>>>,
}

impl SpecTable {
    pub fn new(header: Vec<&str>, rows: Vec<Vec<Option<&str>>>) -> Self {
        Self {
            header_levels: vec![header.into_iter().map(str::to_string).collect()],
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.header_levels
            .iter()
            .map(Vec::len)
            .chain(self.rows.iter().map(Vec::len))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    KeyValue,
    ModelColumns,
    ModelRows,
    RecordRows,
}

/// Everything read from one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableReading {
    pub layout: TableLayout,
    pub headers: Vec<String>,
    pub cells: Vec<SpecCell>,
    pub specs: RawSpecMap,
    pub models: BTreeMap<String, RawSpecMap>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    /// Bare placeholder: "Parameter", "Value", "Specification".
    Generic,
    /// Min/Typ/Max style; combines with the row label.
    Qualifier(Qualifier),
    Unit,
    Note,
    Named,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Qualifier {
    Min,
    Typ,
    Max,
}

const GENERIC_HEADERS: &[&str] = &[
    "",
    "parameter",
    "parameters",
    "specification",
    "specifications",
    "spec",
    "specs",
    "feature",
    "features",
    "characteristic",
    "characteristics",
    "property",
    "properties",
    "value",
    "values",
    "data",
    "description",
];

const MODEL_HEADERS: &[&str] = &[
    "model",
    "models",
    "part number",
    "part no",
    "p/n",
    "product",
    "sku",
    "order code",
    "version",
];

fn normalize_header(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', ':'])
        .to_lowercase()
}

fn is_generic(text: &str) -> bool {
    GENERIC_HEADERS.contains(&normalize_header(text).as_str())
}

fn is_model_header(text: &str) -> bool {
    MODEL_HEADERS.contains(&normalize_header(text).as_str())
}

fn classify(header: &str) -> ColumnRole {
    let h = normalize_header(header);
    match h.as_str() {
        "min" | "minimum" => ColumnRole::Qualifier(Qualifier::Min),
        "typ" | "typical" | "nominal" => ColumnRole::Qualifier(Qualifier::Typ),
        "max" | "maximum" => ColumnRole::Qualifier(Qualifier::Max),
        "unit" | "units" => ColumnRole::Unit,
        "note" | "notes" | "remark" | "remarks" | "comment" | "comments" | "condition"
        | "conditions" => ColumnRole::Note,
        _ if GENERIC_HEADERS.contains(&h.as_str()) => ColumnRole::Generic,
        _ => ColumnRole::Named,
    }
}

fn cell_text(cell: Option<&Option<String>>) -> Option<&str> {
    let text = cell?.as_deref()?.trim();
    match text {
        "" | "-" | "–" | "—" => None,
        t => Some(t),
    }
}

pub struct TableExtractor {
    patterns: &'static PatternLibrary,
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TableExtractor {
    pub fn new() -> Self {
        Self {
            patterns: PatternLibrary::standard(),
        }
    }

    /// Flattened header per column, and the index of the first body row.
    ///
    /// A headerless table of one or two columns is read as label/value pairs;
    /// a wider one borrows its first row as header when that row holds no values.
    fn headers(&self, table: &SpecTable) -> Result<(Vec<String>, usize), TableError> {
        let width = table.width();

        if table.header_levels.is_empty() {
            if width <= 2 {
                return Ok((vec![String::new(); width], 0));
            }
            let first = table.rows.first().ok_or(TableError::NoHeader { width })?;
            let holds_values = first
                .iter()
                .skip(1)
                .filter_map(|c| cell_text(Some(c)))
                .any(|t| self.patterns.looks_like_value(t));
            if holds_values {
                return Err(TableError::NoHeader { width });
            }
            let promoted: Vec<String> = (0..width)
                .map(|c| cell_text(first.get(c)).unwrap_or_default().to_string())
                .collect();
            self.check_labels(&promoted)?;
            return Ok((promoted, 1));
        }

        let expected = table.header_levels[0].len();
        for (level, labels) in table.header_levels.iter().enumerate() {
            if labels.len() != expected {
                return Err(TableError::MisalignedHeaders {
                    level,
                    found: labels.len(),
                    expected,
                });
            }
        }

        let flattened: Vec<String> = (0..expected)
            .map(|col| {
                let mut parts: Vec<&str> = Vec::new();
                for level in &table.header_levels {
                    let label = level[col].trim();
                    if !label.is_empty() && parts.last() != Some(&label) {
                        parts.push(label);
                    }
                }
                parts.join(" ")
            })
            .collect();
        self.check_labels(&flattened)?;
        Ok((flattened, 0))
    }

    fn check_labels(&self, headers: &[String]) -> Result<(), TableError> {
        if headers.len() > 2 && headers.iter().all(|h| h.trim().is_empty()) {
            return Err(TableError::BlankHeaders {
                width: headers.len(),
            });
        }
        Ok(())
    }

    /// Every non-empty body cell with its true row/column and header. Text
    /// beyond the last header column is dropped; see [`Self::read`].
    pub fn cells(&self, table: &SpecTable) -> Result<Vec<SpecCell>, TableError> {
        self.scan(table).map(|(cells, _)| cells)
    }

    /// In-range cells, plus a warning per cell past the header width.
    fn scan(&self, table: &SpecTable) -> Result<(Vec<SpecCell>, Vec<String>), TableError> {
        let (headers, first_row) = self.headers(table)?;
        let width = headers.len();

        let mut cells = Vec::new();
        let mut skipped = Vec::new();
        for (row, cols) in table.rows.iter().enumerate().skip(first_row) {
            for col in 0..cols.len() {
                let Some(text) = cell_text(cols.get(col)) else {
                    continue;
                };
                if col >= width {
                    tracing::debug!(row, col, width, "cell beyond header width skipped");
                    skipped.push(format!(
                        "row {row} has text in column {col}, beyond the {width} header columns; cell skipped"
                    ));
                    continue;
                }
                cells.push(SpecCell {
                    row,
                    col,
                    header: headers[col].clone(),
                    text: text.to_string(),
                });
            }
        }
        Ok((cells, skipped))
    }

    /// Cells plus the raw spec map(s) they encode.
    pub fn read(&self, table: &SpecTable) -> Result<TableReading, TableError> {
        let (headers, _) = self.headers(table)?;
        let (cells, skipped) = self.scan(table)?;
        let layout = self.layout(&headers, &cells);

        let mut reading = TableReading {
            layout,
            headers,
            cells: Vec::new(),
            specs: RawSpecMap::new(),
            models: BTreeMap::new(),
            warnings: skipped,
        };

        // group by row, keeping column positions
        let mut rows: BTreeMap<usize, BTreeMap<usize, &SpecCell>> = BTreeMap::new();
        for cell in &cells {
            rows.entry(cell.row).or_default().insert(cell.col, cell);
        }

        for (row, cols) in &rows {
            match layout {
                TableLayout::KeyValue => self.read_key_value(&mut reading, cols),
                TableLayout::ModelColumns => self.read_model_columns(&mut reading, cols),
                TableLayout::ModelRows => self.read_model_rows(&mut reading, *row, cols),
                TableLayout::RecordRows => self.read_record_row(&mut reading, cols),
            }
        }

        reading.cells = cells;
        Ok(reading)
    }

    fn layout(&self, headers: &[String], cells: &[SpecCell]) -> TableLayout {
        if headers.first().is_some_and(|h| is_model_header(h)) {
            return TableLayout::ModelRows;
        }

        let first_header_named = headers
            .first()
            .is_some_and(|h| classify(h) == ColumnRole::Named);
        let mut labels = cells.iter().filter(|c| c.col == 0).peekable();
        if first_header_named
            && labels.peek().is_some()
            && labels.all(|c| self.patterns.looks_like_value(&c.text))
        {
            return TableLayout::RecordRows;
        }

        let named = headers
            .iter()
            .skip(1)
            .filter(|h| classify(h) == ColumnRole::Named)
            .count();
        if named >= 2 {
            return TableLayout::ModelColumns;
        }
        TableLayout::KeyValue
    }

    fn row_label<'a>(&self, cols: &BTreeMap<usize, &'a SpecCell>) -> Option<&'a str> {
        let cell: &'a SpecCell = cols.get(&0)?;
        let label = cell.text.as_str();
        // repeated header rows inside the body
        if is_generic(label) {
            return None;
        }
        Some(label)
    }

    fn read_key_value(&self, reading: &mut TableReading, cols: &BTreeMap<usize, &SpecCell>) {
        let Some(label) = self.row_label(cols) else {
            return;
        };
        let unit = cols
            .values()
            .find(|c| classify(&c.header) == ColumnRole::Unit)
            .map(|c| c.text.as_str());

        let mut row_values: BTreeMap<String, RawValue> = BTreeMap::new();
        for cell in cols.values().filter(|c| c.col > 0) {
            let key = match classify(&cell.header) {
                ColumnRole::Unit | ColumnRole::Note => continue,
                ColumnRole::Generic | ColumnRole::Named => label.to_string(),
                ColumnRole::Qualifier(Qualifier::Typ) => label.to_string(),
                ColumnRole::Qualifier(Qualifier::Min) => format!("min {label}"),
                ColumnRole::Qualifier(Qualifier::Max) => format!("max {label}"),
            };
            let value = match unit {
                Some(u) if !cell.text.ends_with(u) => format!("{} {u}", cell.text),
                _ => cell.text.clone(),
            };
            match row_values.get_mut(&key) {
                Some(existing) => existing.push(value),
                None => {
                    row_values.insert(key, RawValue::Single(value));
                }
            }
        }
        for (key, value) in row_values {
            reading.specs.insert(&key, value);
        }
    }

    fn read_model_columns(&self, reading: &mut TableReading, cols: &BTreeMap<usize, &SpecCell>) {
        let Some(label) = self.row_label(cols) else {
            return;
        };
        for cell in cols.values().filter(|c| c.col > 0) {
            match classify(&cell.header) {
                ColumnRole::Named => {
                    let model = clean_model_token(&cell.header);
                    reading
                        .models
                        .entry(model)
                        .or_default()
                        .insert(label, cell.text.as_str());
                }
                ColumnRole::Generic | ColumnRole::Qualifier(_) => {
                    reading.specs.insert(label, cell.text.as_str());
                }
                ColumnRole::Unit | ColumnRole::Note => {}
            }
        }
    }

    fn read_model_rows(
        &self,
        reading: &mut TableReading,
        row: usize,
        cols: &BTreeMap<usize, &SpecCell>,
    ) {
        let Some(model) = cols.get(&0).map(|c| clean_model_token(&c.text)) else {
            reading
                .warnings
                .push(format!("row {row}: no model name in first column"));
            return;
        };
        if model.is_empty() || is_model_header(&model) {
            return;
        }
        let specs = reading.models.entry(model).or_default();
        for cell in cols.values().filter(|c| c.col > 0) {
            if matches!(classify(&cell.header), ColumnRole::Named | ColumnRole::Qualifier(_)) {
                specs.insert(&cell.header, cell.text.as_str());
            }
        }
    }

    fn read_record_row(&self, reading: &mut TableReading, cols: &BTreeMap<usize, &SpecCell>) {
        for cell in cols.values() {
            if classify(&cell.header) == ColumnRole::Named {
                reading.specs.append(&cell.header, cell.text.clone());
            }
        }
    }

    /// Read every table of a document independently; a table that cannot be
    /// interpreted contributes nothing and a warning. Later tables override.
    pub fn read_all(&self, tables: &[SpecTable]) -> TablesSummary {
        let mut summary = TablesSummary::default();
        for (index, table) in tables.iter().enumerate() {
            match self.read(table) {
                Ok(reading) => {
                    summary.cells += reading.cells.len();
                    summary.specs.merge_from(&reading.specs);
                    for (model, specs) in reading.models {
                        summary.models.entry(model).or_default().merge_from(&specs);
                    }
                    summary.warnings.extend(
                        reading
                            .warnings
                            .into_iter()
                            .map(|w| format!("table {index}: {w}")),
                    );
                }
                Err(err) => {
                    tracing::warn!(table = index, error = %err, "table structure unrecognized");
                    summary.warnings.push(format!("table {index}: {err}"));
                }
            }
        }
        summary
    }
}

/// Union of all tables in one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TablesSummary {
    pub cells: usize,
    pub specs: RawSpecMap,
    pub models: BTreeMap<String, RawSpecMap>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TableExtractor {
        TableExtractor::new()
    }

    #[test]
    fn empty_cell_is_skipped_not_shifted() {
        let table = SpecTable::new(
            vec!["Parameter", "LBX-405", "LBX-488"],
            vec![
                vec![Some("Wavelength"), Some("405 nm"), Some("488 nm")],
                vec![Some("Output power"), None, Some("50 mW")],
                vec![Some("Noise"), Some("< 0.2 %"), Some("< 0.3 %")],
            ],
        );
        let cells = extractor().cells(&table).unwrap();
        assert_eq!(cells.len(), 8);
        let power = cells.iter().find(|c| c.text == "50 mW").unwrap();
        assert_eq!((power.row, power.col), (1, 2));
        assert_eq!(power.header, "LBX-488");
    }

    #[test]
    fn key_value_table_with_generic_header() {
        let table = SpecTable::new(
            vec!["Specification", "Value"],
            vec![
                vec![Some("Wavelength (nm)"), Some("488 ± 2")],
                vec![Some("PER"), Some(">100:1")],
            ],
        );
        let reading = extractor().read(&table).unwrap();
        assert_eq!(reading.layout, TableLayout::KeyValue);
        assert_eq!(
            reading.specs.get("wavelength").unwrap().value,
            RawValue::from("488 ± 2")
        );
        assert_eq!(reading.specs.get("per").unwrap().value, RawValue::from(">100:1"));
        assert!(reading.specs.get("value").is_none());
        assert!(reading.specs.get("specification").is_none());
    }

    #[test]
    fn qualifier_columns_combine_with_label() {
        let table = SpecTable::new(
            vec!["Parameter", "Min", "Typ", "Max", "Unit"],
            vec![vec![
                Some("Output power"),
                Some("90"),
                Some("100"),
                None,
                Some("mW"),
            ]],
        );
        let reading = extractor().read(&table).unwrap();
        assert_eq!(
            reading.specs.get("min output power").unwrap().value,
            RawValue::from("90 mW")
        );
        assert_eq!(
            reading.specs.get("output power").unwrap().value,
            RawValue::from("100 mW")
        );
        assert!(reading.specs.get("max output power").is_none());
    }

    #[test]
    fn model_columns_become_records() {
        let table = SpecTable::new(
            vec!["Parameter", "LBX-405", "LBX-488"],
            vec![
                vec![Some("Wavelength"), Some("405 nm"), Some("488 nm")],
                vec![Some("Output power"), None, Some("50 mW")],
            ],
        );
        let reading = extractor().read(&table).unwrap();
        assert_eq!(reading.layout, TableLayout::ModelColumns);
        assert_eq!(reading.models.len(), 2);
        let lbx405 = &reading.models["LBX-405"];
        assert_eq!(lbx405.len(), 1);
        assert_eq!(
            reading.models["LBX-488"].get("output power").unwrap().value,
            RawValue::from("50 mW")
        );
    }

    #[test]
    fn model_rows_become_records() {
        let table = SpecTable::new(
            vec!["Model", "Wavelength", "Power"],
            vec![
                vec![Some("OBIS 405 LX"), Some("405 nm"), Some("100 mW")],
                vec![Some("OBIS 488 LX"), Some("488 nm"), Some("150 mW")],
            ],
        );
        let reading = extractor().read(&table).unwrap();
        assert_eq!(reading.layout, TableLayout::ModelRows);
        assert_eq!(
            reading.models["OBIS 488 LX"].get("power").unwrap().value,
            RawValue::from("150 mW")
        );
    }

    #[test]
    fn record_rows_collect_value_lists() {
        let table = SpecTable::new(
            vec!["Wavelength", "Power", "Noise"],
            vec![
                vec![Some("405 nm"), Some("100 mW"), Some("<0.2%")],
                vec![Some("488 nm"), Some("150 mW"), None],
            ],
        );
        let reading = extractor().read(&table).unwrap();
        assert_eq!(reading.layout, TableLayout::RecordRows);
        assert_eq!(
            reading.specs.get("wavelength").unwrap().value,
            RawValue::Multi(vec!["405 nm".into(), "488 nm".into()])
        );
        assert_eq!(reading.specs.get("noise").unwrap().value, RawValue::from("<0.2%"));
    }

    #[test]
    fn repeated_placeholder_row_is_skipped() {
        let table = SpecTable::new(
            vec!["Parameter", "Value"],
            vec![
                vec![Some("Parameter"), Some("Value")],
                vec![Some("Wavelength"), Some("405 nm")],
            ],
        );
        let reading = extractor().read(&table).unwrap();
        assert_eq!(reading.specs.len(), 1);
    }

    #[test]
    fn multi_level_headers_flatten_by_column() {
        let table = SpecTable {
            header_levels: vec![
                vec!["".into(), "Output power".into(), "Output power".into()],
                vec!["Parameter".into(), "Min".into(), "Max".into()],
            ],
            rows: vec![vec![Some("Laser".into()), Some("1".into()), Some("2".into())]],
        };
        let cells = extractor().cells(&table).unwrap();
        assert_eq!(cells[1].header, "Output power Min");
        assert_eq!(cells[2].header, "Output power Max");
    }

    #[test]
    fn uninterpretable_headers_yield_no_cells() {
        let blank = SpecTable::new(
            vec!["", "", ""],
            vec![vec![Some("a"), Some("b"), Some("c")]],
        );
        assert!(matches!(
            extractor().cells(&blank),
            Err(TableError::BlankHeaders { .. })
        ));

        let misaligned = SpecTable {
            header_levels: vec![vec!["A".into(), "B".into()], vec!["C".into()]],
            rows: vec![],
        };
        assert!(matches!(
            extractor().cells(&misaligned),
            Err(TableError::MisalignedHeaders { .. })
        ));

    }

    #[test]
    fn stray_cell_past_header_is_skipped_not_fatal() {
        let table = SpecTable::new(
            vec!["Parameter", "Value"],
            vec![
                vec![Some("Wavelength"), Some("488 nm")],
                vec![Some("Output power"), Some("100 mW")],
                vec![Some("Beam diameter"), Some("0.7 mm"), Some("1)")],
            ],
        );
        let reading = extractor().read(&table).unwrap();
        assert_eq!(reading.layout, TableLayout::KeyValue);
        assert_eq!(reading.specs.len(), 3);
        assert_eq!(
            reading.specs.get("beam diameter").unwrap().value,
            RawValue::from("0.7 mm")
        );
        assert_eq!(reading.cells.len(), 6);
        assert!(reading.cells.iter().all(|c| c.col < 2));
        assert_eq!(reading.warnings.len(), 1);
        assert!(reading.warnings[0].contains("column 2"));
    }

    #[test]
    fn headerless_two_column_table_is_key_value() {
        let table = SpecTable {
            header_levels: vec![],
            rows: vec![vec![Some("Wavelength".into()), Some("405 nm".into())]],
        };
        let reading = extractor().read(&table).unwrap();
        assert_eq!(reading.specs.len(), 1);
    }

    #[test]
    fn later_tables_override_and_bad_tables_only_warn() {
        let first = SpecTable::new(
            vec!["Parameter", "Value"],
            vec![
                vec![Some("Wavelength"), Some("405 nm")],
                vec![Some("Power"), Some("50 mW")],
            ],
        );
        let broken = SpecTable::new(vec!["", "", ""], vec![vec![Some("x"), None, None]]);
        let second = SpecTable::new(
            vec!["Parameter", "Value"],
            vec![vec![Some("Power"), Some("100 mW")]],
        );
        let summary = extractor().read_all(&[first, broken, second]);
        assert_eq!(summary.specs.len(), 2);
        assert_eq!(summary.specs.get("power").unwrap().value, RawValue::from("100 mW"));
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.cells, 6);
    }
}
