//! Markup reading (untrusted HTML).
//!
//! Tables are expanded into a full grid: a cell spanning `colspan` columns or
//! `rowspan` rows occupies every position it covers, so column indices keep
//! their identity even around merged cells.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

use crate::table::SpecTable;

/// Upper bound on a single span; larger values are vendor markup bugs.
const MAX_SPAN: usize = 64;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkupReading {
    pub tables: Vec<SpecTable>,
    /// `<dt>`/`<dd>` pairs in document order.
    pub definitions: Vec<(String, String)>,
    /// Visible text, one text node per line.
    pub text: String,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse(&el.text().collect::<Vec<_>>().join(" "))
}

fn span_attr(el: ElementRef<'_>, name: &str) -> usize {
    el.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

pub fn read_markup(html: &str) -> MarkupReading {
    let doc = Html::parse_document(html);
    MarkupReading {
        tables: read_tables(&doc),
        definitions: read_definitions(&doc),
        text: visible_text(&doc),
    }
}

fn read_tables(doc: &Html) -> Vec<SpecTable> {
    let (Some(tables), Some(rows)) = (selector("table"), selector("tr")) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for table in doc.select(&tables) {
        // rows of nested tables belong to those tables
        let own_rows: Vec<ElementRef<'_>> = table
            .select(&rows)
            .filter(|tr| nearest_table(*tr).map(|t| t.id()) == Some(table.id()))
            .collect();
        if let Some(grid) = table_grid(&own_rows) {
            out.push(grid);
        }
    }
    out
}

fn nearest_table(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

fn is_header_row(tr: ElementRef<'_>) -> bool {
    let in_thead = tr
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "thead");
    let mut cells = tr
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "th" | "td"))
        .peekable();
    in_thead || (cells.peek().is_some() && cells.all(|c| c.value().name() == "th"))
}

fn table_grid(rows: &[ElementRef<'_>]) -> Option<SpecTable> {
    // column → (rows still covered, text)
    let mut carried: BTreeMap<usize, (usize, Option<String>)> = BTreeMap::new();
    let mut header_levels: Vec<Vec<String>> = Vec::new();
    let mut body: Vec<Vec<Option<String>>> = Vec::new();

    for tr in rows {
        let mut row: Vec<Option<String>> = Vec::new();
        let take_carried = |row: &mut Vec<Option<String>>,
                            carried: &mut BTreeMap<usize, (usize, Option<String>)>| {
            while let Some((left, text)) = carried.get_mut(&row.len()) {
                row.push(text.clone());
                *left -= 1;
                if *left == 0 {
                    carried.remove(&(row.len() - 1));
                }
            }
        };

        for cell in tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "th" | "td"))
        {
            take_carried(&mut row, &mut carried);
            let text = element_text(cell);
            let text = (!text.is_empty()).then_some(text);
            let colspan = span_attr(cell, "colspan");
            let rowspan = span_attr(cell, "rowspan");
            for _ in 0..colspan {
                if rowspan > 1 {
                    carried.insert(row.len(), (rowspan - 1, text.clone()));
                }
                row.push(text.clone());
            }
        }
        take_carried(&mut row, &mut carried);

        if row.is_empty() {
            continue;
        }
        if body.is_empty() && is_header_row(*tr) {
            header_levels.push(row.into_iter().map(Option::unwrap_or_default).collect());
        } else {
            body.push(row);
        }
    }

    if header_levels.is_empty() && body.is_empty() {
        return None;
    }

    // spans can leave header levels ragged; pad on the right
    let width = header_levels.iter().map(Vec::len).max().unwrap_or(0);
    for level in &mut header_levels {
        level.resize(width, String::new());
    }

    Some(SpecTable {
        header_levels,
        rows: body,
    })
}

fn read_definitions(doc: &Html) -> Vec<(String, String)> {
    let Some(lists) = selector("dl") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for dl in doc.select(&lists) {
        let mut term: Option<String> = None;
        for child in dl.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "dt" => term = Some(element_text(child)),
                "dd" => {
                    let value = element_text(child);
                    if let Some(key) = term.as_ref().filter(|k| !k.is_empty()) {
                        if !value.is_empty() {
                            out.push((key.clone(), value));
                        }
                    }
                }
                _ => {}
            }
        }
    }
    out
}

fn visible_text(doc: &Html) -> String {
    let Some(body_sel) = selector("body") else {
        return String::new();
    };
    let Some(body) = doc.select(&body_sel).next() else {
        return String::new();
    };

    let mut out = String::new();
    for node in body.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
        });
        if hidden {
            continue;
        }
        let s = collapse(text);
        if s.is_empty() {
            continue;
        }
        out.push_str(&s);
        out.push('\n');
    }
    out
}
