//! Output formatting for tabular results.
//!
//! Results travel as JSON by default; `table` renders an ASCII grid in the
//! style of `impala-shell` and `markdown` a pipe table.

use crate::models::ColumnMetadata;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// How `execute_query` renders a row set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured columns and rows
    #[default]
    Json,
    /// ASCII grid, as printed by impala-shell
    Table,
    /// GitHub-flavoured pipe table
    Markdown,
}

/// Text for a single value. NULL is spelled out, nested values stay JSON.
pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".into(),
        JsonValue::String(text) => text.clone(),
        JsonValue::Bool(_) | JsonValue::Number(_) => value.to_string(),
        nested => serde_json::to_string(nested).unwrap_or_default(),
    }
}

struct Cell {
    text: String,
    numeric: bool,
}

/// Row set flattened to text, one cell per column. Short rows are padded with NULL.
struct Grid<'a> {
    headers: Vec<&'a str>,
    body: Vec<Vec<Cell>>,
}

impl<'a> Grid<'a> {
    fn new(columns: &'a [ColumnMetadata], rows: &[Vec<JsonValue>]) -> Self {
        let body = rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| {
                        let value = row.get(i).unwrap_or(&JsonValue::Null);
                        Cell {
                            text: format_value(value),
                            numeric: value.is_number(),
                        }
                    })
                    .collect()
            })
            .collect();
        Self {
            headers: columns.iter().map(|c| c.name.as_str()).collect(),
            body,
        }
    }

    /// Display width of each column, header included.
    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.body
                    .iter()
                    .map(|cells| cells[i].text.width())
                    .fold(header.width(), usize::max)
            })
            .collect()
    }
}

fn boxed_line<I: IntoIterator<Item = String>>(cells: I) -> String {
    let mut line: String = cells.into_iter().map(|c| format!("| {} ", c)).collect();
    line.push_str("|\n");
    line
}

pub fn format_as_table(
    columns: &[ColumnMetadata],
    rows: &[Vec<JsonValue>],
    truncated: bool,
    execution_time_ms: u64,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let grid = Grid::new(columns, rows);
    let widths = grid.widths();
    let mut rule: String = widths.iter().map(|w| format!("+{}", "-".repeat(w + 2))).collect();
    rule.push_str("+\n");

    let mut out = rule.clone();
    out += &boxed_line(grid.headers.iter().zip(&widths).map(|(h, w)| pad_center(h, *w)));
    out += &rule;
    for cells in &grid.body {
        // numbers right-aligned
        out += &boxed_line(cells.iter().zip(&widths).map(|(cell, w)| {
            if cell.numeric {
                pad_left(&cell.text, *w)
            } else {
                pad_right(&cell.text, *w)
            }
        }));
    }
    out += &rule;

    out += &format!(
        "Fetched {} {}{} in {:.2}s\n",
        rows.len(),
        if rows.len() == 1 { "row" } else { "rows" },
        if truncated { " (truncated)" } else { "" },
        execution_time_ms as f64 / 1000.0
    );
    out
}

pub fn format_as_markdown(
    columns: &[ColumnMetadata],
    rows: &[Vec<JsonValue>],
    truncated: bool,
) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let grid = Grid::new(columns, rows);
    let mut out = boxed_line(grid.headers.iter().map(|h| escape_markdown(h)));
    out += &"|---".repeat(grid.headers.len());
    out.push_str("|\n");
    for cells in &grid.body {
        out += &boxed_line(cells.iter().map(|c| escape_markdown(&c.text)));
    }

    out += &format!("\n*{} rows*", rows.len());
    if truncated {
        out.push_str(" *(truncated)*");
    }
    out
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

// `format!` padding counts chars, not display columns.

fn pad_right(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(fill))
}

fn pad_left(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{}{text}", " ".repeat(fill))
}

fn pad_center(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    let before = fill / 2;
    format!("{}{text}{}", " ".repeat(before), " ".repeat(fill - before))
}
