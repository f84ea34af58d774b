//! Export encoder: turns an unbounded query result into a single sheet

use crate::registry::TypeRegistry;
use chrono::{NaiveDate, NaiveDateTime};
use tabula_core::{QueryResponse, Schema, Value, ViewSpec};

/// One spreadsheet cell
#[derive(Debug, Clone, PartialEq)]
pub enum ExportCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// A single-sheet workbook ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSheet {
    /// File name, `<date> - <view name>.xlsx`
    pub file_name: String,
    /// Sheet title (the view name)
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<ExportCell>>,
}

/// `2024-01-03 - Open invoices.xlsx`
pub fn export_file_name(date: NaiveDate, view_name: &str) -> String {
    format!("{} - {}.xlsx", date.format("%Y-%m-%d"), view_name)
}

/// Convert every cell of `response` through the registry.
///
/// Rows are positional against the view's columns; columns whose kind is
/// unknown export their raw text.
pub fn encode_sheet(
    registry: &TypeRegistry,
    schema: &Schema,
    table: &str,
    view: &ViewSpec,
    response: &QueryResponse,
    date: NaiveDate,
) -> ExportSheet {
    let kinds: Vec<_> = view
        .columns
        .iter()
        .map(|column| schema.resolve(table, view.segment(), &column.column))
        .collect();

    let rows = response
        .rows
        .iter()
        .map(|row| {
            kinds
                .iter()
                .zip(row.iter().chain(std::iter::repeat(&Value::Null)))
                .map(|(kind, value)| match kind {
                    Some(kind) => registry.export_cell(kind, value),
                    None if value.is_null() => ExportCell::Empty,
                    None => ExportCell::Text(value.to_text()),
                })
                .collect()
        })
        .collect::<Vec<Vec<ExportCell>>>();

    tracing::info!(view = %view.name, rows = rows.len(), "encoded export sheet");

    ExportSheet {
        file_name: export_file_name(date, &view.name),
        title: view.name.clone(),
        headers: view.columns.iter().map(|column| column.name.clone()).collect(),
        rows,
    }
}
