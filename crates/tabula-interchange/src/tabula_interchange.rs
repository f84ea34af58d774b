//! Tabula Interchange - Workbook output
//!
//! Turns an [`ExportSheet`](tabula_grid::ExportSheet) produced by the grid's
//! export encoder into an `.xlsx` file with typed cells: numbers stay
//! numbers, dates and date-times carry a date format, booleans stay
//! booleans.

mod xlsx_export;

pub use xlsx_export::{ExportError, XlsxExporter, sheet_name};
