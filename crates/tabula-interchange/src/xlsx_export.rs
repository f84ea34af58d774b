//! XLSX writer for export sheets

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::path::{Path, PathBuf};
use tabula_grid::{ExportCell, ExportSheet};
use thiserror::Error;

/// Longest sheet name Excel accepts
const MAX_SHEET_NAME: usize = 31;

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Errors while writing a workbook
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Workbook error: {0}")]
    Workbook(#[from] XlsxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A sheet title Excel accepts: forbidden characters replaced, at most 31
/// characters, never empty
pub fn sheet_name(title: &str) -> String {
    let name: String = title
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME)
        .collect();
    let name = name.trim_matches('\'').trim();
    if name.is_empty() {
        "Export".to_string()
    } else {
        name.to_string()
    }
}

/// Writes export sheets as `.xlsx` files into one directory
#[derive(Debug, Clone)]
pub struct XlsxExporter {
    output_dir: PathBuf,
}

impl XlsxExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where `sheet` will be written
    pub fn path_for(&self, sheet: &ExportSheet) -> PathBuf {
        let file_name: String = sheet
            .file_name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '-' } else { c })
            .collect();
        self.output_dir.join(file_name)
    }

    /// Write `sheet` and return the file's path
    #[tracing::instrument(skip(self, sheet), fields(title = %sheet.title, rows = sheet.rows.len()))]
    pub fn write(&self, sheet: &ExportSheet) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.path_for(sheet);

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name(&sheet.title))?;
        write_sheet(worksheet, sheet)?;
        workbook.save(&path)?;

        tracing::info!(path = %path.display(), "wrote workbook");
        Ok(path)
    }
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &ExportSheet) -> Result<(), XlsxError> {
    let header = Format::new().set_bold();
    let date = Format::new().set_num_format(DATE_FORMAT);
    let datetime = Format::new().set_num_format(DATETIME_FORMAT);

    for (col, title) in sheet.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, title, &header)?;
    }

    for (index, cells) in sheet.rows.iter().enumerate() {
        let row = index as u32 + 1;
        for (col, cell) in cells.iter().enumerate() {
            let col = col as u16;
            match cell {
                ExportCell::Empty => {}
                ExportCell::Text(text) => {
                    worksheet.write_string(row, col, text)?;
                }
                ExportCell::Number(number) => {
                    worksheet.write_number(row, col, *number)?;
                }
                ExportCell::Bool(value) => {
                    worksheet.write_boolean(row, col, *value)?;
                }
                ExportCell::Date(value) => {
                    worksheet.write_datetime_with_format(row, col, value, &date)?;
                }
                ExportCell::DateTime(value) => {
                    worksheet.write_datetime_with_format(row, col, value, &datetime)?;
                }
            }
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();
    Ok(())
}
