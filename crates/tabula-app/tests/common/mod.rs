//! Common test utilities

#![allow(dead_code)]

use std::path::PathBuf;
use tabula_app::cli::BrowseArgs;

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("invoices.json")
}

pub fn browse_args() -> BrowseArgs {
    BrowseArgs {
        fixture: fixture_path(),
        view: None,
        saved_filter: None,
        filters: Vec::new(),
        sort: None,
        desc: false,
        limit: None,
    }
}

/// Cells of every content line of a rendered table, header first
pub fn table_cells(output: &str) -> Vec<Vec<String>> {
    output
        .lines()
        .filter(|line| line.starts_with('│'))
        .map(|line| {
            line.trim_start_matches('│')
                .trim_end_matches('│')
                .split('┆')
                .map(|cell| cell.trim().to_string())
                .collect()
        })
        .collect()
}

/// Cells of the data rows of a rendered table
pub fn data_rows(output: &str) -> Vec<Vec<String>> {
    table_cells(output).into_iter().skip(1).collect()
}

/// Display text of the first column of every data row
pub fn first_column(output: &str) -> Vec<String> {
    data_rows(output)
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .collect()
}
