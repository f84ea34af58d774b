//! Command-line interface

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tabula", version, about = "Browse, filter and export record tables")]
pub struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Neither read nor write remembered views and column widths
    #[arg(long, global = true)]
    pub no_preferences: bool,

    /// More log output; repeat for trace level
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the first page of a view as a table
    Browse(BrowseArgs),

    /// Write the whole filtered view to an .xlsx workbook
    Export(ExportArgs),

    /// Show how filter text compiles for a field kind
    CheckFilter(CheckFilterArgs),
}

#[derive(Debug, Clone, Args)]
pub struct BrowseArgs {
    /// Fixture with the table's schema, views, saved filters and records
    pub fixture: PathBuf,

    /// View id or name; defaults to the remembered or default view
    #[arg(long)]
    pub view: Option<String>,

    /// Saved filter id or name
    #[arg(long = "saved-filter", value_name = "NAME")]
    pub saved_filter: Option<String>,

    /// Filter text for one column, e.g. `total=>1000` or `name=acme;globex`
    #[arg(long = "filter", value_name = "COLUMN=TEXT", value_parser = parse_column_filter)]
    pub filters: Vec<(String, String)>,

    /// Sort column
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    /// Rows to fetch
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub browse: BrowseArgs,

    /// Directory for the workbook; overrides the settings file
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct CheckFilterArgs {
    /// Field kind: text, quantity, money, percentage, serial, date, datetime,
    /// boolean, `enum:a,b,c`, `array:<kind>` or a JSON kind object
    pub kind: String,

    /// Filter text as typed into a column header
    pub text: String,

    /// Column name used in the compiled query fragment
    #[arg(long, default_value = "value")]
    pub column: String,
}

fn parse_column_filter(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((column, text)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), text.to_string()))
        }
        _ => Err(format!("expected COLUMN=TEXT, got {:?}", arg)),
    }
}
