//! Tabula - command-line records browser
//!
//! Wires the grid engine, effect executor and workbook writer to JSON
//! fixtures served from an in-memory record store.

pub mod cli;
pub mod commands;
pub mod fixture;
pub mod logging;

pub use cli::{Cli, Command};
pub use commands::{Runner, check_filter, open_preferences, parse_kind, render_table};
pub use fixture::Fixture;
