//! Tabula Grid - Filter compiler and grid data engine
//!
//! Everything in this crate is pure: reducers take a state and an event and
//! return a new state plus [`Effect`]s describing the I/O to perform. The
//! `tabula-services` crate executes those effects.
//!
//! - [`TypeRegistry`] - per-kind filter parsing, display formatting and
//!   export encoding
//! - [`compile_column`] - filter text to structured predicates
//! - [`QueryAssembler`] - grid state to record store query
//! - [`RequestReconciler`] / [`FetchWindow`] - latest-wins responses and
//!   incremental row limits
//! - [`BulkState`] - the bulk action state machine
//! - [`encode_sheet`] - export rows to a typed sheet
//! - [`GridEngine`] / [`PageEngine`] - the grid and page reducers

mod assembler;
mod bulk;
mod compiler;
mod export;
mod fetch;
mod grid;
mod page;
mod reconciler;
mod registry;

pub use assembler::*;
pub use bulk::*;
pub use compiler::*;
pub use export::*;
pub use fetch::*;
pub use grid::*;
pub use page::*;
pub use reconciler::*;
pub use registry::*;
