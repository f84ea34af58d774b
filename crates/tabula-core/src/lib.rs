//! Tabula Core - Shared data model for the records browser
//!
//! This crate provides the types every other Tabula crate depends on:
//!
//! - `Value`, `Record`, `Row` - cell values as they travel over the wire
//! - `FieldKind` / `Schema` - the semantic type of every column, keyed by table
//! - `ColumnFilter` / `FilterDetail` - structured predicates sent with a query
//! - `QueryRequest`, `StoreRequest`, `DeleteRequest` - record store requests
//! - `ViewSpec` / `SavedFilterSpec` - user-authored views and saved filters
//! - `RecordStore` - the capability used to talk to the remote record store

mod error;
mod field_kind;
mod filter;
mod request;
mod store;
mod types;
mod view;

pub use error::*;
pub use field_kind::*;
pub use filter::*;
pub use request::*;
pub use store::*;
pub use types::*;
pub use view::*;
