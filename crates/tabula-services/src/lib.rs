//! Tabula Services Layer
//!
//! This crate runs the pure reducers of `tabula-grid` against the outside
//! world.
//!
//! # Architecture
//!
//! ```text
//! CLI (tabula-app)
//!     ↓
//! Service Layer (tabula-services) ← This crate
//!     ↓
//! Reducers (tabula-grid), workbook writer (tabula-interchange)
//!     ↓
//! Data model and store capability (tabula-core)
//! ```
//!
//! # Services
//!
//! - [`GridSession`] - Event loop owning one page state
//! - [`EffectExecutor`] - Runs effects and produces their completion events
//! - [`InMemoryRecordStore`] - Record store over in-memory tables
//! - [`PreferenceStorage`] - Remembered views and column widths in SQLite
//!
//! # Design Principles
//!
//! 1. **Reducers stay pure** - Only this crate performs I/O
//! 2. **One completion per effect** - Every spawned effect reports back exactly once
//! 3. **Failures become events** - Store errors surface as failure events, not panics

mod error;
mod executor;
mod memory_store;
mod preferences;
mod session;
mod sorting;

pub use error::{ServiceError, ServiceResult};
pub use executor::{Completion, EffectExecutor};
pub use memory_store::InMemoryRecordStore;
pub use preferences::PreferenceStorage;
pub use session::GridSession;
pub use sorting::{NullPosition, RecordSort};
