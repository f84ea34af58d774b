//! Common test fixtures and a failing store

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Once};
use std::time::Duration;
use tabula_core::{
    ColumnSpec, DeleteRequest, FILTER_TABLE, FieldKind, FilterColumnSpec, QueryRequest,
    QueryResponse, Record, RecordStore, Result, SavedFilterSpec, Schema, StoreRequest,
    StoreResponse, TabulaError, VIEW_TABLE, Value, ViewSpec,
};
use tabula_grid::{FetchConfig, GridEngine, GridOptions, PageEngine, SetColumnAction};
use tabula_services::InMemoryRecordStore;

pub const TABLE: &str = "Invoice";

static TRACING: Once = Once::new();

/// Route engine logs to the test harness; safe to call from every test
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    });
}

pub fn invoice(id: &str, name: &str, total: f64, status: &str) -> Record {
    let mut record = Record::new();
    record.insert("id".into(), id.into());
    record.insert("name".into(), name.into());
    record.insert("total".into(), Value::Float(total));
    record.insert("status".into(), status.into());
    record
}

pub fn invoices() -> Vec<Record> {
    vec![
        invoice("inv-1", "Acme", 1500.0, "open"),
        invoice("inv-2", "Globex", 250.0, "open"),
        invoice("inv-3", "Initech", 4200.0, "closed"),
        invoice("inv-4", "Umbrella", 90.0, "open"),
        invoice("inv-5", "Hooli", 1200.5, "open"),
    ]
}

pub fn open_view() -> ViewSpec {
    let mut view = ViewSpec::new("v-open", "Open invoices", TABLE)
        .with_column(ColumnSpec::new("name", "Name", 150.0))
        .with_column(ColumnSpec::new("total", "Total", 90.0))
        .with_column(ColumnSpec::new("status", "Status", 80.0));
    view.is_default = true;
    view
}

pub fn all_view() -> ViewSpec {
    ViewSpec::new("v-all", "All invoices", TABLE)
        .with_column(ColumnSpec::new("name", "Name", 150.0))
        .with_column(ColumnSpec::new("total", "Total", 90.0))
}

pub fn big_filter() -> SavedFilterSpec {
    SavedFilterSpec {
        id: "f-big".into(),
        record_version: None,
        table: TABLE.into(),
        view: Some("v-open".into()),
        user: None,
        name: "Big".into(),
        columns: vec![FilterColumnSpec {
            column: "total".into(),
            filter: ">1000".into(),
        }],
        is_default: false,
    }
}

/// Invoices plus two views and one saved filter
pub fn invoice_store() -> Arc<InMemoryRecordStore> {
    let views = [open_view(), all_view()]
        .iter()
        .map(|view| view.to_record().unwrap())
        .collect::<Vec<_>>();
    let store = InMemoryRecordStore::new()
        .with_table(TABLE, invoices())
        .with_table(VIEW_TABLE, views)
        .with_table(FILTER_TABLE, [big_filter().to_record().unwrap()]);
    Arc::new(store)
}

pub fn schema() -> Schema {
    Schema::new().with_table(
        TABLE,
        [
            ("name", FieldKind::Text),
            ("total", FieldKind::Money),
            ("status", FieldKind::enumeration(["open", "closed"])),
        ],
    )
}

/// Small fetch window so incremental fetching shows with five rows
pub fn fetch_config() -> FetchConfig {
    FetchConfig {
        initial_rows: 2,
        increment: 2,
        prefetch_margin: 2,
        debounce: Duration::from_millis(5),
    }
}

pub fn page_engine() -> PageEngine {
    let options = GridOptions::new(TABLE)
        .fallback_sorts(["id"])
        .bulk_action(Arc::new(SetColumnAction::new("Close", "status")));
    let grid = GridEngine::new(options, schema()).with_fetch_config(fetch_config());
    PageEngine::new(grid, None)
}

/// Store whose every request fails
pub struct OfflineStore;

#[async_trait]
impl RecordStore for OfflineStore {
    async fn query(&self, _request: QueryRequest) -> Result<QueryResponse> {
        Err(TabulaError::Store("store offline".into()))
    }

    async fn store(&self, _request: StoreRequest) -> Result<StoreResponse> {
        Err(TabulaError::Store("store offline".into()))
    }

    async fn delete(&self, _request: DeleteRequest) -> Result<()> {
        Err(TabulaError::Store("store offline".into()))
    }
}

/// Store that panics on every request
pub struct PanickingStore;

#[async_trait]
impl RecordStore for PanickingStore {
    async fn query(&self, _request: QueryRequest) -> Result<QueryResponse> {
        panic!("query handler crashed")
    }

    async fn store(&self, _request: StoreRequest) -> Result<StoreResponse> {
        panic!("store handler crashed")
    }

    async fn delete(&self, _request: DeleteRequest) -> Result<()> {
        panic!("delete handler crashed")
    }
}
