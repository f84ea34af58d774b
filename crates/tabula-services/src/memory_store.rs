//! In-process record store
//!
//! Holds every table in memory and answers queries with the same
//! predicate, sort and projection rules as the remote store. The `tabula`
//! binary serves fixtures from it and tests drive sessions against it.

use crate::sorting::RecordSort;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tabula_core::{
    DeleteRequest, QueryRequest, QueryResponse, Record, RecordId, RecordStore, Result, Row,
    StoreRequest, StoreResponse, TabulaError, Value, record_id, record_to_json,
};

/// Column yielding the whole record as one JSON object
const WHOLE_RECORD: &str = ".";

/// Column yielding a null cell
const NULL_CELL: &str = "null";

/// Column holding the record's revision counter
const RECORD_VERSION: &str = "recordVersion";

type Table = IndexMap<RecordId, Record>;

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<String, Table>>,
    /// Record ids whose stores fail, for exercising error paths
    rejected: RwLock<HashSet<RecordId>>,
    query_count: AtomicUsize,
    /// Queries received in order, kept only after `with_query_log`
    query_log: Mutex<Option<Vec<QueryRequest>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep every query received, for inspection in tests
    pub fn with_query_log(self) -> Self {
        *self.query_log.lock() = Some(Vec::new());
        self
    }

    /// Add `records` to `table`; records without an id are skipped
    pub fn with_table(self, table: impl Into<String>, records: impl IntoIterator<Item = Record>) -> Self {
        let table = table.into();
        for record in records {
            self.insert(&table, record);
        }
        self
    }

    /// Insert or replace one record. Returns false when it has no id.
    pub fn insert(&self, table: &str, record: Record) -> bool {
        let Some(id) = record_id(&record) else {
            tracing::warn!(table, "record without id ignored");
            return false;
        };
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(id, record);
        true
    }

    /// Make stores of record `id` fail
    pub fn reject_store(&self, id: impl Into<RecordId>) {
        self.rejected.write().insert(id.into());
    }

    pub fn get(&self, table: &str, id: &str) -> Option<Record> {
        self.tables.read().get(table)?.get(id).cloned()
    }

    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .get(table)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Queries received so far; empty unless the log was enabled
    pub fn query_log(&self) -> Vec<QueryRequest> {
        self.query_log.lock().clone().unwrap_or_default()
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Answer `request` synchronously
    pub fn run_query(&self, request: &QueryRequest) -> QueryResponse {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        if let Some(log) = self.query_log.lock().as_mut() {
            log.push(request.clone());
        }

        let tables = self.tables.read();
        let Some(table) = tables.get(&request.table_name) else {
            tracing::debug!(table = %request.table_name, "query on empty table");
            return QueryResponse::default();
        };

        let mut matched: Vec<&Record> = table
            .values()
            .filter(|record| request.filters.iter().all(|filter| filter.matches(record)))
            .collect();
        RecordSort::new(request.sort_keys()).sort(&mut matched);

        let full_count = matched.len();
        let rows: Vec<Row> = matched
            .into_iter()
            .take(request.limit.unwrap_or(usize::MAX))
            .map(|record| project(record, &request.columns))
            .collect();

        tracing::debug!(
            table = %request.table_name,
            rows = rows.len(),
            full_count,
            "answered query"
        );
        QueryResponse { rows, full_count }
    }
}

/// Cells of `record` for `columns`, in order
fn project(record: &Record, columns: &[String]) -> Row {
    columns
        .iter()
        .map(|column| match column.as_str() {
            WHOLE_RECORD => Value::Json(record_to_json(record)),
            NULL_CELL => Value::Null,
            column => {
                let key = column.split_once('@').map_or(column, |(key, _)| key);
                record.get(key).cloned().unwrap_or(Value::Null)
            }
        })
        .collect()
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        Ok(self.run_query(&request))
    }

    async fn store(&self, request: StoreRequest) -> Result<StoreResponse> {
        let mut record = request.record;
        let id = record_id(&record)
            .ok_or_else(|| TabulaError::Store("record has no id".to_string()))?;
        if self.rejected.read().contains(&id) {
            return Err(TabulaError::Store(format!("record {} was rejected", id)));
        }

        let mut tables = self.tables.write();
        let table = tables.entry(request.table_name.clone()).or_default();
        let version = table
            .get(&id)
            .and_then(|existing| existing.get(RECORD_VERSION))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        record.insert(RECORD_VERSION.to_string(), Value::Int(version + 1));
        table.insert(id.clone(), record.clone());

        tracing::debug!(table = %request.table_name, id = %id, form = %request.form, "stored record");
        Ok(StoreResponse { record })
    }

    async fn delete(&self, request: DeleteRequest) -> Result<()> {
        let removed = self
            .tables
            .write()
            .get_mut(&request.table_name)
            .and_then(|table| table.shift_remove(&request.record_id));
        match removed {
            Some(_) => Ok(()),
            None => Err(TabulaError::NotFound(format!(
                "{} {}",
                request.table_name, request.record_id
            ))),
        }
    }
}
