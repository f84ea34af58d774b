//! JSON fixtures: one table with its schema, views, saved filters and
//! records, served from an in-memory record store

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tabula_core::{
    FILTER_TABLE, FieldKind, FilterDetail, RecordId, SavedFilterSpec, Schema, VIEW_TABLE, ViewSpec,
    record_from_json,
};
use tabula_grid::{BulkAction, FetchConfig, GridEngine, GridOptions, PageEngine, SetColumnAction};
use tabula_services::InMemoryRecordStore;

#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub table: String,
    pub columns: IndexMap<String, FieldKind>,
    #[serde(default = "default_sorts")]
    pub sorts: Vec<String>,
    #[serde(default)]
    pub mandatory_filters: Vec<FilterDetail>,
    #[serde(default)]
    pub bulk_actions: Vec<BulkActionSpec>,
    pub views: Vec<ViewSpec>,
    #[serde(default)]
    pub filters: Vec<SavedFilterSpec>,
    #[serde(default)]
    pub records: Vec<serde_json::Value>,
}

/// A "set column" bulk action
#[derive(Debug, Clone, Deserialize)]
pub struct BulkActionSpec {
    pub name: String,
    pub column: String,
    #[serde(default)]
    pub extra_filters: Vec<FilterDetail>,
}

fn default_sorts() -> Vec<String> {
    vec!["id".to_string()]
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid fixture {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let fixture: Fixture = serde_json::from_str(content)?;
        if let Some(view) = fixture.views.iter().find(|view| view.table != fixture.table) {
            bail!(
                "view {:?} belongs to table {:?}, not {:?}",
                view.name,
                view.table,
                fixture.table
            );
        }
        Ok(fixture)
    }

    pub fn schema(&self) -> Schema {
        Schema::new().with_table(self.table.clone(), self.columns.clone())
    }

    /// Resolve a view by id or case-insensitive name
    pub fn view_id(&self, name: &str) -> Option<RecordId> {
        self.views
            .iter()
            .find(|view| view.id == name)
            .or_else(|| {
                self.views
                    .iter()
                    .find(|view| view.name.eq_ignore_ascii_case(name))
            })
            .map(|view| view.id.clone())
    }

    /// Resolve a saved filter by id or case-insensitive name
    pub fn filter_id(&self, name: &str) -> Option<RecordId> {
        self.filters
            .iter()
            .find(|filter| filter.id == name)
            .or_else(|| {
                self.filters
                    .iter()
                    .find(|filter| filter.name.eq_ignore_ascii_case(name))
            })
            .map(|filter| filter.id.clone())
    }

    pub fn store(&self) -> Result<InMemoryRecordStore> {
        let store = InMemoryRecordStore::new();
        for view in &self.views {
            store.insert(VIEW_TABLE, view.to_record()?);
        }
        for filter in &self.filters {
            store.insert(FILTER_TABLE, filter.to_record()?);
        }
        let mut skipped = 0;
        for json in &self.records {
            let inserted = record_from_json(json.clone())
                .map(|record| store.insert(&self.table, record))
                .unwrap_or(false);
            if !inserted {
                skipped += 1;
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, table = %self.table, "skipped records without an object id");
        }
        tracing::debug!(
            table = %self.table,
            records = self.records.len() - skipped,
            views = self.views.len(),
            filters = self.filters.len(),
            "loaded fixture"
        );
        Ok(store)
    }

    pub fn page_engine(&self, fetch: FetchConfig, user: Option<String>) -> PageEngine {
        let mut options = GridOptions::new(self.table.clone()).fallback_sorts(self.sorts.clone());
        for filter in &self.mandatory_filters {
            options = options.mandatory_filter(filter.clone());
        }
        for spec in &self.bulk_actions {
            let mut action = SetColumnAction::new(spec.name.clone(), spec.column.clone());
            for filter in &spec.extra_filters {
                action = action.with_extra_filter(filter.clone());
            }
            let action: Arc<dyn BulkAction> = Arc::new(action);
            options = options.bulk_action(action);
        }
        let grid = GridEngine::new(options, self.schema()).with_fetch_config(fetch);
        PageEngine::new(grid, user)
    }
}
