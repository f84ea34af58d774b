//! Page controller: view and saved-filter management around one grid
//!
//! The page loads the views and saved filters of its table, picks a view,
//! seeds the grid from it and forwards grid events. Until both lists have
//! loaded there is no grid; selecting another view or filter drops the grid
//! and selection runs again.

use crate::grid::{Effect, GridEngine, GridEvent, GridSeed, GridState, Update};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tabula_core::{
    ColumnFilter, DeleteRequest, FILTER_TABLE, FilterColumnSpec, FilterDetail, QueryRequest,
    QueryResponse, Record, RecordId, SavedFilterSpec, StoreRequest, VIEW_TABLE, Value, ViewSpec,
    record_to_json,
};
use uuid::Uuid;

/// Parameters that are not column filters
pub const SORT_PARAMETER: &str = "sort";
pub const SORT_REVERSED_PARAMETER: &str = "sort_reversed";
pub const FILTER_PARAMETER: &str = "filter";

/// Preferences remembered between sessions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RememberedPreferences {
    /// Last selected view per table
    pub selected_views: HashMap<String, RecordId>,
    /// Column widths per view
    pub widths: HashMap<RecordId, IndexMap<String, f64>>,
}

/// How the page was opened
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    pub view_id: Option<RecordId>,
    /// URL-style parameters; see [`SORT_PARAMETER`] and friends
    pub parameters: IndexMap<String, String>,
}

impl PageRequest {
    pub fn view(mut self, view_id: impl Into<RecordId>) -> Self {
        self.view_id = Some(view_id.into());
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// State of the manage-filters dialog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagingFilters {
    /// Edited names of the current view's filters
    pub names: IndexMap<RecordId, String>,
    pub default: Option<RecordId>,
    pub deleted: Vec<RecordId>,
}

#[derive(Debug, Clone)]
pub struct PageState {
    pub grid: Option<GridState>,
    pub view_id: Option<RecordId>,
    pub filter_id: Option<RecordId>,
    pub views: Option<Vec<Arc<ViewSpec>>>,
    pub filters: Option<Vec<SavedFilterSpec>>,
    /// Consumed by the first selection
    pub parameters: Option<IndexMap<String, String>>,
    pub saving_filter: bool,
    pub saving_filter_name: String,
    pub managing_filters: Option<ManagingFilters>,
    pub remembered: RememberedPreferences,
    pub last_error: Option<String>,
}

impl PageState {
    pub fn view(&self) -> Option<&Arc<ViewSpec>> {
        self.grid.as_ref().map(|grid| &grid.view)
    }

    /// Saved filters offered for the selected view
    pub fn view_filters(&self) -> impl Iterator<Item = &SavedFilterSpec> {
        let view_id = self.view_id.as_deref();
        self.filters
            .iter()
            .flatten()
            .filter(move |filter| view_id.is_some_and(|id| filter.belongs_to(id)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Grid(GridEvent),
    ViewsLoaded { response: QueryResponse },
    FiltersLoaded { response: QueryResponse },
    LoadFailed { error: String },
    SelectView { view: RecordId },
    /// `None` selects the view's default filter
    SelectFilter { filter: Option<RecordId> },
    SaveFilter,
    SaveFilterName(String),
    SaveFilterCancel,
    SaveFilterConfirm,
    FilterSaved { record: Record },
    DeleteFilter,
    FilterDeleted { filter: RecordId },
    StoreFailed { error: String },
    ManageFilters,
    HideManageFilters,
    SaveManageFilters,
    ManageFilterDelete { filter: RecordId },
    ManageFilterRename { filter: RecordId, name: String },
    ManageFilterSetDefault { filter: Option<RecordId> },
    PageActivated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEffect {
    Grid(Effect),
    /// Answer with `ViewsLoaded` or `LoadFailed`
    LoadViews { request: QueryRequest },
    /// Answer with `FiltersLoaded` or `LoadFailed`
    LoadFilters { request: QueryRequest },
    RememberView { table: String, view_id: RecordId },
    /// Answer with `FilterSaved` or `StoreFailed`
    StoreFilter { request: StoreRequest },
    /// Answer with `FilterDeleted` or `StoreFailed`
    DeleteFilter { request: DeleteRequest },
}

type PageUpdate = Update<PageState, PageEffect>;

/// Page reducer for one table
#[derive(Debug, Clone)]
pub struct PageEngine {
    grid: GridEngine,
    user: Option<String>,
}

impl PageEngine {
    pub fn new(grid: GridEngine, user: Option<String>) -> Self {
        Self { grid, user }
    }

    pub fn grid(&self) -> &GridEngine {
        &self.grid
    }

    fn table(&self) -> &str {
        &self.grid.options().table
    }

    pub fn initialize(&self, request: PageRequest, remembered: RememberedPreferences) -> PageUpdate {
        let table = self.table().to_string();
        let views = QueryRequest::new(VIEW_TABLE)
            .columns(["."])
            .filter(FilterDetail::column("table", ColumnFilter::equal(table.clone())))
            .sorts(["name"]);
        let user = self.user.clone().map(Value::from).unwrap_or(Value::Null);
        let filters = QueryRequest::new(FILTER_TABLE)
            .columns(["."])
            .filter(FilterDetail::column("table", ColumnFilter::equal(table)))
            .filter(FilterDetail::column("user", ColumnFilter::equal(user)))
            .sorts(["name"]);

        let state = PageState {
            grid: None,
            view_id: request.view_id,
            filter_id: request
                .parameters
                .get(FILTER_PARAMETER)
                .filter(|id| !id.is_empty())
                .cloned(),
            views: None,
            filters: None,
            parameters: Some(request.parameters),
            saving_filter: false,
            saving_filter_name: String::new(),
            managing_filters: None,
            remembered,
            last_error: None,
        };
        Update::new(state)
            .with_effect(PageEffect::LoadViews { request: views })
            .with_effect(PageEffect::LoadFilters { request: filters })
    }

    pub fn reduce(&self, state: PageState, event: PageEvent) -> PageUpdate {
        let update = self.reduce_event(state, event);
        let ready = update.state.grid.is_none()
            && update.state.views.is_some()
            && update.state.filters.is_some();
        if !ready {
            return update;
        }
        let Update { state, mut effects } = update;
        let selected = self.select_view(state);
        effects.extend(selected.effects);
        Update {
            state: selected.state,
            effects,
        }
    }

    /// Pick the view and filter, seed the grid and start it
    fn select_view(&self, mut state: PageState) -> PageUpdate {
        let views = state.views.clone().unwrap_or_default();
        let Some(first) = views.first() else {
            tracing::debug!(table = self.table(), "no views to select");
            return Update::new(state);
        };

        let wanted = state
            .view_id
            .clone()
            .or_else(|| state.remembered.selected_views.get(self.table()).cloned())
            .or_else(|| views.iter().find(|view| view.is_default).map(|view| view.id.clone()));
        let view = wanted
            .and_then(|id| views.iter().find(|view| view.id == id))
            .unwrap_or(first)
            .clone();

        let filter_id = state.filter_id.clone().or_else(|| {
            state
                .filters
                .iter()
                .flatten()
                .find(|filter| filter.belongs_to(&view.id) && filter.is_default)
                .map(|filter| filter.id.clone())
        });

        let mut seed = GridSeed {
            widths: state.remembered.widths.get(&view.id).cloned().unwrap_or_default(),
            sort_column: view.default_sort().map(String::from),
            sort_descending: view.default_sort_descending,
            ..Default::default()
        };
        match &filter_id {
            None => {
                for column in &view.columns {
                    seed.filter_texts.insert(column.column.clone(), column.filter.clone());
                }
            }
            Some(id) => {
                let saved = state.filters.iter().flatten().find(|filter| &filter.id == id);
                for column in saved.iter().flat_map(|filter| &filter.columns) {
                    seed.filter_texts.insert(column.column.clone(), column.filter.clone());
                }
            }
        }

        for (key, value) in state.parameters.take().unwrap_or_default() {
            match key.as_str() {
                SORT_PARAMETER => seed.sort_column = Some(value),
                SORT_REVERSED_PARAMETER => seed.sort_descending = is_truthy(&value),
                FILTER_PARAMETER => {}
                _ => {
                    seed.filter_texts.insert(key, value);
                }
            }
        }

        tracing::info!(
            table = self.table(),
            view = %view.name,
            filter = ?filter_id,
            "selected view"
        );
        state.view_id = Some(view.id.clone());
        state.filter_id = filter_id;
        let grid = self.grid.initialize(view, seed);
        self.with_grid(state, grid)
    }

    /// Install a grid update, lifting its effects into page effects
    fn with_grid(&self, mut state: PageState, update: Update<GridState, Effect>) -> PageUpdate {
        for effect in &update.effects {
            if let Effect::PersistWidths { view_id, widths } = effect {
                state.remembered.widths.insert(view_id.clone(), widths.clone());
            }
        }
        state.grid = Some(update.state);
        Update {
            state,
            effects: update.effects.into_iter().map(PageEffect::Grid).collect(),
        }
    }

    fn reduce_event(&self, mut state: PageState, event: PageEvent) -> PageUpdate {
        match event {
            PageEvent::Grid(event) => match state.grid.take() {
                Some(grid) => {
                    let update = self.grid.reduce(grid, event);
                    self.with_grid(state, update)
                }
                None => {
                    tracing::debug!("grid event before a view was selected, ignoring");
                    Update::new(state)
                }
            },

            PageEvent::PageActivated => match state.grid.take() {
                Some(grid) => {
                    let update = self.grid.reduce(grid, GridEvent::Refresh);
                    self.with_grid(state, update)
                }
                None => Update::new(state),
            },

            PageEvent::ViewsLoaded { response } => {
                state.views = Some(decode_rows(&response, ViewSpec::from_value, Arc::new));
                Update::new(state)
            }

            PageEvent::FiltersLoaded { response } => {
                state.filters = Some(decode_rows(&response, SavedFilterSpec::from_value, |f| f));
                Update::new(state)
            }

            PageEvent::LoadFailed { error } | PageEvent::StoreFailed { error } => {
                tracing::warn!(error = %error, "page request failed");
                state.last_error = Some(error);
                Update::new(state)
            }

            PageEvent::SelectView { view } => {
                let table = self.table().to_string();
                state
                    .remembered
                    .selected_views
                    .insert(table.clone(), view.clone());
                state.view_id = Some(view.clone());
                state.filter_id = None;
                state.grid = None;
                state.parameters = None;
                Update::new(state).with_effect(PageEffect::RememberView {
                    table,
                    view_id: view,
                })
            }

            PageEvent::SelectFilter { filter } => {
                state.filter_id = filter;
                state.grid = None;
                state.parameters = None;
                Update::new(state)
            }

            PageEvent::SaveFilter => {
                state.saving_filter = true;
                state.saving_filter_name.clear();
                Update::new(state)
            }

            PageEvent::SaveFilterName(name) => {
                state.saving_filter_name = name;
                Update::new(state)
            }

            PageEvent::SaveFilterCancel => {
                state.saving_filter = false;
                Update::new(state)
            }

            PageEvent::SaveFilterConfirm => self.save_filter(state),

            PageEvent::FilterSaved { record } => {
                let saved = match SavedFilterSpec::from_value(&Value::Json(record_to_json(&record))) {
                    Ok(saved) => saved,
                    Err(e) => {
                        tracing::warn!(error = %e, "stored filter could not be decoded");
                        return Update::new(state);
                    }
                };
                let filters = state.filters.get_or_insert_with(Vec::new);
                filters.retain(|filter| filter.id != saved.id);
                filters.push(saved);
                filters.sort_by_key(|filter| filter.name.to_lowercase());
                Update::new(state)
            }

            PageEvent::DeleteFilter => {
                let Some(filter_id) = state.filter_id.take() else {
                    tracing::warn!("no saved filter selected to delete");
                    return Update::new(state);
                };
                if let Some(filters) = state.filters.as_mut() {
                    filters.retain(|filter| filter.id != filter_id);
                }
                let request = self.delete_request(filter_id);
                Update::new(state).with_effect(PageEffect::DeleteFilter { request })
            }

            PageEvent::FilterDeleted { filter } => {
                if let Some(filters) = state.filters.as_mut() {
                    filters.retain(|saved| saved.id != filter);
                }
                Update::new(state)
            }

            PageEvent::ManageFilters => {
                let filters: Vec<&SavedFilterSpec> = state.view_filters().collect();
                let managing = ManagingFilters {
                    names: filters
                        .iter()
                        .map(|filter| (filter.id.clone(), filter.name.clone()))
                        .collect(),
                    default: filters
                        .iter()
                        .find(|filter| filter.is_default)
                        .map(|filter| filter.id.clone()),
                    deleted: Vec::new(),
                };
                state.managing_filters = Some(managing);
                Update::new(state)
            }

            PageEvent::HideManageFilters => {
                state.managing_filters = None;
                Update::new(state)
            }

            PageEvent::ManageFilterDelete { filter } => {
                if let Some(managing) = state.managing_filters.as_mut() {
                    managing.names.shift_remove(&filter);
                    managing.deleted.push(filter);
                }
                Update::new(state)
            }

            PageEvent::ManageFilterRename { filter, name } => {
                if let Some(managing) = state.managing_filters.as_mut() {
                    managing.names.insert(filter, name);
                }
                Update::new(state)
            }

            PageEvent::ManageFilterSetDefault { filter } => {
                if let Some(managing) = state.managing_filters.as_mut() {
                    managing.default = filter;
                }
                Update::new(state)
            }

            PageEvent::SaveManageFilters => self.save_managed_filters(state),
        }
    }

    fn save_filter(&self, mut state: PageState) -> PageUpdate {
        let Some(grid) = state.grid.as_ref() else {
            tracing::warn!("cannot save a filter before a view is selected");
            return Update::new(state);
        };
        let filter = SavedFilterSpec {
            id: Uuid::new_v4().to_string(),
            record_version: None,
            table: self.table().to_string(),
            view: state.view_id.clone(),
            user: self.user.clone(),
            name: state.saving_filter_name.clone(),
            columns: grid
                .filter_texts
                .iter()
                .map(|(column, filter)| FilterColumnSpec {
                    column: column.clone(),
                    filter: filter.clone(),
                })
                .collect(),
            is_default: false,
        };
        let record = match filter.to_record() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "saved filter could not be encoded");
                return Update::new(state);
            }
        };

        tracing::info!(filter = %filter.name, "saving filter");
        state.saving_filter = false;
        state.filter_id = Some(filter.id.clone());
        state.filters.get_or_insert_with(Vec::new).push(filter);
        let request = self.store_request(record);
        Update::new(state).with_effect(PageEffect::StoreFilter { request })
    }

    /// One delete per removed filter, one store per renamed or re-defaulted one
    fn save_managed_filters(&self, mut state: PageState) -> PageUpdate {
        let Some(managing) = state.managing_filters.take() else {
            return Update::new(state);
        };
        let mut effects: Vec<PageEffect> = managing
            .deleted
            .iter()
            .map(|id| PageEffect::DeleteFilter {
                request: self.delete_request(id.clone()),
            })
            .collect();

        for filter in state.view_filters() {
            let Some(name) = managing.names.get(&filter.id) else {
                continue;
            };
            let is_default = managing.default.as_ref() == Some(&filter.id);
            if *name == filter.name && is_default == filter.is_default {
                continue;
            }
            let changed = SavedFilterSpec {
                name: name.clone(),
                is_default,
                ..filter.clone()
            };
            match changed.to_record() {
                Ok(record) => effects.push(PageEffect::StoreFilter {
                    request: self.store_request(record),
                }),
                Err(e) => tracing::warn!(error = %e, filter = %filter.id, "filter could not be encoded"),
            }
        }

        tracing::info!(changes = effects.len(), "saving managed filters");
        Update {
            state,
            effects,
        }
    }

    fn store_request(&self, record: Record) -> StoreRequest {
        StoreRequest {
            table_name: FILTER_TABLE.to_string(),
            form: self.table().to_string(),
            record,
        }
    }

    fn delete_request(&self, record_id: RecordId) -> DeleteRequest {
        DeleteRequest {
            table_name: FILTER_TABLE.to_string(),
            form: self.table().to_string(),
            record_id,
        }
    }
}

/// Decode the whole-record cell of every row, skipping rows that fail
fn decode_rows<T, U>(
    response: &QueryResponse,
    decode: impl Fn(&Value) -> tabula_core::Result<T>,
    wrap: impl Fn(T) -> U,
) -> Vec<U> {
    response
        .rows
        .iter()
        .filter_map(|row| {
            let cell = row.first()?;
            match decode(cell) {
                Ok(item) => Some(wrap(item)),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable row");
                    None
                }
            }
        })
        .collect()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

#[cfg(test)]
mod tests;
