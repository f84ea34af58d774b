//! Grid reducer
//!
//! [`GridEngine::reduce`] is a pure function from a state and an event to
//! a new state plus the effects to run. Effects are data; the runtime that
//! executes them feeds their completions back as events.

use crate::assembler::{BulkScope, GridOptions, QueryAssembler, QueryInput, QueryPurpose, RowLayout};
use crate::bulk::{BulkAction, BulkFailure, BulkPhase, BulkReport, BulkState};
use crate::compiler::ColumnFilterReport;
use crate::export::{ExportSheet, encode_sheet};
use crate::fetch::{FetchConfig, FetchWindow};
use crate::reconciler::{RequestId, RequestReconciler};
use crate::registry::TypeRegistry;
use chrono::NaiveDate;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{
    QueryRequest, QueryResponse, RecordId, Row, Schema, StoreRequest, ViewSpec, record_from_json,
    record_id,
};

/// New state plus the effects a transition produced
#[derive(Debug)]
pub struct Update<S, E> {
    pub state: S,
    pub effects: Vec<E>,
}

impl<S, E> Update<S, E> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: E) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn map<T, F>(self, f: F) -> Update<T, E>
    where
        F: FnOnce(S) -> T,
    {
        Update {
            state: f(self.state),
            effects: self.effects,
        }
    }

    pub fn map_effects<T, F>(self, f: F) -> Update<S, T>
    where
        F: FnMut(E) -> T,
    {
        Update {
            state: self.state,
            effects: self.effects.into_iter().map(f).collect(),
        }
    }
}

/// Side effects requested by the grid
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Display query; answer with `DataFetched` or `QueryFailed`
    Query {
        request_id: RequestId,
        request: QueryRequest,
    },
    /// Answer with `IncreaseFetch` after `delay`
    ScheduleFetchIncrease { generation: u64, delay: Duration },
    /// Whole records of the selection; answer with `BulkFetched` or
    /// `BulkQueryFailed`
    BulkQuery { request: QueryRequest },
    /// One bulk commit; answer with `BulkCommitted`
    Commit {
        record_id: Option<RecordId>,
        request: StoreRequest,
    },
    /// Unbounded export query; answer with `ExportFetched` or `ExportFailed`
    ExportQuery { request: QueryRequest },
    WriteWorkbook { sheet: ExportSheet },
    PersistWidths {
        view_id: RecordId,
        widths: IndexMap<String, f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    Refresh,
    DataFetched {
        request_id: RequestId,
        response: QueryResponse,
    },
    QueryFailed {
        request_id: RequestId,
        error: String,
    },
    ResetWidths,
    ResizeColumn {
        column: String,
        width: f64,
    },
    UpdateFilter {
        column: String,
        text: String,
    },
    ClickHeader {
        column: String,
    },
    SetAddingColumn(bool),
    /// The viewport read row `index`
    RowAccessed {
        index: usize,
    },
    IncreaseFetch {
        generation: u64,
    },
    StartBulkAction {
        index: usize,
    },
    BulkFormAction(serde_json::Value),
    BulkSetSelected {
        id: RecordId,
        selected: bool,
    },
    CloseBulk,
    ApplyBulk,
    BulkFetched {
        response: QueryResponse,
    },
    BulkQueryFailed {
        error: String,
    },
    BulkCommitted {
        record_id: Option<RecordId>,
        result: Result<(), String>,
    },
    ExportRequested,
    ExportFetched {
        response: QueryResponse,
        date: NaiveDate,
    },
    ExportFailed {
        error: String,
    },
}

impl GridEvent {
    pub fn update_filter(column: impl Into<String>, text: impl Into<String>) -> Self {
        GridEvent::UpdateFilter {
            column: column.into(),
            text: text.into(),
        }
    }

    pub fn click_header(column: impl Into<String>) -> Self {
        GridEvent::ClickHeader {
            column: column.into(),
        }
    }

    pub fn set_selected(id: impl Into<RecordId>, selected: bool) -> Self {
        GridEvent::BulkSetSelected {
            id: id.into(),
            selected,
        }
    }
}

/// Where a grid starts: remembered widths, filter texts and sort
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridSeed {
    pub widths: IndexMap<String, f64>,
    pub filter_texts: IndexMap<String, String>,
    pub sort_column: Option<String>,
    pub sort_descending: bool,
}

#[derive(Debug, Clone)]
pub struct GridState {
    pub view: Arc<ViewSpec>,
    pub column_widths: IndexMap<String, f64>,
    pub filter_texts: IndexMap<String, String>,
    /// Rows of the latest applied display query; `None` until the first
    /// response after a filter, sort, view or refresh change
    pub fetched_rows: Option<Arc<Vec<Row>>>,
    pub sort_column: Option<String>,
    pub sort_descending: bool,
    pub is_adding_column: bool,
    pub total_row_count: usize,
    pub fetch: FetchWindow,
    pub requests: RequestReconciler,
    pub bulk: Option<BulkState>,
    pub last_error: Option<String>,
    pub last_bulk_report: Option<BulkReport>,
}

impl GridState {
    pub fn latest_request_id(&self) -> RequestId {
        self.requests.latest()
    }

    pub fn fetch_row_limit(&self) -> usize {
        self.fetch.limit()
    }

    pub fn is_loading(&self) -> bool {
        self.fetched_rows.is_none() && self.last_error.is_none()
    }

    pub fn bulk_phase(&self) -> Option<BulkPhase> {
        self.bulk.as_ref().map(|bulk| bulk.phase)
    }

    pub fn rows(&self) -> &[Row] {
        self.fetched_rows.as_deref().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Static context of a grid and its reducer
#[derive(Debug, Clone)]
pub struct GridEngine {
    options: Arc<GridOptions>,
    registry: Arc<TypeRegistry>,
    schema: Arc<Schema>,
    config: FetchConfig,
}

type GridUpdate = Update<GridState, Effect>;

impl GridEngine {
    pub fn new(options: GridOptions, schema: Schema) -> Self {
        Self {
            options: Arc::new(options),
            registry: Arc::new(TypeRegistry::standard()),
            schema: Arc::new(schema),
            config: FetchConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_fetch_config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn fetch_config(&self) -> &FetchConfig {
        &self.config
    }

    fn assembler(&self) -> QueryAssembler<'_> {
        QueryAssembler::new(&self.options, &self.registry, &self.schema)
    }

    /// Build the initial state for `view` and issue its first query
    pub fn initialize(&self, view: Arc<ViewSpec>, seed: GridSeed) -> GridUpdate {
        let column_widths = view
            .columns
            .iter()
            .map(|column| {
                let width = seed.widths.get(&column.column).copied().unwrap_or(column.width);
                (column.column.clone(), width)
            })
            .collect();

        let state = GridState {
            view,
            column_widths,
            filter_texts: seed.filter_texts,
            fetched_rows: None,
            sort_column: seed.sort_column.filter(|column| !column.is_empty()),
            sort_descending: seed.sort_descending,
            is_adding_column: false,
            total_row_count: 0,
            fetch: FetchWindow::new(&self.config),
            requests: RequestReconciler::new(),
            bulk: None,
            last_error: None,
            last_bulk_report: None,
        };
        self.with_request(state)
    }

    /// Compiled filter texts of the visible columns
    pub fn filter_reports(&self, state: &GridState) -> Vec<ColumnFilterReport> {
        self.assembler().filter_reports(&state.view, &state.filter_texts)
    }

    pub fn row_layout(&self, state: &GridState) -> RowLayout {
        RowLayout::new(&self.options, &state.view)
    }

    /// Display text of cell `column` of a fetched row
    pub fn format_cell(&self, state: &GridState, row: &Row, column: usize) -> String {
        let (Some(spec), Some(value)) = (state.view.columns.get(column), row.get(column)) else {
            return String::new();
        };
        match self
            .schema
            .resolve(&self.options.table, state.view.segment(), &spec.column)
        {
            Some(kind) => self.registry.format(kind, value),
            None => value.to_text(),
        }
    }

    pub fn bulk_action(&self, state: &GridState) -> Option<&Arc<dyn BulkAction>> {
        state
            .bulk
            .as_ref()
            .and_then(|bulk| self.options.bulk_actions.get(bulk.action_index))
    }

    /// Whether "Apply" is currently available
    pub fn can_apply_bulk(&self, state: &GridState) -> bool {
        match (&state.bulk, self.bulk_action(state)) {
            (Some(bulk), Some(action)) => bulk.can_apply(action.as_ref()),
            _ => false,
        }
    }

    /// The query the current state would issue for `purpose`
    pub fn query_for(&self, state: &GridState, purpose: QueryPurpose) -> QueryRequest {
        let bulk = match (&state.bulk, self.bulk_action(state)) {
            (Some(bulk), Some(action)) => Some(BulkScope {
                selected: &bulk.selected,
                extra_filters: action.extra_filters(),
            }),
            _ => None,
        };
        let input = QueryInput {
            view: &state.view,
            filter_texts: &state.filter_texts,
            sort_column: state.sort_column.as_deref(),
            sort_descending: state.sort_descending,
            limit: state.fetch.limit(),
            bulk,
        };
        self.assembler().assemble(&input, purpose)
    }

    /// Issue a fresh display query, superseding any in flight.
    ///
    /// Rows already fetched stay visible until the response lands; events
    /// that change which records match clear them first.
    fn with_request(&self, mut state: GridState) -> GridUpdate {
        let request_id = state.requests.issue();
        state.last_error = None;
        let request = self.query_for(&state, QueryPurpose::Display);
        tracing::debug!(request_id, limit = ?request.limit, "issuing display query");
        Update::new(state).with_effect(Effect::Query {
            request_id,
            request,
        })
    }

    fn persist_widths(state: GridState) -> GridUpdate {
        let effect = Effect::PersistWidths {
            view_id: state.view.id.clone(),
            widths: state.column_widths.clone(),
        };
        Update::new(state).with_effect(effect)
    }

    fn ignore(state: GridState, event: &str) -> GridUpdate {
        tracing::warn!(event, "event not valid in current grid state, ignoring");
        Update::new(state)
    }

    pub fn reduce(&self, mut state: GridState, event: GridEvent) -> GridUpdate {
        match event {
            GridEvent::Refresh => {
                state.fetched_rows = None;
                self.with_request(state)
            }

            GridEvent::DataFetched {
                request_id,
                response,
            } => {
                if state.requests.accepts(request_id) {
                    state.total_row_count = response.full_count;
                    state.fetched_rows = Some(Arc::new(response.rows));
                    state.last_error = None;
                }
                Update::new(state)
            }

            GridEvent::QueryFailed { request_id, error } => {
                if state.requests.accepts(request_id) {
                    tracing::warn!(request_id, error = %error, "display query failed");
                    state.last_error = Some(error);
                }
                Update::new(state)
            }

            GridEvent::ResetWidths => {
                state.column_widths = state
                    .view
                    .columns
                    .iter()
                    .map(|column| (column.column.clone(), column.width))
                    .collect();
                Self::persist_widths(state)
            }

            GridEvent::ResizeColumn { column, width } => {
                if state.view.column(&column).is_none() || !width.is_finite() || width <= 0.0 {
                    return Self::ignore(state, "ResizeColumn");
                }
                state.column_widths.insert(column, width);
                Self::persist_widths(state)
            }

            GridEvent::UpdateFilter { column, text } => {
                state.filter_texts.insert(column, text);
                state.fetch.reset(&self.config);
                state.fetched_rows = None;
                self.with_request(state)
            }

            GridEvent::ClickHeader { column } => {
                if state.sort_column.as_deref() == Some(column.as_str()) {
                    state.sort_descending = !state.sort_descending;
                } else {
                    state.sort_column = Some(column);
                    state.sort_descending = false;
                }
                state.fetch.reset(&self.config);
                state.fetched_rows = None;
                self.with_request(state)
            }

            GridEvent::SetAddingColumn(adding) => {
                state.is_adding_column = adding;
                Update::new(state)
            }

            GridEvent::RowAccessed { index } => {
                match state.fetch.on_row_access(&self.config, index) {
                    Some(generation) => {
                        let delay = self.config.debounce;
                        Update::new(state)
                            .with_effect(Effect::ScheduleFetchIncrease { generation, delay })
                    }
                    None => Update::new(state),
                }
            }

            GridEvent::IncreaseFetch { generation } => {
                if state.fetch.increase(&self.config, generation) {
                    tracing::debug!(limit = state.fetch.limit(), "increasing fetch limit");
                    self.with_request(state)
                } else {
                    Update::new(state)
                }
            }

            GridEvent::StartBulkAction { index } => {
                let Some(action) = self.options.bulk_actions.get(index) else {
                    return Self::ignore(state, "StartBulkAction");
                };
                if state.bulk.is_some() {
                    return Self::ignore(state, "StartBulkAction");
                }
                tracing::info!(action = action.name(), "bulk action started");
                state.bulk = Some(BulkState::start(index, action.as_ref()));
                state.last_bulk_report = None;
                self.with_request(state)
            }

            GridEvent::BulkFormAction(form_action) => {
                let Some(action) = self.bulk_action(&state).cloned() else {
                    return Self::ignore(state, "BulkFormAction");
                };
                match state.bulk.as_mut() {
                    Some(bulk) if bulk.phase == BulkPhase::Selecting => {
                        let (form_state, form_data) =
                            action
                                .detail()
                                .reduce(&bulk.form_state, &bulk.form_data, &form_action);
                        bulk.form_state = form_state;
                        bulk.form_data = form_data;
                        Update::new(state)
                    }
                    _ => Self::ignore(state, "BulkFormAction"),
                }
            }

            GridEvent::BulkSetSelected { id, selected } => match state.bulk.as_mut() {
                Some(bulk) if bulk.phase == BulkPhase::Selecting => {
                    bulk.selected = bulk.toggled_selection(&id, selected);
                    Update::new(state)
                }
                _ => Self::ignore(state, "BulkSetSelected"),
            },

            GridEvent::CloseBulk => match state.bulk.as_ref().map(|bulk| bulk.phase) {
                Some(BulkPhase::Selecting) => {
                    tracing::info!("bulk action closed");
                    state.bulk = None;
                    self.with_request(state)
                }
                _ => Self::ignore(state, "CloseBulk"),
            },

            GridEvent::ApplyBulk => {
                if !self.can_apply_bulk(&state) {
                    return Self::ignore(state, "ApplyBulk");
                }
                let Some(bulk) = state.bulk.as_mut() else {
                    return Self::ignore(state, "ApplyBulk");
                };
                bulk.phase = BulkPhase::Applying;
                let request = self.assembler().selected_records(&bulk.selected);
                tracing::info!(selected = bulk.selected.len(), "applying bulk action");
                Update::new(state).with_effect(Effect::BulkQuery { request })
            }

            GridEvent::BulkFetched { response } => self.commit_bulk(state, response),

            GridEvent::BulkQueryFailed { error } => match state.bulk.as_mut() {
                Some(bulk) if bulk.phase == BulkPhase::Applying => {
                    tracing::warn!(error = %error, "bulk record fetch failed");
                    bulk.phase = BulkPhase::Selecting;
                    state.last_error = Some(error);
                    Update::new(state)
                }
                _ => Self::ignore(state, "BulkQueryFailed"),
            },

            GridEvent::BulkCommitted { record_id, result } => {
                let finished = match state.bulk.as_mut() {
                    Some(bulk) if bulk.phase == BulkPhase::Committing => {
                        bulk.record_commit(record_id, result)
                    }
                    _ => return Self::ignore(state, "BulkCommitted"),
                };
                if finished {
                    self.finish_bulk(state)
                } else {
                    Update::new(state)
                }
            }

            GridEvent::ExportRequested => {
                let request = self.query_for(&state, QueryPurpose::Export);
                tracing::info!(view = %state.view.name, "export requested");
                Update::new(state).with_effect(Effect::ExportQuery { request })
            }

            GridEvent::ExportFetched { response, date } => {
                let sheet = encode_sheet(
                    &self.registry,
                    &self.schema,
                    &self.options.table,
                    &state.view,
                    &response,
                    date,
                );
                Update::new(state).with_effect(Effect::WriteWorkbook { sheet })
            }

            GridEvent::ExportFailed { error } => {
                tracing::warn!(error = %error, "export failed");
                state.last_error = Some(error);
                Update::new(state)
            }
        }
    }

    /// Turn fetched records into one store request each
    fn commit_bulk(&self, mut state: GridState, response: QueryResponse) -> GridUpdate {
        let Some(action) = self.bulk_action(&state).cloned() else {
            return Self::ignore(state, "BulkFetched");
        };
        let Some(bulk) = state.bulk.as_mut().filter(|bulk| bulk.phase == BulkPhase::Applying)
        else {
            return Self::ignore(state, "BulkFetched");
        };

        let form = format!("Bulk {}", action.name());
        let mut effects = Vec::new();
        for row in response.rows {
            let record = row
                .into_iter()
                .next()
                .and_then(|cell| record_from_json(serde_json::Value::from(cell)));
            let Some(record) = record else {
                bulk.report.failures.push(BulkFailure {
                    record_id: None,
                    error: "fetched row is not a record".to_string(),
                });
                continue;
            };
            let updated = action.apply(record, &bulk.form_data);
            effects.push(Effect::Commit {
                record_id: record_id(&updated),
                request: StoreRequest {
                    table_name: self.options.table.clone(),
                    form: form.clone(),
                    record: updated,
                },
            });
        }

        bulk.pending_commit_count = effects.len();
        bulk.phase = BulkPhase::Committing;
        tracing::info!(commits = effects.len(), "committing bulk action");

        if effects.is_empty() {
            return self.finish_bulk(state);
        }
        Update {
            state,
            effects,
        }
    }

    fn finish_bulk(&self, mut state: GridState) -> GridUpdate {
        if let Some(bulk) = state.bulk.take() {
            tracing::info!(
                action = %bulk.report.action,
                committed = bulk.report.committed,
                failed = bulk.report.failures.len(),
                "bulk action finished"
            );
            state.last_bulk_report = Some(bulk.report);
        }
        self.with_request(state)
    }
}

#[cfg(test)]
mod tests;
