//! Query assembler: grid state in, record store query out

use crate::bulk::BulkAction;
use crate::compiler::{ColumnFilterReport, compile_column};
use crate::registry::TypeRegistry;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tabula_core::{
    ColumnFilter, FilterDetail, QueryRequest, RecordId, Row, Schema, Value, ViewSpec,
};

/// Column that yields a null cell; placeholder for absent trailer columns
pub const NULL_COLUMN: &str = "null";

/// Column that yields the record id
pub const ID_COLUMN: &str = "id";

/// Column that yields the whole record as one JSON object
pub const WHOLE_RECORD_COLUMN: &str = ".";

/// Static configuration of one grid
#[derive(Debug, Clone, Default)]
pub struct GridOptions {
    pub table: String,
    /// Sorts used when none is chosen, and appended as tiebreaks otherwise
    pub fallback_sorts: Vec<String>,
    /// Scoping predicates always AND-ed into display and export queries
    pub mandatory_filters: Vec<FilterDetail>,
    pub color_column: Option<String>,
    pub text_color_column: Option<String>,
    pub extra_columns: Vec<String>,
    pub bulk_actions: Vec<Arc<dyn BulkAction>>,
}

impl GridOptions {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn fallback_sorts(mut self, sorts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fallback_sorts = sorts.into_iter().map(Into::into).collect();
        self
    }

    pub fn mandatory_filter(mut self, filter: FilterDetail) -> Self {
        self.mandatory_filters.push(filter);
        self
    }

    pub fn color_columns(
        mut self,
        color: Option<impl Into<String>>,
        text_color: Option<impl Into<String>>,
    ) -> Self {
        self.color_column = color.map(Into::into);
        self.text_color_column = text_color.map(Into::into);
        self
    }

    pub fn extra_columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn bulk_action(mut self, action: Arc<dyn BulkAction>) -> Self {
        self.bulk_actions.push(action);
        self
    }

    /// Bookkeeping columns appended to display queries, in order
    pub fn trailer(&self) -> Vec<String> {
        let mut trailer = vec![
            self.color_column.clone().unwrap_or_else(|| NULL_COLUMN.to_string()),
            self.text_color_column.clone().unwrap_or_else(|| NULL_COLUMN.to_string()),
            ID_COLUMN.to_string(),
        ];
        trailer.extend(self.extra_columns.iter().cloned());
        trailer
    }
}

/// Positions of the bookkeeping trailer in a display row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    visible: usize,
    extras: Vec<String>,
}

impl RowLayout {
    pub fn new(options: &GridOptions, view: &ViewSpec) -> Self {
        Self {
            visible: view.columns.len(),
            extras: options.extra_columns.clone(),
        }
    }

    pub fn visible_count(&self) -> usize {
        self.visible
    }

    pub fn color_index(&self) -> usize {
        self.visible
    }

    pub fn text_color_index(&self) -> usize {
        self.visible + 1
    }

    pub fn id_index(&self) -> usize {
        self.visible + 2
    }

    pub fn extra_index(&self, column: &str) -> Option<usize> {
        self.extras
            .iter()
            .position(|extra| extra == column)
            .map(|position| self.visible + 3 + position)
    }

    /// Total cells per row
    pub fn width(&self) -> usize {
        self.visible + 3 + self.extras.len()
    }

    pub fn visible_cells<'a>(&self, row: &'a Row) -> &'a [Value] {
        &row[..self.visible.min(row.len())]
    }

    pub fn id(&self, row: &Row) -> Option<RecordId> {
        match row.get(self.id_index())? {
            Value::String(id) => Some(id.clone()),
            Value::Int(id) => Some(id.to_string()),
            _ => None,
        }
    }

    pub fn color<'a>(&self, row: &'a Row) -> Option<&'a str> {
        row.get(self.color_index()).and_then(Value::as_str)
    }

    pub fn text_color<'a>(&self, row: &'a Row) -> Option<&'a str> {
        row.get(self.text_color_index()).and_then(Value::as_str)
    }

    pub fn extra<'a>(&self, row: &'a Row, column: &str) -> Option<&'a Value> {
        row.get(self.extra_index(column)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPurpose {
    /// Bounded, with the bookkeeping trailer
    Display,
    /// Unbounded, visible columns only
    Export,
}

/// Selection scope of an active bulk action
#[derive(Debug, Clone)]
pub struct BulkScope<'a> {
    pub selected: &'a BTreeSet<RecordId>,
    pub extra_filters: Vec<FilterDetail>,
}

/// Everything of the grid state a query depends on
#[derive(Debug, Clone)]
pub struct QueryInput<'a> {
    pub view: &'a ViewSpec,
    pub filter_texts: &'a IndexMap<String, String>,
    pub sort_column: Option<&'a str>,
    pub sort_descending: bool,
    pub limit: usize,
    pub bulk: Option<BulkScope<'a>>,
}

pub struct QueryAssembler<'a> {
    options: &'a GridOptions,
    registry: &'a TypeRegistry,
    schema: &'a Schema,
}

impl<'a> QueryAssembler<'a> {
    pub fn new(options: &'a GridOptions, registry: &'a TypeRegistry, schema: &'a Schema) -> Self {
        Self {
            options,
            registry,
            schema,
        }
    }

    /// Compile the filter text of every visible column, in the order the
    /// texts were first entered
    pub fn filter_reports(
        &self,
        view: &ViewSpec,
        filter_texts: &IndexMap<String, String>,
    ) -> Vec<ColumnFilterReport> {
        filter_texts
            .iter()
            .filter(|(column, _)| view.column(column).is_some())
            .map(|(column, text)| {
                let kind = self.schema.resolve(&self.options.table, view.segment(), column);
                compile_column(self.registry, kind, column, text)
            })
            .collect()
    }

    pub fn assemble(&self, input: &QueryInput<'_>, purpose: QueryPurpose) -> QueryRequest {
        let mut filters: Vec<FilterDetail> = self
            .filter_reports(input.view, input.filter_texts)
            .iter()
            .filter_map(ColumnFilterReport::detail)
            .collect();
        filters.extend(self.options.mandatory_filters.iter().cloned());

        if let Some(bulk) = &input.bulk {
            filters.extend(bulk.extra_filters.iter().cloned());
            filters = vec![FilterDetail::or(vec![
                FilterDetail::and(filters),
                FilterDetail::column(ID_COLUMN, ColumnFilter::one_of(bulk.selected.iter().cloned())),
            ])];
        }

        let mut columns: Vec<String> = input
            .view
            .columns
            .iter()
            .map(|column| column.column.clone())
            .collect();
        if purpose == QueryPurpose::Display {
            columns.extend(self.options.trailer());
        }

        let sorts = match input.sort_column {
            Some(column) => {
                let prefix = if input.sort_descending { "-" } else { "" };
                std::iter::once(format!("{}{}", prefix, column))
                    .chain(self.options.fallback_sorts.iter().cloned())
                    .collect()
            }
            None => self.options.fallback_sorts.clone(),
        };

        let limit = match (purpose, &input.bulk) {
            (QueryPurpose::Display, None) => Some(input.limit),
            _ => None,
        };

        let request = QueryRequest {
            table_name: self.options.table.clone(),
            segment: input.view.segment().map(String::from),
            columns,
            sorts,
            filters,
            limit,
        };
        tracing::debug!(
            table = %request.table_name,
            filters = request.filters.len(),
            limit = ?request.limit,
            purpose = ?purpose,
            "assembled query"
        );
        request
    }

    /// Fetch whole records for exactly `selected`, ignoring every other filter
    pub fn selected_records(&self, selected: &BTreeSet<RecordId>) -> QueryRequest {
        QueryRequest::new(self.options.table.clone())
            .columns([WHOLE_RECORD_COLUMN])
            .filter(FilterDetail::column(
                ID_COLUMN,
                ColumnFilter::one_of(selected.iter().cloned()),
            ))
    }
}
