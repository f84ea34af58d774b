//! Bulk action engine
//!
//! A bulk action moves through four phases:
//!
//! ```text
//! Browsing --start--> Selecting --apply--> Applying --fetched--> Committing
//!     ^                   |                                          |
//!     +------close--------+-------------last commit answered---------+
//! ```
//!
//! Browsing is the absence of a [`BulkState`]. Commits are counted, not
//! sequenced: they may complete in any order and a failed commit is counted
//! like a successful one, then reported.

use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tabula_core::{FilterDetail, Record, RecordId, Value};

/// Opaque state of a detail form, owned by the form implementation
pub type FormState = serde_json::Value;

/// Data edited by a detail form, passed to [`BulkAction::apply`]
pub type FormData = serde_json::Value;

/// The form a user fills in before applying a bulk action
pub trait DetailForm: Send + Sync {
    /// Initial state and data
    fn initialize(&self) -> (FormState, FormData);

    /// Handle a form action, producing new state and data
    fn reduce(&self, state: &FormState, data: &FormData, action: &serde_json::Value)
    -> (FormState, FormData);

    /// Validation errors; empty when the data may be applied
    fn validate(&self, data: &FormData) -> Vec<String>;
}

/// A transform applied to every selected record
pub trait BulkAction: Send + Sync {
    fn name(&self) -> &str;

    fn detail(&self) -> &dyn DetailForm;

    /// Predicates AND-ed into the grid's filters while this action is active
    fn extra_filters(&self) -> Vec<FilterDetail> {
        Vec::new()
    }

    /// Produce the record to store from the fetched one
    fn apply(&self, record: Record, data: &FormData) -> Record;
}

impl fmt::Debug for dyn BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkAction").field("name", &self.name()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkPhase {
    /// Choosing records and editing the detail form
    Selecting,
    /// Full records for the selection are being fetched
    Applying,
    /// Store requests are in flight
    Committing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkFailure {
    pub record_id: Option<RecordId>,
    pub error: String,
}

/// Outcome of one applied bulk action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    pub action: String,
    pub committed: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkState {
    pub action_index: usize,
    pub form_state: FormState,
    pub form_data: FormData,
    /// Never mutated in place; every change installs a new set
    pub selected: Arc<BTreeSet<RecordId>>,
    pub pending_commit_count: usize,
    pub phase: BulkPhase,
    pub report: BulkReport,
}

impl BulkState {
    pub fn start(action_index: usize, action: &dyn BulkAction) -> Self {
        let (form_state, form_data) = action.detail().initialize();
        Self {
            action_index,
            form_state,
            form_data,
            selected: Arc::new(BTreeSet::new()),
            pending_commit_count: 0,
            phase: BulkPhase::Selecting,
            report: BulkReport {
                action: action.name().to_string(),
                ..Default::default()
            },
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// A copy of the selection with `id` added or removed
    pub fn toggled_selection(&self, id: &str, selected: bool) -> Arc<BTreeSet<RecordId>> {
        let mut next = BTreeSet::clone(&self.selected);
        if selected {
            next.insert(id.to_string());
        } else {
            next.remove(id);
        }
        Arc::new(next)
    }

    pub fn validation(&self, action: &dyn BulkAction) -> Vec<String> {
        action.detail().validate(&self.form_data)
    }

    /// Apply is offered only while selecting, with nothing in flight, a
    /// non-empty selection and a valid form
    pub fn can_apply(&self, action: &dyn BulkAction) -> bool {
        self.phase == BulkPhase::Selecting
            && self.pending_commit_count == 0
            && !self.selected.is_empty()
            && self.validation(action).is_empty()
    }

    /// Count one answered commit. Returns true when it was the last one.
    pub fn record_commit(&mut self, record_id: Option<RecordId>, result: Result<(), String>) -> bool {
        self.pending_commit_count = self.pending_commit_count.saturating_sub(1);
        match result {
            Ok(()) => self.report.committed += 1,
            Err(error) => {
                tracing::warn!(record_id = ?record_id, error = %error, "bulk commit failed");
                self.report.failures.push(BulkFailure { record_id, error });
            }
        }
        self.pending_commit_count == 0
    }
}

/// Detail form holding a single `value`
#[derive(Debug, Default)]
pub struct ValueForm;

impl DetailForm for ValueForm {
    fn initialize(&self) -> (FormState, FormData) {
        (json!({}), json!({ "value": null }))
    }

    /// Accepts `{"set": <value>}`
    fn reduce(
        &self,
        state: &FormState,
        data: &FormData,
        action: &serde_json::Value,
    ) -> (FormState, FormData) {
        match action.get("set") {
            Some(value) => (state.clone(), json!({ "value": value })),
            None => (state.clone(), data.clone()),
        }
    }

    fn validate(&self, data: &FormData) -> Vec<String> {
        match data.get("value") {
            Some(value) if !value.is_null() => Vec::new(),
            _ => vec!["value is required".to_string()],
        }
    }
}

/// Sets one column of every selected record to the form's value
#[derive(Debug)]
pub struct SetColumnAction {
    name: String,
    column: String,
    extra_filters: Vec<FilterDetail>,
    form: ValueForm,
}

impl SetColumnAction {
    pub fn new(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            extra_filters: Vec::new(),
            form: ValueForm,
        }
    }

    pub fn with_extra_filter(mut self, filter: FilterDetail) -> Self {
        self.extra_filters.push(filter);
        self
    }
}

impl BulkAction for SetColumnAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn detail(&self) -> &dyn DetailForm {
        &self.form
    }

    fn extra_filters(&self) -> Vec<FilterDetail> {
        self.extra_filters.clone()
    }

    fn apply(&self, mut record: Record, data: &FormData) -> Record {
        let value = data.get("value").cloned().map(Value::from).unwrap_or(Value::Null);
        record.insert(self.column.clone(), value);
        record
    }
}
