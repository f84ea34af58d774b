//! User-authored views and saved filters
//!
//! Both are ordinary records in the record store (tables `View` and
//! `Filter`), fetched whole through the `"."` column.

use crate::error::{Result, TabulaError};
use crate::types::{Record, RecordId, Value, record_from_json};
use serde::{Deserialize, Deserializer, Serialize};

/// Table holding [`ViewSpec`] records
pub const VIEW_TABLE: &str = "View";

/// Table holding [`SavedFilterSpec`] records
pub const FILTER_TABLE: &str = "Filter";

/// One visible column of a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column key in the record store (may carry an `@` suffix)
    pub column: String,
    /// Header text
    pub name: String,
    #[serde(deserialize_with = "lenient_width")]
    pub width: f64,
    /// Filter text applied when no saved filter is selected
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub fixed: bool,
}

impl ColumnSpec {
    pub fn new(column: impl Into<String>, name: impl Into<String>, width: f64) -> Self {
        Self {
            column: column.into(),
            name: name.into(),
            width,
            filter: String::new(),
            fixed: false,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }
}

/// Widths are persisted as decimal strings; accept either form
fn lenient_width<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Width {
        Number(f64),
        Text(String),
    }

    match Width::deserialize(deserializer)? {
        Width::Number(n) => Ok(n),
        Width::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// A named, persisted set of visible columns for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSpec {
    pub id: RecordId,
    #[serde(default)]
    pub record_version: Option<i64>,
    pub name: String,
    pub table: String,
    pub columns: Vec<ColumnSpec>,
    #[serde(rename = "default", default)]
    pub is_default: bool,
    #[serde(default)]
    pub default_sort_column: Option<String>,
    #[serde(rename = "defaultSortDirection", default)]
    pub default_sort_descending: bool,
    #[serde(default)]
    pub segment: Option<String>,
}

impl ViewSpec {
    pub fn new(id: impl Into<RecordId>, name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record_version: None,
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            is_default: false,
            default_sort_column: None,
            default_sort_descending: false,
            segment: None,
        }
    }

    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Default sort column, treating an empty name as unset
    pub fn default_sort(&self) -> Option<&str> {
        self.default_sort_column
            .as_deref()
            .filter(|column| !column.is_empty())
    }

    /// Segment, treating an empty name as unset
    pub fn segment(&self) -> Option<&str> {
        self.segment.as_deref().filter(|segment| !segment.is_empty())
    }

    pub fn column(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.column == key)
    }

    /// Decode a view from the whole-record cell of a `"."` query
    pub fn from_value(value: &Value) -> Result<Self> {
        from_value(value, "view")
    }

    pub fn to_record(&self) -> Result<Record> {
        to_record(self)
    }
}

/// Filter text for one column of a saved filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterColumnSpec {
    pub column: String,
    pub filter: String,
}

/// A named, persisted alternate set of per-column filter texts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFilterSpec {
    pub id: RecordId,
    #[serde(default)]
    pub record_version: Option<i64>,
    pub table: String,
    /// View this filter belongs to
    #[serde(default)]
    pub view: Option<RecordId>,
    /// Owner
    #[serde(default)]
    pub user: Option<String>,
    pub name: String,
    pub columns: Vec<FilterColumnSpec>,
    #[serde(rename = "default", default)]
    pub is_default: bool,
}

impl SavedFilterSpec {
    pub fn from_value(value: &Value) -> Result<Self> {
        from_value(value, "filter")
    }

    pub fn to_record(&self) -> Result<Record> {
        to_record(self)
    }

    pub fn belongs_to(&self, view_id: &str) -> bool {
        self.view.as_deref() == Some(view_id)
    }
}

fn from_value<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    let json = serde_json::Value::from(value.clone());
    serde_json::from_value(json)
        .map_err(|e| TabulaError::Schema(format!("invalid {} record: {}", what, e)))
}

fn to_record<T: Serialize>(spec: &T) -> Result<Record> {
    let json = serde_json::to_value(spec)?;
    record_from_json(json).ok_or_else(|| TabulaError::Other("record is not an object".into()))
}
