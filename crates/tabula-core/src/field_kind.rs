//! Semantic field kinds and the static column schema

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The semantic type of a column.
///
/// Governs how filter text is compiled, how values are displayed and how
/// they are converted for spreadsheet export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text
    Text,
    /// One of a closed set of string values
    Enum { values: Vec<String> },
    /// Plain number
    Quantity,
    /// Currency amount
    Money,
    /// Fraction displayed as a percentage (0.5 is 50%)
    Percentage,
    /// Auto-incrementing serial number
    Serial,
    /// Calendar date
    Date,
    /// Date and time
    #[serde(rename = "datetime")]
    DateTime,
    /// True/false
    Boolean,
    /// Array of another kind
    Array { items: Box<FieldKind> },
}

impl FieldKind {
    /// The registry tag for this kind
    pub fn tag(&self) -> KindTag {
        match self {
            FieldKind::Text => KindTag::Text,
            FieldKind::Enum { .. } => KindTag::Enum,
            FieldKind::Quantity => KindTag::Quantity,
            FieldKind::Money => KindTag::Money,
            FieldKind::Percentage => KindTag::Percentage,
            FieldKind::Serial => KindTag::Serial,
            FieldKind::Date => KindTag::Date,
            FieldKind::DateTime => KindTag::DateTime,
            FieldKind::Boolean => KindTag::Boolean,
            FieldKind::Array { .. } => KindTag::Array,
        }
    }

    /// Whether this kind is numeric (money, percentage, plain number, serial)
    pub fn is_quantity_like(&self) -> bool {
        matches!(
            self,
            FieldKind::Quantity | FieldKind::Money | FieldKind::Percentage | FieldKind::Serial
        )
    }

    pub fn enumeration(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        FieldKind::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array_of(items: FieldKind) -> Self {
        FieldKind::Array {
            items: Box::new(items),
        }
    }
}

/// Discriminant of [`FieldKind`], used as the key of the type registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KindTag {
    Text,
    Enum,
    Quantity,
    Money,
    Percentage,
    Serial,
    Date,
    DateTime,
    Boolean,
    Array,
}

impl KindTag {
    /// Every tag, in declaration order
    pub const ALL: [KindTag; 10] = [
        KindTag::Text,
        KindTag::Enum,
        KindTag::Quantity,
        KindTag::Money,
        KindTag::Percentage,
        KindTag::Serial,
        KindTag::Date,
        KindTag::DateTime,
        KindTag::Boolean,
        KindTag::Array,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            KindTag::Text => "text",
            KindTag::Enum => "enum",
            KindTag::Quantity => "quantity",
            KindTag::Money => "money",
            KindTag::Percentage => "percentage",
            KindTag::Serial => "serial",
            KindTag::Date => "date",
            KindTag::DateTime => "datetime",
            KindTag::Boolean => "boolean",
            KindTag::Array => "array",
        }
    }
}

/// Static schema: column kinds keyed by table name and optional segment.
///
/// Tables are stored under `table` or `table@segment`. Column keys may carry
/// an `@` suffix (e.g. `personnel.name@role`); only the part before the `@`
/// is used for lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    tables: HashMap<String, IndexMap<String, FieldKind>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the columns of a table (or `table@segment`)
    pub fn with_table(
        mut self,
        key: impl Into<String>,
        columns: impl IntoIterator<Item = (impl Into<String>, FieldKind)>,
    ) -> Self {
        self.tables.insert(
            key.into(),
            columns.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        );
        self
    }

    /// Look up the kind of a column
    pub fn resolve(&self, table: &str, segment: Option<&str>, column: &str) -> Option<&FieldKind> {
        let table_key = match segment {
            Some(segment) if !segment.is_empty() => format!("{}@{}", table, segment),
            _ => table.to_string(),
        };
        let column_key = column.split('@').next().unwrap_or(column);
        let kind = self
            .tables
            .get(&table_key)
            .and_then(|columns| columns.get(column_key));
        if kind.is_none() {
            tracing::debug!(table = %table_key, column = %column, "column not found in schema");
        }
        kind
    }

    /// Columns of a table in declaration order
    pub fn columns(&self, table: &str) -> Option<&IndexMap<String, FieldKind>> {
        self.tables.get(table)
    }
}
