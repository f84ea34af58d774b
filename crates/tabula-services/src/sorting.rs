//! Multi-column record sorting with null handling

use std::cmp::Ordering;
use tabula_core::{Record, SortKey, Value};

/// Where null cells go, independent of sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullPosition {
    First,
    /// Matches the record store's ordering
    #[default]
    Last,
}

/// Sort keys in priority order (first = highest priority)
#[derive(Debug, Clone, Default)]
pub struct RecordSort {
    keys: Vec<SortKey>,
    null_position: NullPosition,
}

impl RecordSort {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self {
            keys,
            null_position: NullPosition::default(),
        }
    }

    pub fn with_null_position(mut self, null_position: NullPosition) -> Self {
        self.null_position = null_position;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn compare_values(&self, a: &Value, b: &Value, descending: bool) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match self.null_position {
                NullPosition::First => Ordering::Less,
                NullPosition::Last => Ordering::Greater,
            },
            (false, true) => match self.null_position {
                NullPosition::First => Ordering::Greater,
                NullPosition::Last => Ordering::Less,
            },
            (false, false) => {
                let ordering = compare_non_null_values(a, b);
                if descending { ordering.reverse() } else { ordering }
            }
        }
    }

    pub fn compare_records(&self, a: &Record, b: &Record) -> Ordering {
        for key in &self.keys {
            let left = a.get(&key.column).unwrap_or(&Value::Null);
            let right = b.get(&key.column).unwrap_or(&Value::Null);
            let ordering = self.compare_values(left, right, key.descending);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable sort in place
    pub fn sort(&self, records: &mut [&Record]) {
        if self.is_empty() {
            return;
        }
        records.sort_by(|a, b| self.compare_records(a, b));
    }
}

/// Typed comparison where possible, falling back to case-insensitive text
fn compare_non_null_values(a: &Value, b: &Value) -> Ordering {
    a.compare(b).unwrap_or_else(|| {
        a.to_text()
            .to_lowercase()
            .cmp(&b.to_text().to_lowercase())
    })
}
