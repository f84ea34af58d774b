//! Structured filter predicates sent with a query
//!
//! A [`ColumnFilter`] is the atom: every condition it carries must hold for a
//! cell to match. [`FilterDetail`] combines atoms with `and`/`or`/`not`.
//! The `matches` methods evaluate predicates in process with the same
//! semantics a record store applies:
//!
//! - `equal: null` means "is empty", `not_equal: null` means "is not empty"
//! - `greater`/`lesser` are strict; a null cell never satisfies a comparison
//! - `like` is a case-insensitive glob (`%` any run, `_` one char, `\` escape)
//! - `in: []` matches nothing
//! - array cells match `like`/`equal`/`not_equal` when any element does

use crate::types::{Record, Value};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

/// Predicate on a single column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub equal: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub not_equal: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub greater: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub lesser: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<String>,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub in_list: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersects: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_case: bool,
}

/// A key that is present with a `null` value deserializes to `Some(Value::Null)`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl ColumnFilter {
    pub fn equal(value: impl Into<Value>) -> Self {
        Self {
            equal: Some(value.into()),
            ..Default::default()
        }
    }

    /// `equal: null`, the explicit "is empty" test
    pub fn is_empty() -> Self {
        Self {
            equal: Some(Value::Null),
            ..Default::default()
        }
    }

    pub fn not_equal(value: impl Into<Value>) -> Self {
        Self {
            not_equal: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn greater(value: impl Into<Value>) -> Self {
        Self {
            greater: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn lesser(value: impl Into<Value>) -> Self {
        Self {
            lesser: Some(value.into()),
            ..Default::default()
        }
    }

    /// Exclusive range `lower < cell < upper`
    pub fn between(lower: impl Into<Value>, upper: impl Into<Value>) -> Self {
        Self {
            greater: Some(lower.into()),
            lesser: Some(upper.into()),
            ..Default::default()
        }
    }

    pub fn like(pattern: impl Into<String>) -> Self {
        Self {
            like: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn one_of(values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            in_list: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn ignoring_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    /// Whether `cell` satisfies every condition of this filter
    pub fn matches(&self, cell: &Value) -> bool {
        if let Some(pattern) = &self.like {
            let hit = match cell {
                Value::Null => false,
                Value::Array(items) => items.iter().any(|item| like_matches(pattern, &item.to_text())),
                other => like_matches(pattern, &other.to_text()),
            };
            if !hit {
                return false;
            }
        }

        if let Some(expected) = &self.equal {
            let hit = match (expected, cell) {
                (Value::Null, cell) => cell.is_null(),
                (expected, Value::Array(items)) => items
                    .iter()
                    .any(|item| item.loosely_equals(expected, self.ignore_case)),
                (expected, cell) => cell.loosely_equals(expected, self.ignore_case),
            };
            if !hit {
                return false;
            }
        }

        if let Some(excluded) = &self.not_equal {
            let hit = match (excluded, cell) {
                (Value::Null, cell) => !cell.is_null(),
                (_, Value::Null) => false,
                (excluded, Value::Array(items)) => items
                    .iter()
                    .any(|item| !item.loosely_equals(excluded, self.ignore_case)),
                (excluded, cell) => !cell.loosely_equals(excluded, self.ignore_case),
            };
            if !hit {
                return false;
            }
        }

        if let Some(bound) = &self.greater {
            if cell.compare(bound) != Some(Ordering::Greater) {
                return false;
            }
        }

        if let Some(bound) = &self.lesser {
            if cell.compare(bound) != Some(Ordering::Less) {
                return false;
            }
        }

        if let Some(list) = &self.in_list {
            if !list.iter().any(|candidate| cell.loosely_equals(candidate, false)) {
                return false;
            }
        }

        if let Some(list) = &self.intersects {
            let hit = match cell {
                Value::Array(items) => items
                    .iter()
                    .any(|item| list.iter().any(|candidate| item.loosely_equals(candidate, false))),
                _ => false,
            };
            if !hit {
                return false;
            }
        }

        true
    }
}

/// A filter tree as sent to the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterDetail {
    Column { column: String, filter: ColumnFilter },
    And { and: Vec<FilterDetail> },
    Or { or: Vec<FilterDetail> },
    Not { not: Box<FilterDetail> },
}

impl FilterDetail {
    pub fn column(column: impl Into<String>, filter: ColumnFilter) -> Self {
        FilterDetail::Column {
            column: column.into(),
            filter,
        }
    }

    pub fn and(items: Vec<FilterDetail>) -> Self {
        FilterDetail::And { and: items }
    }

    pub fn or(items: Vec<FilterDetail>) -> Self {
        FilterDetail::Or { or: items }
    }

    pub fn negate(item: FilterDetail) -> Self {
        FilterDetail::Not { not: Box::new(item) }
    }

    /// Evaluate against a full record. Missing columns read as null;
    /// an empty `or` matches nothing and an empty `and` matches everything.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            FilterDetail::Column { column, filter } => {
                let key = column.split('@').next().unwrap_or(column);
                filter.matches(record.get(key).unwrap_or(&Value::Null))
            }
            FilterDetail::And { and } => and.iter().all(|item| item.matches(record)),
            FilterDetail::Or { or } => or.iter().any(|item| item.matches(record)),
            FilterDetail::Not { not } => !not.matches(record),
        }
    }
}

/// Case-insensitive glob match: `%` any run, `_` one char, `\` escapes
pub fn like_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<LikeToken> = tokenize_like(&pattern.to_lowercase());
    let text: Vec<char> = text.to_lowercase().chars().collect();

    // Iterative wildcard matching with a single backtrack point
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(LikeToken::AnyRun) => {
                star = Some((p, t));
                p += 1;
            }
            Some(LikeToken::AnyOne) => {
                p += 1;
                t += 1;
            }
            Some(LikeToken::Literal(c)) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|token| *token == LikeToken::AnyRun)
}

#[derive(Debug, PartialEq)]
enum LikeToken {
    Literal(char),
    AnyOne,
    AnyRun,
}

fn tokenize_like(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            '%' => LikeToken::AnyRun,
            '_' => LikeToken::AnyOne,
            c => LikeToken::Literal(c),
        });
    }
    tokens
}
