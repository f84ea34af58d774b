//! Filter text mini-language
//!
//! Each column carries a short filter text that compiles to zero or more
//! [`ColumnFilter`] predicates:
//!
//! ```text
//! >X       greater than X
//! <X       less than X
//! X to Y   strictly between X and Y
//! =        is empty
//! =X       equal to X (case-insensitive for text)
//! !X       not equal to X (case-insensitive for text)
//! X        kind default: substring match for text, equality otherwise
//! A;B      A or B
//! ```
//!
//! Comparisons are strict, so numeric and date ranges exclude both
//! endpoints: `10 to 20` matches neither 10 nor 20. On date-time columns a
//! bare date stands for its whole day, so `2024-01-01 to 2024-01-31` runs
//! from midnight on the first through the end of the 31st.
//!
//! The range form is a plain substring test on `" to "` and is not
//! recognized for text columns, where it would shadow ordinary searches.

use crate::registry::TypeRegistry;
use serde::Serialize;
use tabula_core::{ColumnFilter, FieldKind, FilterDetail, Value};

/// Separates alternatives within one column's filter text
pub const ALTERNATIVE_SEPARATOR: char = ';';

/// Separates the bounds of a range
pub const RANGE_SEPARATOR: &str = " to ";

/// Result of compiling one alternative
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "filter", rename_all = "snake_case")]
pub enum FilterOutcome {
    /// A predicate to send to the record store
    Compiled(ColumnFilter),
    /// Empty text, nothing to filter on
    Cleared,
    /// The text could not be parsed for this kind; the input is invalid
    Unparseable,
    /// This kind cannot be filtered at all
    Unsupported,
}

impl FilterOutcome {
    pub fn predicate(&self) -> Option<&ColumnFilter> {
        match self {
            FilterOutcome::Compiled(filter) => Some(filter),
            _ => None,
        }
    }

    pub fn into_predicate(self) -> Option<ColumnFilter> {
        match self {
            FilterOutcome::Compiled(filter) => Some(filter),
            _ => None,
        }
    }
}

/// Which end of a range a parsed value is used for.
///
/// Whole-day values widen to cover the day: a lower bound is the start of
/// the day, an upper bound is the start of the next day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Lower,
    Upper,
}

/// Compile one alternative for a free-text column
pub fn compile_text(text: &str) -> FilterOutcome {
    let text = text.trim();
    let filter = if text.is_empty() {
        return FilterOutcome::Cleared;
    } else if let Some(rest) = text.strip_prefix('>') {
        ColumnFilter::greater(rest.trim())
    } else if let Some(rest) = text.strip_prefix('<') {
        ColumnFilter::lesser(rest.trim())
    } else if text == "=" {
        ColumnFilter::is_empty()
    } else if let Some(rest) = text.strip_prefix('=') {
        ColumnFilter::equal(rest.trim()).ignoring_case()
    } else if let Some(rest) = text.strip_prefix('!') {
        ColumnFilter::not_equal(rest.trim()).ignoring_case()
    } else {
        ColumnFilter::like(to_pattern(text))
    };
    FilterOutcome::Compiled(filter)
}

/// Compile one alternative for an ordered kind (numbers, dates).
///
/// `parse` converts operand text into a comparable value, or `None` when it
/// cannot; any unparseable operand makes the whole alternative unparseable.
pub fn compile_ordered<F>(text: &str, parse: F) -> FilterOutcome
where
    F: Fn(&str, Bound) -> Option<Value>,
{
    let text = text.trim();
    let operand = |raw: &str, bound: Bound| parse(raw.trim(), bound);

    let filter = if text.is_empty() {
        return FilterOutcome::Cleared;
    } else if let Some(rest) = text.strip_prefix('>') {
        operand(rest, Bound::Upper).map(ColumnFilter::greater)
    } else if let Some(rest) = text.strip_prefix('<') {
        operand(rest, Bound::Lower).map(ColumnFilter::lesser)
    } else if let Some((lhs, rhs)) = text.split_once(RANGE_SEPARATOR) {
        operand(lhs, Bound::Lower)
            .zip(operand(rhs, Bound::Upper))
            .map(|(lower, upper)| ColumnFilter::between(lower, upper))
    } else if text == "=" {
        Some(ColumnFilter::is_empty())
    } else if let Some(rest) = text.strip_prefix('=') {
        operand(rest, Bound::Lower).map(ColumnFilter::equal)
    } else if let Some(rest) = text.strip_prefix('!') {
        operand(rest, Bound::Lower).map(ColumnFilter::not_equal)
    } else {
        operand(text, Bound::Lower).map(ColumnFilter::equal)
    };

    match filter {
        Some(filter) => FilterOutcome::Compiled(filter),
        None => {
            tracing::debug!(text = %text, "unparseable filter alternative");
            FilterOutcome::Unparseable
        }
    }
}

/// Turn user text into a substring pattern for the store's `like`.
///
/// `*` and `?` are the user's wildcards; the store's own wildcard characters
/// are escaped so they match literally.
pub fn to_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        match c {
            '\\' | '%' | '_' => {
                pattern.push('\\');
                pattern.push(c);
            }
            '*' => pattern.push('%'),
            '?' => pattern.push('_'),
            c => pattern.push(c),
        }
    }
    pattern.push('%');
    pattern
}

/// Compiled filter text of one column, with a verdict per alternative
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnFilterReport {
    pub column: String,
    pub text: String,
    pub outcomes: Vec<FilterOutcome>,
}

impl ColumnFilterReport {
    pub fn predicates(&self) -> impl Iterator<Item = &ColumnFilter> {
        self.outcomes.iter().filter_map(FilterOutcome::predicate)
    }

    /// Some alternative could not be parsed
    pub fn is_invalid(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| matches!(outcome, FilterOutcome::Unparseable))
    }

    /// The column's kind cannot be filtered
    pub fn is_unsupported(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| matches!(outcome, FilterOutcome::Unsupported))
    }

    /// The query fragment for this column: nothing, a single predicate, or
    /// an `or` over all valid alternatives
    pub fn detail(&self) -> Option<FilterDetail> {
        let mut details: Vec<FilterDetail> = self
            .predicates()
            .map(|filter| FilterDetail::column(self.column.clone(), filter.clone()))
            .collect();
        match details.len() {
            0 => None,
            1 => details.pop(),
            _ => Some(FilterDetail::or(details)),
        }
    }
}

/// Compile a column's full filter text.
///
/// A column whose kind is unknown reports `Unsupported` for any non-empty
/// text.
pub fn compile_column(
    registry: &TypeRegistry,
    kind: Option<&FieldKind>,
    column: &str,
    text: &str,
) -> ColumnFilterReport {
    let outcomes = if text.trim().is_empty() {
        Vec::new()
    } else {
        match kind {
            Some(kind) => registry.compile_alternatives(kind, text),
            None => vec![FilterOutcome::Unsupported],
        }
    };

    let report = ColumnFilterReport {
        column: column.to_string(),
        text: text.to_string(),
        outcomes,
    };
    if report.is_invalid() || report.is_unsupported() {
        tracing::warn!(
            column = %column,
            text = %text,
            unsupported = report.is_unsupported(),
            "filter text dropped from query"
        );
    }
    report
}
