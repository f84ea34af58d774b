//! Type registry: per-kind filter compilation, display formatting and
//! export conversion

use crate::compiler::{self, ALTERNATIVE_SEPARATOR, Bound, FilterOutcome};
use crate::export::ExportCell;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::Arc;
use tabula_core::{ColumnFilter, FieldKind, KindTag, Value, parse_date, parse_datetime};

const DISPLAY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DISPLAY_DATE_FORMAT: &str = "%Y-%m-%d";
const UNSUPPORTED_DISPLAY: &str = "?";
const UNSUPPORTED_EXPORT: &str = "(not supported)";

/// Behavior of one field kind.
///
/// Null values never reach a behavior: the registry renders them as an
/// empty string and an empty export cell.
pub trait FieldBehavior: Send + Sync {
    /// The kind this behavior is registered for
    fn tag(&self) -> KindTag;

    /// Compile a single alternative (no `;` handling)
    fn compile_filter(&self, kind: &FieldKind, text: &str) -> FilterOutcome;

    /// Compile a full filter text; alternatives are OR-ed by default
    fn compile_alternatives(&self, kind: &FieldKind, text: &str) -> Vec<FilterOutcome> {
        text.split(ALTERNATIVE_SEPARATOR)
            .map(|alternative| self.compile_filter(kind, alternative))
            .collect()
    }

    fn format(&self, kind: &FieldKind, value: &Value) -> String;

    fn export_cell(&self, kind: &FieldKind, value: &Value) -> ExportCell;
}

/// Closed map from [`KindTag`] to its behavior
#[derive(Clone)]
pub struct TypeRegistry {
    behaviors: BTreeMap<KindTag, Arc<dyn FieldBehavior>>,
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("kinds", &self.behaviors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TypeRegistry {
    /// An empty registry; every kind is unsupported until registered
    pub fn empty() -> Self {
        Self {
            behaviors: BTreeMap::new(),
        }
    }

    /// A registry with a behavior for every kind
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TextBehavior));
        registry.register(Arc::new(EnumBehavior));
        registry.register(Arc::new(NumberBehavior(NumberStyle::Plain)));
        registry.register(Arc::new(NumberBehavior(NumberStyle::Money)));
        registry.register(Arc::new(NumberBehavior(NumberStyle::Percentage)));
        registry.register(Arc::new(NumberBehavior(NumberStyle::Serial)));
        registry.register(Arc::new(DateBehavior));
        registry.register(Arc::new(DateTimeBehavior));
        registry.register(Arc::new(BooleanBehavior));
        registry.register(Arc::new(ArrayBehavior));
        registry
    }

    /// Register a behavior, replacing any previous one for the same kind
    pub fn register(&mut self, behavior: Arc<dyn FieldBehavior>) {
        self.behaviors.insert(behavior.tag(), behavior);
    }

    pub fn behavior(&self, tag: KindTag) -> Option<&dyn FieldBehavior> {
        self.behaviors.get(&tag).map(|behavior| behavior.as_ref())
    }

    /// Compile one alternative for `kind`
    pub fn compile_filter(&self, kind: &FieldKind, text: &str) -> FilterOutcome {
        match self.behavior(kind.tag()) {
            Some(behavior) => behavior.compile_filter(kind, text),
            None => FilterOutcome::Unsupported,
        }
    }

    /// Compile a `;`-separated filter text for `kind`
    pub fn compile_alternatives(&self, kind: &FieldKind, text: &str) -> Vec<FilterOutcome> {
        match self.behavior(kind.tag()) {
            Some(behavior) => behavior.compile_alternatives(kind, text),
            None => vec![FilterOutcome::Unsupported],
        }
    }

    /// Render a value for display
    pub fn format(&self, kind: &FieldKind, value: &Value) -> String {
        if value.is_null() {
            return String::new();
        }
        match self.behavior(kind.tag()) {
            Some(behavior) => behavior.format(kind, value),
            None => UNSUPPORTED_DISPLAY.to_string(),
        }
    }

    /// Convert a value to a spreadsheet cell
    pub fn export_cell(&self, kind: &FieldKind, value: &Value) -> ExportCell {
        if value.is_null() {
            return ExportCell::Empty;
        }
        match self.behavior(kind.tag()) {
            Some(behavior) => behavior.export_cell(kind, value),
            None => ExportCell::Text(UNSUPPORTED_EXPORT.to_string()),
        }
    }
}

struct TextBehavior;

impl FieldBehavior for TextBehavior {
    fn tag(&self) -> KindTag {
        KindTag::Text
    }

    fn compile_filter(&self, _kind: &FieldKind, text: &str) -> FilterOutcome {
        compiler::compile_text(text)
    }

    fn format(&self, _kind: &FieldKind, value: &Value) -> String {
        value.to_text()
    }

    fn export_cell(&self, _kind: &FieldKind, value: &Value) -> ExportCell {
        ExportCell::Text(value.to_text())
    }
}

/// Exact string identity, no operators
struct EnumBehavior;

impl FieldBehavior for EnumBehavior {
    fn tag(&self) -> KindTag {
        KindTag::Enum
    }

    fn compile_filter(&self, _kind: &FieldKind, text: &str) -> FilterOutcome {
        let text = text.trim();
        if text.is_empty() {
            FilterOutcome::Cleared
        } else {
            FilterOutcome::Compiled(ColumnFilter::equal(text))
        }
    }

    fn format(&self, _kind: &FieldKind, value: &Value) -> String {
        value.to_text()
    }

    fn export_cell(&self, _kind: &FieldKind, value: &Value) -> ExportCell {
        ExportCell::Text(value.to_text())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberStyle {
    Plain,
    Money,
    Percentage,
    Serial,
}

struct NumberBehavior(NumberStyle);

impl NumberBehavior {
    /// Parse operand text. Accepts the display format of the style
    /// (currency symbol, thousands separators, trailing `%`).
    fn parse(&self, text: &str) -> Option<Value> {
        let text = text.trim();
        if self.0 == NumberStyle::Serial {
            return parse_integer(text).map(Value::Int);
        }

        let (text, percent) = match (self.0, text.strip_suffix('%')) {
            (NumberStyle::Percentage, Some(stripped)) => (stripped.trim(), true),
            _ => (text, false),
        };
        let cleaned: String = text
            .chars()
            .filter(|c| *c != ',' && !(self.0 == NumberStyle::Money && *c == '$'))
            .collect();

        if percent {
            return parse_decimal(&cleaned).map(|n| Value::Float(n / 100.0));
        }
        match parse_integer(&cleaned) {
            Some(n) => Some(Value::Int(n)),
            None => parse_decimal(&cleaned).map(Value::Float),
        }
    }
}

impl FieldBehavior for NumberBehavior {
    fn tag(&self) -> KindTag {
        match self.0 {
            NumberStyle::Plain => KindTag::Quantity,
            NumberStyle::Money => KindTag::Money,
            NumberStyle::Percentage => KindTag::Percentage,
            NumberStyle::Serial => KindTag::Serial,
        }
    }

    fn compile_filter(&self, _kind: &FieldKind, text: &str) -> FilterOutcome {
        compiler::compile_ordered(text, |operand, _| self.parse(operand))
    }

    fn format(&self, _kind: &FieldKind, value: &Value) -> String {
        let Some(number) = value.as_f64() else {
            return value.to_text();
        };
        match self.0 {
            NumberStyle::Plain => format_plain(number),
            NumberStyle::Serial => value
                .as_i64()
                .map(|n| n.to_string())
                .unwrap_or_else(|| format_plain(number)),
            NumberStyle::Money => format_money(number),
            NumberStyle::Percentage => format!("{}%", format_plain(round_to(number * 100.0, 6))),
        }
    }

    fn export_cell(&self, _kind: &FieldKind, value: &Value) -> ExportCell {
        match value.as_f64() {
            Some(number) => ExportCell::Number(number),
            None => ExportCell::Text(value.to_text()),
        }
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_decimal(text: &str) -> Option<f64> {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    let well_formed = !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|c| *c == '.').count() <= 1
        && body.chars().any(|c| c.is_ascii_digit());
    if !well_formed {
        return None;
    }
    text.parse().ok()
}

fn round_to(number: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (number * factor).round() / factor
}

fn format_plain(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

/// `$1,234.50`, negative amounts as `-$1,234.50`
fn format_money(number: f64) -> String {
    let cents = (number.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let grouped = whole
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .join(",");
    let sign = if number < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Calendar dates compare without adjustment
struct DateBehavior;

impl FieldBehavior for DateBehavior {
    fn tag(&self) -> KindTag {
        KindTag::Date
    }

    fn compile_filter(&self, _kind: &FieldKind, text: &str) -> FilterOutcome {
        compiler::compile_ordered(text, |operand, _| parse_date(operand).map(Value::Date))
    }

    fn format(&self, _kind: &FieldKind, value: &Value) -> String {
        match value.as_date() {
            Some(date) => date.format(DISPLAY_DATE_FORMAT).to_string(),
            None => value.to_text(),
        }
    }

    fn export_cell(&self, _kind: &FieldKind, value: &Value) -> ExportCell {
        match value.as_date() {
            Some(date) => ExportCell::Date(date),
            None => ExportCell::Text(value.to_text()),
        }
    }
}

struct DateTimeBehavior;

impl DateTimeBehavior {
    /// A bare date covers the whole day; text with a time is taken exactly
    fn parse(text: &str, bound: Bound) -> Option<Value> {
        if let Some(date) = parse_date(text) {
            return day_bound(date, bound).map(Value::DateTime);
        }
        parse_datetime(text).map(Value::DateTime)
    }
}

fn day_bound(date: NaiveDate, bound: Bound) -> Option<NaiveDateTime> {
    let start = date.and_hms_opt(0, 0, 0)?;
    match bound {
        Bound::Lower => Some(start),
        Bound::Upper => start.checked_add_signed(Duration::days(1)),
    }
}

impl FieldBehavior for DateTimeBehavior {
    fn tag(&self) -> KindTag {
        KindTag::DateTime
    }

    fn compile_filter(&self, _kind: &FieldKind, text: &str) -> FilterOutcome {
        compiler::compile_ordered(text, Self::parse)
    }

    fn format(&self, _kind: &FieldKind, value: &Value) -> String {
        match value.as_datetime() {
            Some(datetime) => datetime.format(DISPLAY_DATETIME_FORMAT).to_string(),
            None => value.to_text(),
        }
    }

    fn export_cell(&self, _kind: &FieldKind, value: &Value) -> ExportCell {
        match value.as_datetime() {
            Some(datetime) => ExportCell::DateTime(datetime),
            None => ExportCell::Text(value.to_text()),
        }
    }
}

/// Only the literal tokens are recognized; `;` does not combine them
struct BooleanBehavior;

impl BooleanBehavior {
    fn token(text: &str) -> Option<bool> {
        match text.trim() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        }
    }
}

impl FieldBehavior for BooleanBehavior {
    fn tag(&self) -> KindTag {
        KindTag::Boolean
    }

    fn compile_filter(&self, _kind: &FieldKind, text: &str) -> FilterOutcome {
        match Self::token(text) {
            Some(flag) => FilterOutcome::Compiled(ColumnFilter::equal(flag)),
            None if text.trim().is_empty() => FilterOutcome::Cleared,
            None => FilterOutcome::Unparseable,
        }
    }

    /// The first recognized token wins
    fn compile_alternatives(&self, kind: &FieldKind, text: &str) -> Vec<FilterOutcome> {
        let mut alternatives = text.split(ALTERNATIVE_SEPARATOR);
        if let Some(flag) = alternatives.clone().find_map(Self::token) {
            return vec![FilterOutcome::Compiled(ColumnFilter::equal(flag))];
        }
        if alternatives.all(|alternative| alternative.trim().is_empty()) {
            vec![FilterOutcome::Cleared]
        } else {
            vec![self.compile_filter(kind, text)]
        }
    }

    fn format(&self, _kind: &FieldKind, value: &Value) -> String {
        match value.as_bool() {
            Some(true) => "yes".to_string(),
            Some(false) => "no".to_string(),
            None => value.to_text(),
        }
    }

    fn export_cell(&self, _kind: &FieldKind, value: &Value) -> ExportCell {
        match value.as_bool() {
            Some(flag) => ExportCell::Bool(flag),
            None => ExportCell::Text(value.to_text()),
        }
    }
}

/// Arrays of text behave like text on their elements; other item kinds
/// are unsupported
struct ArrayBehavior;

fn text_items(kind: &FieldKind) -> bool {
    matches!(kind, FieldKind::Array { items } if **items == FieldKind::Text)
}

fn join_items(value: &Value, separator: &str) -> String {
    match value {
        Value::Array(items) => items.iter().map(Value::to_text).join(separator),
        other => other.to_text(),
    }
}

impl FieldBehavior for ArrayBehavior {
    fn tag(&self) -> KindTag {
        KindTag::Array
    }

    fn compile_filter(&self, kind: &FieldKind, text: &str) -> FilterOutcome {
        if text_items(kind) {
            compiler::compile_text(text)
        } else {
            FilterOutcome::Unsupported
        }
    }

    fn compile_alternatives(&self, kind: &FieldKind, text: &str) -> Vec<FilterOutcome> {
        if text_items(kind) {
            text.split(ALTERNATIVE_SEPARATOR)
                .map(compiler::compile_text)
                .collect()
        } else {
            vec![FilterOutcome::Unsupported]
        }
    }

    fn format(&self, kind: &FieldKind, value: &Value) -> String {
        if text_items(kind) {
            join_items(value, ",")
        } else {
            UNSUPPORTED_DISPLAY.to_string()
        }
    }

    fn export_cell(&self, kind: &FieldKind, value: &Value) -> ExportCell {
        if text_items(kind) {
            ExportCell::Text(join_items(value, ", "))
        } else {
            ExportCell::Text(UNSUPPORTED_EXPORT.to_string())
        }
    }
}
