//! Bronze → silver: canonical column names, clean strings, parsed dates, business rules.

use crate::error::MedallionError;
use crate::pipeline::rules::RuleConfig;
use crate::table::Column;
use crate::table::ColumnType;
use crate::table::SchemaError;
use crate::table::Table;
use crate::table::Value;
use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use log::debug;
use log::warn;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Column names treated as dates without being declared.
static DATE_LIKE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(date|dt|time|timestamp|datetime)$|^(date|dt)_|_(date|dt|time|timestamp|datetime|at|on|seen)$")
        .expect("Hardcode regex pattern")
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const MONTH_FIRST_DATETIME_FORMATS: &[&str] = &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];
const MONTH_FIRST_DATE_FORMATS: &[&str] = &["%m/%d/%Y"];
const DAY_FIRST_DATETIME_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];
const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y"];

/// Options of the silver transform.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SilverOptions {
    /// Canonical names of columns to parse as dates
    pub date_columns: Vec<String>,
    /// Also parse columns whose name looks like a date (`created_at`, `last_seen`, `dt`)
    pub detect_date_columns: bool,
    /// Read `01/02/2020` as 1 February instead of 2 January
    pub day_first: bool,
    /// Collapse internal runs of whitespace to one space
    pub collapse_whitespace: bool,
    /// Configured business rules, run before any added with [`SilverTransform::with_rule`]
    pub rules: Vec<RuleConfig>,
}

impl Default for SilverOptions {
    fn default() -> Self {
        SilverOptions {
            date_columns: Vec::new(),
            detect_date_columns: true,
            day_first: false,
            collapse_whitespace: true,
            rules: Vec::new(),
        }
    }
}

/// A named table-to-table step applied after the structural normalisation.
pub trait BusinessRule: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, table: Table) -> Result<Table, MedallionError>;
}

/// [`BusinessRule`] backed by a closure.
pub struct FnRule<F> {
    name: String,
    function: F,
}

impl<F> FnRule<F>
where
    F: Fn(Table) -> Result<Table, MedallionError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, function: F) -> Self {
        FnRule {
            name: name.into(),
            function,
        }
    }
}

impl<F> BusinessRule for FnRule<F>
where
    F: Fn(Table) -> Result<Table, MedallionError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, table: Table) -> Result<Table, MedallionError> {
        (self.function)(table)
    }
}

/// Result of the silver transform.
#[derive(Clone, Debug, PartialEq)]
pub struct SilverOutcome {
    pub table: Table,
    /// Number of non-null cells per column that could not be parsed as dates
    pub coercion_failures: BTreeMap<String, usize>,
}

/// The configured bronze → silver transform.
///
/// Steps run in a fixed order: column-name canonicalisation, string
/// normalisation, date parsing, then the business rules in registration order.
#[derive(Default)]
pub struct SilverTransform {
    options: SilverOptions,
    rules: Vec<Box<dyn BusinessRule>>,
}

impl SilverTransform {
    pub fn new(options: SilverOptions) -> Self {
        let rules = options.rules.iter().map(RuleConfig::build).collect();
        SilverTransform { options, rules }
    }

    /// Appends a rule; rules run in the order they are added.
    pub fn with_rule(mut self, rule: impl BusinessRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn options(&self) -> &SilverOptions {
        &self.options
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn apply(&self, bronze: &Table) -> Result<SilverOutcome, MedallionError> {
        let mut columns = canonical_columns(bronze.columns())?;
        let mut rows = bronze.rows().to_vec();

        for (index, column) in columns.iter().enumerate() {
            if column.kind == ColumnType::Varchar {
                for row in rows.iter_mut() {
                    if let Value::Varchar(text) = &row[index] {
                        row[index] = normalize_text(text, self.options.collapse_whitespace)
                            .map(Value::Varchar)
                            .unwrap_or(Value::Null);
                    }
                }
            }
        }

        for name in &self.options.date_columns {
            if !columns.iter().any(|column| column.name == *name) {
                Err(SchemaError::MissingColumn(name.to_owned()))?;
            }
        }

        let mut coercion_failures = BTreeMap::new();
        for (index, column) in columns.iter_mut().enumerate() {
            if column.kind != ColumnType::Varchar {
                continue;
            }
            let declared = self.options.date_columns.contains(&column.name);
            let detected = !declared && self.options.detect_date_columns && is_date_like(&column.name);
            if !declared && !detected {
                continue;
            }

            let parsed: Vec<Option<ParsedDate>> = rows
                .iter()
                .map(|row| row[index].as_str().and_then(|text| parse_date(text, self.options.day_first)))
                .collect();
            let attempted = rows.iter().filter(|row| !row[index].is_null()).count();
            let succeeded = parsed.iter().flatten().count();
            if detected && succeeded == 0 {
                debug!("Column '{}' looks like a date but no value parses; kept as text", column.name);
                continue;
            }

            let kind = if parsed.iter().flatten().all(|date| matches!(date, ParsedDate::Date(_))) {
                ColumnType::Date
            } else {
                ColumnType::Timestamp
            };
            for (row, date) in rows.iter_mut().zip(parsed) {
                row[index] = match (date, kind) {
                    (None, _) => Value::Null,
                    (Some(ParsedDate::Date(date)), ColumnType::Date) => Value::Date(date),
                    (Some(ParsedDate::Date(date)), _) => Value::Timestamp(date.and_time(NaiveTime::MIN)),
                    (Some(ParsedDate::Timestamp(datetime)), _) => Value::Timestamp(datetime),
                };
            }
            column.kind = kind;

            let failures = attempted - succeeded;
            if failures > 0 {
                warn!(
                    "{failures} of {attempted} values in column '{}' are not dates and became null",
                    column.name
                );
                coercion_failures.insert(column.name.to_owned(), failures);
            }
        }

        let mut table = Table::new(columns, rows)?;
        for rule in &self.rules {
            debug!("Apply business rule '{}'", rule.name());
            table = rule.apply(table)?;
        }

        debug!(
            "Refined silver table: {} rows, {} columns",
            table.row_count(),
            table.column_count()
        );
        Ok(SilverOutcome {
            table,
            coercion_failures,
        })
    }
}

/// Bronze → silver with default options and no business rules.
pub fn bronze_to_silver(bronze: &Table) -> Result<Table, MedallionError> {
    SilverTransform::default()
        .apply(bronze)
        .map(|outcome| outcome.table)
}

/// Canonical column name: trimmed, lowercased, each run of characters other
/// than letters and digits replaced by one `_`, no leading or trailing `_`.
/// A name with no letters or digits becomes `column`.
pub fn canonical_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let mut canonical = String::with_capacity(lowered.len());
    let mut pending_separator = false;
    for character in lowered.chars() {
        if character.is_alphanumeric() {
            if pending_separator && !canonical.is_empty() {
                canonical.push('_');
            }
            pending_separator = false;
            canonical.push(character);
        } else {
            pending_separator = true;
        }
    }

    if canonical.is_empty() {
        "column".to_owned()
    } else {
        canonical
    }
}

fn canonical_columns(columns: &[Column]) -> Result<Vec<Column>, SchemaError> {
    let mut seen = HashMap::<String, &str>::with_capacity(columns.len());
    let mut canonical = Vec::with_capacity(columns.len());
    for column in columns {
        let name = canonical_name(&column.name);
        if let Some(first) = seen.get(&name) {
            return Err(SchemaError::CanonicalCollision {
                first: first.to_string(),
                second: column.name.to_owned(),
                canonical: name,
            });
        }
        seen.insert(name.to_owned(), &column.name);
        canonical.push(Column::new(name, column.kind));
    }
    Ok(canonical)
}

/// Trims the text and optionally collapses inner whitespace; blank text is `None`.
pub fn normalize_text(text: &str, collapse_whitespace: bool) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if collapse_whitespace {
        Some(trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
    } else {
        Some(trimmed.to_owned())
    }
}

/// True if a canonical column name suggests date values.
pub fn is_date_like(name: &str) -> bool {
    DATE_LIKE_NAME.is_match(name)
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum ParsedDate {
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

/// Parses one date or date/time text. Offsets are converted to UTC.
fn parse_date(text: &str, day_first: bool) -> Option<ParsedDate> {
    let text = text.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(ParsedDate::Timestamp(datetime.naive_utc()));
    }

    let (slash_datetime_formats, slash_date_formats) = if day_first {
        (DAY_FIRST_DATETIME_FORMATS, DAY_FIRST_DATE_FORMATS)
    } else {
        (MONTH_FIRST_DATETIME_FORMATS, MONTH_FIRST_DATE_FORMATS)
    };
    DATETIME_FORMATS
        .iter()
        .chain(slash_datetime_formats)
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(ParsedDate::Timestamp)
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .chain(slash_date_formats)
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .map(ParsedDate::Date)
        })
}
