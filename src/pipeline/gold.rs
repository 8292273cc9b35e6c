//! Silver → gold: column selection, null filtering, date range and deduplication.

use crate::table::SchemaError;
use crate::table::Table;
use crate::table::Value;
use chrono::NaiveDate;
use log::debug;
use serde::Deserialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::collections::HashSet;
use std::str::FromStr;

/// Inclusive calendar date bounds on one column.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub column: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Parses `column:start:end` with ISO dates, e.g. `dt:2020-01-01:2020-12-31`.
impl FromStr for DateRange {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.rsplitn(3, ':');
        let (Some(end), Some(start), Some(column)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected 'column:start:end', found '{text}'"));
        };
        let parse = |date: &str| {
            NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|e| format!("invalid date '{date}': {e}"))
        };
        Ok(DateRange {
            column: column.trim().to_owned(),
            start: parse(start)?,
            end: parse(end)?,
        })
    }
}

/// Options of the gold transform.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GoldOptions {
    /// Columns to retain in this order; all columns when empty
    pub columns: Vec<String>,
    /// Rows null in any of these columns are dropped
    pub null_filter_columns: Vec<String>,
    pub date_range: Option<DateRange>,
    pub dedupe: bool,
    /// Duplicate key when deduplicating; all retained columns when empty
    pub dedupe_on: Vec<String>,
    /// Within a duplicate group keep the row with the greatest value here
    pub keep_latest_by: Option<String>,
}

/// Shapes a silver table into the gold table.
///
/// Steps run in a fixed order: column selection, null filtering, date-range
/// filtering, deduplication. Every column named by the later steps must be
/// among the retained columns.
pub fn silver_to_gold(silver: &Table, options: &GoldOptions) -> Result<Table, SchemaError> {
    let table = if options.columns.is_empty() {
        silver.clone()
    } else {
        silver.select(&options.columns)?
    };
    debug!("Selected {} of {} columns", table.column_count(), silver.column_count());

    let null_filter = options
        .null_filter_columns
        .iter()
        .map(|name| retained(silver, &table, name))
        .collect::<Result<Vec<_>, _>>()?;
    let date_filter = match &options.date_range {
        Some(range) => {
            let index = retained(silver, &table, &range.column)?;
            let kind = table.columns()[index].kind;
            if !kind.has_date() {
                return Err(SchemaError::WrongType {
                    column: range.column.to_owned(),
                    found: kind.sql_name(),
                    expected: "date or timestamp",
                });
            }
            Some((index, range))
        }
        None => None,
    };
    let dedupe_key = if options.dedupe {
        let key = if options.dedupe_on.is_empty() {
            (0..table.column_count()).collect()
        } else {
            options
                .dedupe_on
                .iter()
                .map(|name| retained(silver, &table, name))
                .collect::<Result<Vec<_>, _>>()?
        };
        Some(key)
    } else {
        None
    };
    let latest_by = match (&options.keep_latest_by, options.dedupe) {
        (Some(name), true) => {
            let index = retained(silver, &table, name)?;
            let kind = table.columns()[index].kind;
            if !kind.is_number() && !kind.is_datetime() {
                return Err(SchemaError::WrongType {
                    column: name.to_owned(),
                    found: kind.sql_name(),
                    expected: "number, date or time",
                });
            }
            Some(index)
        }
        _ => None,
    };

    let table = if null_filter.is_empty() {
        table
    } else {
        table.filter_rows(|_, row| null_filter.iter().all(|index| !row[*index].is_null()))
    };

    let table = match date_filter {
        Some((index, range)) => table.filter_rows(|_, row| {
            row[index]
                .as_date()
                .is_some_and(|date| range.contains(date))
        }),
        None => table,
    };

    let table = match dedupe_key {
        Some(key) => {
            let survivors = survivors(&table, &key, latest_by);
            table.filter_rows(|index, _| survivors.contains(&index))
        }
        None => table,
    };

    debug!(
        "Shaped gold table: {} rows, {} columns",
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

/// Position of `name` in the selected table; silver columns dropped by the
/// selection are reported as not retained.
fn retained(silver: &Table, selected: &Table, name: &str) -> Result<usize, SchemaError> {
    match selected.column_index(name) {
        Some(index) => Ok(index),
        None if silver.column_index(name).is_some() => Err(SchemaError::NotRetained(name.to_owned())),
        None => Err(SchemaError::MissingColumn(name.to_owned())),
    }
}

/// Row positions surviving deduplication on `key`.
fn survivors(table: &Table, key: &[usize], latest_by: Option<usize>) -> HashSet<usize> {
    let mut best = HashMap::<Vec<&Value>, usize>::with_capacity(table.row_count());
    for (index, row) in table.rows().iter().enumerate() {
        let group = key.iter().map(|column| &row[*column]).collect::<Vec<_>>();
        match best.entry(group) {
            Entry::Vacant(entry) => {
                entry.insert(index);
            }
            Entry::Occupied(mut entry) => {
                if let Some(column) = latest_by {
                    let incumbent = &table.rows()[*entry.get()][column];
                    if row[column].rank(incumbent).is_gt() {
                        entry.insert(index);
                    }
                }
            }
        }
    }
    best.into_values().collect()
}
