//! In-memory tables flowing between the pipeline stages.

pub mod column;
pub mod value;

pub use column::Column;
pub use column::ColumnType;
pub use value::Value;

use std::collections::HashSet;
use thiserror::Error;

/// Errors raised when a table or a column reference is structurally invalid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Value at row {row} of column '{column}' is not of type {expected}")]
    ValueType {
        column: String,
        row: usize,
        expected: &'static str,
    },

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Column '{0}' is not among the retained columns")]
    NotRetained(String),

    #[error("Columns '{first}' and '{second}' both canonicalize to '{canonical}'")]
    CanonicalCollision {
        first: String,
        second: String,
        canonical: String,
    },

    #[error("Column '{column}' has type {found}, expected {expected}")]
    WrongType {
        column: String,
        found: &'static str,
        expected: &'static str,
    },
}

/// An ordered collection of uniquely named, homogeneously typed columns of
/// equal length.
///
/// The only way to build a table is [`Table::new`] (or [`Table::from_values`],
/// which detects the column types first), so every `Table` in the program
/// satisfies its invariants. Tables are never mutated in place: transforms
/// consume or borrow a table and return a new one.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Builds a table, checking name uniqueness, row width and value types.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self, SchemaError> {
        let mut names = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !names.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateColumn(column.name.to_owned()));
            }
        }

        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SchemaError::RowWidth {
                    row: index,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
            for (column, value) in columns.iter().zip(row) {
                if let Some(kind) = value.kind() {
                    if kind != column.kind {
                        return Err(SchemaError::ValueType {
                            column: column.name.to_owned(),
                            row: index,
                            expected: column.kind.sql_name(),
                        });
                    }
                }
            }
        }

        Ok(Table { columns, rows })
    }

    /// Builds a table whose column types are detected from the values.
    ///
    /// A column mixing integers and doubles is widened to double; an all-null
    /// column is typed varchar. Any other mix of kinds is a [`SchemaError`].
    pub fn from_values(names: Vec<String>, mut rows: Vec<Vec<Value>>) -> Result<Self, SchemaError> {
        let mut columns = Vec::with_capacity(names.len());
        for (index, name) in names.into_iter().enumerate() {
            let mut kinds = HashSet::new();
            for row in &rows {
                if let Some(kind) = row.get(index).and_then(Value::kind) {
                    kinds.insert(kind);
                }
            }
            let kind = if kinds.is_empty() {
                ColumnType::Varchar
            } else if kinds.len() == 1 {
                kinds.into_iter().next().unwrap_or(ColumnType::Varchar)
            } else if kinds.iter().all(ColumnType::is_number) {
                for row in rows.iter_mut() {
                    if let Some(Value::BigInt(integer)) = row.get(index) {
                        let widened = *integer as f64;
                        row[index] = Value::Double(widened);
                    }
                }
                ColumnType::Double
            } else {
                let row = rows
                    .iter()
                    .position(|row| row.get(index).and_then(Value::kind).is_some())
                    .unwrap_or(0);
                return Err(SchemaError::ValueType {
                    column: name,
                    row,
                    expected: "a single type",
                });
            };
            columns.push(Column::new(name, kind));
        }
        Table::new(columns, rows)
    }

    /// A table with the given columns and no rows.
    pub fn empty(columns: Vec<Column>) -> Result<Self, SchemaError> {
        Table::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Position of `name`, or [`SchemaError::MissingColumn`].
    pub fn require_column(&self, name: &str) -> Result<usize, SchemaError> {
        self.column_index(name)
            .ok_or_else(|| SchemaError::MissingColumn(name.to_owned()))
    }

    /// Values of one column in row order.
    pub fn values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// Keeps only the named columns, in the order given.
    pub fn select(&self, names: &[String]) -> Result<Table, SchemaError> {
        let indexes = names
            .iter()
            .map(|name| self.require_column(name))
            .collect::<Result<Vec<_>, _>>()?;
        let columns = indexes
            .iter()
            .map(|index| self.columns[*index].clone())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indexes.iter().map(|index| row[*index].clone()).collect())
            .collect();
        Table::new(columns, rows)
    }

    /// Keeps the rows for which `predicate(position, row)` holds.
    pub fn filter_rows<F>(self, mut predicate: F) -> Table
    where
        F: FnMut(usize, &[Value]) -> bool,
    {
        let rows = self
            .rows
            .into_iter()
            .enumerate()
            .filter(|(index, row)| predicate(*index, row))
            .map(|(_, row)| row)
            .collect();
        Table {
            columns: self.columns,
            rows,
        }
    }

    pub fn into_parts(self) -> (Vec<Column>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }
}
