//! # Table export
//!
//! Serialises a stage table as CSV, Parquet or an Excel 2007+ workbook.

pub mod csv;
pub mod parquet;
pub mod xlsx;

pub use xlsx::derived_sheet_name;
pub use xlsx::export_workbook;
pub use xlsx::sheet_names;

use crate::query::QueryError;
use crate::table::Table;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when a table cannot be written in the target format.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("A table without columns cannot be written as {0}")]
    EmptySchema(ExportFormat),

    #[error("Table has {0} rows, a worksheet holds at most {max}", max = xlsx::MAX_ROWS - 1)]
    TooManyRows(usize),

    #[error("Table has {0} columns, a worksheet holds at most {max}", max = xlsx::MAX_COLUMNS)]
    TooManyColumns(usize),

    #[error("Cell {reference} has {length} characters, a cell holds at most {max}", max = xlsx::MAX_CELL_CHARS)]
    CellTooLong { reference: String, length: usize },

    #[error("Column '{column}' holds {value}, which {format} cannot represent")]
    UnsupportedValue {
        column: String,
        value: String,
        format: ExportFormat,
    },

    #[error("Workbook needs at least one sheet")]
    NoSheets,

    #[error("Invalid sheet name '{0}'")]
    InvalidSheetName(String),

    #[error("Duplicate sheet name '{0}'")]
    DuplicateSheetName(String),

    #[error("Staging table failed: {0}")]
    Staging(#[from] QueryError),

    // Third-party library errors
    #[error("{0}")]
    Csv(#[from] ::csv::Error),

    #[error("{0}")]
    Engine(#[from] duckdb::Error),

    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    // Standard library errors
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Output format of an export.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Parquet,
    Xlsx,
}

impl ExportFormat {
    /// Detects the format from a file extension.
    pub fn from_file_name(file_name: impl AsRef<Path>) -> Option<Self> {
        file_name
            .as_ref()
            .extension()
            .and_then(|extension| extension.to_str())
            .and_then(|extension| extension.parse().ok())
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Parquet => "parquet",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "parquet" | "columnar-binary" => Ok(ExportFormat::Parquet),
            "xlsx" => Ok(ExportFormat::Xlsx),
            _ => Err(format!("unsupported export format '{name}'")),
        }
    }
}

/// Serialises `table` in `format`. A workbook gets a single sheet named `Data`.
pub fn export(table: &Table, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Csv => csv::write_csv(table),
        ExportFormat::Parquet => parquet::write_parquet(table),
        ExportFormat::Xlsx => export_workbook(&[("Data", table)]),
    }
}
