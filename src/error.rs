use crate::spreadsheet::SpreadsheetError;
use thiserror::Error;

/// Main error type of the pipeline.
/// Aggregates the per-module errors; each variant names the stage that failed.
#[derive(Error, Debug)]
pub enum MedallionError {
    /// Input bytes could not be parsed as the declared format
    #[error("Format error: {0}")]
    FormatError(#[from] SpreadsheetError),

    /// A referenced column is absent, duplicated or of the wrong type
    #[error("Schema error: {0}")]
    SchemaError(#[from] crate::table::SchemaError),

    /// The SQL engine rejected or failed a statement
    #[error("Query error: {0}")]
    QueryError(#[from] crate::query::QueryError),

    /// The table cannot be written in the target format
    #[error("Export error: {0}")]
    ExportError(#[from] crate::export::ExportError),

    /// An action ran before the stage it depends on
    #[error("Stage error: {0}")]
    StageError(#[from] crate::pipeline::StageError),

    #[error("Config error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("{0}")]
    IoError(#[from] std::io::Error),
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SpreadsheetError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| SpreadsheetError::WithContextError(format!("{}: {}", message, e)))
    }
}
