//! # Ad-hoc SQL over the stage tables
//!
//! Every query runs in a fresh in-memory engine holding copies of the stage
//! tables present in the session, registered as `bronze`, `silver` and `gold`.
//! External file and network access is disabled in that engine, so a query can
//! only read the stage tables.

pub mod engine;

pub use engine::DuckDbEngine;

use crate::pipeline::session::PipelineState;
use crate::table::SchemaError;
use crate::table::Table;
use log::info;
use thiserror::Error;

/// Errors raised while running SQL.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Message reported by the engine, unchanged
    #[error("{0}")]
    Engine(#[from] duckdb::Error),

    #[error("Column '{column}' holds an unsupported value {value}")]
    UnsupportedValue { column: String, value: String },

    /// The result set is not a valid table (e.g. duplicate column names)
    #[error("Invalid result: {0}")]
    Result(#[from] SchemaError),
}

/// A SQL engine the stage tables can be registered with.
pub trait SqlEngine {
    /// Makes `table` queryable as relation `name`, replacing any previous one.
    fn register(&mut self, name: &str, table: &Table) -> Result<(), QueryError>;

    /// Runs one statement and collects its result set.
    fn execute(&self, sql: &str) -> Result<Table, QueryError>;
}

/// Runs `sql` against every stage table present in `state`.
pub fn run_query(state: &PipelineState, sql: &str) -> Result<Table, QueryError> {
    let mut engine = DuckDbEngine::sandboxed()?;
    for (stage, table) in state.tables() {
        engine.register(stage.relation_name(), table)?;
    }
    let result = engine.execute(sql)?;
    info!(
        "Query returned {} rows, {} columns",
        result.row_count(),
        result.column_count()
    );
    Ok(result)
}
