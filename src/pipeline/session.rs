//! The stage tables of one user session and the actions that produce them.

use crate::error::MedallionError;
use crate::export::export;
use crate::export::ExportFormat;
use crate::pipeline::gold::silver_to_gold;
use crate::pipeline::rules::RowExtract;
use crate::pipeline::gold::GoldOptions;
use crate::pipeline::silver::SilverTransform;
use crate::pipeline::summary::value_counts;
use crate::pipeline::Stage;
use crate::pipeline::StageError;
use crate::query::run_query;
use crate::spreadsheet::read_bronze;
use crate::spreadsheet::IngestOptions;
use crate::spreadsheet::SourceFormat;
use crate::table::Table;
use log::info;
use std::collections::BTreeMap;

/// The current table of each stage, if it has been produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineState {
    bronze: Option<Table>,
    silver: Option<Table>,
    gold: Option<Table>,
}

impl PipelineState {
    pub fn get(&self, stage: Stage) -> Option<&Table> {
        match stage {
            Stage::Bronze => self.bronze.as_ref(),
            Stage::Silver => self.silver.as_ref(),
            Stage::Gold => self.gold.as_ref(),
        }
    }

    /// Present stages in pipeline order.
    pub fn tables(&self) -> impl Iterator<Item = (Stage, &Table)> + '_ {
        Stage::ALL
            .into_iter()
            .filter_map(|stage| self.get(stage).map(|table| (stage, table)))
    }

    /// The state after `stage` is replaced by `table`: earlier stages are
    /// kept, later stages are cleared since they derive from the old table.
    pub fn with(&self, stage: Stage, table: Table) -> PipelineState {
        let keep = |earlier: Stage| if earlier < stage { self.get(earlier).cloned() } else { None };
        let mut next = PipelineState {
            bronze: keep(Stage::Bronze),
            silver: keep(Stage::Silver),
            gold: keep(Stage::Gold),
        };
        match stage {
            Stage::Bronze => next.bronze = Some(table),
            Stage::Silver => next.silver = Some(table),
            Stage::Gold => next.gold = Some(table),
        }
        next
    }
}

/// Runs the pipeline actions of a single user.
///
/// Every action either replaces whole stage tables or leaves the state as it
/// was; a failing action never leaves a partial result behind.
pub struct Session {
    transform: SilverTransform,
    state: PipelineState,
    coercion_failures: BTreeMap<String, usize>,
}

impl Session {
    pub fn new(transform: SilverTransform) -> Self {
        Session {
            transform,
            state: PipelineState::default(),
            coercion_failures: BTreeMap::new(),
        }
    }

    pub fn with_state(mut self, state: PipelineState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Reads `bytes` into a new bronze table, clearing silver and gold.
    pub fn upload(
        &mut self,
        bytes: &[u8],
        format: SourceFormat,
        options: &IngestOptions,
    ) -> Result<&Table, MedallionError> {
        let bronze = read_bronze(bytes, format, options)?;
        info!(
            "Uploaded bronze: {} rows, {} columns",
            bronze.row_count(),
            bronze.column_count()
        );
        self.state = self.state.with(Stage::Bronze, bronze);
        self.coercion_failures.clear();
        Ok(self.require(Stage::Bronze)?)
    }

    /// Derives silver from bronze, clearing gold.
    pub fn refine(&mut self) -> Result<&Table, MedallionError> {
        let outcome = self.transform.apply(self.require(Stage::Bronze)?)?;
        info!(
            "Refined silver: {} rows, {} columns",
            outcome.table.row_count(),
            outcome.table.column_count()
        );
        self.state = self.state.with(Stage::Silver, outcome.table);
        self.coercion_failures = outcome.coercion_failures;
        Ok(self.require(Stage::Silver)?)
    }

    /// Date coercion failures of the last refine, per silver column.
    pub fn coercion_failures(&self) -> &BTreeMap<String, usize> {
        &self.coercion_failures
    }

    /// Derives gold from silver.
    pub fn shape(&mut self, options: &GoldOptions) -> Result<&Table, MedallionError> {
        let gold = silver_to_gold(self.require(Stage::Silver)?, options)?;
        info!("Shaped gold: {} rows, {} columns", gold.row_count(), gold.column_count());
        self.state = self.state.with(Stage::Gold, gold);
        Ok(self.require(Stage::Gold)?)
    }

    /// Runs read-only SQL over the present stage tables.
    pub fn query(&self, sql: &str) -> Result<Table, MedallionError> {
        let result = run_query(&self.state, sql)?;
        info!(
            "Query over {} stage tables: {} rows, {} columns",
            self.state.tables().count(),
            result.row_count(),
            result.column_count()
        );
        Ok(result)
    }

    /// Category counts of `column` in the table of `stage`.
    pub fn summarize(&self, stage: Stage, column: &str) -> Result<Table, MedallionError> {
        let summary = value_counts(self.require(stage)?, column)?;
        info!("Summarized {stage}.{column}: {} distinct values", summary.row_count());
        Ok(summary)
    }

    /// Rows of the table of `stage` selected by `extract`.
    pub fn extract(&self, stage: Stage, extract: &RowExtract) -> Result<Table, MedallionError> {
        let rows = extract.apply(self.require(stage)?)?;
        info!("Extract '{}' of {stage}: {} rows", extract.name, rows.row_count());
        Ok(rows)
    }

    /// Serialises the table of `stage`.
    pub fn export(&self, stage: Stage, format: ExportFormat) -> Result<Vec<u8>, MedallionError> {
        let table = self.require(stage)?;
        let bytes = export(table, format)?;
        info!(
            "Exported {stage} as {format}: {} rows, {} columns, {} bytes",
            table.row_count(),
            table.column_count(),
            bytes.len()
        );
        Ok(bytes)
    }

    fn require(&self, stage: Stage) -> Result<&Table, StageError> {
        self.state.get(stage).ok_or(StageError::Missing(stage))
    }
}
