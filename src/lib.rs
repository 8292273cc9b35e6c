//! # Medallion pipeline for spreadsheet data
//!
//! Stages one uploaded spreadsheet through three in-memory tables and lets the
//! user inspect and export each of them.
//!
//! ## Stages
//!
//! - **Bronze**: the file as read. CSV/TSV values are typed by inference,
//!   `.xlsx` cells by their number format; column names are kept verbatim.
//! - **Silver**: canonical `snake_case` column names, trimmed strings with
//!   blanks as null, parsed date columns, then user business rules.
//! - **Gold**: selected columns, null and date-range filters, deduplication.
//!
//! ## Features
//!
//! - **Ad-hoc SQL**: any stage present is queryable as `bronze`, `silver` or
//!   `gold` through an embedded DuckDB with file and network access disabled
//! - **Export**: CSV, Parquet (types preserved) and formatted `.xlsx` workbooks
//! - **Summaries**: category counts of a column, e.g. endpoints per status
//! - **Configuration**: every option can come from a YAML or JSON file
//!
//! ```no_run
//! use rusty_medallion::{GoldOptions, IngestOptions, Session, SilverTransform, SourceFormat};
//!
//! let bytes = std::fs::read("endpoints.xlsx")?;
//! let mut session = Session::new(SilverTransform::default());
//! session.upload(&bytes, SourceFormat::Xlsx, &IngestOptions::default())?;
//! session.refine()?;
//! session.shape(&GoldOptions::default())?;
//! let counts = session.query("SELECT status, COUNT(*) AS n FROM gold GROUP BY status")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod export;
mod helpers;
pub mod pipeline;
pub mod query;
pub mod spreadsheet;
pub mod table;

pub use config::PipelineConfig;
pub use error::MedallionError;
pub use export::export;
pub use export::derived_sheet_name;
pub use export::export_workbook;
pub use export::sheet_names;
pub use export::ExportFormat;
pub use pipeline::gold::silver_to_gold;
pub use pipeline::gold::DateRange;
pub use pipeline::gold::GoldOptions;
pub use pipeline::rules::AddressFamily;
pub use pipeline::rules::FirstAddress;
pub use pipeline::rules::RowExtract;
pub use pipeline::rules::RuleConfig;
pub use pipeline::rules::TitleCase;
pub use pipeline::session::PipelineState;
pub use pipeline::session::Session;
pub use pipeline::silver::bronze_to_silver;
pub use pipeline::silver::BusinessRule;
pub use pipeline::silver::FnRule;
pub use pipeline::silver::SilverOptions;
pub use pipeline::silver::SilverTransform;
pub use pipeline::summary::value_counts;
pub use pipeline::Stage;
pub use query::run_query;
pub use spreadsheet::read_bronze;
pub use spreadsheet::IngestOptions;
pub use spreadsheet::SourceFormat;
pub use table::Column;
pub use table::ColumnType;
pub use table::Table;
pub use table::Value;
