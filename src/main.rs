use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use rusty_medallion::derived_sheet_name;
use rusty_medallion::export;
use rusty_medallion::export_workbook;
use rusty_medallion::sheet_names;
use rusty_medallion::DateRange;
use rusty_medallion::ExportFormat;
use rusty_medallion::PipelineConfig;
use rusty_medallion::RowExtract;
use rusty_medallion::Session;
use rusty_medallion::SilverTransform;
use rusty_medallion::SourceFormat;
use rusty_medallion::Stage;
use rusty_medallion::Table;
use std::io::Write;
use std::path::PathBuf;

/// Stage a spreadsheet through bronze, silver and gold tables, then query or export a stage
#[derive(Parser)]
#[command(name = "medallion", version)]
struct Cli {
    /// The .csv, .tsv or .xlsx file to ingest
    input: PathBuf,

    /// Input format, when the file extension does not tell
    #[arg(short, long)]
    format: Option<SourceFormat>,

    /// YAML or JSON file with `ingest`, `silver` and `gold` options; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sheet name or glob pattern of the workbook sheet to read
    #[arg(long)]
    sheet: Option<String>,

    /// Comma-separated names the header row must contain
    #[arg(long, value_delimiter = ',')]
    header_hint: Vec<String>,

    /// Comma-separated gold columns, in order
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Drop duplicate gold rows
    #[arg(long)]
    dedupe: bool,

    /// Comma-separated columns forming the duplicate key
    #[arg(long, value_delimiter = ',')]
    dedupe_on: Vec<String>,

    /// Keep the row with the greatest value of this column in each duplicate group
    #[arg(long)]
    keep_latest_by: Option<String>,

    /// Comma-separated columns whose null rows are dropped from gold
    #[arg(long, value_delimiter = ',')]
    null_filter: Vec<String>,

    /// Inclusive date filter as `column:YYYY-MM-DD:YYYY-MM-DD`
    #[arg(long)]
    date_range: Option<DateRange>,

    /// SQL over the `bronze`, `silver` and `gold` tables; its result is the output
    #[arg(long)]
    sql: Option<String>,

    /// Count the values of this column of the exported stage (repeatable)
    #[arg(long)]
    summary: Vec<String>,

    /// Rows to write as an extra sheet, as `name:column[,column...]:pattern`
    /// (repeatable; the pattern ignores case)
    #[arg(long)]
    extract: Vec<RowExtract>,

    /// Stage to export
    #[arg(long, default_value = "gold")]
    export_stage: Stage,

    /// csv, parquet or xlsx; taken from the output extension when omitted
    #[arg(long)]
    export_format: Option<ExportFormat>,

    /// Output file; CSV goes to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// More verbose logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// The configuration file with command-line flags applied on top.
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if self.sheet.is_some() {
            config.ingest.sheet = self.sheet.clone();
        }
        if !self.header_hint.is_empty() {
            config.ingest.header_hint = self.header_hint.clone();
        }
        if !self.columns.is_empty() {
            config.gold.columns = self.columns.clone();
        }
        if self.dedupe {
            config.gold.dedupe = true;
        }
        if !self.dedupe_on.is_empty() {
            config.gold.dedupe_on = self.dedupe_on.clone();
        }
        if self.keep_latest_by.is_some() {
            config.gold.keep_latest_by = self.keep_latest_by.clone();
        }
        if !self.null_filter.is_empty() {
            config.gold.null_filter_columns = self.null_filter.clone();
        }
        if self.date_range.is_some() {
            config.gold.date_range = self.date_range.clone();
        }
        config.extracts.extend(self.extract.iter().cloned());
        Ok(config)
    }

    fn source_format(&self, bytes: &[u8]) -> Result<SourceFormat> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        match SourceFormat::from_file_name(&self.input) {
            Ok(format) => Ok(format),
            Err(error) => SourceFormat::sniff(bytes).ok_or(error).map_err(Into::into),
        }
    }

    /// Sheet names of the exported workbook: the stage, one `{column}_counts` per
    /// summary, then the extracts.
    fn workbook_sheets(&self, config: &PipelineConfig) -> Vec<String> {
        let mut names = vec![self.export_stage.relation_name().to_owned()];
        names.extend(self.summary.iter().map(|column| derived_sheet_name(column, "counts")));
        names.extend(config.extracts.iter().map(|extract| extract.name.to_owned()));
        names
    }

    fn export_format(&self) -> ExportFormat {
        self.export_format
            .or_else(|| self.output.as_ref().and_then(|path| ExportFormat::from_file_name(path)))
            .unwrap_or(ExportFormat::Csv)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.debug {
        true => "debug",
        false => "info",
    };
    let env = env_logger::Env::default().filter_or("LOG_LEVEL", log_level);
    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .init();

    let config = cli.pipeline_config()?;
    let export_format = cli.export_format();
    let sheets = cli.workbook_sheets(&config);
    if cli.sql.is_none() && export_format == ExportFormat::Xlsx {
        sheet_names(sheets.iter().map(String::as_str))?;
    }
    let bytes = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let format = cli.source_format(&bytes)?;
    log::info!("Ingesting {} as {:?}", cli.input.display(), format);

    let mut session = Session::new(SilverTransform::new(config.silver));
    session.upload(&bytes, format, &config.ingest)?;
    session.refine()?;
    session.shape(&config.gold)?;

    let output = match &cli.sql {
        Some(sql) => {
            let result = session.query(sql)?;
            export(&result, export_format)?
        }
        None => {
            let summaries = cli
                .summary
                .iter()
                .map(|column| session.summarize(cli.export_stage, column).map(|summary| (column, summary)))
                .collect::<Result<Vec<_>, _>>()?;
            let extracts = config
                .extracts
                .iter()
                .map(|extract| session.extract(cli.export_stage, extract))
                .collect::<Result<Vec<_>, _>>()?;
            if export_format == ExportFormat::Xlsx {
                let table = session
                    .state()
                    .get(cli.export_stage)
                    .context("Stage table disappeared")?;
                let tables = std::iter::once(table)
                    .chain(summaries.iter().map(|(_, summary)| summary))
                    .chain(extracts.iter());
                // Empty extracts get no sheet
                let workbook: Vec<(&str, &Table)> = sheets
                    .iter()
                    .map(String::as_str)
                    .zip(tables)
                    .enumerate()
                    .filter(|(index, (_, table))| *index <= summaries.len() || table.row_count() > 0)
                    .map(|(_, sheet)| sheet)
                    .collect();
                export_workbook(&workbook)?
            } else {
                for (column, summary) in &summaries {
                    for row in summary.rows() {
                        log::info!("{column} = '{}': {}", row[0], row[1]);
                    }
                }
                for (extract, rows) in config.extracts.iter().zip(&extracts) {
                    log::info!("{}: {} matching rows", extract.name, rows.row_count());
                }
                session.export(cli.export_stage, export_format)?
            }
        }
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &output).with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {} bytes to {}", output.len(), path.display());
        }
        None if export_format == ExportFormat::Csv => std::io::stdout().write_all(&output)?,
        None => bail!("{export_format} output needs --output"),
    }
    Ok(())
}
