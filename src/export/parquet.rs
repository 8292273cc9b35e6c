use crate::export::ExportError;
use crate::export::ExportFormat;
use crate::query::DuckDbEngine;
use crate::query::SqlEngine;
use crate::table::Table;
use log::debug;

const STAGING_TABLE: &str = "export";

/// Writes the table through a scratch DuckDB database and returns the file bytes.
pub(crate) fn write_parquet(table: &Table) -> Result<Vec<u8>, ExportError> {
    if table.column_count() == 0 {
        return Err(ExportError::EmptySchema(ExportFormat::Parquet));
    }

    let mut engine = DuckDbEngine::open()?;
    engine.register(STAGING_TABLE, table)?;

    let directory = tempfile::tempdir()?;
    let path = directory.path().join("export.parquet");
    let target = path.to_string_lossy().replace('\'', "''");
    engine
        .connection()
        .execute_batch(&format!("COPY {STAGING_TABLE} TO '{target}' (FORMAT PARQUET)"))?;

    let bytes = std::fs::read(&path)?;
    debug!("Wrote {} rows as {} bytes of parquet", table.row_count(), bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use crate::export::parquet::*;
    use crate::table::Column;
    use crate::table::ColumnType;
    use crate::table::Value;
    use chrono::NaiveDate;

    #[test]
    fn keeps_date_columns_typed() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let columns = vec![
            Column::new("id", ColumnType::BigInt),
            Column::new("dt", ColumnType::Date),
        ];
        let rows = vec![
            vec![Value::BigInt(1), Value::Date(date)],
            vec![Value::BigInt(2), Value::Null],
        ];
        let table = Table::new(columns, rows).unwrap();
        let bytes = write_parquet(&table).unwrap();
        assert!(bytes.starts_with(b"PAR1"));

        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("gold.parquet");
        std::fs::write(&path, &bytes).unwrap();
        let engine = DuckDbEngine::open().unwrap();
        let sql = format!(
            "SELECT typeof(dt) AS kind, dt FROM read_parquet('{}') ORDER BY id",
            path.display()
        );
        let result = engine.execute(&sql).unwrap();
        assert_eq!(result.rows()[0], vec![Value::from("DATE"), Value::Date(date)]);
        assert_eq!(result.rows()[1][1], Value::Null);
    }

    #[test]
    fn empty_schema_is_rejected() {
        let table = Table::empty(Vec::new()).unwrap();
        assert!(matches!(
            write_parquet(&table),
            Err(ExportError::EmptySchema(ExportFormat::Parquet))
        ));
    }
}
