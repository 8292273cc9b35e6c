use crate::query::QueryError;
use crate::query::SqlEngine;
use crate::spreadsheet::cell::epoch_days_to_date;
use crate::spreadsheet::cell::micros_to_time;
use crate::table::ColumnType;
use crate::table::Table;
use crate::table::Value;
use chrono::DateTime;
use duckdb::params_from_iter;
use duckdb::types::TimeUnit;
use duckdb::types::Value as DuckValue;
use duckdb::Config;
use duckdb::Connection;
use log::debug;

/// Embedded in-memory DuckDB database.
pub struct DuckDbEngine {
    connection: Connection,
}

impl DuckDbEngine {
    /// Opens an engine with default settings.
    pub fn open() -> Result<Self, QueryError> {
        Ok(DuckDbEngine {
            connection: Connection::open_in_memory()?,
        })
    }

    /// Opens an engine that cannot read or write files or reach the network.
    pub fn sandboxed() -> Result<Self, QueryError> {
        let config = Config::default().enable_external_access(false)?;
        Ok(DuckDbEngine {
            connection: Connection::open_in_memory_with_flags(config)?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl SqlEngine for DuckDbEngine {
    fn register(&mut self, name: &str, table: &Table) -> Result<(), QueryError> {
        let relation = quote_identifier(name);
        let definitions = table
            .columns()
            .iter()
            .map(|column| format!("{} {}", quote_identifier(&column.name), column.kind.sql_name()))
            .collect::<Vec<_>>()
            .join(", ");
        self.connection
            .execute_batch(&format!("CREATE OR REPLACE TABLE {relation} ({definitions})"))?;

        // Temporal values travel as text and are cast by the engine
        let placeholders = table
            .columns()
            .iter()
            .map(|column| match column.kind {
                ColumnType::Date | ColumnType::Timestamp | ColumnType::Time => {
                    format!("CAST(? AS {})", column.kind.sql_name())
                }
                _ => "?".to_owned(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let transaction = self.connection.transaction()?;
        {
            let mut statement = transaction.prepare(&format!("INSERT INTO {relation} VALUES ({placeholders})"))?;
            for row in table.rows() {
                statement.execute(params_from_iter(row.iter().map(to_duckdb)))?;
            }
        }
        transaction.commit()?;

        debug!("Registered '{name}': {} rows, {} columns", table.row_count(), table.column_count());
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<Table, QueryError> {
        let mut statement = self.connection.prepare(sql)?;
        let mut rows = statement.query([])?;
        let names = rows
            .as_ref()
            .map(|statement| statement.column_names())
            .unwrap_or_default();

        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                record.push(from_duckdb(name, row.get::<_, DuckValue>(index)?)?);
            }
            values.push(record);
        }
        Ok(Table::from_values(names, values)?)
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_duckdb(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Boolean(value) => DuckValue::Boolean(*value),
        Value::BigInt(value) => DuckValue::BigInt(*value),
        Value::Double(value) => DuckValue::Double(*value),
        Value::Varchar(value) => DuckValue::Text(value.to_owned()),
        Value::Date(_) | Value::Timestamp(_) | Value::Time(_) => DuckValue::Text(value.to_string()),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn from_duckdb(column: &str, value: DuckValue) -> Result<Value, QueryError> {
    let unsupported = |value: String| QueryError::UnsupportedValue {
        column: column.to_owned(),
        value,
    };

    let converted = match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Boolean(value),
        DuckValue::TinyInt(value) => Value::BigInt(value.into()),
        DuckValue::SmallInt(value) => Value::BigInt(value.into()),
        DuckValue::Int(value) => Value::BigInt(value.into()),
        DuckValue::BigInt(value) => Value::BigInt(value),
        DuckValue::UTinyInt(value) => Value::BigInt(value.into()),
        DuckValue::USmallInt(value) => Value::BigInt(value.into()),
        DuckValue::UInt(value) => Value::BigInt(value.into()),
        DuckValue::UBigInt(value) => i64::try_from(value)
            .map(Value::BigInt)
            .unwrap_or(Value::Double(value as f64)),
        DuckValue::HugeInt(value) => i64::try_from(value)
            .map(Value::BigInt)
            .unwrap_or(Value::Double(value as f64)),
        DuckValue::Float(value) => Value::Double(value.into()),
        DuckValue::Double(value) => Value::Double(value),
        DuckValue::Decimal(decimal) => {
            let text = decimal.to_string();
            text.parse::<f64>()
                .map(Value::Double)
                .map_err(|_| unsupported(format!("DECIMAL {text}")))?
        }
        DuckValue::Text(value) | DuckValue::Enum(value) => Value::Varchar(value),
        DuckValue::Date32(days) => epoch_days_to_date(days.into())
            .map(Value::Date)
            .ok_or_else(|| unsupported(format!("DATE {days}")))?,
        DuckValue::Timestamp(unit, instant) => DateTime::from_timestamp_micros(to_micros(unit, instant))
            .map(|datetime| Value::Timestamp(datetime.naive_utc()))
            .ok_or_else(|| unsupported(format!("TIMESTAMP {instant}")))?,
        DuckValue::Time64(unit, instant) => micros_to_time(to_micros(unit, instant))
            .map(Value::Time)
            .ok_or_else(|| unsupported(format!("TIME {instant}")))?,
        other => return Err(unsupported(format!("{other:?}"))),
    };
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use crate::query::engine::*;
    use crate::table::Column;
    use chrono::NaiveDate;
    use chrono::NaiveTime;

    fn endpoints() -> Table {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let columns = vec![
            Column::new("host name", ColumnType::Varchar),
            Column::new("cpu", ColumnType::Double),
            Column::new("cores", ColumnType::BigInt),
            Column::new("active", ColumnType::Boolean),
            Column::new("installed", ColumnType::Date),
            Column::new("seen_at", ColumnType::Timestamp),
            Column::new("backup", ColumnType::Time),
        ];
        let rows = vec![
            vec![
                Value::from("h1"),
                Value::Double(0.25),
                Value::BigInt(8),
                Value::Boolean(true),
                Value::Date(date),
                Value::Timestamp(date.and_hms_micro_opt(13, 5, 9, 250_000).unwrap()),
                Value::Time(NaiveTime::from_hms_opt(2, 30, 0).unwrap()),
            ],
            vec![
                Value::from("h\"2"),
                Value::Null,
                Value::Null,
                Value::Boolean(false),
                Value::Null,
                Value::Null,
                Value::Null,
            ],
        ];
        Table::new(columns, rows).unwrap()
    }

    #[test]
    fn registered_table_reads_back_unchanged() {
        let mut engine = DuckDbEngine::open().unwrap();
        let table = endpoints();
        engine.register("silver", &table).unwrap();
        let result = engine.execute("SELECT * FROM silver ORDER BY active DESC").unwrap();
        assert_eq!(result, table);
    }

    #[test]
    fn count_star() {
        let mut engine = DuckDbEngine::sandboxed().unwrap();
        engine.register("silver", &endpoints()).unwrap();
        let result = engine.execute("SELECT COUNT(*) AS n FROM silver").unwrap();
        assert_eq!(result.column_names(), vec!["n"]);
        assert_eq!(result.rows(), &[vec![Value::BigInt(2)]]);
    }

    #[test]
    fn result_types_are_widened() {
        let engine = DuckDbEngine::open().unwrap();
        let result = engine
            .execute("SELECT 1::INTEGER AS i, 2.50::DECIMAL(4,2) AS d, 'x'::VARCHAR AS s, NULL AS n")
            .unwrap();
        let kinds: Vec<_> = result.columns().iter().map(|column| column.kind).collect();
        assert_eq!(
            kinds,
            vec![ColumnType::BigInt, ColumnType::Double, ColumnType::Varchar, ColumnType::Varchar]
        );
        assert_eq!(result.rows()[0][1], Value::Double(2.5));
    }

    #[test]
    fn unknown_relation_keeps_engine_message() {
        let engine = DuckDbEngine::sandboxed().unwrap();
        let error = engine.execute("SELECT * FROM platinum").unwrap_err();
        assert!(matches!(error, QueryError::Engine(_)));
        assert!(error.to_string().contains("platinum"));
    }

    #[test]
    fn duplicate_result_columns_are_rejected() {
        let engine = DuckDbEngine::open().unwrap();
        assert!(matches!(
            engine.execute("SELECT 1 AS a, 2 AS a"),
            Err(QueryError::Result(_))
        ));
    }

    #[test]
    fn sandbox_blocks_file_access() {
        let engine = DuckDbEngine::sandboxed().unwrap();
        assert!(engine.execute("SELECT * FROM read_csv('/etc/hosts')").is_err());
    }

    #[test]
    fn unsupported_result_value() {
        let engine = DuckDbEngine::open().unwrap();
        assert!(matches!(
            engine.execute("SELECT [1, 2] AS list"),
            Err(QueryError::UnsupportedValue { .. })
        ));
    }
}
