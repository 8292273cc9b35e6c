use crate::export::ExportError;
use crate::table::Table;
use csv::Writer;

/// Header row then one record per row; null is an empty field.
pub(crate) fn write_csv(table: &Table) -> Result<Vec<u8>, ExportError> {
    if table.column_count() == 0 {
        return Ok(Vec::new());
    }

    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(table.column_names())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use crate::export::csv::*;
    use crate::spreadsheet::read_bronze;
    use crate::spreadsheet::IngestOptions;
    use crate::spreadsheet::SourceFormat;
    use crate::table::Column;
    use crate::table::ColumnType;
    use crate::table::Value;
    use chrono::NaiveDate;

    fn endpoints() -> Table {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let columns = vec![
            Column::new("Host Name", ColumnType::Varchar),
            Column::new("cores", ColumnType::BigInt),
            Column::new("cpu", ColumnType::Double),
            Column::new("active", ColumnType::Boolean),
            Column::new("installed", ColumnType::Date),
            Column::new("seen_at", ColumnType::Timestamp),
        ];
        let rows = vec![
            vec![
                Value::from("a,b \"quoted\""),
                Value::BigInt(8),
                Value::Double(0.25),
                Value::Boolean(true),
                Value::Date(date),
                Value::Timestamp(date.and_hms_opt(13, 5, 9).unwrap()),
            ],
            vec![
                Value::from("line\nbreak"),
                Value::Null,
                Value::Double(-1.5),
                Value::Boolean(false),
                Value::Null,
                Value::Null,
            ],
        ];
        Table::new(columns, rows).unwrap()
    }

    #[test]
    fn writes_header_and_formatted_values() {
        let text = String::from_utf8(write_csv(&endpoints()).unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Host Name,cores,cpu,active,installed,seen_at"));
        assert_eq!(
            lines.next(),
            Some("\"a,b \"\"quoted\"\"\",8,0.25,true,2024-02-29,2024-02-29 13:05:09")
        );
    }

    #[test]
    fn round_trip_through_ingestion() {
        let bytes = write_csv(&endpoints()).unwrap();
        let bronze = read_bronze(&bytes, SourceFormat::Csv, &IngestOptions::default()).unwrap();
        assert_eq!(
            bronze.column_names(),
            vec!["Host Name", "cores", "cpu", "active", "installed", "seen_at"]
        );
        assert_eq!(
            bronze.rows()[0],
            vec![
                Value::from("a,b \"quoted\""),
                Value::BigInt(8),
                Value::Double(0.25),
                Value::Boolean(true),
                Value::from("2024-02-29"),
                Value::from("2024-02-29 13:05:09"),
            ]
        );
        assert_eq!(bronze.rows()[1][0], Value::from("line\nbreak"));
        assert_eq!(bronze.rows()[1][1], Value::Null);
    }

    #[test]
    fn no_columns_is_empty_output() {
        let table = Table::empty(Vec::new()).unwrap();
        assert!(write_csv(&table).unwrap().is_empty());
    }
}
