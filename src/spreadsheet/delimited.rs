//! Delimited text (CSV/TSV) reader.
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::IngestOptions;
use crate::spreadsheet::SpreadsheetError;
use csv::ReaderBuilder;
use encoding_rs::Encoding;
use log::debug;
use std::borrow::Cow;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads delimited text into a sheet, one record per row.
///
/// Records may have different widths here; width is checked against the
/// header once the header row is known.
pub(crate) fn read_delimited(
    bytes: &[u8],
    delimiter: u8,
    options: &IngestOptions,
    criteria: &Criteria,
) -> Result<Sheet, SpreadsheetError> {
    let text = decode(bytes, &options.encoding)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut sheet = Sheet::new("csv");
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        sheet.record_widths.push(record.len());
        for (col, field) in record.iter().enumerate() {
            if criteria.is_null(field) {
                continue;
            }
            sheet.push(Cell {
                row,
                col,
                kind: infer_kind(field, options.infer_types),
                value: field.to_owned(),
            });
        }
    }
    sheet.finish();
    Ok(sheet)
}

/// UTF-8 (BOM optional) is used as is; anything else is decoded with `label`.
fn decode<'a>(bytes: &'a [u8], label: &str) -> Result<Cow<'a, str>, SpreadsheetError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(Cow::Borrowed(text));
    }

    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| SpreadsheetError::UnknownEncoding(label.to_owned()))?;
    let (text, used, had_errors) = encoding.decode(bytes);
    debug!("Decoded input as {} (replacement characters: {had_errors})", used.name());
    Ok(text)
}

/// Cell type of a raw field. Integers with leading zeros stay text.
fn infer_kind(field: &str, infer_types: bool) -> CellType {
    if !infer_types {
        return CellType::InlineString;
    }

    let trimmed = field.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return CellType::BooleanText;
    }

    let unsigned = trimmed.trim_start_matches(['-', '+']);
    let has_leading_zero = unsigned.len() > 1
        && unsigned.starts_with('0')
        && unsigned[1..].starts_with(|c: char| c.is_ascii_digit());
    if has_leading_zero || !unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return CellType::InlineString;
    }

    match trimmed.parse::<f64>() {
        Ok(number) if number.is_finite() => CellType::Number,
        _ => CellType::InlineString,
    }
}

#[cfg(test)]
mod tests {
    use crate::spreadsheet::cell::CellType;
    use crate::spreadsheet::delimited::*;
    use crate::spreadsheet::*;
    use crate::table::*;

    fn read(text: &[u8], options: &IngestOptions) -> Result<Table, SpreadsheetError> {
        read_bronze(text, SourceFormat::Csv, options)
    }

    #[test]
    fn infers_column_types() {
        let table = read(b"id,score,active,name\n1,2.5,true,a\n2,3,FALSE,\n", &IngestOptions::default()).unwrap();
        let kinds: Vec<_> = table.columns().iter().map(|column| column.kind).collect();
        assert_eq!(kinds, vec![ColumnType::BigInt, ColumnType::Double, ColumnType::Boolean, ColumnType::Varchar]);
        assert_eq!(
            table.rows()[1],
            vec![Value::BigInt(2), Value::Double(3.0), Value::Boolean(false), Value::Null]
        );
    }

    #[test]
    fn booleans_padded_with_spaces() {
        let table = read(b"id, active\n1, true\n2,TRUE \n3, false\n", &IngestOptions::default()).unwrap();
        assert_eq!(table.column_names(), vec!["id", " active"]);
        assert_eq!(table.columns()[1].kind, ColumnType::Boolean);
        let active: Vec<_> = table.values(1).cloned().collect();
        assert_eq!(active, vec![Value::Boolean(true), Value::Boolean(true), Value::Boolean(false)]);
    }

    #[test]
    fn mixed_boolean_column_keeps_spelling() {
        let table = read(b"FALSE,flag\nx,TRUE\ny,maybe\n", &IngestOptions::default()).unwrap();
        assert_eq!(table.column_names(), vec!["FALSE", "flag"]);
        assert_eq!(table.columns()[1].kind, ColumnType::Varchar);
        assert_eq!(table.rows()[0][1], Value::from("TRUE"));
    }

    #[test]
    fn keeps_text_without_inference() {
        let options = IngestOptions {
            infer_types: false,
            ..IngestOptions::default()
        };
        let table = read(b"id\n1\n", &options).unwrap();
        assert_eq!(table.columns()[0].kind, ColumnType::Varchar);
        assert_eq!(table.rows()[0][0], Value::from("1"));
    }

    #[test]
    fn infer_kind_rules() {
        assert_eq!(infer_kind("42", true), CellType::Number);
        assert_eq!(infer_kind("-1.5e3", true), CellType::Number);
        assert_eq!(infer_kind(".5", true), CellType::Number);
        assert_eq!(infer_kind("007", true), CellType::InlineString);
        assert_eq!(infer_kind("0.7", true), CellType::Number);
        assert_eq!(infer_kind("NaN", true), CellType::InlineString);
        assert_eq!(infer_kind("inf", true), CellType::InlineString);
        assert_eq!(infer_kind("True", true), CellType::BooleanText);
        assert_eq!(infer_kind(" true ", true), CellType::BooleanText);
        assert_eq!(infer_kind("10.0.0.1", true), CellType::InlineString);
    }

    #[test]
    fn quoted_fields_and_raw_names() {
        let table = read(b"\"Host Name\",Note\n\"a,b\",\"say \"\"hi\"\"\nthere\"\n", &IngestOptions::default()).unwrap();
        assert_eq!(table.column_names(), vec!["Host Name", "Note"]);
        assert_eq!(table.rows()[0], vec![Value::from("a,b"), Value::from("say \"hi\"\nthere")]);
    }

    #[test]
    fn title_rows_above_header_may_be_narrower() {
        let options = IngestOptions {
            header_hint: vec!["host".to_owned()],
            ..IngestOptions::default()
        };
        let table = read(b"Weekly export\n\nhost,status\nh1,up\n", &options).unwrap();
        assert_eq!(table.column_names(), vec!["host", "status"]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn ragged_record_is_a_format_error() {
        let error = read(b"a,b\n1,2\n3\n", &IngestOptions::default()).unwrap_err();
        assert!(matches!(error, SpreadsheetError::RaggedRecord { record: 3, expected: 2, found: 1 }));
    }

    #[test]
    fn decodes_legacy_encoding() {
        let table = read(b"name\ncaf\xe9\n", &IngestOptions::default()).unwrap();
        assert_eq!(table.rows()[0][0], Value::from("caf\u{e9}"));
    }

    #[test]
    fn strips_utf8_bom() {
        let table = read(b"\xEF\xBB\xBFid\n1\n", &IngestOptions::default()).unwrap();
        assert_eq!(table.column_names(), vec!["id"]);
    }

    #[test]
    fn unknown_encoding_label() {
        let options = IngestOptions {
            encoding: "klingon".to_owned(),
            ..IngestOptions::default()
        };
        assert!(matches!(read(b"\xff\n", &options), Err(SpreadsheetError::UnknownEncoding(_))));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(read(b"", &IngestOptions::default()), Err(SpreadsheetError::EmptySheet(_))));
    }

    #[test]
    fn tab_delimited() {
        let table = read_bronze(b"a\tb\n1\t2\n", SourceFormat::Tsv, &IngestOptions::default()).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
    }
}
