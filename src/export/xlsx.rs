//! Excel 2007+ workbook writer.
//!
//! Every sheet gets a bold, frozen header row and column widths fitted to the
//! content. Cells are written inline (no shared string table); numbers, dates
//! and times carry a number format so they read back typed.

use crate::export::ExportError;
use crate::export::ExportFormat;
use crate::spreadsheet::reference::index_to_reference;
use crate::table::Table;
use crate::table::Value;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::Timelike;
use log::debug;
use quick_xml::events::BytesDecl;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Writer;
use std::collections::HashSet;
use std::io::Cursor;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

/// Rows per worksheet, header included
pub(crate) const MAX_ROWS: usize = 1_048_576;
pub(crate) const MAX_COLUMNS: usize = 16_384;
pub(crate) const MAX_CELL_CHARS: usize = 32_767;
const MAX_SHEET_NAME_CHARS: usize = 31;
const INVALID_SHEET_NAME_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];
const MAX_COLUMN_WIDTH: usize = 60;
const WIDTH_SAMPLE_ROWS: usize = 1_000;

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const WORKSHEET_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const STYLES_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

// Indexes into cellXfs of STYLES
const STYLE_HEADER: &str = "1";
const STYLE_INTEGER: &str = "2";
const STYLE_DOUBLE: &str = "3";
const STYLE_DATE: &str = "4";
const STYLE_DATETIME: &str = "5";
const STYLE_TIME: &str = "6";

const ROOT_RELATIONSHIPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="3"><numFmt numFmtId="164" formatCode="yyyy-mm-dd"/><numFmt numFmtId="165" formatCode="yyyy-mm-dd hh:mm:ss"/><numFmt numFmtId="166" formatCode="hh:mm:ss"/></numFmts>
<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts>
<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
<cellXfs count="7">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
<xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/>
<xf numFmtId="3" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>
<xf numFmtId="4" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>
<xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>
<xf numFmtId="165" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>
<xf numFmtId="166" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>
</cellXfs>
<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>"#;

type XmlWriter = Writer<Vec<u8>>;

/// Writes one worksheet per `(name, table)` pair, in order.
///
/// Names longer than 31 characters are truncated; names that are empty,
/// contain `[]:*?/\` or collide (ignoring case) after truncation are rejected.
pub fn export_workbook(sheets: &[(&str, &Table)]) -> Result<Vec<u8>, ExportError> {
    if sheets.is_empty() {
        return Err(ExportError::NoSheets);
    }
    let names = sheet_names(sheets.iter().map(|(name, _)| *name))?;
    for (_, table) in sheets {
        check_limits(table)?;
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(&content_types(sheets.len())?)?;
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELATIONSHIPS.as_bytes())?;
    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(&workbook(&names)?)?;
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(&workbook_relationships(sheets.len())?)?;
    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(STYLES.as_bytes())?;
    for (index, (_, table)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", index + 1), options)?;
        zip.write_all(&worksheet(table)?)?;
    }

    let bytes = zip.finish()?.into_inner();
    debug!("Wrote workbook with sheets {names:?}: {} bytes", bytes.len());
    Ok(bytes)
}

/// Name of a sheet derived from `base`, such as the summary of a column:
/// `{base}_{suffix}` with characters sheet names cannot hold replaced by `_`.
/// `base` is shortened so the suffix survives truncation.
pub fn derived_sheet_name(base: &str, suffix: &str) -> String {
    let room = MAX_SHEET_NAME_CHARS.saturating_sub(suffix.chars().count() + 1);
    let base: String = base
        .trim_matches('\'')
        .chars()
        .map(|c| if INVALID_SHEET_NAME_CHARS.contains(&c) { '_' } else { c })
        .take(room)
        .collect();
    format!("{base}_{suffix}")
}

/// Checks that `names` can be the sheet names of one workbook and returns them
/// as written.
pub fn sheet_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<Vec<String>, ExportError> {
    let mut seen = HashSet::new();
    let mut sheet_names = Vec::new();
    for name in names {
        let truncated = name.chars().take(MAX_SHEET_NAME_CHARS).collect::<String>();
        if truncated.trim().is_empty()
            || truncated.contains(INVALID_SHEET_NAME_CHARS)
            || truncated.starts_with('\'')
            || truncated.ends_with('\'')
        {
            return Err(ExportError::InvalidSheetName(name.to_owned()));
        }
        if !seen.insert(truncated.to_lowercase()) {
            return Err(ExportError::DuplicateSheetName(truncated));
        }
        sheet_names.push(truncated);
    }
    Ok(sheet_names)
}

fn check_limits(table: &Table) -> Result<(), ExportError> {
    if table.column_count() == 0 {
        return Err(ExportError::EmptySchema(ExportFormat::Xlsx));
    }
    if table.column_count() > MAX_COLUMNS {
        return Err(ExportError::TooManyColumns(table.column_count()));
    }
    if table.row_count() >= MAX_ROWS {
        return Err(ExportError::TooManyRows(table.row_count()));
    }
    Ok(())
}

fn xml_writer() -> Result<XmlWriter, ExportError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    Ok(writer)
}

fn content_types(sheet_count: usize) -> Result<Vec<u8>, ExportError> {
    let mut writer = xml_writer()?;
    writer.write_event(Event::Start(
        BytesStart::new("Types").with_attributes([("xmlns", CONTENT_TYPES_NS)]),
    ))?;
    writer.write_event(Event::Empty(BytesStart::new("Default").with_attributes([
        ("Extension", "rels"),
        ("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
    ])))?;
    writer.write_event(Event::Empty(
        BytesStart::new("Default").with_attributes([("Extension", "xml"), ("ContentType", "application/xml")]),
    ))?;
    writer.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
        ("PartName", "/xl/workbook.xml"),
        ("ContentType", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"),
    ])))?;
    writer.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
        ("PartName", "/xl/styles.xml"),
        ("ContentType", "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"),
    ])))?;
    for index in 1..=sheet_count {
        let part_name = format!("/xl/worksheets/sheet{index}.xml");
        writer.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
            ("PartName", part_name.as_str()),
            ("ContentType", "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"),
        ])))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Types")))?;
    Ok(writer.into_inner())
}

fn workbook(names: &[String]) -> Result<Vec<u8>, ExportError> {
    let mut writer = xml_writer()?;
    writer.write_event(Event::Start(
        BytesStart::new("workbook").with_attributes([("xmlns", SPREADSHEET_NS), ("xmlns:r", RELATIONSHIPS_NS)]),
    ))?;
    writer.write_event(Event::Start(BytesStart::new("sheets")))?;
    for (index, name) in names.iter().enumerate() {
        let id = (index + 1).to_string();
        let relationship = format!("rId{id}");
        writer.write_event(Event::Empty(BytesStart::new("sheet").with_attributes([
            ("name", name.as_str()),
            ("sheetId", id.as_str()),
            ("r:id", relationship.as_str()),
        ])))?;
    }
    writer.write_event(Event::End(BytesEnd::new("sheets")))?;
    writer.write_event(Event::End(BytesEnd::new("workbook")))?;
    Ok(writer.into_inner())
}

/// Worksheets are `rId1..rIdN`; styles follow them.
fn workbook_relationships(sheet_count: usize) -> Result<Vec<u8>, ExportError> {
    let mut writer = xml_writer()?;
    writer.write_event(Event::Start(
        BytesStart::new("Relationships").with_attributes([("xmlns", PACKAGE_RELATIONSHIPS_NS)]),
    ))?;
    for index in 1..=sheet_count {
        let id = format!("rId{index}");
        let target = format!("worksheets/sheet{index}.xml");
        writer.write_event(Event::Empty(BytesStart::new("Relationship").with_attributes([
            ("Id", id.as_str()),
            ("Type", WORKSHEET_TYPE),
            ("Target", target.as_str()),
        ])))?;
    }
    let styles_id = format!("rId{}", sheet_count + 1);
    writer.write_event(Event::Empty(BytesStart::new("Relationship").with_attributes([
        ("Id", styles_id.as_str()),
        ("Type", STYLES_TYPE),
        ("Target", "styles.xml"),
    ])))?;
    writer.write_event(Event::End(BytesEnd::new("Relationships")))?;
    Ok(writer.into_inner())
}

fn worksheet(table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut writer = xml_writer()?;
    writer.write_event(Event::Start(
        BytesStart::new("worksheet").with_attributes([("xmlns", SPREADSHEET_NS), ("xmlns:r", RELATIONSHIPS_NS)]),
    ))?;

    writer.write_event(Event::Start(BytesStart::new("sheetViews")))?;
    writer.write_event(Event::Start(
        BytesStart::new("sheetView").with_attributes([("workbookViewId", "0")]),
    ))?;
    writer.write_event(Event::Empty(BytesStart::new("pane").with_attributes([
        ("ySplit", "1"),
        ("topLeftCell", "A2"),
        ("activePane", "bottomLeft"),
        ("state", "frozen"),
    ])))?;
    writer.write_event(Event::End(BytesEnd::new("sheetView")))?;
    writer.write_event(Event::End(BytesEnd::new("sheetViews")))?;

    writer.write_event(Event::Start(BytesStart::new("cols")))?;
    for (index, width) in column_widths(table).into_iter().enumerate() {
        let position = (index + 1).to_string();
        let width = width.to_string();
        writer.write_event(Event::Empty(BytesStart::new("col").with_attributes([
            ("min", position.as_str()),
            ("max", position.as_str()),
            ("width", width.as_str()),
            ("customWidth", "1"),
        ])))?;
    }
    writer.write_event(Event::End(BytesEnd::new("cols")))?;

    writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
    start_row(&mut writer, 0)?;
    for (col, column) in table.columns().iter().enumerate() {
        write_text_cell(&mut writer, &index_to_reference(0, col), &column.name, Some(STYLE_HEADER))?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;

    for (index, row) in table.rows().iter().enumerate() {
        let row_index = index + 1;
        start_row(&mut writer, row_index)?;
        for (col, (column, value)) in table.columns().iter().zip(row).enumerate() {
            let reference = index_to_reference(row_index, col);
            write_cell(&mut writer, &reference, &column.name, value)?;
        }
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("sheetData")))?;

    writer.write_event(Event::End(BytesEnd::new("worksheet")))?;
    Ok(writer.into_inner())
}

/// `min(max(header, longest value in the first rows) + 2, 60)` characters.
fn column_widths(table: &Table) -> Vec<usize> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let longest = table
                .values(index)
                .take(WIDTH_SAMPLE_ROWS)
                .map(|value| value.to_string().chars().count())
                .fold(column.name.chars().count(), usize::max);
            (longest + 2).min(MAX_COLUMN_WIDTH)
        })
        .collect()
}

fn start_row(writer: &mut XmlWriter, row: usize) -> Result<(), ExportError> {
    let position = (row + 1).to_string();
    writer.write_event(Event::Start(
        BytesStart::new("row").with_attributes([("r", position.as_str())]),
    ))?;
    Ok(())
}

fn write_text_cell(
    writer: &mut XmlWriter,
    reference: &str,
    text: &str,
    style: Option<&str>,
) -> Result<(), ExportError> {
    let length = text.chars().count();
    if length > MAX_CELL_CHARS {
        return Err(ExportError::CellTooLong {
            reference: reference.to_owned(),
            length,
        });
    }

    let mut cell = BytesStart::new("c").with_attributes([("r", reference), ("t", "inlineStr")]);
    if let Some(style) = style {
        cell.push_attribute(("s", style));
    }
    writer.write_event(Event::Start(cell))?;
    writer.write_event(Event::Start(BytesStart::new("is")))?;
    writer.write_event(Event::Start(
        BytesStart::new("t").with_attributes([("xml:space", "preserve")]),
    ))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new("t")))?;
    writer.write_event(Event::End(BytesEnd::new("is")))?;
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

fn write_cell(writer: &mut XmlWriter, reference: &str, column: &str, value: &Value) -> Result<(), ExportError> {
    let (kind, style, text) = match value {
        Value::Null => return Ok(()),
        Value::Varchar(text) => return write_text_cell(writer, reference, text, None),
        Value::Boolean(flag) => (Some("b"), None, if *flag { "1" } else { "0" }.to_owned()),
        Value::BigInt(integer) => (None, Some(STYLE_INTEGER), integer.to_string()),
        Value::Double(double) if !double.is_finite() => {
            return Err(ExportError::UnsupportedValue {
                column: column.to_owned(),
                value: double.to_string(),
                format: ExportFormat::Xlsx,
            })
        }
        Value::Double(double) => (None, Some(STYLE_DOUBLE), double.to_string()),
        Value::Date(date) => (None, Some(STYLE_DATE), date_serial(*date).to_string()),
        Value::Timestamp(datetime) => (None, Some(STYLE_DATETIME), datetime_serial(*datetime).to_string()),
        Value::Time(time) => (None, Some(STYLE_TIME), time_fraction(*time).to_string()),
    };

    let mut cell = BytesStart::new("c").with_attributes([("r", reference)]);
    if let Some(kind) = kind {
        cell.push_attribute(("t", kind));
    }
    if let Some(style) = style {
        cell.push_attribute(("s", style));
    }
    writer.write_event(Event::Start(cell))?;
    writer.write_event(Event::Start(BytesStart::new("v")))?;
    writer.write_event(Event::Text(BytesText::new(&text)))?;
    writer.write_event(Event::End(BytesEnd::new("v")))?;
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

/// Excel 1900-system serial day number.
fn date_serial(date: NaiveDate) -> i64 {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    let days = (date - base).num_days();
    // Serial 60 is the nonexistent 1900-02-29
    if days < 61 {
        days - 1
    } else {
        days
    }
}

fn time_fraction(time: NaiveTime) -> f64 {
    let seconds = time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 / 1e9;
    seconds / 86_400.0
}

fn datetime_serial(datetime: NaiveDateTime) -> f64 {
    date_serial(datetime.date()) as f64 + time_fraction(datetime.time())
}
