//! Reader of Excel 2007+ (`.xlsx`, `.xlsm`) packages

use crate::error::ResultMessage;
use crate::helpers::xml::push_reference;
use crate::helpers::xml::ElementExt;
use crate::helpers::xml::XmlReader;
use crate::helpers::zip::open_part;
use crate::helpers::zip::require_part;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::cell::DateSystem;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::excel::Package;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use log::warn;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::collections::HashMap;
use std::io::BufRead;

const NUM_FMTS: QName = QName(b"numFmts");
const NUM_FMT: QName = QName(b"numFmt");
const CELL_XFS: QName = QName(b"cellXfs");
const XF: QName = QName(b"xf");
const STRING_ITEM: QName = QName(b"si");
const PHONETIC_RUN: QName = QName(b"rPh");
const TEXT: QName = QName(b"t");
const WORKBOOK_PR: QName = QName(b"workbookPr");
const SHEET: QName = QName(b"sheet");
const ROW: QName = QName(b"row");
const CELL: QName = QName(b"c");
const INLINE_STRING: QName = QName(b"is");
const VALUE: QName = QName(b"v");

/// An Excel 2007+ workbook opened from memory
pub(crate) struct XlsxWorkbook {
    zip: Package,
    /// Cell type of each `cellXfs` style index
    styles: Vec<CellType>,
    /// (name, part path) in workbook order
    sheets: Vec<(String, String)>,
}

impl XlsxWorkbook {
    pub(crate) fn open(bytes: Vec<u8>) -> Result<XlsxWorkbook, SpreadsheetError> {
        let (zip, styles, sheets) = excel::open(bytes, load_workbook, load_number_formats)?;
        Ok(XlsxWorkbook { zip, styles, sheets })
    }

    pub(crate) fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Reads the first sheet accepted by the criteria.
    ///
    /// Numbers take the type of their style's number format. Shared strings are
    /// resolved, and cells holding no value or a null literal are left out.
    pub(crate) fn read_sheet(&mut self, criteria: &Criteria) -> Result<Sheet, SpreadsheetError> {
        let Some((name, path)) = self.sheets.iter().find(|(name, _)| criteria.accept(name)).cloned() else {
            let pattern = criteria
                .sheet_name_pattern
                .as_ref()
                .map(|pattern| pattern.as_str().to_owned())
                .unwrap_or_default();
            warn!("No sheet matches '{pattern}'; the workbook has {:?}", self.sheet_names());
            return Err(SpreadsheetError::SheetNotFound(pattern));
        };
        let shared_strings = load_shared_strings(&mut self.zip).with_prefix("xl/sharedStrings.xml")?;
        debug!("Reading sheet '{name}' from {path} ({} shared strings)", shared_strings.len());

        let mut sheet = Sheet::new(&name);
        // Position of a row or cell that omits its `r` attribute
        let mut next_row = 0usize;
        let mut next_col = 0usize;
        let mut pending = None::<Cell>;
        let mut reader = require_part(&mut self.zip, &path)?;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == ROW => {
                if let Some(number) = event.attr_as::<usize>("r")? {
                    next_row = number.saturating_sub(1);
                }
                next_col = 0;
            }
            Event::End(event) if event.name() == ROW => next_row += 1,
            Event::Start(event) if event.name() == CELL => {
                let (row, col) = event
                    .attr("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((next_row, next_col));
                next_col = col + 1;
                let mut kind = cell_type(event.attr("t")?.as_deref(), criteria.error_as_null);
                if let (CellType::Number, Some(style)) = (kind, event.attr("s")?) {
                    if !style.is_empty() {
                        kind = self.styles.get(style.parse::<usize>()?).copied().unwrap_or(CellType::Number);
                    }
                }
                pending = Some(Cell { row, col, kind, value: String::new() });
            }
            Event::Start(event) if event.name() == VALUE || event.name() == INLINE_STRING => {
                let is_value = event.name() == VALUE;
                let text = match is_value {
                    true => read_text(&mut reader, VALUE, true)?,
                    false => read_text(&mut reader, INLINE_STRING, false)?,
                };
                if let Some(cell) = pending.as_mut() {
                    cell.value = text;
                }
            }
            Event::End(event) if event.name() == CELL => {
                if let Some(cell) = pending.take() {
                    if let Some(cell) = finish_cell(cell, &shared_strings, criteria, &sheet.name)? {
                        sheet.push(cell);
                    }
                }
            }
        });
        sheet.finish();
        Ok(sheet)
    }
}

/// Cell type named by the `t` attribute of a `<c>` element.
fn cell_type(t: Option<&str>, error_as_null: bool) -> CellType {
    match t {
        Some("inlineStr" | "str") => CellType::InlineString,
        Some("s") => CellType::SharedString,
        Some("d") => CellType::IsoDateTime,
        Some("b") => CellType::Boolean,
        Some("e") if error_as_null => CellType::Empty,
        Some("e") => CellType::Error,
        _ => CellType::Number,
    }
}

/// Resolves a cell at its end tag; `None` when it holds no value.
fn finish_cell(
    mut cell: Cell,
    shared_strings: &[String],
    criteria: &Criteria,
    sheet_name: &str,
) -> Result<Option<Cell>, SpreadsheetError> {
    match cell.kind {
        CellType::Empty => return Ok(None),
        CellType::Error => {
            return Err(SpreadsheetError::CellValueError(
                sheet_name.to_owned(),
                cell.reference(),
                cell.value,
            ))
        }
        CellType::SharedString => {
            let index = cell.value.trim().parse::<usize>()?;
            cell.value = shared_strings.get(index).cloned().unwrap_or_default();
            cell.kind = CellType::InlineString;
        }
        _ => (),
    }
    let is_null = cell.value.is_empty() || (cell.kind == CellType::InlineString && criteria.is_null(&cell.value));
    Ok((!is_null).then_some(cell))
}

/// The shared string table; a workbook without one has no shared strings.
fn load_shared_strings(zip: &mut Package) -> Result<Vec<String>, SpreadsheetError> {
    let mut strings = Vec::new();
    if let Some(mut reader) = open_part(zip, "xl/sharedStrings.xml")? {
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == STRING_ITEM => {
                strings.push(read_text(&mut reader, STRING_ITEM, false)?);
            }
        });
    }
    Ok(strings)
}

/// Worksheets in workbook order and the date system, from `xl/workbook.xml`.
fn load_workbook(zip: &mut Package) -> Result<(Vec<(String, String)>, DateSystem), SpreadsheetError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut sheets = Vec::new();
    let mut system = DateSystem::default();
    let mut reader = require_part(zip, "xl/workbook.xml")?;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == SHEET => {
            let path = event.attr_local("id")?.and_then(|id| relationships.get(&id).cloned());
            if let (Some(name), Some(path)) = (event.attr("name")?, path) {
                sheets.push((name, path));
            }
        }
        Event::Start(event) if event.name() == WORKBOOK_PR => {
            let flag = event.attr("date1904")?;
            system = DateSystem::from_1904_flag(matches!(flag.as_deref(), Some("1" | "true")));
        }
    });
    Ok((sheets, system))
}

/// Cell type of every `cellXfs` style index, from `xl/styles.xml`.
fn load_number_formats(zip: &mut Package, system: DateSystem) -> Result<Vec<CellType>, SpreadsheetError> {
    let Some(mut reader) = open_part(zip, "xl/styles.xml")? else {
        return Ok(Vec::new());
    };

    let mut section = None::<QName<'static>>;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_ids = Vec::<String>::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == NUM_FMTS => section = Some(NUM_FMTS),
        Event::Start(event) if event.name() == CELL_XFS => section = Some(CELL_XFS),
        Event::End(event) if Some(event.name()) == section => section = None,
        Event::Start(event) if section == Some(NUM_FMTS) && event.name() == NUM_FMT => {
            if let (Some(id), Some(code)) = (event.attr("numFmtId")?, event.attr("formatCode")?) {
                custom_formats.insert(id, CellType::custom_number_format(&code, system));
            }
        }
        Event::Start(event) if section == Some(CELL_XFS) && event.name() == XF => {
            format_ids.push(event.attr("numFmtId")?.unwrap_or_else(|| "0".to_owned()));
        }
    });

    Ok(excel::resolve_number_formats(format_ids, custom_formats, system))
}

/// Collects the text of a string element up to its `end` tag. `<v>` holds its
/// text directly (`own_text`); `<si>` and `<is>` hold it in `<t>` runs, and
/// the runs of phonetic guides are skipped.
fn read_text<R: BufRead>(reader: &mut XmlReader<R>, end: QName, own_text: bool) -> Result<String, SpreadsheetError> {
    let mut text = String::new();
    let mut in_text = own_text;
    let mut in_phonetic = false;
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end => break,
        Event::Start(event) if event.name() == PHONETIC_RUN => in_phonetic = true,
        Event::End(event) if event.name() == PHONETIC_RUN => in_phonetic = false,
        Event::Start(event) if event.name() == TEXT => in_text = !in_phonetic,
        Event::End(event) if event.name() == TEXT => in_text = own_text,
        Event::Text(event) if in_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if in_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if in_text => push_reference(&mut text, &event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use crate::spreadsheet::criteria::Criteria;
    use crate::spreadsheet::xlsx::XlsxWorkbook;
    use crate::spreadsheet::*;
    use crate::table::*;
    use chrono::NaiveDate;
    use std::io::Cursor;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Cover" sheetId="1" r:id="rId1"/><sheet name="Endpoints" sheetId="2" r:id="rId2"/></sheets>
</workbook>"#;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="1"><numFmt numFmtId="164" formatCode="dd/mm/yyyy\ hh:mm"/></numFmts>
<cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/><xf numFmtId="164" applyNumberFormat="1"/></cellXfs>
</styleSheet>"#;

    const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="6" uniqueCount="6">
<si><t>Endpoint Name</t></si>
<si><t>Endpoint Status</t></si>
<si><t>Last Seen</t></si>
<si><r><t>host</t></r><r><t xml:space="preserve">-01</t></r><rPh><t>ignored</t></rPh></si>
<si><t>Connected &amp; healthy</t></si>
<si><t>Exported by admin</t></si>
</sst>"#;

    const COVER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>cover</t></is></c></row>
</sheetData></worksheet>"#;

    const ENDPOINTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="s"><v>5</v></c></row>
<row r="3"><c r="A3" t="s"><v>0</v></c><c r="B3" t="s"><v>1</v></c><c r="C3" t="s"><v>2</v></c><c r="D3" t="inlineStr"><is><t>Score</t></is></c><c r="E3" t="inlineStr"><is><t>Installed</t></is></c></row>
<row r="4"><c r="A4" t="s"><v>3</v></c><c r="B4" t="s"><v>4</v></c><c r="C4" s="2"><v>43831.5</v></c><c r="D4"><v>10</v></c><c r="E4" s="1"><v>43466</v></c></row>
<row r="5"><c r="A5" t="inlineStr"><is><t>host-02</t></is></c><c r="B5" t="e"><v>#N/A</v></c><c r="D5"><v>2.5</v></c><c r="E5" t="b"><v>1</v></c></row>
</sheetData></worksheet>"#;

    /// Builds an in-memory package from (path, content) parts
    fn package(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, content) in parts {
            zip.start_file(*path, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn endpoints_workbook() -> Vec<u8> {
        package(&[
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/workbook.xml", WORKBOOK),
            ("xl/styles.xml", STYLES),
            ("xl/sharedStrings.xml", SHARED_STRINGS),
            ("xl/worksheets/sheet1.xml", COVER),
            ("xl/worksheets/sheet2.xml", ENDPOINTS),
        ])
    }

    fn options(sheet: &str) -> IngestOptions {
        IngestOptions {
            sheet: Some(sheet.to_owned()),
            header_hint: vec!["Endpoint Name".to_owned(), "Endpoint Status".to_owned()],
            ..IngestOptions::default()
        }
    }

    #[test]
    fn lists_sheets_in_workbook_order() {
        let workbook = XlsxWorkbook::open(endpoints_workbook()).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Cover", "Endpoints"]);
    }

    #[test]
    fn reads_typed_cells_after_detected_header() {
        let table = read_bronze(&endpoints_workbook(), SourceFormat::Xlsx, &options("End*")).unwrap();
        assert_eq!(
            table.column_names(),
            vec!["Endpoint Name", "Endpoint Status", "Last Seen", "Score", "Installed"]
        );
        let kinds: Vec<_> = table.columns().iter().map(|column| column.kind).collect();
        assert_eq!(
            kinds,
            vec![ColumnType::Varchar, ColumnType::Varchar, ColumnType::Timestamp, ColumnType::Double, ColumnType::Varchar]
        );
        let noon = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(
            table.rows()[0],
            vec![
                Value::from("host-01"),
                Value::from("Connected & healthy"),
                Value::Timestamp(noon),
                Value::Double(10.0),
                Value::from("2019-01-01"),
            ]
        );
        assert_eq!(table.rows()[1][1], Value::Null);
        assert_eq!(table.rows()[1][4], Value::from("true"));
    }

    #[test]
    fn error_cells_fail_unless_nulled() {
        let strict = IngestOptions {
            error_as_null: false,
            ..options("Endpoints")
        };
        let error = read_bronze(&endpoints_workbook(), SourceFormat::Xlsx, &strict).unwrap_err();
        assert!(matches!(error, SpreadsheetError::CellValueError(_, ref reference, _) if reference == "B5"));
    }

    #[test]
    fn first_sheet_by_default() {
        let mut workbook = XlsxWorkbook::open(endpoints_workbook()).unwrap();
        let criteria = Criteria::try_from(&IngestOptions::default()).unwrap();
        let sheet = workbook.read_sheet(&criteria).unwrap();
        assert_eq!(sheet.name, "Cover");
    }

    #[test]
    fn missing_sheet() {
        let error = read_bronze(&endpoints_workbook(), SourceFormat::Xlsx, &options("Nope")).unwrap_err();
        assert!(matches!(error, SpreadsheetError::SheetNotFound(_)));
    }

    #[test]
    fn workbook_without_sheets() {
        let bytes = package(&[
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/workbook.xml", "<workbook><sheets/></workbook>"),
        ]);
        assert!(matches!(
            XlsxWorkbook::open(bytes),
            Err(SpreadsheetError::SpreadsheetEmptyError)
        ));
    }
}
