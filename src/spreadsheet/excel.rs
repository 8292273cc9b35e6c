//! Microsoft Office Excel package helpers
use crate::error::ResultMessage;
use crate::helpers::xml::ElementExt;
use crate::helpers::zip::require_part;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::cell::DateSystem;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::Cursor;
use zip::ZipArchive;

/// XML tag name for relationship elements in Excel files
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Magic number of OLE compound documents (legacy `.xls` and encrypted OOXML)
const COMPOUND_FILE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// In-memory ZIP package of a workbook
pub(crate) type Package = ZipArchive<Cursor<Vec<u8>>>;

/// Workbook metadata loader: sheets as (name, zip path) pairs plus the date system
type WorkbookLoader = fn(&mut Package) -> Result<(Vec<(String, String)>, DateSystem), SpreadsheetError>;

/// Number format loader: cell type per style index
type NumberFormatLoader = fn(&mut Package, DateSystem) -> Result<Vec<CellType>, SpreadsheetError>;

/// Opens a workbook package from memory, returning it with the cell type of
/// every style index and the (name, zip path) of every worksheet.
///
/// Compound files are rejected up front: a password-protected `.xlsx` is an
/// encrypted OLE container, not a ZIP package.
pub(super) fn open(
    bytes: Vec<u8>,
    load_workbook: WorkbookLoader,
    load_number_formats: NumberFormatLoader,
) -> Result<(Package, Vec<CellType>, Vec<(String, String)>), SpreadsheetError> {
    if is_compound_file(&bytes) {
        Err(SpreadsheetError::CompoundFileError)?;
    }

    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let (sheets, system) = load_workbook(&mut zip).with_prefix("xl/workbook.xml")?;
    if sheets.is_empty() {
        Err(SpreadsheetError::SpreadsheetEmptyError)?
    }

    let number_formats = load_number_formats(&mut zip, system).with_prefix("xl/styles.xml")?;
    Ok((zip, number_formats, sheets))
}

/// True for OLE compound documents. Encrypted workbooks are stored this way too.
pub(crate) fn is_compound_file(bytes: &[u8]) -> bool {
    bytes.starts_with(&COMPOUND_FILE_MAGIC)
}

/// Loads worksheet relationships: relationship id to worksheet path
pub(super) fn load_relationships(zip: &mut Package, path: &str) -> Result<HashMap<String, String>, SpreadsheetError> {
    let mut reader = require_part(zip, path)?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let is_worksheet = event.attr("Type")?.is_none_or(|kind| kind.ends_with("/worksheet"));
            if let (true, Some(id), Some(target)) = (is_worksheet, event.attr("Id")?, event.attr("Target")?) {
                relationships.insert(id, to_zip_path(&target));
            }
        }
    });
    Ok(relationships)
}

/// Maps style format ids to cell types using custom and built-in formats
pub(super) fn resolve_number_formats(
    format_ids: Vec<String>,
    custom_formats: HashMap<String, CellType>,
    system: DateSystem,
) -> Vec<CellType> {
    format_ids
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::builtin_number_format(id, system))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Normalizes a relationship target to a path inside the package
pub(crate) fn to_zip_path(path: &str) -> String {
    if let Some(absolute) = path.strip_prefix('/') {
        absolute.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}
