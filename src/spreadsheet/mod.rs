//! # Bronze ingestion
//!
//! Turns the raw bytes of a delimited text file or an Excel 2007+ workbook into
//! the bronze [`Table`]. Cells are typed the way the source encodes them (workbook
//! number formats, CSV value inference); names and strings are left untouched.
//!
//! Both readers collect cells into a [`Sheet`](sheet::Sheet) first; the shared
//! conversion then finds the header row, names and types the columns, and drops
//! empty rows and columns.

pub(crate) mod cell;
pub(crate) mod criteria;
pub(crate) mod delimited;
pub(crate) mod excel;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xlsx;

use crate::helpers::xml::XmlError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::xlsx::XlsxWorkbook;
use crate::table::SchemaError;
use crate::table::Table;
use log::debug;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading input bytes into the bronze table.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("{0}")]
    WithContextError(String),

    #[error("Cannot detect file format for '{0}'")]
    InvalidFileFormat(String),

    #[error("Workbook is encrypted or in the legacy .xls format; save it as .xlsx")]
    CompoundFileError,

    #[error("Workbook contains no sheets")]
    SpreadsheetEmptyError,

    #[error("Missing part '{0}' in workbook")]
    FileError(String),

    #[error("No sheet matches '{0}'")]
    SheetNotFound(String),

    #[error("Sheet '{0}' contains no data")]
    EmptySheet(String),

    #[error("Invalid cell value at {1} of sheet '{0}': {2}")]
    CellValueError(String, String, String),

    #[error("Record {record} has {found} fields, expected {expected}")]
    RaggedRecord {
        record: usize,
        expected: usize,
        found: usize,
    },

    #[error("Unknown text encoding '{0}'")]
    UnknownEncoding(String),

    #[error("Delimiter '{0}' is not a single-byte character")]
    InvalidDelimiter(char),

    #[error("Invalid sheet pattern: {0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    InvalidTable(#[from] SchemaError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    XmlHelperError(#[from] XmlError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    // Standard library errors
    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    IoError(#[from] std::io::Error),
}

/// Layout of the input bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    /// Delimited text using [`IngestOptions::delimiter`]
    Csv,
    /// Tab-delimited text
    Tsv,
    /// Excel 2007+ workbook (`.xlsx`, `.xlsm`)
    Xlsx,
}

impl SourceFormat {
    /// Detects the format from a file extension.
    pub fn from_file_name(file_name: impl AsRef<Path>) -> Result<Self, SpreadsheetError> {
        let path = file_name.as_ref();
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default();
        extension
            .parse()
            .map_err(|_| SpreadsheetError::InvalidFileFormat(path.display().to_string()))
    }

    /// Detects a workbook from its content: ZIP packages are read as xlsx.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"PK\x03\x04") {
            Some(SourceFormat::Xlsx)
        } else {
            None
        }
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Ok(SourceFormat::Csv),
            "tsv" | "tab" => Ok(SourceFormat::Tsv),
            "xlsx" | "xlsm" => Ok(SourceFormat::Xlsx),
            _ => Err(format!("unsupported source format '{name}'")),
        }
    }
}

/// Options controlling bronze ingestion.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Sheet name or glob pattern; the first sheet when unset
    pub sheet: Option<String>,
    /// Names the header row must contain; the first non-empty row when empty
    pub header_hint: Vec<String>,
    /// Field delimiter for [`SourceFormat::Csv`]
    pub delimiter: char,
    /// WHATWG label of the encoding used when the input is not UTF-8
    pub encoding: String,
    /// Type delimited columns from their values instead of keeping text
    pub infer_types: bool,
    pub skip_empty_rows: bool,
    /// Read error cells (`#N/A`, `#DIV/0!`) as null instead of failing
    pub error_as_null: bool,
    /// Text values read as null, in addition to the empty string
    pub null_values: Vec<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            sheet: None,
            header_hint: Vec::new(),
            delimiter: ',',
            encoding: "windows-1252".to_owned(),
            infer_types: true,
            skip_empty_rows: true,
            error_as_null: true,
            null_values: Vec::new(),
        }
    }
}

/// Reads raw input bytes into the bronze table.
pub fn read_bronze(bytes: &[u8], format: SourceFormat, options: &IngestOptions) -> Result<Table, SpreadsheetError> {
    let criteria = Criteria::try_from(options)?;
    let sheet = match format {
        SourceFormat::Csv => delimited::read_delimited(bytes, delimiter_byte(options.delimiter)?, options, &criteria)?,
        SourceFormat::Tsv => delimited::read_delimited(bytes, b'\t', options, &criteria)?,
        SourceFormat::Xlsx => XlsxWorkbook::open(bytes.to_vec())?.read_sheet(&criteria)?,
    };
    let table = sheet.to_table(options)?;
    debug!(
        "Read bronze table from {:?} sheet '{}': {} rows, {} columns",
        format,
        sheet.name,
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

fn delimiter_byte(delimiter: char) -> Result<u8, SpreadsheetError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or(SpreadsheetError::InvalidDelimiter(delimiter))
}

#[cfg(test)]
mod tests {
    use crate::spreadsheet::*;

    #[test]
    fn format_from_file_name() {
        assert_eq!(SourceFormat::from_file_name("report.CSV").unwrap(), SourceFormat::Csv);
        assert_eq!(SourceFormat::from_file_name("report.tsv").unwrap(), SourceFormat::Tsv);
        assert_eq!(SourceFormat::from_file_name("dir/report.xlsx").unwrap(), SourceFormat::Xlsx);
        assert!(matches!(
            SourceFormat::from_file_name("report.xls"),
            Err(SpreadsheetError::InvalidFileFormat(_))
        ));
        assert!(SourceFormat::from_file_name("report").is_err());
    }

    #[test]
    fn sniff_zip_magic() {
        assert_eq!(SourceFormat::sniff(b"PK\x03\x04rest"), Some(SourceFormat::Xlsx));
        assert_eq!(SourceFormat::sniff(b"a,b\n"), None);
    }

    #[test]
    fn semicolon_delimiter() {
        let options = IngestOptions {
            delimiter: ';',
            ..IngestOptions::default()
        };
        let table = read_bronze(b"a;b\n1;x\n", SourceFormat::Csv, &options).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
    }

    #[test]
    fn multibyte_delimiter_is_rejected() {
        let options = IngestOptions {
            delimiter: '\u{2016}',
            ..IngestOptions::default()
        };
        assert!(matches!(
            read_bronze(b"a\n", SourceFormat::Csv, &options),
            Err(SpreadsheetError::InvalidDelimiter(_))
        ));
    }

    #[test]
    fn compound_file_is_rejected() {
        let bytes = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0, 0, 0, 0];
        assert!(matches!(
            read_bronze(&bytes, SourceFormat::Xlsx, &IngestOptions::default()),
            Err(SpreadsheetError::CompoundFileError)
        ));
    }

    #[test]
    fn garbage_workbook_is_a_format_error() {
        assert!(matches!(
            read_bronze(b"not a zip", SourceFormat::Xlsx, &IngestOptions::default()),
            Err(SpreadsheetError::ZipError(_))
        ));
    }

    #[test]
    fn options_from_yaml() {
        let options: IngestOptions = serde_yaml::from_str("delimiter: ';'\nheader_hint: [Host]\n").unwrap();
        assert_eq!(options.delimiter, ';');
        assert_eq!(options.header_hint, vec!["Host".to_owned()]);
        assert!(options.infer_types);
        assert_eq!(options.encoding, "windows-1252");
    }
}
