use crate::spreadsheet::IngestOptions;
use crate::spreadsheet::SpreadsheetError;
use glob::Pattern;
use std::collections::HashSet;

/// Compiled form of [`IngestOptions`] used while scanning cells.
#[derive(Clone, Debug)]
pub(crate) struct Criteria {
    /// Sheet name pattern; `None` selects the first sheet.
    pub(crate) sheet_name_pattern: Option<Pattern>,

    /// Null literals (default: empty string)
    pub(crate) nulls: HashSet<String>,

    /// Convert error cells to null values instead of failing.
    pub(crate) error_as_null: bool,
}

impl Criteria {
    /// Checks if a sheet name matches the sheet pattern.
    pub(crate) fn accept(&self, sheet_name: &str) -> bool {
        self.sheet_name_pattern
            .as_ref()
            .map(|pattern| pattern.matches(sheet_name))
            .unwrap_or(true)
    }

    /// True if the raw text should be read as a missing value.
    pub(crate) fn is_null(&self, value: &str) -> bool {
        self.nulls.contains(value)
    }
}

impl TryFrom<&IngestOptions> for Criteria {
    type Error = SpreadsheetError;

    fn try_from(options: &IngestOptions) -> Result<Self, Self::Error> {
        let sheet_name_pattern = options
            .sheet
            .as_deref()
            .map(Pattern::new)
            .transpose()?;
        let mut nulls: HashSet<String> = options.null_values.iter().cloned().collect();
        nulls.insert(String::new());
        Ok(Criteria {
            sheet_name_pattern,
            nulls,
            error_as_null: options.error_as_null,
        })
    }
}
