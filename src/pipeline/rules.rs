//! Opt-in silver rules and row extracts for endpoint inventories.
//!
//! None of these run unless configured: rules are listed under `silver.rules`
//! and extracts under `extracts` in the pipeline configuration.

use crate::config::ConfigError;
use crate::error::MedallionError;
use crate::pipeline::silver::BusinessRule;
use crate::table::Column;
use crate::table::ColumnType;
use crate::table::SchemaError;
use crate::table::Table;
use crate::table::Value;
use regex::Regex;
use regex::RegexBuilder;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::LazyLock;

static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,3}(?:\.\d{1,3}){3})\b").expect("Hardcode regex pattern"));

/// A rule as written in the configuration file.
///
/// ```yaml
/// rules:
///   - title_case: { column: endpoint_status }
///   - first_address: { source: ip_address, target: ipv4, family: v4 }
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleConfig {
    TitleCase { column: String },
    FirstAddress {
        source: String,
        target: String,
        family: AddressFamily,
    },
}

impl RuleConfig {
    pub fn build(&self) -> Box<dyn BusinessRule> {
        match self {
            RuleConfig::TitleCase { column } => Box::new(TitleCase::new(column)),
            RuleConfig::FirstAddress { source, target, family } => {
                Box::new(FirstAddress::new(source, target, *family))
            }
        }
    }
}

/// Rewrites a text column in title case (`ONLINE` → `Online`, `lost connection`
/// → `Lost Connection`).
pub struct TitleCase {
    column: String,
}

impl TitleCase {
    pub fn new(column: impl Into<String>) -> Self {
        TitleCase { column: column.into() }
    }
}

impl BusinessRule for TitleCase {
    fn name(&self) -> &str {
        "title_case"
    }

    fn apply(&self, table: Table) -> Result<Table, MedallionError> {
        let index = table.require_column(&self.column)?;
        let kind = table.columns()[index].kind;
        if kind != ColumnType::Varchar {
            Err(SchemaError::WrongType {
                column: self.column.to_owned(),
                found: kind.sql_name(),
                expected: ColumnType::Varchar.sql_name(),
            })?;
        }

        let (columns, mut rows) = table.into_parts();
        for row in rows.iter_mut() {
            if let Value::Varchar(text) = &row[index] {
                row[index] = Value::Varchar(title_case(text.trim()));
            }
        }
        Ok(Table::new(columns, rows)?)
    }
}

/// Upper-cases the first letter of every word and lower-cases the rest. A word
/// is a run of letters.
pub fn title_case(text: &str) -> String {
    let mut title = String::with_capacity(text.len());
    let mut in_word = false;
    for character in text.chars() {
        if character.is_alphabetic() {
            match in_word {
                true => title.extend(character.to_lowercase()),
                false => title.extend(character.to_uppercase()),
            }
            in_word = true;
        } else {
            title.push(character);
            in_word = false;
        }
    }
    title
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

/// Stores the first address of a family found in a multi-address cell
/// (`10.0.0.5, 192.168.1.7`) in its own text column. An existing target column
/// is replaced; otherwise it is appended.
pub struct FirstAddress {
    source: String,
    target: String,
    family: AddressFamily,
}

impl FirstAddress {
    pub fn new(source: impl Into<String>, target: impl Into<String>, family: AddressFamily) -> Self {
        FirstAddress {
            source: source.into(),
            target: target.into(),
            family,
        }
    }
}

impl BusinessRule for FirstAddress {
    fn name(&self) -> &str {
        "first_address"
    }

    fn apply(&self, table: Table) -> Result<Table, MedallionError> {
        let source = table.require_column(&self.source)?;
        let target = table.column_index(&self.target);
        let (mut columns, mut rows) = table.into_parts();

        for row in rows.iter_mut() {
            let address = match &row[source] {
                Value::Null => None,
                Value::Varchar(text) => first_address(text, self.family),
                other => first_address(&other.to_string(), self.family),
            };
            let address = Value::from(address);
            match target {
                Some(index) => row[index] = address,
                None => row.push(address),
            }
        }
        match target {
            Some(index) => columns[index].kind = ColumnType::Varchar,
            None => columns.push(Column::new(self.target.to_owned(), ColumnType::Varchar)),
        }
        Ok(Table::new(columns, rows)?)
    }
}

/// First IPv4 address anywhere in `text`, or the first comma-separated part
/// containing `:` for IPv6.
pub fn first_address(text: &str, family: AddressFamily) -> Option<String> {
    match family {
        AddressFamily::V4 => IPV4.captures(text).map(|captures| captures[1].to_owned()),
        AddressFamily::V6 => text
            .split(',')
            .map(str::trim)
            .find(|part| part.contains(':'))
            .map(str::to_owned),
    }
}

/// Rows of a stage whose text in any of `columns` matches `pattern`, ignoring
/// case; written as an extra workbook sheet named `name`.
///
/// ```yaml
/// extracts:
///   - name: upgrade_failures
///     columns: [last_upgrade_status, last_upgrade_failure_reason]
///     pattern: "fail|timed out|faulty|lost|error"
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowExtract {
    pub name: String,
    pub columns: Vec<String>,
    pub pattern: String,
}

impl RowExtract {
    pub fn apply(&self, table: &Table) -> Result<Table, MedallionError> {
        let pattern = RegexBuilder::new(&self.pattern)
            .case_insensitive(true)
            .build()
            .map_err(ConfigError::from)?;
        Ok(matching_rows(table, &self.columns, &pattern)?)
    }
}

impl FromStr for RowExtract {
    type Err = ConfigError;

    /// Parses `name:column[,column...]:pattern`; the pattern may contain `:`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(columns), Some(pattern)) if !name.trim().is_empty() && !pattern.is_empty() => {
                Ok(RowExtract {
                    name: name.trim().to_owned(),
                    columns: columns.split(',').map(|column| column.trim().to_owned()).collect(),
                    pattern: pattern.to_owned(),
                })
            }
            _ => Err(ConfigError::InvalidExtract(text.to_owned())),
        }
    }
}

/// Keeps the rows where the text of at least one of `columns` matches
/// `pattern`. Nulls never match.
pub fn matching_rows(table: &Table, columns: &[String], pattern: &Regex) -> Result<Table, SchemaError> {
    let indexes = columns
        .iter()
        .map(|column| table.require_column(column))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(table.clone().filter_rows(|_, row| {
        indexes.iter().any(|index| match &row[*index] {
            Value::Null => false,
            Value::Varchar(text) => pattern.is_match(text),
            other => pattern.is_match(&other.to_string()),
        })
    }))
}
