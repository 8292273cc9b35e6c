//! Pipeline options read from a YAML or JSON file.

use crate::pipeline::gold::GoldOptions;
use crate::pipeline::rules::RowExtract;
use crate::pipeline::silver::SilverOptions;
use crate::spreadsheet::IngestOptions;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid extract '{0}', expected name:column[,column...]:pattern")]
    InvalidExtract(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Unknown configuration file type '{0}', expected .yaml, .yml or .json")]
    UnknownExtension(String),
}

/// Options of every stage; each section and field may be omitted.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestOptions,
    pub silver: SilverOptions,
    pub gold: GoldOptions,
    /// Row extracts written as extra workbook sheets
    pub extracts: Vec<RowExtract>,
}

impl PipelineConfig {
    /// Loads the file at `path`, choosing the parser from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let read = || {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_owned(),
                source,
            })
        };
        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&read()?),
            "json" => Self::from_json_str(&read()?),
            _ => Err(ConfigError::UnknownExtension(path.display().to_string())),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        // An empty document is null in YAML
        if text.trim().is_empty() {
            return Ok(PipelineConfig::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}
