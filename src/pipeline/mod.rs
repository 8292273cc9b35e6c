//! # Medallion stages
//!
//! Bronze is the raw ingested table, silver the structurally normalised one and
//! gold the filtered, deduplicated, column-selected one. The stage transforms are
//! pure functions of their input; [`Session`](session::Session) owns the current
//! table of each stage.

pub mod gold;
pub mod rules;
pub mod session;
pub mod silver;
pub mod summary;

use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when an action runs before the stage it depends on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("No {0} table; run {action} first", action = .0.produced_by())]
    Missing(Stage),

    #[error("Unknown stage '{0}', expected bronze, silver or gold")]
    UnknownStage(String),
}

/// Position of a table in the pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Bronze,
    Silver,
    Gold,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Bronze, Stage::Silver, Stage::Gold];

    /// Relation name the stage is registered under for SQL queries.
    pub const fn relation_name(&self) -> &'static str {
        match self {
            Stage::Bronze => "bronze",
            Stage::Silver => "silver",
            Stage::Gold => "gold",
        }
    }

    /// Session action that produces this stage.
    pub const fn produced_by(&self) -> &'static str {
        match self {
            Stage::Bronze => "upload",
            Stage::Silver => "refine",
            Stage::Gold => "shape",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.relation_name())
    }
}

impl FromStr for Stage {
    type Err = StageError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.relation_name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| StageError::UnknownStage(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::*;

    #[test]
    fn parse_stage() {
        assert_eq!("Silver".parse::<Stage>(), Ok(Stage::Silver));
        assert_eq!(" gold ".parse::<Stage>(), Ok(Stage::Gold));
        assert_eq!(
            "platinum".parse::<Stage>(),
            Err(StageError::UnknownStage("platinum".to_owned()))
        );
    }

    #[test]
    fn missing_stage_names_the_action() {
        assert_eq!(
            StageError::Missing(Stage::Silver).to_string(),
            "No silver table; run refine first"
        );
    }
}
