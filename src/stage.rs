//! Job stage state machine
//!
//! Created → CompanySelected → Researching → Preprocessing
//!         → ReportGeneration → Validating → Completed
//!
//! `Error` is absorbing and reachable from every non-terminal stage.

use crate::error::PipelineError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    CompanySelected,
    Researching,
    Preprocessing,
    ReportGeneration,
    Validating,
    Completed,
    Error,
}

/// Forward transitions. Anything not listed here (other than `* → Error`
/// from a non-terminal stage) is rejected.
pub const TRANSITIONS: &[(Stage, Stage)] = &[
    (Stage::Created, Stage::CompanySelected),
    (Stage::CompanySelected, Stage::Researching),
    (Stage::Researching, Stage::Preprocessing),
    (Stage::Preprocessing, Stage::ReportGeneration),
    (Stage::ReportGeneration, Stage::Validating),
    (Stage::Validating, Stage::Completed),
];

impl Stage {
    /// Progress total reported to observers: one step per stage after `Created`.
    pub const TOTAL: u32 = 6;

    pub fn ordinal(self) -> Option<u32> {
        match self {
            Stage::Created => Some(0),
            Stage::CompanySelected => Some(1),
            Stage::Researching => Some(2),
            Stage::Preprocessing => Some(3),
            Stage::ReportGeneration => Some(4),
            Stage::Validating => Some(5),
            Stage::Completed => Some(6),
            Stage::Error => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    /// The next stage on the happy path, if any.
    pub fn next(self) -> Option<Stage> {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, to)| *to)
    }

    pub fn can_transition_to(self, to: Stage) -> bool {
        if to == Stage::Error {
            return !self.is_terminal();
        }
        TRANSITIONS.contains(&(self, to))
    }

    /// Validate `self → to`, returning the target stage.
    pub fn transition(self, to: Stage) -> Result<Stage> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(PipelineError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Created => "Created",
            Stage::CompanySelected => "CompanySelected",
            Stage::Researching => "Researching",
            Stage::Preprocessing => "Preprocessing",
            Stage::ReportGeneration => "ReportGeneration",
            Stage::Validating => "Validating",
            Stage::Completed => "Completed",
            Stage::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Stage; 8] = [
        Stage::Created,
        Stage::CompanySelected,
        Stage::Researching,
        Stage::Preprocessing,
        Stage::ReportGeneration,
        Stage::Validating,
        Stage::Completed,
        Stage::Error,
    ];

    #[test]
    fn test_happy_path_walks_every_stage_once() {
        let mut stage = Stage::Created;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            stage = stage.transition(next).unwrap();
            visited.push(stage);
        }
        assert_eq!(stage, Stage::Completed);
        assert_eq!(visited.len(), Stage::TOTAL as usize + 1);

        let ordinals: Vec<u32> = visited.iter().filter_map(|s| s.ordinal()).collect();
        assert!(ordinals.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn test_no_skips_or_backward_moves() {
        assert!(!Stage::Created.can_transition_to(Stage::Researching));
        assert!(!Stage::Preprocessing.can_transition_to(Stage::Researching));
        assert!(!Stage::Validating.can_transition_to(Stage::Validating));
        assert!(Stage::Researching.transition(Stage::Completed).is_err());
    }

    #[test]
    fn test_error_reachable_only_from_non_terminal() {
        for stage in ALL {
            assert_eq!(stage.can_transition_to(Stage::Error), !stage.is_terminal());
        }
    }

    #[test]
    fn test_terminal_stages_are_absorbing() {
        for to in ALL {
            assert!(!Stage::Completed.can_transition_to(to));
            assert!(!Stage::Error.can_transition_to(to));
        }
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&Stage::ReportGeneration).unwrap();
        assert_eq!(json, "\"report_generation\"");
    }
}
