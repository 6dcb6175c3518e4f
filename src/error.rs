//! Error type shared by all planner operations.

use h3o::CellIndex;

/// Error type for planner operation failures.
#[derive(Debug)]
pub enum PlanError {
    /// A model parameter failed validation (non-positive mast height or frequency).
    InvalidParameter(String),
    /// A clearance computation touched a cell with no elevation sample.
    MissingElevation(CellIndex),
    /// A referenced cell is not part of the planning surface.
    UnknownCell(CellIndex),
    /// The greedy selector found no eligible candidate with positive gain.
    CandidatesExhausted,
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            PlanError::MissingElevation(cell) => write!(f, "Missing elevation sample for cell {}", cell),
            PlanError::UnknownCell(cell) => write!(f, "Cell {} is not part of the planning surface", cell),
            PlanError::CandidatesExhausted => write!(f, "No eligible placement candidate with positive gain remains"),
        }
    }
}

impl std::error::Error for PlanError {}
