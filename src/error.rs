//! Error types for the timetable optimizer.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by input construction, configuration and the job surface.
///
/// Exhausting a generation/time/stagnation budget and user cancellation are
/// normal terminations and are not represented here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    /// Malformed or infeasible input, raised before any generation runs
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration failed validation after merging preset and overrides
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No job with this id is known to the manager
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Unexpected failure inside the optimizer
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
