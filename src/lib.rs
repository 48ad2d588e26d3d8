//! Island-model genetic optimizer for university lecture timetables.
//!
//! Build an [`InputModel`](algorithms::input::InputModel) from an entity
//! snapshot, then either drive [`GeneticOptimizer`] directly or run it as a
//! cancellable background job through [`JobManager`].

pub mod algorithms;
pub mod error;

pub use algorithms::config::{ConfigOverrides, ConfigRequest, Preset, SchedulerConfig};
pub use algorithms::input::InputModel;
pub use algorithms::jobs::{
    CancelAck, InMemorySnapshots, JobId, JobManager, JobStatus, JobView, ScopeId, SnapshotProvider,
};
pub use algorithms::models::{InputSnapshot, ScheduleResult};
pub use algorithms::optimizer::{GeneticOptimizer, ProgressReporter, RunOutcome};
pub use error::{Result, SchedulerError};
