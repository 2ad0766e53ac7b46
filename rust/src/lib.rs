//! Edge-insertion local search for resource-investment scheduling.
//!
//! Jobs with fixed durations run inside release/deadline windows and are
//! linked by start-to-start precedences. The solver lowers the peak
//! instantaneous resource cost of the schedule by inserting precedence edges
//! between overlapping jobs, deleting edges when it gets stuck, and starting
//! over from the permanent graph when deletions stop helping.

// Allow clippy warning triggered by PyO3 macro expansion
#![cfg_attr(feature = "python", allow(clippy::useless_conversion))]

pub mod config;
pub mod graph;
pub mod logging;
pub mod problem;
pub mod propagation;
pub mod skyline;
pub mod swag;

#[cfg(feature = "python")]
mod python;

pub use config::{ConfigError, ElitePoolConfig, MatrixScorerConfig, ScorerKind, SwagConfig};
pub use graph::{EdgeRef, GraphError, PrecedenceGraph};
pub use problem::{
    Availability, Job, JobId, Polynomial, Precedence, Problem, ProblemError, Resource,
    ScheduleCost, ScheduleViolation, Solution, Time,
};
pub use propagation::{PropagationError, TimeBounds};
pub use skyline::{Peak, Skyline, SkylineError, SkylineKind, TimeRange};
pub use swag::{SolverError, SolverStats, SwagSolver, TimeBreakdown};
