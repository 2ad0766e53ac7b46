//! SWAG: local search by precedence-edge insertion.
//!
//! The solver starts from every job at its earliest start and repeatedly
//! serializes two overlapping jobs in the most expensive stretch of the
//! schedule. See [`SwagSolver`] for the loop and [`scorer`] for the
//! strategies that bias which pair is picked.

mod candidates;
pub mod scorer;
mod solver;
mod stats;
mod unstick;

pub use candidates::{Candidate, CandidateGenerator};
pub use scorer::{
    build_scorer, CombinedScorer, EdgeScorer, ElitePoolScorer, MatrixEdgeScorer, UniformScorer,
};
pub use solver::{SolverError, SwagSolver};
pub use stats::{Phase, ScoreSample, ScoreTrace, SolverStats, TimeBreakdown};
pub use unstick::{DeletionPlan, DeletionSearch};
