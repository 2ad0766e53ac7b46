//! Configuration types for the edge-insertion solver.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::problem::Time;
use crate::skyline::{SkylineKind, DEFAULT_MAX_ARRAY_HORIZON};

/// Rejected configuration values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("a time limit is required")]
    MissingTimeLimit,

    #[error("unknown scorer {0:?} (expected none, matrix, elite_pool or combined)")]
    UnknownScorer(String),

    #[error("unknown skyline {0:?} (expected auto, tree or array)")]
    UnknownSkyline(String),

    #[error("{name} must be positive")]
    NotPositive { name: &'static str },

    #[error("{name} = {value} is outside {range}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        range: &'static str,
    },
}

/// How candidate edges are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScorerKind {
    /// Every candidate is equally likely.
    #[default]
    Uniform,
    /// Reinforcement matrix over edges of past rounds.
    Matrix,
    /// Ordering frequency within an elite pool of schedules.
    ElitePool,
    /// Sum of the matrix and elite-pool scores.
    Combined,
}

impl FromStr for ScorerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "uniform" => Ok(Self::Uniform),
            "matrix" => Ok(Self::Matrix),
            "elite_pool" | "elite" => Ok(Self::ElitePool),
            "combined" => Ok(Self::Combined),
            other => Err(ConfigError::UnknownScorer(other.to_string())),
        }
    }
}

impl FromStr for SkylineKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "tree" => Ok(Self::Tree),
            "array" => Ok(Self::Array),
            other => Err(ConfigError::UnknownSkyline(other.to_string())),
        }
    }
}

/// Parameters of the matrix edge scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixScorerConfig {
    /// Number of recent round qualities kept for comparison.
    pub window: usize,
    /// Share of the window a round must beat to earn any reinforcement.
    pub fraction_threshold: f64,
    /// Iterations between matrix flips; 0 disables aging.
    pub aging_interval: u64,
}

impl Default for MatrixScorerConfig {
    fn default() -> Self {
        Self {
            window: 10,
            fraction_threshold: 0.5,
            aging_interval: 0,
        }
    }
}

/// Parameters of the elite-pool edge scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ElitePoolConfig {
    pub pool_size: usize,
    /// Scoring starts once `start_factor * pool_size` rounds were seen.
    pub start_factor: f64,
    pub sigmoid_base: f64,
    pub sigmoid_coefficient: f64,
}

impl Default for ElitePoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 50,
            start_factor: 1.5,
            sigmoid_base: std::f64::consts::E,
            sigmoid_coefficient: 2.0,
        }
    }
}

/// Configuration for one solver run.
#[derive(Debug, Clone, PartialEq)]
pub struct SwagConfig {
    /// Wall-clock budget; required.
    pub time_limit: Option<Duration>,
    /// Optional cap on iterations, checked alongside the time limit.
    pub iteration_limit: Option<u64>,
    pub seed: u64,
    /// 0 silent .. 3 debug, see [`crate::logging`].
    pub verbosity: u8,
    /// BFS depth bound of the deletion search.
    pub deletion_max_depth: usize,
    /// Job pairs tried per unstick attempt.
    pub deletion_trials: usize,
    /// Unstick attempts between resets.
    pub deletions_before_reset: usize,
    /// Iterations between forced complete propagations.
    pub complete_propagation_after: u64,
    /// Iterations between peak-range checks; 0 checks every iteration.
    pub range_check_interval: u64,
    /// Candidates per batched scan; 0 uses the full sweep.
    pub edge_candidate_batch_size: usize,
    /// Shuffle candidate jobs before the first batch of a scan.
    pub randomize_edge_candidates: bool,
    /// Score penalty per time step the backward search falls short.
    pub deletion_undermove_penalty: u32,
    /// Measure time spent per solver phase.
    pub disaggregate_time: bool,
    /// Record the best score at this interval; `None` disables the trace.
    pub intermediate_score_interval: Option<Duration>,
    pub skyline: SkylineKind,
    /// Longest horizon the dense skyline may allocate for.
    pub max_array_horizon: Time,
    pub scorer: ScorerKind,
    pub matrix: MatrixScorerConfig,
    pub elite_pool: ElitePoolConfig,
}

impl Default for SwagConfig {
    fn default() -> Self {
        Self {
            time_limit: None,
            iteration_limit: None,
            seed: 42,
            verbosity: 0,
            deletion_max_depth: 6,
            deletion_trials: 30,
            deletions_before_reset: 30,
            complete_propagation_after: 50,
            range_check_interval: 0,
            edge_candidate_batch_size: 0,
            randomize_edge_candidates: false,
            deletion_undermove_penalty: 3,
            disaggregate_time: false,
            intermediate_score_interval: None,
            skyline: SkylineKind::Auto,
            max_array_horizon: DEFAULT_MAX_ARRAY_HORIZON,
            scorer: ScorerKind::Uniform,
            matrix: MatrixScorerConfig::default(),
            elite_pool: ElitePoolConfig::default(),
        }
    }
}

impl SwagConfig {
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn with_iteration_limit(mut self, limit: u64) -> Self {
        self.iteration_limit = Some(limit);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_scorer(mut self, scorer: ScorerKind) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_skyline(mut self, skyline: SkylineKind) -> Self {
        self.skyline = skyline;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.edge_candidate_batch_size = batch_size;
        self
    }

    /// Check everything that can be checked without a problem instance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.time_limit {
            None => return Err(ConfigError::MissingTimeLimit),
            Some(limit) if limit.is_zero() => {
                return Err(ConfigError::NotPositive { name: "time_limit" })
            }
            _ => {}
        }
        if self.max_array_horizon <= 0 {
            return Err(ConfigError::NotPositive {
                name: "max_array_horizon",
            });
        }
        if self.matrix.window == 0 {
            return Err(ConfigError::NotPositive {
                name: "matrix.window",
            });
        }
        let threshold = self.matrix.fraction_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "matrix.fraction_threshold",
                value: threshold,
                range: "(0, 1]",
            });
        }
        if self.elite_pool.pool_size == 0 {
            return Err(ConfigError::NotPositive {
                name: "elite_pool.pool_size",
            });
        }
        if !(self.elite_pool.start_factor >= 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "elite_pool.start_factor",
                value: self.elite_pool.start_factor,
                range: "[1, inf)",
            });
        }
        if !(self.elite_pool.sigmoid_base > 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "elite_pool.sigmoid_base",
                value: self.elite_pool.sigmoid_base,
                range: "(1, inf)",
            });
        }
        if !(self.elite_pool.sigmoid_coefficient > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "elite_pool.sigmoid_coefficient",
            });
        }
        if self.intermediate_score_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::NotPositive {
                name: "intermediate_score_interval",
            });
        }
        Ok(())
    }
}
