//! Python bindings.
//!
//! Instances come in as flat lists so the Python side needs no wrapper
//! classes for jobs or resources.

use std::time::Duration;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{ScorerKind, SwagConfig};
use crate::problem::{Availability, Job, Polynomial, Precedence, Problem, Resource, Time};
use crate::skyline::SkylineKind;
use crate::swag::SwagSolver;

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Outcome of a solver run.
#[pyclass]
#[derive(Clone, Debug)]
pub struct SwagResult {
    #[pyo3(get)]
    pub start_times: Vec<Time>,
    #[pyo3(get)]
    pub peak_cost: f64,
    #[pyo3(get)]
    pub iterations: u64,
    #[pyo3(get)]
    pub insertions: u64,
    #[pyo3(get)]
    pub deletions: u64,
    #[pyo3(get)]
    pub resets: u64,
    /// `(seconds, iteration, best)` samples, empty unless requested.
    #[pyo3(get)]
    pub score_trace: Vec<(f64, u64, f64)>,
}

#[pymethods]
impl SwagResult {
    fn __repr__(&self) -> String {
        format!(
            "SwagResult(peak_cost={}, iterations={}, resets={})",
            self.peak_cost, self.iterations, self.resets
        )
    }
}

/// Resource given as `(availability, investment, overshoot)`: availability
/// is a list of `(time, amount)` steps, the polynomials are lists of
/// `(coefficient, exponent)` terms.
type PyResource = (Vec<(Time, f64)>, Vec<(f64, f64)>, Vec<(f64, f64)>);

/// Run the edge-insertion solver on one instance.
///
/// # Arguments
/// * `jobs` - `(duration, release, deadline, demand per resource)` per job
/// * `resources` - resource descriptions, see `PyResource`
/// * `precedences` - `(source, target, lag)` start-to-start constraints
/// * `time_limit` - wall-clock budget in seconds
///
/// # Raises
/// * ValueError if the instance or the configuration is rejected
#[pyfunction]
#[pyo3(signature = (
    jobs,
    resources,
    precedences,
    time_limit,
    iteration_limit=None,
    seed=42,
    verbosity=0,
    scorer="none",
    skyline="auto",
    edge_candidate_batch_size=0,
    randomize_edge_candidates=false,
    deletion_max_depth=6,
    deletion_trials=30,
    deletions_before_reset=30,
    complete_propagation_after=50,
    range_check_interval=0,
    intermediate_score_interval=None,
    max_array_horizon=None,
))]
#[allow(clippy::too_many_arguments)]
fn run_swag(
    py: Python<'_>,
    jobs: Vec<(Time, Time, Time, Vec<f64>)>,
    resources: Vec<PyResource>,
    precedences: Vec<(usize, usize, Time)>,
    time_limit: f64,
    iteration_limit: Option<u64>,
    seed: u64,
    verbosity: u8,
    scorer: &str,
    skyline: &str,
    edge_candidate_batch_size: usize,
    randomize_edge_candidates: bool,
    deletion_max_depth: usize,
    deletion_trials: usize,
    deletions_before_reset: usize,
    complete_propagation_after: u64,
    range_check_interval: u64,
    intermediate_score_interval: Option<f64>,
    max_array_horizon: Option<Time>,
) -> PyResult<SwagResult> {
    let time_limit = Duration::try_from_secs_f64(time_limit).map_err(value_error)?;
    let mut config = SwagConfig::default()
        .with_time_limit(time_limit)
        .with_seed(seed)
        .with_verbosity(verbosity)
        .with_scorer(scorer.parse::<ScorerKind>().map_err(value_error)?)
        .with_skyline(skyline.parse::<SkylineKind>().map_err(value_error)?)
        .with_batch_size(edge_candidate_batch_size);
    config.iteration_limit = iteration_limit;
    config.randomize_edge_candidates = randomize_edge_candidates;
    config.deletion_max_depth = deletion_max_depth;
    config.deletion_trials = deletion_trials;
    config.deletions_before_reset = deletions_before_reset;
    config.complete_propagation_after = complete_propagation_after;
    config.range_check_interval = range_check_interval;
    config.intermediate_score_interval = intermediate_score_interval
        .map(Duration::try_from_secs_f64)
        .transpose()
        .map_err(value_error)?;
    if let Some(limit) = max_array_horizon {
        config.max_array_horizon = limit;
    }

    let jobs = jobs
        .into_iter()
        .map(|(d, r, dl, demand)| Job::new(d, r, dl, demand))
        .collect();
    let resources = resources
        .into_iter()
        .map(|(availability, investment, overshoot)| {
            Resource::new(
                Availability::new(availability),
                Polynomial::new(investment),
                Polynomial::new(overshoot),
            )
        })
        .collect();
    let precedences = precedences
        .into_iter()
        .map(|(s, t, lag)| Precedence::new(s, t, lag))
        .collect();
    let problem = Problem::new(jobs, resources, precedences).map_err(value_error)?;

    py.allow_threads(|| {
        let mut solver = SwagSolver::new(&problem, config).map_err(value_error)?;
        let best = solver.run().clone();
        let stats = solver.stats().clone();
        let start_times = best
            .start_times
            .iter()
            .enumerate()
            .map(|(job, start)| start.unwrap_or(problem.base_earliest_start()[job]))
            .collect();
        Ok(SwagResult {
            start_times,
            peak_cost: best.peak_cost,
            iterations: stats.iterations,
            insertions: stats.insertions,
            deletions: stats.deletions,
            resets: stats.resets,
            score_trace: solver
                .score_trace()
                .iter()
                .map(|s| (s.elapsed.as_secs_f64(), s.iteration, s.best))
                .collect(),
        })
    })
}

/// The tcpsp_swag Python module.
#[pymodule]
fn tcpsp_swag(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<SwagResult>()?;
    m.add_function(wrap_pyfunction!(run_swag, m)?)?;
    Ok(())
}
