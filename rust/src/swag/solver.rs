//! The edge-insertion search loop.
//!
//! Each iteration inserts one precedence edge between two jobs that overlap
//! inside the active range, the stretch where the skyline currently peaks.
//! When no candidate fits, edges are deleted to make room for one; when that
//! fails too, the graph goes back to its permanent edges and the search
//! starts over. The best schedule seen is kept throughout.

use std::cmp::Reverse;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashSet;
use thiserror::Error;

use super::candidates::{fits_after, overlaps, Candidate, CandidateGenerator};
use super::scorer::{build_scorer, EdgeScorer};
use super::stats::{Phase, PhaseTimer, ScoreSample, ScoreTrace, SolverStats, TimeBreakdown};
use super::unstick::DeletionSearch;
use crate::config::{ConfigError, SwagConfig};
use crate::graph::{EdgeRef, GraphError, PrecedenceGraph};
use crate::problem::{JobId, Problem, ScheduleViolation, Solution, Time};
use crate::propagation::{PropagationError, TimeBounds};
use crate::skyline::{Skyline, SkylineError, TimeRange, EPSILON};
use crate::{log_changes, log_checks, log_debug};

/// Iterations between progress lines.
const PROGRESS_EVERY: u64 = 10_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Skyline(#[from] SkylineError),

    #[error("precedence {from} -> {to} has lag {lag}, shorter than the duration {duration} of job {from}")]
    UnsupportedPrecedence {
        from: JobId,
        to: JobId,
        lag: Time,
        duration: Time,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Propagation(#[from] PropagationError),

    #[error(transparent)]
    Schedule(#[from] ScheduleViolation),
}

pub struct SwagSolver<'a> {
    problem: &'a Problem,
    config: SwagConfig,
    time_limit: Duration,
    rng: ChaCha8Rng,

    base_graph: PrecedenceGraph,
    graph: PrecedenceGraph,
    bounds: TimeBounds,
    skyline: Skyline,
    scorer: Box<dyn EdgeScorer>,
    candidates: CandidateGenerator,
    deletion: DeletionSearch,
    active_range: TimeRange,

    // scratch
    changed: Vec<JobId>,
    moved: FxHashSet<JobId>,
    by_start: Vec<JobId>,
    by_finish: Vec<JobId>,

    deletions_remaining: usize,
    last_complete_push: u64,
    last_range_check: u64,
    /// A fresh start from the base graph found nothing to insert.
    exhausted: bool,

    best: Solution,
    stats: SolverStats,
    times: TimeBreakdown,
    trace: ScoreTrace,
}

impl<'a> SwagSolver<'a> {
    pub fn new(problem: &'a Problem, config: SwagConfig) -> Result<Self, SolverError> {
        config.validate()?;
        let time_limit = config.time_limit.ok_or(ConfigError::MissingTimeLimit)?;

        if let Some(p) = problem
            .precedences()
            .iter()
            .find(|p| p.lag < problem.job(p.source).duration)
        {
            return Err(SolverError::UnsupportedPrecedence {
                from: p.source,
                to: p.target,
                lag: p.lag,
                duration: problem.job(p.source).duration,
            });
        }

        let base_graph = PrecedenceGraph::from_problem(problem);
        let bounds = TimeBounds::new(problem);
        let mut skyline =
            Skyline::with_array_limit(problem, config.skyline, config.max_array_horizon)?;
        for (job, &start) in bounds.earliest_start().iter().enumerate() {
            skyline.insert(job, start);
        }
        let active_range = skyline.maximum_range();
        let best = Solution::from_start_times(bounds.earliest_start(), skyline.maximum());
        let n = problem.num_jobs();

        Ok(Self {
            problem,
            time_limit,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            graph: base_graph.clone(),
            base_graph,
            bounds,
            skyline,
            scorer: build_scorer(&config, problem),
            candidates: CandidateGenerator::new(),
            deletion: DeletionSearch::new(
                n,
                config.deletion_max_depth,
                config.deletion_undermove_penalty,
            ),
            active_range,
            changed: Vec::new(),
            moved: FxHashSet::default(),
            by_start: Vec::with_capacity(n),
            by_finish: Vec::with_capacity(n),
            deletions_remaining: config.deletions_before_reset,
            last_complete_push: 0,
            last_range_check: 0,
            exhausted: false,
            best,
            stats: SolverStats::default(),
            times: TimeBreakdown::default(),
            trace: ScoreTrace::new(config.intermediate_score_interval),
            config,
        })
    }

    /// Search until the time or iteration limit and return the best schedule.
    ///
    /// Stops earlier when the best peak reaches zero, or when a reset to the
    /// permanent graph leaves no candidate edge at all.
    pub fn run(&mut self) -> &Solution {
        let started = Instant::now();
        let verbosity = self.config.verbosity;
        log_checks!(
            verbosity,
            "swag: {} jobs, {} skyline, {:?} scorer, base peak {:.3}",
            self.problem.num_jobs(),
            self.skyline.kind_name(),
            self.config.scorer,
            self.best.peak_cost
        );

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.time_limit {
                break;
            }
            if self
                .config
                .iteration_limit
                .is_some_and(|limit| self.stats.iterations >= limit)
            {
                break;
            }
            if self.exhausted || self.best.peak_cost <= EPSILON {
                break;
            }
            self.trace
                .observe(elapsed, self.stats.iterations, self.best.peak_cost);
            self.iteration();
        }

        self.update_best();
        log_changes!(
            verbosity,
            "swag done after {} iterations in {:.2?}: best peak {:.3} ({} insertions, {} deletions, {} resets)",
            self.stats.iterations,
            started.elapsed(),
            self.best.peak_cost,
            self.stats.insertions,
            self.stats.deletions,
            self.stats.resets
        );
        &self.best
    }

    fn iteration(&mut self) {
        self.stats.iterations += 1;
        let iteration = self.stats.iterations;
        self.scorer.on_iteration(iteration);

        if iteration % PROGRESS_EVERY == 0 {
            log_changes!(
                self.config.verbosity,
                "iteration {}: best peak {:.3}, {} deletions, {} resets",
                iteration,
                self.best.peak_cost,
                self.stats.deletions,
                self.stats.resets
            );
        }

        let force_complete =
            iteration - self.last_complete_push >= self.config.complete_propagation_after;
        if force_complete {
            self.propagate(true, false);
        }

        let mut range_changed = false;
        if iteration - self.last_range_check >= self.config.range_check_interval {
            self.last_range_check = iteration;
            let peak = self.skyline.maximum_range();
            if peak != self.active_range {
                log_checks!(
                    self.config.verbosity,
                    "active range {} -> {}",
                    self.active_range,
                    peak
                );
                range_changed = true;
                self.candidates.clear();
                self.active_range = peak;
                self.propagate(false, true);
            }
        }

        if self.candidates.is_empty() {
            if range_changed || iteration == 1 {
                self.regenerate_candidates();
                if self.candidates.is_empty() {
                    self.unstick();
                }
            } else if self.config.edge_candidate_batch_size > 0 {
                self.next_batch();
                if self.candidates.is_empty() {
                    self.unstick();
                }
            } else {
                self.unstick();
            }
        }

        let weighted = !self.scorer.is_uniform();
        let timer = PhaseTimer::start(self.config.disaggregate_time);
        let mut inserted = false;
        while !inserted {
            let Some(candidate) = self.candidates.draw(weighted, &mut self.rng) else {
                break;
            };
            inserted = self.try_insert(candidate, force_complete);
        }
        timer.stop(&mut self.times, Phase::Selection);

        if force_complete {
            self.last_complete_push = iteration;
        }
    }

    /// Insert `candidate` if it is still admissible.
    fn try_insert(&mut self, candidate: Candidate, force_complete: bool) -> bool {
        let (s, t) = (candidate.source, candidate.target);
        let b = &self.bounds;
        let admissible = overlaps(b, s, t)
            && b.intersects(s, self.active_range)
            && b.intersects(t, self.active_range)
            && fits_after(b, s, t);
        if !admissible {
            return false;
        }
        debug_assert!(!self.graph.reaches(t, s), "edge {s} -> {t} would close a cycle");
        self.insert_edge(s, t, force_complete);
        true
    }

    fn insert_edge(&mut self, s: JobId, t: JobId, force_complete: bool) {
        self.stats.insertions += 1;
        log_debug!(
            self.config.verbosity,
            "insert {} -> {} (ES {} / {}, LF {})",
            s,
            t,
            self.bounds.es(s),
            self.bounds.es(t),
            self.bounds.lf(t)
        );

        let timer = PhaseTimer::start(self.config.disaggregate_time);
        self.graph.insert_edge(s, t, self.bounds.duration(s), false);
        self.changed.clear();
        self.bounds.push_earliest_forward(
            &self.graph,
            &[s],
            force_complete,
            false,
            self.active_range,
            &mut self.changed,
        );
        self.bounds
            .push_latest_backward(&self.graph, &[t], force_complete, false, self.active_range);
        timer.stop(&mut self.times, Phase::Propagation);
        self.sync_skyline();
    }

    /// Drain deferred propagation work and move changed jobs in the skyline.
    fn propagate(&mut self, force_complete: bool, range_changed: bool) {
        let timer = PhaseTimer::start(self.config.disaggregate_time);
        self.changed.clear();
        self.bounds.push_latest_backward(
            &self.graph,
            &[],
            force_complete,
            range_changed,
            self.active_range,
        );
        self.bounds.push_earliest_forward(
            &self.graph,
            &[],
            force_complete,
            range_changed,
            self.active_range,
            &mut self.changed,
        );
        timer.stop(&mut self.times, Phase::Propagation);
        self.sync_skyline();
    }

    fn sync_skyline(&mut self) {
        let timer = PhaseTimer::start(self.config.disaggregate_time);
        self.moved.clear();
        for &job in &self.changed {
            if self.moved.insert(job) {
                self.skyline.reposition(job, self.bounds.es(job));
            }
        }
        timer.stop(&mut self.times, Phase::Skyline);
    }

    fn regenerate_candidates(&mut self) {
        let timer = PhaseTimer::start(self.config.disaggregate_time);
        self.candidates
            .collect_jobs(&self.bounds, self.active_range);
        if self.config.edge_candidate_batch_size == 0 {
            self.candidates
                .build_full(&self.bounds, self.scorer.as_mut());
        } else {
            self.next_batch();
        }
        timer.stop(&mut self.times, Phase::Selection);
        log_checks!(
            self.config.verbosity,
            "{} candidate edges among {} jobs in {}",
            self.candidates.len(),
            self.candidates.jobs().len(),
            self.active_range
        );
    }

    fn next_batch(&mut self) {
        self.candidates.build_batch(
            &self.bounds,
            self.scorer.as_mut(),
            self.config.edge_candidate_batch_size,
            self.config.randomize_edge_candidates,
            &mut self.rng,
        );
    }

    /// Find something to insert when the pool ran dry: a moved peak, a
    /// deletion set, or a fresh start.
    fn unstick(&mut self) {
        let timer = PhaseTimer::start(self.config.disaggregate_time);
        self.stats.unstick_calls += 1;
        self.propagate(true, false);

        let peak = self.skyline.maximum_range();
        if peak != self.active_range {
            self.active_range = peak;
            self.regenerate_candidates();
            if !self.candidates.is_empty() {
                timer.stop(&mut self.times, Phase::Unstick);
                return;
            }
        }

        self.update_best();

        let mut needs_reset = true;
        if self.deletions_remaining > 0 {
            self.deletions_remaining -= 1;
            self.create_new_candidate_edges();
            needs_reset = self.candidates.is_empty();
        }
        if needs_reset {
            self.reset();
            self.regenerate_candidates();
            self.deletions_remaining = self.config.deletions_before_reset;
            if self.candidates.is_empty() {
                log_changes!(
                    self.config.verbosity,
                    "no candidate edge in the base schedule; stopping"
                );
                self.exhausted = true;
            }
        }
        timer.stop(&mut self.times, Phase::Unstick);
    }

    /// Delete edges so that one overlapping pair of the active range can be
    /// serialized, and queue that pair as the only candidate.
    fn create_new_candidate_edges(&mut self) {
        self.candidates
            .collect_jobs(&self.bounds, self.active_range);
        let bounds = &self.bounds;
        self.by_finish.clear();
        self.by_finish.extend_from_slice(self.candidates.jobs());
        self.by_finish
            .sort_unstable_by_key(|&j| (bounds.ef(j), j));
        self.by_start.clear();
        self.by_start.extend_from_slice(self.candidates.jobs());
        self.by_start
            .sort_unstable_by_key(|&j| (Reverse(bounds.es(j)), j));

        let n = self.by_start.len();
        for trial in 0..self.config.deletion_trials {
            if trial / 2 + trial % 2 >= n {
                break;
            }
            let s = self.by_finish[trial / 2];
            let t = self.by_start[trial / 2 + trial % 2];
            if s == t || !overlaps(&self.bounds, s, t) {
                continue;
            }
            let base_es = self.bounds.base_earliest_start()[s];
            let base_lf = self.bounds.base_latest_finish()[t];
            if base_es + self.bounds.duration(s) + self.bounds.duration(t) > base_lf {
                continue;
            }

            let overlap = self.bounds.ef(s) - self.bounds.es(t);
            let wanted_back = (overlap / 2).min(self.bounds.es(s) - base_es);
            let back = self
                .deletion
                .backward(&mut self.graph, &self.bounds, s, wanted_back);
            let wanted_forward = (overlap - back.achieved).max(0);
            let Some(forward) =
                self.deletion
                    .forward(&mut self.graph, &self.bounds, t, wanted_forward)
            else {
                continue;
            };

            let mut edges = back.edges;
            edges.extend(forward.edges);
            if edges.is_empty() && !fits_after(&self.bounds, s, t) {
                continue;
            }
            log_debug!(
                self.config.verbosity,
                "unstick {} -> {}: deleting {} edges (backward {}, forward {})",
                s,
                t,
                edges.len(),
                back.achieved,
                forward.achieved
            );
            self.commit_deletions(&edges);
            self.candidates.clear();
            self.candidates.push(Candidate::new(s, t, 1.0));
            return;
        }
        self.candidates.clear();
    }

    fn commit_deletions(&mut self, edges: &[EdgeRef]) {
        self.stats.deletions += 1;
        let mut es_seeds = Vec::with_capacity(edges.len());
        let mut lf_seeds = Vec::with_capacity(edges.len());
        for &e in edges {
            es_seeds.push(self.graph.edge(e).target);
            lf_seeds.push(e.source);
        }
        self.graph.bulk_delete(edges);

        let timer = PhaseTimer::start(self.config.disaggregate_time);
        self.changed.clear();
        self.bounds
            .rebuild_earliest_forward(&self.graph, &es_seeds, &mut self.changed);
        self.bounds.rebuild_latest_backward(&self.graph, &lf_seeds);
        timer.stop(&mut self.times, Phase::Propagation);
        self.sync_skyline();
    }

    /// Back to the permanent graph. The abandoned schedule is offered to the
    /// best-known solution and the scorer first.
    fn reset(&mut self) {
        self.update_best();
        let timer = PhaseTimer::start(self.config.disaggregate_time);
        self.stats.resets += 1;
        let quality = self.skyline.maximum();
        self.scorer
            .incorporate_result(quality, self.bounds.earliest_start(), &self.graph);

        self.graph.restore(&self.base_graph);
        self.bounds.reset();
        for job in 0..self.bounds.num_jobs() {
            self.skyline.reposition(job, self.bounds.es(job));
        }
        self.active_range = self.skyline.maximum_range();
        self.candidates.clear();
        timer.stop(&mut self.times, Phase::Reset);
        log_checks!(
            self.config.verbosity,
            "reset {}: abandoned peak {:.3}, best {:.3}",
            self.stats.resets,
            quality,
            self.best.peak_cost
        );
    }

    fn update_best(&mut self) {
        if self.bounds.has_deferred() {
            self.propagate(true, false);
        }
        let cost = self.skyline.maximum();
        if cost < self.best.peak_cost {
            self.best = Solution::from_start_times(self.bounds.earliest_start(), cost);
            self.stats.improvements += 1;
            log_changes!(
                self.config.verbosity,
                "new best peak {:.3} at iteration {}",
                cost,
                self.stats.iterations
            );
        }
    }

    pub fn solution(&self) -> &Solution {
        &self.best
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    pub fn time_breakdown(&self) -> &TimeBreakdown {
        &self.times
    }

    pub fn score_trace(&self) -> &[ScoreSample] {
        self.trace.samples()
    }

    pub fn graph(&self) -> &PrecedenceGraph {
        &self.graph
    }

    pub fn bounds(&self) -> &TimeBounds {
        &self.bounds
    }

    pub fn active_range(&self) -> TimeRange {
        self.active_range
    }

    /// Complete the propagation, then check the graph, the bounds and the
    /// best schedule.
    pub fn verify(&mut self) -> Result<(), SolverError> {
        self.propagate(true, false);
        self.graph.check()?;
        self.bounds.verify(&self.graph)?;
        self.problem.check_feasible(&self.best)?;
        Ok(())
    }
}
