//! Incremental earliest-start / latest-finish propagation.
//!
//! Bounds follow start-to-start lags:
//! `ES[t] >= ES[s] + lag` and `LF[s] <= LF[t] - d[t] - lag + d[s]`.
//! Insertions only tighten bounds and use the `push_*` passes; deletions can
//! relax them and use the `rebuild_*` passes, which recompute a vertex from
//! all of its remaining edges.
//!
//! Outside the active range the push passes are lazy: a vertex whose bound
//! already lay beyond the range before the update gets its new value, but its
//! neighbours are only visited once the vertex is drained from the deferred
//! buffer (a forced pass, or a range move that brings it or one of its
//! direct neighbours into range). Only direct neighbours of a deferred
//! vertex can be stale relative to it.

use thiserror::Error;

use crate::graph::PrecedenceGraph;
use crate::problem::{JobId, Problem, Time};
use crate::skyline::TimeRange;

/// A stored bound that disagrees with a full recomputation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropagationError {
    #[error("job {job}: earliest start {stored} but edges imply {expected}")]
    EarliestStart {
        job: JobId,
        stored: Time,
        expected: Time,
    },

    #[error("job {job}: latest finish {stored} but edges imply {expected}")]
    LatestFinish {
        job: JobId,
        stored: Time,
        expected: Time,
    },

    #[error("job {job}: window [{earliest_start}, {latest_finish}) cannot hold duration {duration}")]
    Infeasible {
        job: JobId,
        earliest_start: Time,
        latest_finish: Time,
        duration: Time,
    },
}

#[derive(Debug, Clone)]
pub struct TimeBounds {
    durations: Vec<Time>,
    releases: Vec<Time>,
    deadlines: Vec<Time>,
    base_earliest_start: Vec<Time>,
    base_latest_finish: Vec<Time>,
    earliest_start: Vec<Time>,
    latest_finish: Vec<Time>,
    queue: Vec<JobId>,
    deferred_forward: Vec<JobId>,
    deferred_backward: Vec<JobId>,
}

impl TimeBounds {
    /// Bounds of the permanent graph of `problem`.
    pub fn new(problem: &Problem) -> Self {
        Self {
            durations: problem.durations(),
            releases: problem.jobs().iter().map(|j| j.release).collect(),
            deadlines: problem.jobs().iter().map(|j| j.deadline).collect(),
            base_earliest_start: problem.base_earliest_start().to_vec(),
            base_latest_finish: problem.base_latest_finish().to_vec(),
            earliest_start: problem.base_earliest_start().to_vec(),
            latest_finish: problem.base_latest_finish().to_vec(),
            queue: Vec::new(),
            deferred_forward: Vec::new(),
            deferred_backward: Vec::new(),
        }
    }

    pub fn num_jobs(&self) -> usize {
        self.durations.len()
    }

    pub fn earliest_start(&self) -> &[Time] {
        &self.earliest_start
    }

    pub fn latest_finish(&self) -> &[Time] {
        &self.latest_finish
    }

    pub fn base_earliest_start(&self) -> &[Time] {
        &self.base_earliest_start
    }

    pub fn base_latest_finish(&self) -> &[Time] {
        &self.base_latest_finish
    }

    pub fn es(&self, job: JobId) -> Time {
        self.earliest_start[job]
    }

    pub fn lf(&self, job: JobId) -> Time {
        self.latest_finish[job]
    }

    pub fn duration(&self, job: JobId) -> Time {
        self.durations[job]
    }

    pub fn durations(&self) -> &[Time] {
        &self.durations
    }

    /// Earliest finish.
    pub fn ef(&self, job: JobId) -> Time {
        self.earliest_start[job] + self.durations[job]
    }

    /// Whether the job's earliest placement intersects `range`.
    pub fn intersects(&self, job: JobId, range: TimeRange) -> bool {
        self.earliest_start[job] < range.hi && self.ef(job) > range.lo
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred_forward.is_empty() || !self.deferred_backward.is_empty()
    }

    /// Back to base bounds with nothing deferred.
    pub fn reset(&mut self) {
        self.earliest_start.copy_from_slice(&self.base_earliest_start);
        self.latest_finish.copy_from_slice(&self.base_latest_finish);
        self.queue.clear();
        self.deferred_forward.clear();
        self.deferred_backward.clear();
    }

    /// Raise earliest starts reachable from `seeds`.
    ///
    /// Every job whose earliest start changes is appended to `changed`.
    pub fn push_earliest_forward(
        &mut self,
        graph: &PrecedenceGraph,
        seeds: &[JobId],
        force_complete: bool,
        range_changed: bool,
        range: TimeRange,
        changed: &mut Vec<JobId>,
    ) {
        self.queue.clear();
        if force_complete {
            self.queue.append(&mut self.deferred_forward);
        } else if range_changed {
            let es = &self.earliest_start;
            let queue = &mut self.queue;
            self.deferred_forward.retain(|&v| {
                let touches_range = es[v] < range.hi
                    || graph.successors(v).iter().any(|e| es[e.target] < range.hi);
                if touches_range {
                    queue.push(v);
                    false
                } else {
                    true
                }
            });
        }
        self.queue.extend_from_slice(seeds);

        while let Some(v) = self.queue.pop() {
            let start = self.earliest_start[v];
            for e in graph.successors(v) {
                let t = e.target;
                let candidate = start + e.lag;
                if candidate <= self.earliest_start[t] {
                    continue;
                }
                let can_defer = !force_complete && self.earliest_start[t] >= range.hi;
                self.earliest_start[t] = candidate;
                debug_assert!(
                    candidate + self.durations[t] <= self.deadlines[t],
                    "job {t} pushed past its deadline"
                );
                changed.push(t);
                if can_defer {
                    self.deferred_forward.push(t);
                } else {
                    self.queue.push(t);
                }
            }
        }
    }

    /// Lower latest finishes reachable backwards from `seeds`.
    pub fn push_latest_backward(
        &mut self,
        graph: &PrecedenceGraph,
        seeds: &[JobId],
        force_complete: bool,
        range_changed: bool,
        range: TimeRange,
    ) {
        self.queue.clear();
        if force_complete {
            self.queue.append(&mut self.deferred_backward);
        } else if range_changed {
            let lf = &self.latest_finish;
            let queue = &mut self.queue;
            self.deferred_backward.retain(|&v| {
                let touches_range = lf[v] > range.lo
                    || graph.predecessors(v).iter().any(|r| lf[r.source] > range.lo);
                if touches_range {
                    queue.push(v);
                    false
                } else {
                    true
                }
            });
        }
        self.queue.extend_from_slice(seeds);

        while let Some(v) = self.queue.pop() {
            let latest_start = self.latest_finish[v] - self.durations[v];
            for rev in graph.predecessors(v) {
                let s = rev.source;
                let lag = graph.successors(s)[rev.forward_index].lag;
                let candidate = latest_start - lag + self.durations[s];
                if candidate >= self.latest_finish[s] {
                    continue;
                }
                let can_defer = !force_complete && self.latest_finish[s] <= range.lo;
                self.latest_finish[s] = candidate;
                debug_assert!(
                    candidate - self.durations[s] >= self.releases[s],
                    "job {s} pulled before its release"
                );
                if can_defer {
                    self.deferred_backward.push(s);
                } else {
                    self.queue.push(s);
                }
            }
        }
    }

    /// Recompute earliest starts from `seeds` after edges were removed.
    ///
    /// Values only decrease here; jobs whose value changed are appended to
    /// `changed`.
    pub fn rebuild_earliest_forward(
        &mut self,
        graph: &PrecedenceGraph,
        seeds: &[JobId],
        changed: &mut Vec<JobId>,
    ) {
        self.queue.clear();
        self.queue.extend_from_slice(seeds);
        while let Some(v) = self.queue.pop() {
            let recomputed = self.required_earliest_start(graph, v);
            if recomputed < self.earliest_start[v] {
                self.earliest_start[v] = recomputed;
                changed.push(v);
                self.queue
                    .extend(graph.successors(v).iter().map(|e| e.target));
            }
        }
    }

    /// Recompute latest finishes from `seeds` after edges were removed.
    pub fn rebuild_latest_backward(&mut self, graph: &PrecedenceGraph, seeds: &[JobId]) {
        self.queue.clear();
        self.queue.extend_from_slice(seeds);
        while let Some(v) = self.queue.pop() {
            let recomputed = self.required_latest_finish(graph, v);
            if recomputed > self.latest_finish[v] {
                self.latest_finish[v] = recomputed;
                self.queue
                    .extend(graph.predecessors(v).iter().map(|r| r.source));
            }
        }
    }

    fn required_earliest_start(&self, graph: &PrecedenceGraph, v: JobId) -> Time {
        graph
            .predecessors(v)
            .iter()
            .map(|rev| {
                self.earliest_start[rev.source] + graph.successors(rev.source)[rev.forward_index].lag
            })
            .fold(self.releases[v], Time::max)
    }

    fn required_latest_finish(&self, graph: &PrecedenceGraph, v: JobId) -> Time {
        graph
            .successors(v)
            .iter()
            .map(|e| {
                self.latest_finish[e.target] - self.durations[e.target] - e.lag + self.durations[v]
            })
            .fold(self.deadlines[v], Time::min)
    }

    /// Compare every bound against its edges.
    ///
    /// Only meaningful after a complete propagation with nothing deferred.
    pub fn verify(&self, graph: &PrecedenceGraph) -> Result<(), PropagationError> {
        for job in 0..self.num_jobs() {
            let expected = self.required_earliest_start(graph, job);
            if expected != self.earliest_start[job] {
                return Err(PropagationError::EarliestStart {
                    job,
                    stored: self.earliest_start[job],
                    expected,
                });
            }
            let expected = self.required_latest_finish(graph, job);
            if expected != self.latest_finish[job] {
                return Err(PropagationError::LatestFinish {
                    job,
                    stored: self.latest_finish[job],
                    expected,
                });
            }
            if self.ef(job) > self.latest_finish[job] {
                return Err(PropagationError::Infeasible {
                    job,
                    earliest_start: self.earliest_start[job],
                    latest_finish: self.latest_finish[job],
                    duration: self.durations[job],
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::tests::single_resource_problem;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const FULL: TimeRange = TimeRange {
        lo: Time::MIN,
        hi: Time::MAX,
    };

    fn insert(
        graph: &mut PrecedenceGraph,
        bounds: &mut TimeBounds,
        s: JobId,
        t: JobId,
        range: TimeRange,
        force: bool,
    ) -> Vec<JobId> {
        graph.insert_edge(s, t, bounds.duration(s), false);
        let mut changed = Vec::new();
        bounds.push_earliest_forward(graph, &[s], force, false, range, &mut changed);
        bounds.push_latest_backward(graph, &[t], force, false, range);
        changed
    }

    #[test]
    fn test_push_after_insert() {
        let p = single_resource_problem(&[(2, 0, 20, 1.0), (3, 0, 20, 1.0), (4, 0, 20, 1.0)], &[
            (1, 2),
        ]);
        let mut g = PrecedenceGraph::from_problem(&p);
        let mut b = TimeBounds::new(&p);
        assert_eq!(b.earliest_start(), &[0, 0, 3]);
        assert_eq!(b.latest_finish(), &[20, 16, 20]);

        let changed = insert(&mut g, &mut b, 0, 1, FULL, false);
        assert_eq!(b.earliest_start(), &[0, 2, 5]);
        assert_eq!(b.latest_finish(), &[13, 16, 20]);
        assert_eq!(changed, vec![1, 2]);
        assert!(b.verify(&g).is_ok());
    }

    #[test]
    fn test_push_defers_outside_range() {
        // chain 0 -> 1 -> 2 with job 1 already far right of the range
        let p = single_resource_problem(
            &[(2, 0, 50, 1.0), (2, 10, 50, 1.0), (2, 0, 50, 1.0), (2, 0, 50, 1.0)],
            &[(1, 2)],
        );
        let mut g = PrecedenceGraph::from_problem(&p);
        let mut b = TimeBounds::new(&p);
        let range = TimeRange { lo: 0, hi: 5 };

        // 3 -> 1 does not move job 1 (release 10 dominates)
        insert(&mut g, &mut b, 3, 1, range, false);
        assert_eq!(b.es(1), 10);

        b.earliest_start[3] = 9;
        let mut changed = Vec::new();
        b.push_earliest_forward(&g, &[3], false, false, range, &mut changed);
        assert_eq!(b.es(1), 11);
        // job 2 is stale until a forced pass drains the deferred buffer
        assert_eq!(b.es(2), 12);
        assert!(b.has_deferred());

        changed.clear();
        b.push_earliest_forward(&g, &[], true, false, range, &mut changed);
        assert_eq!(b.es(2), 13);
        assert_eq!(changed, vec![2]);
        assert!(b.deferred_forward.is_empty());
    }

    #[test]
    fn test_range_change_requeues_deferred() {
        let p = single_resource_problem(&[(2, 0, 50, 1.0), (2, 6, 50, 1.0), (2, 0, 50, 1.0)], &[
            (1, 2),
        ]);
        let mut g = PrecedenceGraph::from_problem(&p);
        let mut b = TimeBounds::new(&p);
        insert(&mut g, &mut b, 0, 1, FULL, true);
        b.earliest_start[0] = 5;
        let mut changed = Vec::new();
        b.push_earliest_forward(&g, &[0], false, false, TimeRange { lo: 0, hi: 4 }, &mut changed);
        assert_eq!(b.es(1), 7);
        assert_eq!(b.es(2), 8);

        // job 1 falls inside the new range and is drained without forcing
        b.push_earliest_forward(&g, &[], false, true, TimeRange { lo: 0, hi: 10 }, &mut changed);
        assert_eq!(b.es(2), 9);
    }

    #[test]
    fn test_range_change_drains_for_stale_successor() {
        let p = single_resource_problem(&[(2, 0, 50, 1.0), (2, 10, 50, 1.0), (2, 0, 50, 1.0)], &[
            (1, 2),
        ]);
        let mut g = PrecedenceGraph::from_problem(&p);
        let mut b = TimeBounds::new(&p);
        insert(&mut g, &mut b, 0, 1, FULL, true);
        b.earliest_start[0] = 13;
        let mut changed = Vec::new();
        b.push_earliest_forward(&g, &[0], false, false, TimeRange { lo: 0, hi: 5 }, &mut changed);
        assert_eq!(b.es(1), 15);
        assert_eq!(b.es(2), 12);

        // job 1 stays beyond the new range but job 2 would fall inside it
        b.push_earliest_forward(&g, &[], false, true, TimeRange { lo: 0, hi: 13 }, &mut changed);
        assert_eq!(b.es(2), 17);
        assert!(!b.has_deferred());
    }

    #[test]
    fn test_rebuild_after_delete() {
        let p = single_resource_problem(&[(2, 0, 20, 1.0), (3, 0, 20, 1.0), (4, 0, 20, 1.0)], &[]);
        let mut g = PrecedenceGraph::from_problem(&p);
        let mut b = TimeBounds::new(&p);
        insert(&mut g, &mut b, 0, 1, FULL, true);
        insert(&mut g, &mut b, 1, 2, FULL, true);
        assert_eq!(b.earliest_start(), &[0, 2, 5]);

        let victim = g.edge_ref(0, 0);
        g.bulk_delete(&[victim]);
        let mut changed = Vec::new();
        b.rebuild_earliest_forward(&g, &[1], &mut changed);
        b.rebuild_latest_backward(&g, &[0]);
        assert_eq!(b.earliest_start(), &[0, 0, 3]);
        assert_eq!(b.latest_finish(), &[20, 16, 20]);
        assert_eq!(changed, vec![1, 2]);
        assert!(b.verify(&g).is_ok());
    }

    #[test]
    fn test_reset_restores_base() {
        let p = single_resource_problem(&[(2, 0, 20, 1.0), (3, 0, 20, 1.0)], &[]);
        let mut g = PrecedenceGraph::from_problem(&p);
        let mut b = TimeBounds::new(&p);
        insert(&mut g, &mut b, 0, 1, FULL, true);
        b.reset();
        assert_eq!(b.earliest_start(), p.base_earliest_start());
        assert_eq!(b.latest_finish(), p.base_latest_finish());
    }

    #[test]
    fn test_random_insert_delete_stays_consistent() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let jobs: Vec<(Time, Time, Time, f64)> = (0..10)
            .map(|_| (rng.random_range(1..5), rng.random_range(0..5), 60, 1.0))
            .collect();
        let p = single_resource_problem(&jobs, &[(0, 1)]);
        let mut g = PrecedenceGraph::from_problem(&p);
        let mut b = TimeBounds::new(&p);

        for _ in 0..300 {
            if rng.random_bool(0.7) {
                let s = rng.random_range(0..10);
                let t = rng.random_range(0..10);
                let overlap = b.es(t) < b.ef(s) && b.es(s) < b.ef(t);
                if s != t && overlap && b.ef(s) + b.duration(t) <= b.lf(t) {
                    insert(&mut g, &mut b, s, t, FULL, true);
                }
            } else {
                let removable: Vec<_> = (0..10)
                    .flat_map(|s| (0..g.successors(s).len()).map(move |i| (s, i)))
                    .filter(|&(s, i)| !g.successors(s)[i].permanent)
                    .collect();
                if removable.is_empty() {
                    continue;
                }
                let (s, i) = removable[rng.random_range(0..removable.len())];
                let target = g.successors(s)[i].target;
                let victim = g.edge_ref(s, i);
                g.bulk_delete(&[victim]);
                let mut changed = Vec::new();
                b.rebuild_earliest_forward(&g, &[target], &mut changed);
                b.rebuild_latest_backward(&g, &[s]);
            }
            assert!(g.check().is_ok());
            assert_eq!(b.verify(&g), Ok(()));
        }
    }
}
