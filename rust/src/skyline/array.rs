//! Dense per-timestep demand profile.
//!
//! Exact for any cost shape (time-varying availability, polynomial costs
//! over several resources) at the price of touching every time step a job
//! covers on each move.

use super::{EventKind, SkylineEvent, TimeRange, EPSILON};
use crate::problem::{JobId, Problem, Resource, Time};

#[derive(Debug, Clone)]
pub struct ArrayProfile {
    resources: Vec<Resource>,
    /// `available[r][t]`, expanded once.
    available: Vec<Vec<f64>>,
    usage: Vec<Vec<f64>>,
    cost: Vec<f64>,
    starts: Vec<Option<Time>>,
    durations: Vec<Time>,
    demands: Vec<Vec<f64>>,
}

impl ArrayProfile {
    pub fn new(problem: &Problem) -> Self {
        let horizon = problem.horizon().max(0) as usize;
        let available = problem
            .resources()
            .iter()
            .map(|r| (0..horizon).map(|t| r.availability.at(t as Time)).collect())
            .collect();
        Self {
            resources: problem.resources().to_vec(),
            available,
            usage: vec![vec![0.0; horizon]; problem.num_resources()],
            cost: vec![0.0; horizon],
            starts: vec![None; problem.num_jobs()],
            durations: problem.durations(),
            demands: problem.jobs().iter().map(|j| j.demand.clone()).collect(),
        }
    }

    pub fn horizon(&self) -> Time {
        self.cost.len() as Time
    }

    pub fn start_of(&self, job: JobId) -> Option<Time> {
        self.starts[job]
    }

    pub fn insert(&mut self, job: JobId, start: Time) {
        debug_assert!(self.starts[job].is_none(), "job {job} placed twice");
        self.starts[job] = Some(start);
        self.apply(job, start, 1.0);
    }

    pub fn remove(&mut self, job: JobId) {
        if let Some(start) = self.starts[job].take() {
            self.apply(job, start, -1.0);
        }
    }

    pub fn reposition(&mut self, job: JobId, start: Time) {
        if self.starts[job] == Some(start) {
            return;
        }
        self.remove(job);
        self.insert(job, start);
    }

    fn apply(&mut self, job: JobId, start: Time, sign: f64) {
        let end = start + self.durations[job];
        debug_assert!(start >= 0 && end <= self.horizon(), "job {job} outside horizon");
        let span = start.max(0) as usize..end.min(self.horizon()).max(0) as usize;
        for t in span {
            for (r, usage) in self.usage.iter_mut().enumerate() {
                usage[t] += sign * self.demands[job][r];
            }
            self.cost[t] = self
                .resources
                .iter()
                .enumerate()
                .map(|(r, res)| res.instantaneous_cost(self.usage[r][t], self.available[r][t]))
                .sum();
        }
    }

    pub fn cost_at(&self, time: Time) -> f64 {
        self.cost.get(time as usize).copied().unwrap_or(0.0)
    }

    pub fn demand_at(&self, time: Time) -> Vec<f64> {
        self.usage
            .iter()
            .map(|u| u.get(time as usize).copied().unwrap_or(0.0))
            .collect()
    }

    pub fn maximum(&self) -> f64 {
        self.cost.iter().copied().fold(0.0, f64::max)
    }

    fn clamp(&self, range: TimeRange) -> std::ops::Range<usize> {
        let lo = range.lo.clamp(0, self.horizon()) as usize;
        let hi = range.hi.clamp(0, self.horizon()) as usize;
        lo..hi.max(lo)
    }

    pub fn maximum_in(&self, range: TimeRange) -> f64 {
        self.cost[self.clamp(range)]
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }

    /// Leftmost maximal interval inside `range` attaining its peak.
    pub fn maximum_range(&self, range: TimeRange) -> TimeRange {
        let peak = self.maximum_in(range);
        let span = self.clamp(range);
        if span.is_empty() || peak <= EPSILON {
            return range;
        }
        let threshold = peak - EPSILON;
        let slice = &self.cost[span.clone()];
        let first = slice.iter().position(|&c| c >= threshold).unwrap_or(0);
        let len = slice[first..]
            .iter()
            .position(|&c| c < threshold)
            .unwrap_or(slice.len() - first);
        let lo = (span.start + first) as Time;
        TimeRange::new(lo, lo + len as Time)
    }

    /// Start and end events of placed jobs with positive duration.
    pub fn events(&self) -> Vec<SkylineEvent> {
        let mut events: Vec<SkylineEvent> = self
            .starts
            .iter()
            .enumerate()
            .filter(|&(job, _)| self.durations[job] > 0)
            .filter_map(|(job, start)| start.map(|s| (job, s)))
            .flat_map(|(job, start)| {
                [
                    SkylineEvent {
                        time: start,
                        job,
                        kind: EventKind::Start,
                    },
                    SkylineEvent {
                        time: start + self.durations[job],
                        job,
                        kind: EventKind::End,
                    },
                ]
            })
            .collect();
        events.sort_unstable_by_key(|e| (e.time, e.kind, e.job));
        events
    }
}
