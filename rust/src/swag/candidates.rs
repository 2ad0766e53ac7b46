//! Candidate edges between overlapping jobs of the active range.
//!
//! Two scans feed the same pool. The full scan sorts the range's jobs by
//! earliest start and sweeps them while keeping only jobs that are still
//! running, so only overlapping pairs are ever looked at. The batched scan
//! walks all ordered pairs in a fixed order, stops after `batch_size`
//! admissible candidates, and resumes where it stopped on the next call.

use rand::seq::SliceRandom;
use rand::Rng;

use super::scorer::EdgeScorer;
use crate::problem::{JobId, Time};
use crate::propagation::TimeBounds;
use crate::skyline::TimeRange;

/// Proposed edge `source -> target` and its selection weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub source: JobId,
    pub target: JobId,
    pub weight: f64,
}

impl Candidate {
    pub fn new(source: JobId, target: JobId, weight: f64) -> Self {
        Self {
            source,
            target,
            weight,
        }
    }
}

/// Whether the earliest placements of `a` and `b` overlap.
pub fn overlaps(bounds: &TimeBounds, a: JobId, b: JobId) -> bool {
    bounds.es(b) < bounds.ef(a) && bounds.es(a) < bounds.ef(b)
}

/// Whether `target` still fits after `source` once `source -> target` holds.
pub fn fits_after(bounds: &TimeBounds, source: JobId, target: JobId) -> bool {
    bounds.ef(source) + bounds.duration(target) <= bounds.lf(target)
}

#[derive(Debug, Default)]
pub struct CandidateGenerator {
    /// Jobs of the active range, in scan order.
    jobs: Vec<JobId>,
    /// Running jobs of the sweep with their earliest finish.
    sweep: Vec<(JobId, Time)>,
    batch_offset: usize,
    pool: Vec<Candidate>,
    weight_sum: f64,
}

impl CandidateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> &[JobId] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn clear(&mut self) {
        self.pool.clear();
        self.weight_sum = 0.0;
    }

    pub fn push(&mut self, candidate: Candidate) {
        self.weight_sum += candidate.weight;
        self.pool.push(candidate);
    }

    /// Select the jobs of `range` with positive duration and restart the
    /// batched scan.
    pub fn collect_jobs(&mut self, bounds: &TimeBounds, range: TimeRange) {
        self.jobs.clear();
        self.jobs.extend(
            (0..bounds.num_jobs()).filter(|&j| bounds.duration(j) > 0 && bounds.intersects(j, range)),
        );
        self.batch_offset = 0;
    }

    /// Whether the batched scan has pairs left.
    pub fn batch_pending(&self) -> bool {
        let n = self.jobs.len();
        n >= 2 && self.batch_offset < n * (n - 1)
    }

    fn add(&mut self, source: JobId, target: JobId, scorer: &mut dyn EdgeScorer) {
        let weight = if scorer.is_uniform() {
            1.0
        } else {
            1.0 + scorer.score(source, target)
        };
        self.push(Candidate::new(source, target, weight));
    }

    /// Replace the pool with every admissible pair among the collected jobs.
    pub fn build_full(&mut self, bounds: &TimeBounds, scorer: &mut dyn EdgeScorer) {
        self.clear();
        let es = bounds.earliest_start();
        self.jobs.sort_unstable_by_key(|&j| (es[j], j));
        self.sweep.clear();

        for idx in 0..self.jobs.len() {
            let job = self.jobs[idx];
            let start = bounds.es(job);
            let mut k = 0;
            while k < self.sweep.len() {
                if self.sweep[k].1 <= start {
                    self.sweep.swap_remove(k);
                } else {
                    k += 1;
                }
            }
            for k in 0..self.sweep.len() {
                let other = self.sweep[k].0;
                if fits_after(bounds, other, job) {
                    self.add(other, job, scorer);
                }
                if fits_after(bounds, job, other) {
                    self.add(job, other, scorer);
                }
            }
            self.sweep.push((job, bounds.ef(job)));
        }
    }

    /// Replace the pool with up to `batch_size` admissible pairs, continuing
    /// the scan started by the last [`collect_jobs`](Self::collect_jobs).
    pub fn build_batch<R: Rng>(
        &mut self,
        bounds: &TimeBounds,
        scorer: &mut dyn EdgeScorer,
        batch_size: usize,
        randomize: bool,
        rng: &mut R,
    ) {
        self.clear();
        let n = self.jobs.len();
        if n < 2 {
            return;
        }
        if self.batch_offset == 0 && randomize {
            self.jobs.shuffle(rng);
        }

        let total = n * (n - 1);
        while self.batch_offset < total && self.pool.len() < batch_size {
            let step = self.batch_offset / n + 1;
            let first = self.batch_offset % n;
            self.batch_offset += 1;

            let source = self.jobs[first];
            let target = self.jobs[(first + step) % n];
            if overlaps(bounds, source, target) && fits_after(bounds, source, target) {
                self.add(source, target, scorer);
            }
        }
    }

    /// Remove and return one candidate, weighted by score or uniformly.
    pub fn draw<R: Rng>(&mut self, weighted: bool, rng: &mut R) -> Option<Candidate> {
        if self.pool.is_empty() {
            return None;
        }
        let last = self.pool.len() - 1;
        let idx = if weighted && self.weight_sum > 0.0 {
            let mut remaining = rng.random::<f64>() * self.weight_sum;
            self.pool
                .iter()
                .position(|c| {
                    remaining -= c.weight;
                    remaining < 0.0
                })
                .unwrap_or(last)
        } else {
            rng.random_range(0..=last)
        };
        let drawn = self.pool.swap_remove(idx);
        if self.pool.is_empty() {
            self.weight_sum = 0.0;
        } else {
            self.weight_sum -= drawn.weight;
        }
        Some(drawn)
    }
}
