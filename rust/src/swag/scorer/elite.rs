//! Elite pool of good schedules and the ordering frequencies within it.
//!
//! The pool keeps the start times of up to `pool_size` finished rounds.
//! A new round always replaces a non-best member when it improves on the
//! best score; otherwise members are visited from a rotating offset and
//! replaced with a logistic probability in the relative gap between the
//! member and the newcomer, both measured against the best score. The best
//! member is never evicted.
//!
//! `score(s, t)` is the fraction of members in which `s` finishes no later
//! than `t` starts. Values are cached per pair and invalidated whenever the
//! pool changes.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::EdgeScorer;
use crate::config::ElitePoolConfig;
use crate::graph::PrecedenceGraph;
use crate::problem::{JobId, Time};

/// Members closer than this to the best score count as best.
const BEST_TOLERANCE: f64 = 1e-7;

/// Decorrelates the pool stream from the solver stream.
const RNG_SALT: u64 = 0x5eed_e1f7_a9c3_0b11;

#[derive(Debug, Clone)]
pub struct ElitePoolScorer {
    durations: Vec<Time>,
    pool_size: usize,
    start_after: f64,
    sigmoid_base: f64,
    sigmoid_coefficient: f64,
    scores: Vec<f64>,
    members: Vec<Vec<Time>>,
    best_score: f64,
    seen: u64,
    /// `(generation, fraction)` per ordered pair.
    cache: Vec<(u64, f64)>,
    generation: u64,
    rng: ChaCha8Rng,
}

impl ElitePoolScorer {
    pub fn new(durations: Vec<Time>, config: &ElitePoolConfig, seed: u64) -> Self {
        let n = durations.len();
        Self {
            durations,
            pool_size: config.pool_size.max(1),
            start_after: config.start_factor * config.pool_size as f64,
            sigmoid_base: config.sigmoid_base,
            sigmoid_coefficient: config.sigmoid_coefficient,
            scores: Vec::with_capacity(config.pool_size),
            members: Vec::with_capacity(config.pool_size),
            best_score: f64::INFINITY,
            seen: 0,
            cache: vec![(0, 0.0); n * n],
            generation: 1,
            rng: ChaCha8Rng::seed_from_u64(seed ^ RNG_SALT),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    /// Probability of replacing a member `member_gap` above the best with a
    /// newcomer `incoming_gap` above the best.
    fn acceptance(&self, member_gap: f64, incoming_gap: f64) -> f64 {
        if incoming_gap <= 0.0 {
            return 1.0;
        }
        let x = if member_gap > incoming_gap {
            member_gap / incoming_gap - 1.0
        } else {
            1.0 - incoming_gap / member_gap
        };
        1.0 / (1.0 + self.sigmoid_base.powf(-self.sigmoid_coefficient * x))
    }

    fn replace(&mut self, idx: usize, quality: f64, start_times: &[Time]) {
        self.scores[idx] = quality;
        self.members[idx].clear();
        self.members[idx].extend_from_slice(start_times);
        self.best_score = self.best_score.min(quality);
        self.generation += 1;
    }
}

impl EdgeScorer for ElitePoolScorer {
    fn score(&mut self, source: JobId, target: JobId) -> f64 {
        if (self.seen as f64) < self.start_after {
            return 1.0;
        }
        let cell = source * self.durations.len() + target;
        let (generation, cached) = self.cache[cell];
        if generation == self.generation {
            return cached;
        }
        let finish = self.durations[source];
        let before = self
            .members
            .iter()
            .filter(|m| m[source] + finish <= m[target])
            .count();
        let fraction = before as f64 / self.pool_size as f64;
        self.cache[cell] = (self.generation, fraction);
        fraction
    }

    fn incorporate_result(&mut self, quality: f64, start_times: &[Time], _graph: &PrecedenceGraph) {
        self.seen += 1;

        if self.members.len() < self.pool_size {
            self.scores.push(quality);
            self.members.push(start_times.to_vec());
            self.best_score = self.best_score.min(quality);
            self.generation += 1;
            return;
        }

        let offset = self.seen as usize;
        for i in 0..self.pool_size {
            let idx = (i + offset) % self.pool_size;
            let member_gap = self.scores[idx] - self.best_score;
            if member_gap < BEST_TOLERANCE {
                continue;
            }
            let accept = if quality < self.best_score {
                true
            } else {
                let p = self.acceptance(member_gap, quality - self.best_score);
                self.rng.random::<f64>() < p
            };
            if accept {
                self.replace(idx, quality, start_times);
                break;
            }
        }
    }
}
