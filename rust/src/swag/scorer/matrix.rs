//! Reinforcement matrix over ordered job pairs.
//!
//! After each finished round every non-permanent edge of that round's graph
//! is reinforced. Rounds that beat few of the recent rounds earn close to a
//! full unit, rounds that beat most of them earn nothing. With aging
//! enabled, writes alternate between two matrices every `aging_interval`
//! iterations and an entry only counts while it was written in the current
//! or the previous period.

use super::EdgeScorer;
use crate::config::MatrixScorerConfig;
use crate::graph::PrecedenceGraph;
use crate::problem::{JobId, Time};

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    period: u64,
    value: f64,
}

#[derive(Debug, Clone)]
pub struct MatrixEdgeScorer {
    num_jobs: usize,
    matrices: [Vec<Entry>; 2],
    active: usize,
    period: u64,
    /// Ring buffer of recent round qualities.
    window: Vec<f64>,
    window_capacity: usize,
    window_pos: usize,
    fraction_threshold: f64,
    aging_interval: u64,
}

impl MatrixEdgeScorer {
    pub fn new(num_jobs: usize, config: &MatrixScorerConfig) -> Self {
        let cells = num_jobs * num_jobs;
        Self {
            num_jobs,
            matrices: [vec![Entry::default(); cells], vec![Entry::default(); cells]],
            active: 0,
            period: 0,
            window: Vec::with_capacity(config.window),
            window_capacity: config.window.max(1),
            window_pos: 0,
            fraction_threshold: config.fraction_threshold,
            aging_interval: config.aging_interval,
        }
    }

    /// Reinforcement earned by a round of quality `quality`.
    fn adjustment(&self, quality: f64) -> f64 {
        let as_good = self.window.iter().filter(|&&q| q <= quality).count() as f64;
        let needed = self.window_capacity as f64 * self.fraction_threshold;
        if as_good < needed {
            1.0 - as_good / needed
        } else {
            0.0
        }
    }

    fn remember(&mut self, quality: f64) {
        if self.window.len() < self.window_capacity {
            self.window.push(quality);
        } else {
            self.window[self.window_pos] = quality;
        }
        self.window_pos = (self.window_pos + 1) % self.window_capacity;
    }
}

impl EdgeScorer for MatrixEdgeScorer {
    fn score(&mut self, source: JobId, target: JobId) -> f64 {
        let cell = source * self.num_jobs + target;
        if self.aging_interval == 0 {
            return self.matrices[0][cell].value;
        }
        let oldest = self.period.saturating_sub(1);
        self.matrices
            .iter()
            .map(|m| m[cell])
            .filter(|e| e.period >= oldest)
            .map(|e| e.value)
            .sum()
    }

    fn incorporate_result(&mut self, quality: f64, _start_times: &[Time], graph: &PrecedenceGraph) {
        let adjustment = self.adjustment(quality);
        self.remember(quality);
        if adjustment <= 0.0 {
            return;
        }

        let period = self.period;
        let matrix = &mut self.matrices[self.active];
        for (source, edge) in graph.edges() {
            if edge.permanent {
                continue;
            }
            let entry = &mut matrix[source * self.num_jobs + edge.target];
            if entry.period != period {
                *entry = Entry { period, value: 0.0 };
            }
            entry.value += adjustment;
        }
    }

    fn on_iteration(&mut self, iteration: u64) {
        if self.aging_interval > 0 && iteration % self.aging_interval == 0 {
            self.active ^= 1;
            self.period += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(edges: &[(JobId, JobId, bool)]) -> PrecedenceGraph {
        let mut g = PrecedenceGraph::new(3);
        for &(s, t, permanent) in edges {
            g.insert_edge(s, t, 1, permanent);
        }
        g
    }

    #[test]
    fn test_reinforces_non_permanent_edges() {
        let mut m = MatrixEdgeScorer::new(3, &MatrixScorerConfig::default());
        let g = graph_with(&[(0, 1, false), (1, 2, true)]);

        m.incorporate_result(10.0, &[], &g);
        assert_eq!(m.score(0, 1), 1.0);
        assert_eq!(m.score(1, 2), 0.0);

        // one of ten slots is at least as good: 1 - 1/5
        m.incorporate_result(12.0, &[], &g);
        assert!((m.score(0, 1) - 1.8).abs() < 1e-12);
    }

    #[test]
    fn test_no_reinforcement_when_most_rounds_were_better() {
        let config = MatrixScorerConfig {
            window: 2,
            fraction_threshold: 0.5,
            aging_interval: 0,
        };
        let mut m = MatrixEdgeScorer::new(3, &config);
        let g = graph_with(&[(2, 0, false)]);
        m.incorporate_result(1.0, &[], &g);
        assert_eq!(m.score(2, 0), 1.0);
        m.incorporate_result(5.0, &[], &g);
        assert_eq!(m.score(2, 0), 1.0);
        // 1.0 is still in the window and at least as good as 3.0
        m.incorporate_result(3.0, &[], &g);
        assert_eq!(m.score(2, 0), 1.0);
        // window is now [3.0, 5.0]
        m.incorporate_result(0.5, &[], &g);
        assert_eq!(m.score(2, 0), 2.0);
    }

    #[test]
    fn test_aging_forgets_old_periods() {
        let config = MatrixScorerConfig {
            aging_interval: 2,
            ..MatrixScorerConfig::default()
        };
        let mut m = MatrixEdgeScorer::new(3, &config);
        let g = graph_with(&[(0, 2, false)]);
        m.incorporate_result(4.0, &[], &g);
        assert_eq!(m.score(0, 2), 1.0);

        m.on_iteration(1);
        m.on_iteration(2);
        assert_eq!(m.score(0, 2), 1.0);

        m.on_iteration(4);
        assert_eq!(m.score(0, 2), 0.0);
    }
}
