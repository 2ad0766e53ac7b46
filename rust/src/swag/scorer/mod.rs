//! Edge scorers: strategies that bias which candidate edge gets inserted.
//!
//! A scorer learns from finished rounds (the schedule present when the
//! solver resets) and returns a non-negative score for an ordered job pair.
//! Candidates are drawn with weight `1 + score`.

mod elite;
mod matrix;

pub use elite::ElitePoolScorer;
pub use matrix::MatrixEdgeScorer;

use crate::config::{ScorerKind, SwagConfig};
use crate::graph::PrecedenceGraph;
use crate::problem::{JobId, Problem, Time};

pub trait EdgeScorer {
    /// Preference for inserting `source -> target`.
    fn score(&mut self, source: JobId, target: JobId) -> f64;

    /// Learn from a finished round with peak cost `quality`.
    fn incorporate_result(&mut self, quality: f64, start_times: &[Time], graph: &PrecedenceGraph);

    fn on_iteration(&mut self, _iteration: u64) {}

    /// Uniform scorers let the solver skip weighted selection.
    fn is_uniform(&self) -> bool {
        false
    }
}

/// Scores every pair zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformScorer;

impl EdgeScorer for UniformScorer {
    fn score(&mut self, _source: JobId, _target: JobId) -> f64 {
        0.0
    }

    fn incorporate_result(&mut self, _quality: f64, _start_times: &[Time], _graph: &PrecedenceGraph) {}

    fn is_uniform(&self) -> bool {
        true
    }
}

/// Sum of several scorers.
pub struct CombinedScorer {
    parts: Vec<Box<dyn EdgeScorer>>,
}

impl CombinedScorer {
    pub fn new(parts: Vec<Box<dyn EdgeScorer>>) -> Self {
        Self { parts }
    }
}

impl EdgeScorer for CombinedScorer {
    fn score(&mut self, source: JobId, target: JobId) -> f64 {
        self.parts.iter_mut().map(|p| p.score(source, target)).sum()
    }

    fn incorporate_result(&mut self, quality: f64, start_times: &[Time], graph: &PrecedenceGraph) {
        for part in &mut self.parts {
            part.incorporate_result(quality, start_times, graph);
        }
    }

    fn on_iteration(&mut self, iteration: u64) {
        for part in &mut self.parts {
            part.on_iteration(iteration);
        }
    }

    fn is_uniform(&self) -> bool {
        self.parts.iter().all(|p| p.is_uniform())
    }
}

/// Scorer selected by `config.scorer`.
pub fn build_scorer(config: &SwagConfig, problem: &Problem) -> Box<dyn EdgeScorer> {
    let matrix = || -> Box<dyn EdgeScorer> {
        Box::new(MatrixEdgeScorer::new(problem.num_jobs(), &config.matrix))
    };
    let elite = || -> Box<dyn EdgeScorer> {
        Box::new(ElitePoolScorer::new(
            problem.durations(),
            &config.elite_pool,
            config.seed,
        ))
    };
    match config.scorer {
        ScorerKind::Uniform => Box::new(UniformScorer),
        ScorerKind::Matrix => matrix(),
        ScorerKind::ElitePool => elite(),
        ScorerKind::Combined => Box::new(CombinedScorer::new(vec![matrix(), elite()])),
    }
}
