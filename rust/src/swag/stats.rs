//! Counters and timing collected during a solver run.
//!
//! Everything here is observational: nothing the solver decides depends on
//! these values.

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub iterations: u64,
    /// Committed candidate edges.
    pub insertions: u64,
    /// Committed deletion sets.
    pub deletions: u64,
    pub resets: u64,
    /// Improvements of the best known solution.
    pub improvements: u64,
    pub unstick_calls: u64,
}

impl fmt::Display for SolverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "iterations:    {}", self.iterations)?;
        writeln!(f, "insertions:    {}", self.insertions)?;
        writeln!(f, "deletions:     {}", self.deletions)?;
        writeln!(f, "resets:        {}", self.resets)?;
        writeln!(f, "improvements:  {}", self.improvements)?;
        write!(f, "unstick calls: {}", self.unstick_calls)
    }
}

/// Solver phases measured when `disaggregate_time` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Propagation,
    Skyline,
    Selection,
    Unstick,
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeBreakdown {
    pub propagation: Duration,
    pub skyline: Duration,
    pub selection: Duration,
    pub unstick: Duration,
    pub reset: Duration,
}

impl TimeBreakdown {
    pub fn add(&mut self, phase: Phase, elapsed: Duration) {
        let slot = match phase {
            Phase::Propagation => &mut self.propagation,
            Phase::Skyline => &mut self.skyline,
            Phase::Selection => &mut self.selection,
            Phase::Unstick => &mut self.unstick,
            Phase::Reset => &mut self.reset,
        };
        *slot += elapsed;
    }

    pub fn total(&self) -> Duration {
        self.propagation + self.skyline + self.selection + self.unstick + self.reset
    }
}

/// Optional stopwatch; inert when timing is disabled.
pub(crate) struct PhaseTimer(Option<Instant>);

impl PhaseTimer {
    pub(crate) fn start(enabled: bool) -> Self {
        Self(enabled.then(Instant::now))
    }

    pub(crate) fn stop(self, breakdown: &mut TimeBreakdown, phase: Phase) {
        if let Some(started) = self.0 {
            breakdown.add(phase, started.elapsed());
        }
    }
}

/// Best score over time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSample {
    pub elapsed: Duration,
    pub iteration: u64,
    pub best: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreTrace {
    interval: Option<Duration>,
    next_due: Duration,
    samples: Vec<ScoreSample>,
}

impl ScoreTrace {
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            next_due: Duration::ZERO,
            samples: Vec::new(),
        }
    }

    /// Record a sample if the interval has passed since the last one.
    pub fn observe(&mut self, elapsed: Duration, iteration: u64, best: f64) {
        let Some(interval) = self.interval else {
            return;
        };
        if elapsed < self.next_due {
            return;
        }
        self.samples.push(ScoreSample {
            elapsed,
            iteration,
            best,
        });
        while self.next_due <= elapsed {
            self.next_due += interval;
        }
    }

    pub fn samples(&self) -> &[ScoreSample] {
        &self.samples
    }
}
