//! Start-time assignments and their evaluation against a [`Problem`].

use thiserror::Error;

use super::{JobId, Problem, Time};

/// Per-job start times. `None` marks a job the solver left unscheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub start_times: Vec<Option<Time>>,
    /// Peak instantaneous cost the solver measured for this assignment.
    pub peak_cost: f64,
}

impl Solution {
    pub fn from_start_times(start_times: &[Time], peak_cost: f64) -> Self {
        Self {
            start_times: start_times.iter().copied().map(Some).collect(),
            peak_cost,
        }
    }

    pub fn start_of(&self, job: JobId) -> Option<Time> {
        self.start_times.get(job).copied().flatten()
    }

    pub fn is_complete(&self) -> bool {
        self.start_times.iter().all(Option::is_some)
    }
}

/// Total cost of a schedule split by cost component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleCost {
    /// Investment polynomials applied to each resource's largest excess.
    pub investment: f64,
    /// Overshoot polynomials summed over every time step.
    pub overshoot: f64,
    /// Largest demand seen per resource.
    pub peak_demand: Vec<f64>,
}

impl ScheduleCost {
    pub fn total(&self) -> f64 {
        self.investment + self.overshoot
    }
}

/// First constraint a schedule breaks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleViolation {
    #[error("expected {expected} start times, got {found}")]
    WrongLength { expected: usize, found: usize },

    #[error("job {job} is not scheduled")]
    Unscheduled { job: JobId },

    #[error("job {job} starts at {start} outside its window [{release}, {deadline})")]
    OutsideWindow {
        job: JobId,
        start: Time,
        release: Time,
        deadline: Time,
    },

    #[error("job {to} starts at {to_start} before {from} at {from_start} plus lag {lag}")]
    PrecedenceViolated {
        from: JobId,
        to: JobId,
        from_start: Time,
        to_start: Time,
        lag: Time,
    },
}

impl Problem {
    /// Check windows and permanent precedences of a complete schedule.
    pub fn check_feasible(&self, solution: &Solution) -> Result<(), ScheduleViolation> {
        if solution.start_times.len() != self.num_jobs() {
            return Err(ScheduleViolation::WrongLength {
                expected: self.num_jobs(),
                found: solution.start_times.len(),
            });
        }
        for (id, job) in self.jobs().iter().enumerate() {
            let start = solution
                .start_of(id)
                .ok_or(ScheduleViolation::Unscheduled { job: id })?;
            if start < job.release || start + job.duration > job.deadline {
                return Err(ScheduleViolation::OutsideWindow {
                    job: id,
                    start,
                    release: job.release,
                    deadline: job.deadline,
                });
            }
        }
        for p in self.precedences() {
            let (Some(from_start), Some(to_start)) =
                (solution.start_of(p.source), solution.start_of(p.target))
            else {
                continue;
            };
            if to_start < from_start + p.lag {
                return Err(ScheduleViolation::PrecedenceViolated {
                    from: p.source,
                    to: p.target,
                    from_start,
                    to_start,
                    lag: p.lag,
                });
            }
        }
        Ok(())
    }

    /// Investment and overshoot cost of a schedule.
    ///
    /// Unscheduled jobs contribute no demand.
    pub fn evaluate(&self, solution: &Solution) -> ScheduleCost {
        let horizon = self
            .jobs()
            .iter()
            .enumerate()
            .filter_map(|(id, job)| solution.start_of(id).map(|s| s + job.duration))
            .chain(std::iter::once(self.horizon()))
            .max()
            .unwrap_or(0)
            .max(0) as usize;

        let mut cost = ScheduleCost {
            peak_demand: vec![0.0; self.num_resources()],
            ..ScheduleCost::default()
        };

        for (r, resource) in self.resources().iter().enumerate() {
            // Difference array over time steps
            let mut delta = vec![0.0; horizon + 1];
            for (id, job) in self.jobs().iter().enumerate() {
                let Some(start) = solution.start_of(id) else {
                    continue;
                };
                if job.duration == 0 || job.demand[r] == 0.0 {
                    continue;
                }
                delta[start.max(0) as usize] += job.demand[r];
                delta[(start + job.duration).max(0) as usize] -= job.demand[r];
            }

            let mut usage = 0.0;
            let mut max_excess: f64 = 0.0;
            for (t, d) in delta.iter().take(horizon).enumerate() {
                usage += d;
                cost.peak_demand[r] = cost.peak_demand[r].max(usage);
                let excess = usage - resource.availability.at(t as Time);
                if excess > 0.0 {
                    max_excess = max_excess.max(excess);
                    cost.overshoot += resource.overshoot.apply(excess);
                }
            }
            if max_excess > 0.0 {
                cost.investment += resource.investment.apply(max_excess);
            }
        }
        cost
    }
}
