//! Problem model: jobs, resources and the permanent precedence graph.
//!
//! A [`Problem`] is validated once at construction and is read-only
//! afterwards. Everything the solver later relies on (an acyclic base graph,
//! windows long enough for their jobs, base bounds that leave room for every
//! job) is checked here, so malformed instances never reach the solver.

mod resource;
mod solution;

use std::collections::VecDeque;
use thiserror::Error;

pub use resource::{Availability, Polynomial, Resource};
pub use solution::{ScheduleCost, ScheduleViolation, Solution};

/// Integer time step.
pub type Time = i64;

/// Dense job index.
pub type JobId = usize;

/// A job with a fixed duration that must run inside `[release, deadline)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub duration: Time,
    pub release: Time,
    pub deadline: Time,
    /// Demand per resource, indexed like [`Problem::resources`].
    pub demand: Vec<f64>,
}

impl Job {
    pub fn new(duration: Time, release: Time, deadline: Time, demand: Vec<f64>) -> Self {
        Self {
            duration,
            release,
            deadline,
            demand,
        }
    }
}

/// Minimum start-to-start distance: `start[target] >= start[source] + lag`.
///
/// A finish-before-start constraint has `lag == duration[source]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precedence {
    pub source: JobId,
    pub target: JobId,
    pub lag: Time,
}

impl Precedence {
    pub fn new(source: JobId, target: JobId, lag: Time) -> Self {
        Self {
            source,
            target,
            lag,
        }
    }
}

/// Reasons an instance is rejected at construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    #[error("job {job} has {found} demand entries but there are {expected} resources")]
    DemandLength {
        job: JobId,
        expected: usize,
        found: usize,
    },

    #[error("job {job} has invalid demand {value} on resource {resource}")]
    InvalidDemand {
        job: JobId,
        resource: usize,
        value: f64,
    },

    #[error("job {job} has negative duration {duration}")]
    NegativeDuration { job: JobId, duration: Time },

    #[error("job {job} has negative release {release}")]
    NegativeRelease { job: JobId, release: Time },

    #[error("job {job} window [{release}, {deadline}) is shorter than its duration {duration}")]
    WindowTooShort {
        job: JobId,
        release: Time,
        deadline: Time,
        duration: Time,
    },

    #[error("precedence {from} -> {to} references a job outside 0..{jobs}")]
    UnknownJob {
        from: JobId,
        to: JobId,
        jobs: usize,
    },

    #[error("precedence on job {job} points to itself")]
    SelfLoop { job: JobId },

    #[error("precedence {from} -> {to} has negative lag {lag}")]
    NegativeLag {
        from: JobId,
        to: JobId,
        lag: Time,
    },

    #[error("circular precedence detected in the base graph")]
    CircularPrecedence,

    #[error(
        "job {job} cannot fit: earliest start {earliest_start} + duration {duration} exceeds latest finish {latest_finish}"
    )]
    InfeasibleWindow {
        job: JobId,
        earliest_start: Time,
        latest_finish: Time,
        duration: Time,
    },

    #[error("resource {resource} is invalid: {reason}")]
    InvalidResource { resource: usize, reason: String },
}

/// A validated scheduling instance.
#[derive(Debug, Clone)]
pub struct Problem {
    jobs: Vec<Job>,
    resources: Vec<Resource>,
    precedences: Vec<Precedence>,
    topological_order: Vec<JobId>,
    base_earliest_start: Vec<Time>,
    base_latest_finish: Vec<Time>,
}

impl Problem {
    /// Validate and build an instance.
    ///
    /// Parallel precedences between the same pair are merged, keeping the
    /// largest lag.
    pub fn new(
        jobs: Vec<Job>,
        resources: Vec<Resource>,
        precedences: Vec<Precedence>,
    ) -> Result<Self, ProblemError> {
        for (idx, resource) in resources.iter().enumerate() {
            let invalid = |reason: String| ProblemError::InvalidResource {
                resource: idx,
                reason,
            };
            resource.availability.validate().map_err(invalid)?;
            resource
                .investment
                .validate()
                .map_err(|r| invalid(format!("investment {r}")))?;
            resource
                .overshoot
                .validate()
                .map_err(|r| invalid(format!("overshoot {r}")))?;
        }

        for (id, job) in jobs.iter().enumerate() {
            validate_job(id, job, resources.len())?;
        }

        let precedences = merge_precedences(&precedences, jobs.len())?;
        let topological_order = topological_sort(jobs.len(), &precedences)?;

        let mut problem = Self {
            jobs,
            resources,
            precedences,
            topological_order,
            base_earliest_start: Vec::new(),
            base_latest_finish: Vec::new(),
        };
        problem.compute_base_bounds()?;
        Ok(problem)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> &Job {
        &self.jobs[id]
    }

    pub fn num_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn num_resources(&self) -> usize {
        self.resources.len()
    }

    /// Merged permanent precedences.
    pub fn precedences(&self) -> &[Precedence] {
        &self.precedences
    }

    /// Jobs ordered so that every precedence points forward.
    pub fn topological_order(&self) -> &[JobId] {
        &self.topological_order
    }

    /// Earliest starts implied by releases and permanent precedences alone.
    pub fn base_earliest_start(&self) -> &[Time] {
        &self.base_earliest_start
    }

    /// Latest finishes implied by deadlines and permanent precedences alone.
    pub fn base_latest_finish(&self) -> &[Time] {
        &self.base_latest_finish
    }

    /// Latest deadline; every job lies inside `[0, horizon)`.
    pub fn horizon(&self) -> Time {
        self.jobs.iter().map(|j| j.deadline).max().unwrap_or(0)
    }

    pub fn durations(&self) -> Vec<Time> {
        self.jobs.iter().map(|j| j.duration).collect()
    }

    /// Cost of one time step at the given per-resource demand.
    pub fn instantaneous_cost(&self, demand: &[f64], time: Time) -> f64 {
        self.resources
            .iter()
            .zip(demand)
            .map(|(r, &d)| r.instantaneous_cost(d, r.availability.at(time)))
            .sum()
    }

    fn compute_base_bounds(&mut self) -> Result<(), ProblemError> {
        let n = self.jobs.len();
        let mut successors: Vec<Vec<(JobId, Time)>> = vec![Vec::new(); n];
        for p in &self.precedences {
            successors[p.source].push((p.target, p.lag));
        }

        // Forward pass: earliest starts
        let mut es: Vec<Time> = self.jobs.iter().map(|j| j.release).collect();
        for &v in &self.topological_order {
            for &(t, lag) in &successors[v] {
                es[t] = es[t].max(es[v] + lag);
            }
        }

        // Backward pass: latest finishes
        let mut lf: Vec<Time> = self.jobs.iter().map(|j| j.deadline).collect();
        for &v in self.topological_order.iter().rev() {
            for &(t, lag) in &successors[v] {
                let bound = lf[t] - self.jobs[t].duration - lag + self.jobs[v].duration;
                lf[v] = lf[v].min(bound);
            }
        }

        for (id, job) in self.jobs.iter().enumerate() {
            if es[id] + job.duration > lf[id] {
                return Err(ProblemError::InfeasibleWindow {
                    job: id,
                    earliest_start: es[id],
                    latest_finish: lf[id],
                    duration: job.duration,
                });
            }
        }

        self.base_earliest_start = es;
        self.base_latest_finish = lf;
        Ok(())
    }
}

fn validate_job(id: JobId, job: &Job, num_resources: usize) -> Result<(), ProblemError> {
    if job.demand.len() != num_resources {
        return Err(ProblemError::DemandLength {
            job: id,
            expected: num_resources,
            found: job.demand.len(),
        });
    }
    if let Some((resource, &value)) = job
        .demand
        .iter()
        .enumerate()
        .find(|(_, d)| !d.is_finite() || **d < 0.0)
    {
        return Err(ProblemError::InvalidDemand {
            job: id,
            resource,
            value,
        });
    }
    if job.duration < 0 {
        return Err(ProblemError::NegativeDuration {
            job: id,
            duration: job.duration,
        });
    }
    if job.release < 0 {
        return Err(ProblemError::NegativeRelease {
            job: id,
            release: job.release,
        });
    }
    if job.deadline - job.release < job.duration {
        return Err(ProblemError::WindowTooShort {
            job: id,
            release: job.release,
            deadline: job.deadline,
            duration: job.duration,
        });
    }
    Ok(())
}

fn merge_precedences(
    precedences: &[Precedence],
    num_jobs: usize,
) -> Result<Vec<Precedence>, ProblemError> {
    let mut merged: Vec<Precedence> = Vec::with_capacity(precedences.len());
    for p in precedences {
        if p.source >= num_jobs || p.target >= num_jobs {
            return Err(ProblemError::UnknownJob {
                from: p.source,
                to: p.target,
                jobs: num_jobs,
            });
        }
        if p.source == p.target {
            return Err(ProblemError::SelfLoop { job: p.source });
        }
        if p.lag < 0 {
            return Err(ProblemError::NegativeLag {
                from: p.source,
                to: p.target,
                lag: p.lag,
            });
        }
        merged.push(*p);
    }

    merged.sort_by_key(|p| (p.source, p.target, std::cmp::Reverse(p.lag)));
    merged.dedup_by_key(|p| (p.source, p.target));
    Ok(merged)
}

/// Kahn's algorithm over the permanent precedences.
fn topological_sort(
    num_jobs: usize,
    precedences: &[Precedence],
) -> Result<Vec<JobId>, ProblemError> {
    let mut in_degree = vec![0usize; num_jobs];
    let mut successors: Vec<Vec<JobId>> = vec![Vec::new(); num_jobs];
    for p in precedences {
        in_degree[p.target] += 1;
        successors[p.source].push(p.target);
    }

    let mut queue: VecDeque<JobId> = (0..num_jobs).filter(|&j| in_degree[j] == 0).collect();
    let mut result = Vec::with_capacity(num_jobs);

    while let Some(job) = queue.pop_front() {
        result.push(job);
        for &succ in &successors[job] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                queue.push_back(succ);
            }
        }
    }

    if result.len() != num_jobs {
        return Err(ProblemError::CircularPrecedence);
    }
    Ok(result)
}
