//! Resource skyline: per-time demand profile with peak queries.
//!
//! The solver only ever asks three things of the profile: where each job
//! currently sits, how expensive the worst time step is, and where that
//! worst stretch lies. [`Skyline`] answers them through one of two
//! backends: the event treap when the cost reduces to a single weighted
//! level, the dense array otherwise.

mod array;
mod cost;
mod tree;

use thiserror::Error;

pub use array::ArrayProfile;
pub use cost::ScalarReduction;
pub use tree::{EventIter, ProfileTree};

use crate::problem::{JobId, Problem, Time};

/// Tolerance for comparing accumulated demand levels.
pub const EPSILON: f64 = 1e-9;

/// Largest horizon the dense backend allocates for by default.
pub const DEFAULT_MAX_ARRAY_HORIZON: Time = 1 << 24;

/// Half-open time interval `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub lo: Time,
    pub hi: Time,
}

impl TimeRange {
    pub fn new(lo: Time, hi: Time) -> Self {
        Self { lo, hi }
    }

    pub fn is_empty(&self) -> bool {
        self.hi <= self.lo
    }

    pub fn contains(&self, time: Time) -> bool {
        self.lo <= time && time < self.hi
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.lo, self.hi)
    }
}

/// Ends sort before starts at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    End,
    Start,
}

/// A job entering or leaving the profile.
///
/// The demand change is the job's demand vector, added on start and
/// subtracted on end. Events name the job instead of carrying that vector so
/// they stay `Copy` and the tree stores one weight per job rather than one
/// vector per event; [`SkylineEvent::delta`] rebuilds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkylineEvent {
    pub time: Time,
    pub job: JobId,
    pub kind: EventKind,
}

impl SkylineEvent {
    /// Per-resource demand change at `time`.
    pub fn delta(&self, problem: &Problem) -> Vec<f64> {
        let sign = match self.kind {
            EventKind::Start => 1.0,
            EventKind::End => -1.0,
        };
        problem.job(self.job).demand.iter().map(|d| sign * d).collect()
    }
}

/// Peak cost of a range and the leftmost stretch attaining it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub cost: f64,
    pub range: TimeRange,
}

/// Which profile backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkylineKind {
    /// Tree when the cost reduces to one level, array otherwise.
    #[default]
    Auto,
    Tree,
    Array,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkylineError {
    #[error(
        "the event tree needs one resource with constant availability or linear costs without free capacity"
    )]
    TreeUnsupported,

    #[error("horizon {horizon} exceeds the dense profile limit {limit}")]
    HorizonTooLarge { horizon: Time, limit: Time },
}

#[derive(Debug, Clone)]
pub enum Skyline {
    Tree {
        tree: ProfileTree,
        reduction: ScalarReduction,
        horizon: Time,
    },
    Array(ArrayProfile),
}

impl Skyline {
    /// Empty profile for `problem`; no job is placed yet.
    pub fn new(problem: &Problem, kind: SkylineKind) -> Result<Self, SkylineError> {
        Self::with_array_limit(problem, kind, DEFAULT_MAX_ARRAY_HORIZON)
    }

    /// Like [`new`](Self::new), refusing a dense profile longer than
    /// `max_array_horizon` time steps.
    pub fn with_array_limit(
        problem: &Problem,
        kind: SkylineKind,
        max_array_horizon: Time,
    ) -> Result<Self, SkylineError> {
        let reduction = ScalarReduction::for_resources(problem.resources());
        match (kind, reduction) {
            (SkylineKind::Array, _) | (SkylineKind::Auto, None) => {
                let horizon = problem.horizon();
                if horizon > max_array_horizon {
                    return Err(SkylineError::HorizonTooLarge {
                        horizon,
                        limit: max_array_horizon,
                    });
                }
                Ok(Self::Array(ArrayProfile::new(problem)))
            }
            (SkylineKind::Tree, None) => Err(SkylineError::TreeUnsupported),
            (_, Some(reduction)) => {
                let weights = problem
                    .jobs()
                    .iter()
                    .map(|j| reduction.weight(&j.demand))
                    .collect();
                Ok(Self::Tree {
                    tree: ProfileTree::new(problem.durations(), weights),
                    reduction,
                    horizon: problem.horizon(),
                })
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Tree { .. } => "tree",
            Self::Array(_) => "array",
        }
    }

    fn horizon(&self) -> Time {
        match self {
            Self::Tree { horizon, .. } => *horizon,
            Self::Array(a) => a.horizon(),
        }
    }

    pub fn start_of(&self, job: JobId) -> Option<Time> {
        match self {
            Self::Tree { tree, .. } => tree.start_of(job),
            Self::Array(a) => a.start_of(job),
        }
    }

    pub fn insert(&mut self, job: JobId, start: Time) {
        match self {
            Self::Tree { tree, .. } => tree.insert(job, start),
            Self::Array(a) => a.insert(job, start),
        }
    }

    pub fn remove(&mut self, job: JobId) {
        match self {
            Self::Tree { tree, .. } => tree.remove(job),
            Self::Array(a) => a.remove(job),
        }
    }

    pub fn reposition(&mut self, job: JobId, start: Time) {
        match self {
            Self::Tree { tree, .. } => tree.reposition(job, start),
            Self::Array(a) => a.reposition(job, start),
        }
    }

    /// Cost of the single time step `[time, time + 1)`.
    pub fn cost_at(&self, time: Time) -> f64 {
        match self {
            Self::Tree {
                tree, reduction, ..
            } => reduction.cost(tree.level_at(time)),
            Self::Array(a) => a.cost_at(time),
        }
    }

    /// Peak cost over all time.
    pub fn maximum(&self) -> f64 {
        match self {
            Self::Tree {
                tree, reduction, ..
            } => reduction.cost(tree.max_level()),
            Self::Array(a) => a.maximum(),
        }
    }

    /// Peak cost inside `range` and where it is attained.
    pub fn maximum_in(&self, range: TimeRange) -> Peak {
        match self {
            Self::Tree {
                tree, reduction, ..
            } => Peak {
                cost: reduction.cost(tree.max_level_in(range)),
                range: tree.max_level_range(range),
            },
            Self::Array(a) => Peak {
                cost: a.maximum_in(range),
                range: a.maximum_range(range),
            },
        }
    }

    /// Leftmost stretch of the global peak.
    pub fn maximum_range(&self) -> TimeRange {
        self.maximum_in(TimeRange::new(0, self.horizon())).range
    }

    /// Demand-change events in time order.
    pub fn events(&self) -> Vec<SkylineEvent> {
        match self {
            Self::Tree { tree, .. } => tree.events().collect(),
            Self::Array(a) => a.events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::tests::single_resource_problem;
    use crate::problem::{Availability, Job, Polynomial, Resource};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Per-timestep recomputation straight from the problem.
    fn brute_force_peak(problem: &Problem, starts: &[Time]) -> f64 {
        (0..problem.horizon())
            .map(|t| {
                let mut demand = vec![0.0; problem.num_resources()];
                for (job, &s) in starts.iter().enumerate() {
                    let j = problem.job(job);
                    if s <= t && t < s + j.duration {
                        for (d, jd) in demand.iter_mut().zip(&j.demand) {
                            *d += jd;
                        }
                    }
                }
                problem.instantaneous_cost(&demand, t)
            })
            .fold(0.0, f64::max)
    }

    fn random_problem(rng: &mut ChaCha8Rng, resources: Vec<Resource>) -> Problem {
        let jobs = (0..25)
            .map(|_| {
                let demand = (0..resources.len())
                    .map(|_| rng.random_range(0..5) as f64)
                    .collect();
                Job::new(rng.random_range(0..6), 0, 40, demand)
            })
            .collect();
        Problem::new(jobs, resources, vec![]).unwrap()
    }

    fn check_against_brute_force(problem: &Problem, kind: SkylineKind, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut skyline = Skyline::new(problem, kind).unwrap();
        let mut starts: Vec<Time> = (0..problem.num_jobs())
            .map(|j| rng.random_range(0..=40 - problem.job(j).duration))
            .collect();
        for (job, &s) in starts.iter().enumerate() {
            skyline.insert(job, s);
        }
        for _ in 0..150 {
            let job = rng.random_range(0..problem.num_jobs());
            starts[job] = rng.random_range(0..=40 - problem.job(job).duration);
            skyline.reposition(job, starts[job]);
            let expected = brute_force_peak(problem, &starts);
            assert!(
                (skyline.maximum() - expected).abs() < 1e-6,
                "{} skyline: {} vs {}",
                skyline.kind_name(),
                skyline.maximum(),
                expected
            );
            let peak = skyline.maximum_in(TimeRange::new(0, 40));
            assert!((peak.cost - expected).abs() < 1e-6);
            assert!((skyline.cost_at(peak.range.lo) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_auto_selects_backend() {
        let linear = single_resource_problem(&[(1, 0, 5, 1.0)], &[]);
        assert_eq!(Skyline::new(&linear, SkylineKind::Auto).unwrap().kind_name(), "tree");

        let varying = Problem::new(
            vec![Job::new(1, 0, 5, vec![1.0])],
            vec![Resource::new(
                Availability::new(vec![(0, 0.0), (2, 1.0)]),
                Polynomial::linear(1.0),
                Polynomial::zero(),
            )],
            vec![],
        )
        .unwrap();
        assert_eq!(Skyline::new(&varying, SkylineKind::Auto).unwrap().kind_name(), "array");
        assert_eq!(
            Skyline::new(&varying, SkylineKind::Tree).unwrap_err(),
            SkylineError::TreeUnsupported
        );
    }

    #[test]
    fn test_tree_single_resource_matches_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let resource = Resource::new(
            Availability::flat(4.0),
            Polynomial::new(vec![(1.0, 2.0), (2.0, 1.0)]),
            Polynomial::linear(1.0),
        );
        let p = random_problem(&mut rng, vec![resource]);
        check_against_brute_force(&p, SkylineKind::Tree, 2);
        check_against_brute_force(&p, SkylineKind::Array, 2);
    }

    #[test]
    fn test_tree_linear_multi_resource_matches_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let p = random_problem(&mut rng, vec![
            Resource::linear(1.0),
            Resource::linear(2.5),
            Resource::linear(0.25),
        ]);
        check_against_brute_force(&p, SkylineKind::Tree, 6);
    }

    #[test]
    fn test_array_general_cost_matches_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let p = random_problem(&mut rng, vec![
            Resource::new(
                Availability::new(vec![(0, 2.0), (10, 5.0), (30, 1.0)]),
                Polynomial::new(vec![(1.0, 2.0)]),
                Polynomial::linear(0.5),
            ),
            Resource::linear(1.0),
        ]);
        check_against_brute_force(&p, SkylineKind::Auto, 10);
    }

    #[test]
    fn test_backends_agree_on_peak_range() {
        let p = single_resource_problem(
            &[(4, 0, 20, 2.0), (4, 0, 20, 2.0), (4, 0, 20, 2.0), (3, 0, 20, 1.0)],
            &[],
        );
        let mut tree = Skyline::new(&p, SkylineKind::Tree).unwrap();
        let mut array = Skyline::new(&p, SkylineKind::Array).unwrap();
        for (job, start) in [(0, 0), (1, 2), (2, 8), (3, 3)] {
            tree.insert(job, start);
            array.insert(job, start);
        }
        // levels: 0-1: 2, 2: 4, 3: 5, 4-5: 3, 8-11: 2
        assert_eq!(tree.maximum_range(), TimeRange::new(3, 4));
        assert_eq!(array.maximum_range(), TimeRange::new(3, 4));
        assert_eq!(tree.events(), array.events());
    }

    fn quadratic_two_resource_problem(deadline: Time) -> Problem {
        let quadratic = || {
            Resource::new(
                Availability::flat(1.0),
                Polynomial::new(vec![(1.0, 2.0)]),
                Polynomial::zero(),
            )
        };
        Problem::new(
            vec![Job::new(3, 0, deadline, vec![1.0, 2.0]), Job::new(2, 0, 10, vec![2.0, 0.0])],
            vec![quadratic(), quadratic()],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn test_dense_profile_refuses_long_horizon() {
        let p = quadratic_two_resource_problem(1_000_000_000_000);
        for kind in [SkylineKind::Auto, SkylineKind::Array] {
            assert_eq!(
                Skyline::new(&p, kind).unwrap_err(),
                SkylineError::HorizonTooLarge {
                    horizon: 1_000_000_000_000,
                    limit: DEFAULT_MAX_ARRAY_HORIZON,
                }
            );
        }

        let short = quadratic_two_resource_problem(40);
        assert!(Skyline::with_array_limit(&short, SkylineKind::Auto, 40).is_ok());
        assert!(matches!(
            Skyline::with_array_limit(&short, SkylineKind::Auto, 39),
            Err(SkylineError::HorizonTooLarge { horizon: 40, limit: 39 })
        ));

        // the event tree never allocates per time step
        let linear = single_resource_problem(&[(2, 0, 1_000_000_000_000, 1.0)], &[]);
        assert!(Skyline::with_array_limit(&linear, SkylineKind::Auto, 10).is_ok());
    }

    #[test]
    fn test_event_deltas() {
        let p = quadratic_two_resource_problem(40);
        let mut skyline = Skyline::new(&p, SkylineKind::Auto).unwrap();
        skyline.insert(0, 4);
        skyline.insert(1, 5);
        let deltas: Vec<(Time, Vec<f64>)> = skyline
            .events()
            .iter()
            .map(|e| (e.time, e.delta(&p)))
            .collect();
        assert_eq!(
            deltas,
            vec![
                (4, vec![1.0, 2.0]),
                (5, vec![2.0, 0.0]),
                (7, vec![-1.0, -2.0]),
                (7, vec![-2.0, 0.0]),
            ]
        );
    }
}
