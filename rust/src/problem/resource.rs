//! Renewable resources: availability over time and the cost polynomials.

use super::Time;

/// Sum of `coefficient * x^exponent` terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polynomial {
    terms: Vec<(f64, f64)>,
}

impl Polynomial {
    pub fn new(terms: Vec<(f64, f64)>) -> Self {
        Self { terms }
    }

    /// `coefficient * x`.
    pub fn linear(coefficient: f64) -> Self {
        Self::new(vec![(coefficient, 1.0)])
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn terms(&self) -> &[(f64, f64)] {
        &self.terms
    }

    pub fn is_zero(&self) -> bool {
        self.terms.iter().all(|&(c, _)| c == 0.0)
    }

    pub fn apply(&self, x: f64) -> f64 {
        self.terms.iter().map(|&(c, e)| c * x.powf(e)).sum()
    }

    /// Coefficient sum if every non-zero term is of degree one.
    pub fn linear_coefficient(&self) -> Option<f64> {
        let mut sum = 0.0;
        for &(c, e) in &self.terms {
            if c == 0.0 {
                continue;
            }
            if e != 1.0 {
                return None;
            }
            sum += c;
        }
        Some(sum)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        for &(c, e) in &self.terms {
            if !c.is_finite() || c < 0.0 {
                return Err(format!("coefficient {c} must be finite and non-negative"));
            }
            if !e.is_finite() || e < 0.0 {
                return Err(format!("exponent {e} must be finite and non-negative"));
            }
        }
        Ok(())
    }
}

/// Piecewise-constant amount of a resource available over time.
///
/// Each point `(time, amount)` holds until the next point.
#[derive(Debug, Clone, PartialEq)]
pub struct Availability {
    points: Vec<(Time, f64)>,
}

impl Availability {
    pub fn new(points: Vec<(Time, f64)>) -> Self {
        Self { points }
    }

    pub fn flat(amount: f64) -> Self {
        Self::new(vec![(0, amount)])
    }

    pub fn points(&self) -> &[(Time, f64)] {
        &self.points
    }

    /// Amount if it never changes.
    pub fn constant(&self) -> Option<f64> {
        let first = self.points.first().map_or(0.0, |p| p.1);
        self.points
            .iter()
            .all(|p| p.1 == first)
            .then_some(first)
    }

    pub fn at(&self, time: Time) -> f64 {
        let idx = self.points.partition_point(|p| p.0 <= time);
        if idx == 0 {
            0.0
        } else {
            self.points[idx - 1].1
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self.points.first() {
            None => return Err("availability needs at least one point".to_string()),
            Some(&(t, _)) if t != 0 => {
                return Err(format!("availability must start at time 0, not {t}"))
            }
            _ => {}
        }
        for window in self.points.windows(2) {
            if window[0].0 >= window[1].0 {
                return Err("availability points must be strictly increasing in time".into());
            }
        }
        for &(_, amount) in &self.points {
            if !amount.is_finite() || amount < 0.0 {
                return Err(format!("availability {amount} must be finite and non-negative"));
            }
        }
        Ok(())
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::flat(0.0)
    }
}

/// A renewable resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    pub availability: Availability,
    /// Paid once for the largest excess over availability.
    pub investment: Polynomial,
    /// Paid for every time step the demand exceeds availability.
    pub overshoot: Polynomial,
}

impl Resource {
    pub fn new(availability: Availability, investment: Polynomial, overshoot: Polynomial) -> Self {
        Self {
            availability,
            investment,
            overshoot,
        }
    }

    /// Resource with no free capacity and a linear investment cost.
    pub fn linear(coefficient: f64) -> Self {
        Self::new(
            Availability::flat(0.0),
            Polynomial::linear(coefficient),
            Polynomial::zero(),
        )
    }

    /// Cost of one time step at `demand` with `available` units free.
    pub fn instantaneous_cost(&self, demand: f64, available: f64) -> f64 {
        let excess = demand - available;
        if excess <= 0.0 {
            return 0.0;
        }
        self.investment.apply(excess) + self.overshoot.apply(excess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polynomial_apply() {
        let p = Polynomial::new(vec![(2.0, 1.0), (0.5, 2.0), (3.0, 0.0)]);
        assert!((p.apply(4.0) - (8.0 + 8.0 + 3.0)).abs() < 1e-12);
        assert_eq!(Polynomial::zero().apply(10.0), 0.0);
    }

    #[test]
    fn test_linear_coefficient() {
        assert_eq!(
            Polynomial::new(vec![(2.0, 1.0), (1.5, 1.0), (0.0, 3.0)]).linear_coefficient(),
            Some(3.5)
        );
        assert_eq!(Polynomial::new(vec![(1.0, 2.0)]).linear_coefficient(), None);
    }

    #[test]
    fn test_polynomial_validation() {
        assert!(Polynomial::new(vec![(-1.0, 1.0)]).validate().is_err());
        assert!(Polynomial::new(vec![(1.0, -1.0)]).validate().is_err());
        assert!(Polynomial::new(vec![(1.0, f64::NAN)]).validate().is_err());
        assert!(Polynomial::linear(1.0).validate().is_ok());
    }

    #[test]
    fn test_availability_lookup() {
        let a = Availability::new(vec![(0, 1.0), (5, 3.0), (9, 0.5)]);
        assert_eq!(a.at(0), 1.0);
        assert_eq!(a.at(4), 1.0);
        assert_eq!(a.at(5), 3.0);
        assert_eq!(a.at(100), 0.5);
        assert_eq!(a.constant(), None);
        assert_eq!(Availability::flat(2.0).constant(), Some(2.0));
    }

    #[test]
    fn test_availability_validation() {
        assert!(Availability::new(vec![]).validate().is_err());
        assert!(Availability::new(vec![(1, 1.0)]).validate().is_err());
        assert!(Availability::new(vec![(0, 1.0), (0, 2.0)]).validate().is_err());
        assert!(Availability::new(vec![(0, -1.0)]).validate().is_err());
        assert!(Availability::new(vec![(0, 1.0), (3, 2.0)]).validate().is_ok());
    }

    #[test]
    fn test_instantaneous_cost_only_counts_excess() {
        let r = Resource::new(
            Availability::flat(2.0),
            Polynomial::linear(1.0),
            Polynomial::new(vec![(1.0, 2.0)]),
        );
        assert_eq!(r.instantaneous_cost(1.0, 2.0), 0.0);
        assert_eq!(r.instantaneous_cost(2.0, 2.0), 0.0);
        assert!((r.instantaneous_cost(5.0, 2.0) - (3.0 + 9.0)).abs() < 1e-12);
    }
}
