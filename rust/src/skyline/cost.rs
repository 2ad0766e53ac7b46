//! Reduction of the multi-resource cost to a single weighted demand level.
//!
//! The event tree tracks one scalar per time step. That is exact when the
//! per-step cost is a non-decreasing function of one weighted sum of
//! demands, which covers two shapes: a single resource with constant
//! availability, and any number of resources with no free capacity and
//! purely linear cost polynomials.

use crate::problem::Resource;

#[derive(Debug, Clone)]
pub enum ScalarReduction {
    /// One resource; the level is its demand.
    Single { resource: Resource, available: f64 },
    /// Level is `Σ weight_r · demand_r`; cost equals the level.
    Linear { weights: Vec<f64> },
}

impl ScalarReduction {
    /// `None` when the cost cannot be expressed through one level.
    pub fn for_resources(resources: &[Resource]) -> Option<Self> {
        if let [resource] = resources {
            if let Some(available) = resource.availability.constant() {
                return Some(Self::Single {
                    resource: resource.clone(),
                    available,
                });
            }
        }

        let mut weights = Vec::with_capacity(resources.len());
        for r in resources {
            if r.availability.constant() != Some(0.0) {
                return None;
            }
            let investment = r.investment.linear_coefficient()?;
            let overshoot = r.overshoot.linear_coefficient()?;
            weights.push(investment + overshoot);
        }
        Some(Self::Linear { weights })
    }

    pub fn weight(&self, demand: &[f64]) -> f64 {
        match self {
            Self::Single { .. } => demand.first().copied().unwrap_or(0.0),
            Self::Linear { weights } => weights.iter().zip(demand).map(|(w, d)| w * d).sum(),
        }
    }

    pub fn cost(&self, level: f64) -> f64 {
        match self {
            Self::Single {
                resource,
                available,
            } => resource.instantaneous_cost(level, *available),
            Self::Linear { .. } => level.max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Availability, Polynomial};

    #[test]
    fn test_single_resource_with_capacity() {
        let r = Resource::new(
            Availability::flat(3.0),
            Polynomial::new(vec![(1.0, 2.0)]),
            Polynomial::zero(),
        );
        let red = ScalarReduction::for_resources(&[r]).unwrap();
        assert_eq!(red.weight(&[5.0]), 5.0);
        assert_eq!(red.cost(2.0), 0.0);
        assert!((red.cost(5.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_multi_resource() {
        let red = ScalarReduction::for_resources(&[
            Resource::linear(2.0),
            Resource::new(
                Availability::flat(0.0),
                Polynomial::linear(1.0),
                Polynomial::linear(0.5),
            ),
        ])
        .unwrap();
        assert!((red.weight(&[1.0, 2.0]) - 5.0).abs() < 1e-12);
        assert_eq!(red.cost(5.0), 5.0);
    }

    #[test]
    fn test_irreducible_profiles() {
        let quadratic = Resource::new(
            Availability::flat(0.0),
            Polynomial::new(vec![(1.0, 2.0)]),
            Polynomial::zero(),
        );
        assert!(ScalarReduction::for_resources(&[quadratic, Resource::linear(1.0)]).is_none());

        let varying = Resource::new(
            Availability::new(vec![(0, 1.0), (5, 2.0)]),
            Polynomial::linear(1.0),
            Polynomial::zero(),
        );
        assert!(ScalarReduction::for_resources(&[varying]).is_none());
    }
}
