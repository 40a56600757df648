//! Quadrature rules for finite element reference domains.
//!
//! The main purpose of this crate is to support the `femfields` library, but the rules are
//! plain `f64` data and can be used independently.
//!
//! Reference domains follow the `femfields` conventions: the unit interval `[0, 1]`, the unit
//! square and cube, and the unit triangle and tetrahedron with a vertex at the origin.
//! [`univariate::gauss`] is the exception and lives on `[-1, 1]`.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod simplex;
pub mod tensor;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable => {
                write!(f, "There is no quadrature rule satisfying the requirements available")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A two-dimensional point.
pub type Point2 = Point<2>;

/// A three-dimensional point.
pub type Point3 = Point<3>;

/// A D-dimensional rule.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// A three-dimensional rule.
pub type Rule3d = Rule<3>;

/// Approximates the integral of `f` with the given rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights.iter().zip(points).map(|(w, p)| w * f(p)).sum()
}

/// Returns a Gauss rule on the unit interval with the smallest number of points that
/// integrates polynomials of the given degree exactly.
pub fn segment(strength: usize) -> Rule<1> {
    univariate::unit_interval_gauss((strength + 2) / 2)
}

/// Returns a tensor Gauss rule on the unit square, exact for the given per-dimension degree.
pub fn quadrilateral(strength: usize) -> Rule2d {
    tensor::quadrilateral_gauss((strength + 2) / 2)
}

/// Returns a tensor Gauss rule on the unit cube, exact for the given per-dimension degree.
pub fn hexahedron(strength: usize) -> Rule3d {
    tensor::hexahedron_gauss((strength + 2) / 2)
}

/// Returns a rule on the unit triangle of the given strength.
///
/// Strengths above 30 are rejected to keep the number of points bounded.
pub fn triangle(strength: usize) -> Result<Rule2d, Error> {
    if strength > MAX_SIMPLEX_STRENGTH {
        return Err(Error::NoRuleAvailable);
    }
    Ok(simplex::triangle(strength))
}

/// Returns a rule on the unit tetrahedron of the given strength.
///
/// Strengths above 30 are rejected to keep the number of points bounded.
pub fn tetrahedron(strength: usize) -> Result<Rule3d, Error> {
    if strength > MAX_SIMPLEX_STRENGTH {
        return Err(Error::NoRuleAvailable);
    }
    Ok(simplex::tetrahedron(strength))
}

const MAX_SIMPLEX_STRENGTH: usize = 30;
