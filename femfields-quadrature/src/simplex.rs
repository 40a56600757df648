//! Collapsed Gauss rules for the unit simplices.
//!
//! The unit triangle `{x, y >= 0, x + y <= 1}` and the unit tetrahedron
//! `{x, y, z >= 0, x + y + z <= 1}` are obtained from the unit square and cube by the Duffy
//! transformation
//!
//! ```text
//! triangle:     (u, v)    -> (u, v (1 - u))
//! tetrahedron:  (u, v, w) -> (u, v (1 - u), w (1 - u) (1 - v))
//! ```
//!
//! whose Jacobian determinants are polynomials in `u` and `v`. The tensor Gauss rule is applied
//! in the collapsed coordinates with enough points to absorb the Jacobian, so that the
//! resulting rule integrates polynomials of the requested total degree exactly. All weights
//! are positive.

use crate::univariate::unit_interval_gauss;
use crate::Rule;

fn points_for_degree(degree: usize) -> usize {
    // n Gauss points integrate polynomials of degree 2n - 1 exactly
    (degree + 2) / 2
}

/// A collapsed Gauss rule on the unit triangle, exact for polynomials of total degree
/// `strength`.
pub fn triangle(strength: usize) -> Rule<2> {
    // The Jacobian (1 - u) raises the degree in u by one
    let n = points_for_degree(strength + 1);
    let (weights1d, points1d) = unit_interval_gauss(n);
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);

    for (&wu, &[u]) in weights1d.iter().zip(&points1d) {
        for (&wv, &[v]) in weights1d.iter().zip(&points1d) {
            weights.push(wu * wv * (1.0 - u));
            points.push([u, v * (1.0 - u)]);
        }
    }

    (weights, points)
}

/// A collapsed Gauss rule on the unit tetrahedron, exact for polynomials of total degree
/// `strength`.
pub fn tetrahedron(strength: usize) -> Rule<3> {
    // The Jacobian (1 - u)^2 (1 - v) raises the degree in u by two
    let n = points_for_degree(strength + 2);
    let (weights1d, points1d) = unit_interval_gauss(n);
    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);

    let rule1d_iter = || weights1d.iter().zip(&points1d);

    for (&wu, &[u]) in rule1d_iter() {
        for (&wv, &[v]) in rule1d_iter() {
            for (&ww, &[w]) in rule1d_iter() {
                let jacobian = (1.0 - u) * (1.0 - u) * (1.0 - v);
                weights.push(wu * wv * ww * jacobian);
                points.push([u, v * (1.0 - u), w * (1.0 - u) * (1.0 - v)]);
            }
        }
    }

    (weights, points)
}
