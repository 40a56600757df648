//! Gauss rules on the unit square and the unit cube.
//!
//! Both are products of the Gauss rule on `[0, 1]` with itself. Points are listed with the
//! first coordinate varying slowest, the same ordering as the nodes of the procedural grids.

use crate::univariate::unit_interval_gauss;
use crate::{Point, Rule};

/// The `D`-fold product of a rule on the unit interval.
///
/// Point `i` takes its coordinates from the base-`n` digits of `i`, most significant first.
pub fn tensor_product<const D: usize>(rule: &Rule<1>) -> Rule<D> {
    let (weights1d, points1d) = rule;
    let n = weights1d.len();
    let num_points = n.pow(D as u32);

    (0..num_points)
        .map(|i| {
            let mut digits = [0; D];
            let mut rest = i;
            for digit in digits.iter_mut().rev() {
                *digit = rest % n;
                rest /= n;
            }
            let weight = digits.iter().map(|&j| weights1d[j]).product::<f64>();
            let point: Point<D> = digits.map(|j| points1d[j][0]);
            (weight, point)
        })
        .unzip()
}

/// The Gauss rule on the unit square with `num_points_per_dim` points along each axis.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    tensor_product(&unit_interval_gauss(num_points_per_dim))
}

/// The Gauss rule on the unit cube with `num_points_per_dim` points along each axis.
pub fn hexahedron_gauss(num_points_per_dim: usize) -> Rule<3> {
    tensor_product(&unit_interval_gauss(num_points_per_dim))
}
