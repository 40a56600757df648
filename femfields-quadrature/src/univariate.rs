//! Gauss-Legendre rules in one dimension.
//!
//! [`gauss`] produces rules on the symmetric interval `[-1, 1]`, [`unit_interval_gauss`] maps
//! them onto the reference interval `[0, 1]` used by the element types of `femfields`. Points
//! are sorted in ascending order.

use crate::Rule;
use std::f64::consts::PI;

/// The Legendre polynomial `P_n` and its derivative at `x`.
///
/// The derivative formula divides by `x^2 - 1` and is only valid in the open interval `(-1, 1)`.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    // m P_m(x) = (2m - 1) x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
    let (mut current, mut previous) = (1.0, 0.0);
    for m in 1..=n {
        let m = m as f64;
        let next = ((2.0 * m - 1.0) * x * current - (m - 1.0) * previous) / m;
        previous = current;
        current = next;
    }
    // P_n'(x) = n (x P_n(x) - P_{n - 1}(x)) / (x^2 - 1)
    let derivative = n as f64 * (x * current - previous) / (x * x - 1.0);
    (current, derivative)
}

const MAX_NEWTON_ITERATIONS: usize = 100;
const NEWTON_TOLERANCE: f64 = 1e-15;

/// The root of `P_n` closest to the initial guess, together with `P_n'` at the root.
fn legendre_root(n: usize, mut x: f64) -> (f64, f64) {
    let (mut p, mut dp) = legendre(n, x);
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let dx = -p / dp;
        x += dx;
        (p, dp) = legendre(n, x);
        if dx.abs() <= NEWTON_TOLERANCE {
            break;
        }
    }
    (x, dp)
}

/// The `n`-point [Gauss-Legendre rule] on `[-1, 1]`, exact for polynomials of degree
/// `2n - 1`.
///
/// # Panics
///
/// Panics if zero points are requested.
///
/// [Gauss-Legendre rule]: https://en.wikipedia.org/wiki/Gauss%E2%80%93Legendre_quadrature
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let mut points = vec![[0.0]; n];
    let mut weights = vec![0.0; n];

    // The roots are symmetric about the origin. The guess for the i-th largest root comes from
    // Numerical Recipes, The Art of Scientific Computing, Third Edition (2007).
    for i in 0..(n + 1) / 2 {
        let guess = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let (x, dp) = legendre_root(n, guess);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points[n - 1 - i] = [x];
        weights[n - 1 - i] = w;
        points[i] = [-x];
        weights[i] = w;
    }

    (weights, points)
}

/// The `n`-point Gauss-Legendre rule on `[0, 1]`.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn unit_interval_gauss(num_points: usize) -> Rule<1> {
    let (weights, points) = gauss(num_points);
    let weights = weights.into_iter().map(|w| 0.5 * w).collect();
    let points = points.into_iter().map(|[x]| [0.5 * (x + 1.0)]).collect();
    (weights, points)
}
