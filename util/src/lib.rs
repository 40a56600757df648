//! Test helpers shared by the workspace crates.
use nalgebra::DMatrix;

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Builds a dense matrix from nested row slices, which reads more naturally in tests than
/// the column-major constructors.
pub fn matrix_from_rows(rows: &[&[f64]]) -> DMatrix<f64> {
    let nrows = rows.len();
    let ncols = rows.first().map(|row| row.len()).unwrap_or(0);
    for row in rows {
        assert_eq!(row.len(), ncols, "All rows must have the same length.");
    }
    DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j])
}
