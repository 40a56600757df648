//! Shape function families on reference shapes.
use crate::element::ReferenceShape;
use crate::Real;
use nalgebra::{DMatrix, DVector, Point3, Scalar};
use numeric_literals::replace_float_literals;

const NODE_TOLERANCE: f64 = 1e-10;

/// Position of a tensor-product node along one reference axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Knot {
    Zero,
    Half,
    One,
}

impl Knot {
    fn from_coordinate(c: f64) -> Self {
        if (c - 0.5).abs() < NODE_TOLERANCE {
            Self::Half
        } else if (c - 1.0).abs() < NODE_TOLERANCE {
            Self::One
        } else {
            Self::Zero
        }
    }
}

/// The node a simplex Lagrange function is associated with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SimplexNode {
    /// Vertex with the given barycentric index.
    Vertex(usize),
    /// Midpoint between two vertices.
    Edge(usize, usize),
}

/// A closed set of shape function families.
///
/// Every family is described by the reference dimension and a per-function role derived from
/// the nodal points the family is built on.
#[derive(Debug, Clone, PartialEq)]
pub enum Basis<T: Scalar> {
    /// A single function equal to one everywhere.
    Constant,
    /// Products of one-dimensional Lagrange polynomials of degree one or two.
    TensorLagrange {
        dimension: usize,
        degree: u8,
        knots: Vec<[Knot; 3]>,
    },
    /// Lagrange polynomials of degree one or two in barycentric coordinates.
    SimplexLagrange {
        dimension: usize,
        degree: u8,
        nodes: Vec<SimplexNode>,
    },
    /// Eight-node serendipity functions on the unit square, given by the corner or mid-edge
    /// position in `{-1, 0, 1}^2`.
    Serendipity { positions: Vec<(i8, i8)> },
    /// One function per point, equal to one at its point and zero at the others.
    IntegrationPoints { points: Vec<Point3<T>> },
}

impl<T: Real> Basis<T> {
    /// Lagrange basis interpolating at the given nodes of a reference shape.
    pub(crate) fn lagrange(shape: ReferenceShape, degree: u8, nodes: &[[f64; 3]]) -> Self {
        let dimension = shape.dimension();
        if dimension == 0 {
            return Self::Constant;
        }
        if shape.is_tensor_product() {
            let knots = nodes
                .iter()
                .map(|p| p.map(Knot::from_coordinate))
                .collect();
            Self::TensorLagrange {
                dimension,
                degree,
                knots,
            }
        } else {
            let nodes = nodes
                .iter()
                .map(|p| {
                    let bary = barycentric_f64(dimension, p);
                    match bary.iter().position(|&l| (l - 1.0).abs() < NODE_TOLERANCE) {
                        Some(vertex) => SimplexNode::Vertex(vertex),
                        None => {
                            let mut halves = (0..=dimension).filter(|&i| (bary[i] - 0.5).abs() < NODE_TOLERANCE);
                            let a = halves.next().unwrap_or(0);
                            let b = halves.next().unwrap_or(a);
                            SimplexNode::Edge(a, b)
                        }
                    }
                })
                .collect();
            Self::SimplexLagrange {
                dimension,
                degree,
                nodes,
            }
        }
    }

    pub(crate) fn serendipity(nodes: &[[f64; 3]]) -> Self {
        let to_sign = |c: f64| (2.0 * c - 1.0).round() as i8;
        Self::Serendipity {
            positions: nodes
                .iter()
                .map(|p| (to_sign(p[0]), to_sign(p[1])))
                .collect(),
        }
    }

    pub fn num_functions(&self) -> usize {
        match self {
            Self::Constant => 1,
            Self::TensorLagrange { knots, .. } => knots.len(),
            Self::SimplexLagrange { nodes, .. } => nodes.len(),
            Self::Serendipity { positions } => positions.len(),
            Self::IntegrationPoints { points } => points.len(),
        }
    }

    /// Values of all functions at a reference point.
    pub fn values(&self, xi: &Point3<T>) -> DVector<T> {
        let n = self.num_functions();
        match self {
            Self::Constant => DVector::from_element(1, T::one()),
            Self::TensorLagrange {
                dimension,
                degree,
                knots,
            } => DVector::from_fn(n, |i, _| {
                (0..*dimension)
                    .map(|k| lagrange_1d(*degree, knots[i][k], xi[k]).0)
                    .fold(T::one(), |acc, v| acc * v)
            }),
            Self::SimplexLagrange {
                dimension,
                degree,
                nodes,
            } => {
                let l = barycentric(*dimension, xi);
                DVector::from_fn(n, |i, _| simplex_value(*degree, nodes[i], &l))
            }
            Self::Serendipity { positions } => {
                DVector::from_fn(n, |i, _| serendipity(positions[i], xi[0], xi[1]).0)
            }
            Self::IntegrationPoints { points } => DVector::from_fn(n, |i, _| {
                if coincides(&points[i], xi) {
                    T::one()
                } else {
                    T::zero()
                }
            }),
        }
    }

    /// Reference gradients of all functions, as a `dimension x num_functions` matrix.
    pub fn gradients(&self, dimension: usize, xi: &Point3<T>) -> DMatrix<T> {
        let n = self.num_functions();
        let mut result = DMatrix::zeros(dimension, n);
        match self {
            Self::Constant | Self::IntegrationPoints { .. } => {}
            Self::TensorLagrange { degree, knots, .. } => {
                for i in 0..n {
                    let factors: Vec<(T, T)> = (0..dimension)
                        .map(|k| lagrange_1d(*degree, knots[i][k], xi[k]))
                        .collect();
                    for j in 0..dimension {
                        result[(j, i)] = factors
                            .iter()
                            .enumerate()
                            .map(|(k, &(value, derivative))| if k == j { derivative } else { value })
                            .fold(T::one(), |acc, v| acc * v);
                    }
                }
            }
            Self::SimplexLagrange { degree, nodes, .. } => {
                let l = barycentric(dimension, xi);
                for i in 0..n {
                    for j in 0..dimension {
                        result[(j, i)] = simplex_derivative(*degree, nodes[i], &l, j);
                    }
                }
            }
            Self::Serendipity { positions } => {
                for i in 0..n {
                    let (_, ds, dt) = serendipity(positions[i], xi[0], xi[1]);
                    result[(0, i)] = ds;
                    if dimension > 1 {
                        result[(1, i)] = dt;
                    }
                }
            }
        }
        result
    }
}

fn coincides<T: Real>(a: &Point3<T>, b: &Point3<T>) -> bool {
    let tol: T = nalgebra::convert(1e-8);
    (a - b).norm() < tol
}

fn barycentric_f64(dimension: usize, p: &[f64; 3]) -> Vec<f64> {
    let mut l = vec![1.0 - p[..dimension].iter().sum::<f64>()];
    l.extend_from_slice(&p[..dimension]);
    l
}

fn barycentric<T: Real>(dimension: usize, xi: &Point3<T>) -> Vec<T> {
    let mut l = vec![T::one() - (0..dimension).fold(T::zero(), |acc, k| acc + xi[k])];
    l.extend((0..dimension).map(|k| xi[k]));
    l
}

/// Derivative of barycentric coordinate `i` with respect to reference axis `j`.
fn barycentric_derivative<T: Real>(i: usize, j: usize) -> T {
    if i == 0 {
        -T::one()
    } else if i == j + 1 {
        T::one()
    } else {
        T::zero()
    }
}

/// One-dimensional Lagrange polynomial on `[0, 1]` and its derivative.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn lagrange_1d<T: Real>(degree: u8, knot: Knot, x: T) -> (T, T) {
    match (degree, knot) {
        (0, _) => (1.0, 0.0),
        (1, Knot::Zero) => (1.0 - x, -1.0),
        (1, _) => (x, 1.0),
        (_, Knot::Zero) => ((1.0 - x) * (1.0 - 2.0 * x), 4.0 * x - 3.0),
        (_, Knot::Half) => (4.0 * x * (1.0 - x), 4.0 - 8.0 * x),
        (_, Knot::One) => (x * (2.0 * x - 1.0), 4.0 * x - 1.0),
    }
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn simplex_value<T: Real>(degree: u8, node: SimplexNode, l: &[T]) -> T {
    match (degree, node) {
        (1, SimplexNode::Vertex(a)) => l[a],
        (_, SimplexNode::Vertex(a)) => l[a] * (2.0 * l[a] - 1.0),
        (_, SimplexNode::Edge(a, b)) => 4.0 * l[a] * l[b],
    }
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn simplex_derivative<T: Real>(degree: u8, node: SimplexNode, l: &[T], j: usize) -> T {
    match (degree, node) {
        (1, SimplexNode::Vertex(a)) => barycentric_derivative(a, j),
        (_, SimplexNode::Vertex(a)) => (4.0 * l[a] - 1.0) * barycentric_derivative(a, j),
        (_, SimplexNode::Edge(a, b)) => {
            4.0 * (l[b] * barycentric_derivative(a, j) + l[a] * barycentric_derivative(b, j))
        }
    }
}

/// Serendipity function at `(x, y)` in `[0, 1]^2` with its two derivatives.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn serendipity<T: Real>(position: (i8, i8), x: T, y: T) -> (T, T, T) {
    let s = 2.0 * x - 1.0;
    let t = 2.0 * y - 1.0;
    let si = T::from_i8(position.0).expect("i8 must fit in T");
    let ti = T::from_i8(position.1).expect("i8 must fit in T");
    // Derivatives with respect to s and t, scaled by ds/dx = dt/dy = 2
    let (value, ds, dt) = match position {
        (0, _) => (
            0.5 * (1.0 - s * s) * (1.0 + t * ti),
            -s * (1.0 + t * ti),
            0.5 * (1.0 - s * s) * ti,
        ),
        (_, 0) => (
            0.5 * (1.0 + s * si) * (1.0 - t * t),
            0.5 * si * (1.0 - t * t),
            -t * (1.0 + s * si),
        ),
        _ => (
            0.25 * (1.0 + s * si) * (1.0 + t * ti) * (s * si + t * ti - 1.0),
            0.25 * si * (1.0 + t * ti) * (2.0 * s * si + t * ti),
            0.25 * ti * (1.0 + s * si) * (s * si + 2.0 * t * ti),
        ),
    };
    (value, 2.0 * ds, 2.0 * dt)
}
