//! Point evaluation as a weak form.
//!
//! The only form needed is the pairing of a trial field with an evaluation test field: the test
//! space has one Kronecker function per integration point, and the integral is taken without
//! weights or Jacobians. Assembling it gives, for each test DOF, the trial quantity at the
//! corresponding integration point.
use crate::element::ElementType;
use crate::error::Error;
use crate::mesh::{ElementBlock, Mesh};
use crate::numbering::DofTable;
use crate::space::{BasisAtPoints, ElementSpace};
use crate::transfer::pseudo_inverse;
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DMatrix, DefaultAllocator, DimName, Point3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// The quantity of the trial field that is evaluated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TrialQuantity {
    Value,
    /// Component of the gradient in physical coordinates.
    Derivative(usize),
}

impl From<Option<usize>> for TrialQuantity {
    fn from(derivative: Option<usize>) -> Self {
        derivative.map_or(Self::Value, Self::Derivative)
    }
}

/// `∫ q(u) · v` with `q` the trial quantity and `v` an evaluation test function.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EvaluationForm {
    pub trial: TrialQuantity,
}

/// Trial basis data at a fixed set of reference points, shared by all elements of a type.
pub(crate) struct TrialAtPoints<T: Real> {
    basis: BasisAtPoints<T>,
    /// Reference gradients of the geometric basis, one matrix per point.
    geometry: Vec<DMatrix<T>>,
}

impl<T: Real> TrialAtPoints<T> {
    pub fn new(element_type: ElementType, trial: &ElementSpace<T>, points: &[Point3<T>], quantity: TrialQuantity) -> Self {
        let geometry = match quantity {
            TrialQuantity::Value => Vec::new(),
            TrialQuantity::Derivative(_) => ElementSpace::isoparametric(element_type)
                .at_points(points)
                .gradients,
        };
        Self {
            basis: trial.at_points(points),
            geometry,
        }
    }

    /// The trial quantity of every shape function at every point, `num_points x num_functions`.
    pub fn element_matrix<D>(
        &self,
        mesh: &Mesh<T, D>,
        block: &ElementBlock,
        element: usize,
        quantity: TrialQuantity,
    ) -> Result<DMatrix<T>, Error>
    where
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        match quantity {
            TrialQuantity::Value => Ok(self.basis.values.clone()),
            TrialQuantity::Derivative(component) => {
                let nodes = mesh.element_node_matrix(block, element);
                let mut result = DMatrix::zeros(self.basis.values.nrows(), self.basis.values.ncols());
                for (k, (geometric, reference)) in self
                    .geometry
                    .iter()
                    .zip(&self.basis.gradients)
                    .enumerate()
                {
                    // Rows of the Jacobian are reference directions
                    let jacobian = geometric * &nodes;
                    let physical = pseudo_inverse(&jacobian)? * reference;
                    result.row_mut(k).copy_from(&physical.row(component));
                }
                Ok(result)
            }
        }
    }
}

/// Assembles the evaluation form over the given elements of one type.
///
/// Rows are test DOFs, columns trial DOFs. Slots without DOF on either side are skipped, as are
/// test functions that vanish at a point.
#[allow(clippy::too_many_arguments)]
pub fn assemble_evaluation<T, D>(
    form: EvaluationForm,
    mesh: &Mesh<T, D>,
    element_type: ElementType,
    elements: &[usize],
    trial: (&ElementSpace<T>, &DofTable),
    test: (&ElementSpace<T>, &DofTable),
    points: &[Point3<T>],
    shape: (usize, usize),
) -> Result<CsrMatrix<T>, Error>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let (trial_space, trial_dofs) = trial;
    let (test_space, test_dofs) = test;
    let mut coo = CooMatrix::new(shape.0, shape.1);
    let Some(block) = mesh.block(element_type) else {
        return Ok(CsrMatrix::from(&coo));
    };

    let trial_at_points = TrialAtPoints::new(element_type, trial_space, points, form.trial);
    let test_values = test_space.at_points(points).values;

    for &e in elements {
        let trial_matrix = trial_at_points.element_matrix(mesh, block, e, form.trial)?;
        for k in 0..points.len() {
            for (j, &psi) in test_values.row(k).iter().enumerate() {
                let Some(row) = test_dofs.get(e, j) else {
                    continue;
                };
                if psi == T::zero() {
                    continue;
                }
                for (i, &phi) in trial_matrix.row(k).iter().enumerate() {
                    if let Some(col) = trial_dofs.get(e, i) {
                        coo.push(row, col, psi * phi);
                    }
                }
            }
        }
    }
    Ok(CsrMatrix::from(&coo))
}
