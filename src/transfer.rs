//! Transfer operators between finite element fields and integration-point fields.
use crate::element::ElementType;
use crate::error::Error;
use crate::field::{FeField, Field, IpField};
use crate::filter::{ElementSelection, ElementSelector};
use crate::mesh::Mesh;
use crate::numbering::{DofNumbering, NumberingBuilder};
use crate::quadrature::{IntegrationRules, RuleSpec};
use crate::space::Space;
use crate::weak_form::{assemble_evaluation, EvaluationForm, TrialAtPoints, TrialQuantity};
use crate::Real;
use log::{debug, warn};
use nalgebra::allocator::Allocator;
use nalgebra::{DMatrix, DVector, DefaultAllocator, DimName, Scalar};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cut-off for singular values, relative to the largest one.
fn singular_value_cutoff<T: Real>(nrows: usize, ncols: usize, max_singular_value: T) -> T {
    T::default_epsilon() * nalgebra::convert::<f64, T>(nrows.max(ncols) as f64) * max_singular_value
}

/// Moore-Penrose pseudo-inverse through the SVD.
///
/// Singular values below `eps * max(m, n) * σ_max` count as zero, which gives the minimum-norm
/// least-squares solution for rank-deficient matrices.
pub fn pseudo_inverse<T: Real>(matrix: &DMatrix<T>) -> Result<DMatrix<T>, Error> {
    let (m, n) = matrix.shape();
    if m == 0 || n == 0 {
        return Ok(DMatrix::zeros(n, m));
    }
    let svd = matrix.clone().svd(true, true);
    let max_sv = svd
        .singular_values
        .iter()
        .fold(T::zero(), |acc, &s| acc.max(s));
    let cutoff = singular_value_cutoff(m, n, max_sv);
    let rank = svd
        .singular_values
        .iter()
        .filter(|&&s| s > cutoff)
        .count();
    if rank < m.min(n) {
        debug!("least squares: rank {rank} for a {m}x{n} system");
    }
    svd.pseudo_inverse(cutoff)
        .map_err(|reason| Error::LeastSquares { reason })
}

/// Minimum-norm least-squares solution `X` of `N X = I`.
pub fn least_squares_identity<T: Real>(n: &DMatrix<T>) -> Result<DMatrix<T>, Error> {
    pseudo_inverse(n)
}

/// Per element type, the operator mapping values at the integration points to the DOFs of the
/// space's shape functions (`num_shape_functions x num_points`).
pub fn elementwise_ip_to_fe_operator<T: Real>(
    rules: &IntegrationRules<T>,
    space: &Space<T>,
) -> Result<BTreeMap<ElementType, DMatrix<T>>, Error> {
    let mut result = BTreeMap::new();
    for (ty, rule) in rules.iter() {
        let Some(element_space) = space.get(ty) else {
            continue;
        };
        let n = element_space.at_points(rule.points()).values;
        result.insert(ty, least_squares_identity(&n)?);
    }
    Ok(result)
}

/// Per element type, the operator mapping nodal values of `origin` to the DOFs of `target`
/// (`target functions x origin functions`).
pub fn elementwise_fe_to_fe_operator<T: Real>(
    origin: &Space<T>,
    target: &Space<T>,
) -> Result<BTreeMap<ElementType, DMatrix<T>>, Error> {
    let mut result = BTreeMap::new();
    for ty in origin.element_types() {
        let (Some(origin_space), Some(target_space)) = (origin.get(ty), target.get(ty)) else {
            continue;
        };
        let n = target_space
            .at_points(origin_space.nodal_points())
            .values;
        result.insert(ty, least_squares_identity(&n)?);
    }
    Ok(result)
}

/// How the global operator is assembled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TransferMethod {
    /// Element-wise evaluation of the source basis.
    Direct,
    /// Assembly of the evaluation weak form against an integration-point test space.
    WeakForm,
    /// The weak form for derivatives, direct evaluation otherwise.
    #[default]
    Auto,
}

/// The operator of one element type.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorBlock<T: Scalar> {
    element_ids: Vec<usize>,
    num_points: usize,
    matrix: CsrMatrix<T>,
}

impl<T: Scalar> OperatorBlock<T> {
    /// Local ids of the elements the rows refer to.
    pub fn element_ids(&self) -> &[usize] {
        &self.element_ids
    }

    /// Row `ip * num_elements + e` holds integration point `ip` of the `e`-th element.
    pub fn matrix(&self) -> &CsrMatrix<T> {
        &self.matrix
    }
}

/// Linear map from the DOFs of a numbering to the integration points of a rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOperator<T: Scalar> {
    rules: Arc<IntegrationRules<T>>,
    derivative: Option<usize>,
    num_dofs: usize,
    restricted: bool,
    blocks: BTreeMap<ElementType, OperatorBlock<T>>,
}

impl<T: Real> TransferOperator<T> {
    /// Builds the operator for the elements selected by `filter` (all elements by default).
    ///
    /// Element types without rule, space definition or DOF table are left out of the operator.
    #[allow(clippy::too_many_arguments)]
    pub fn build<D>(
        mesh: &Mesh<T, D>,
        space: &Space<T>,
        numbering: &DofNumbering,
        rules: Arc<IntegrationRules<T>>,
        derivative: Option<usize>,
        filter: Option<&ElementSelector>,
        method: TransferMethod,
    ) -> Result<Self, Error>
    where
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        if let Some(component) = derivative {
            if component >= D::dim() {
                return Err(Error::InvalidDerivative {
                    component,
                    dimension: D::dim(),
                });
            }
        }
        let selection = match filter {
            Some(selector) => selector.select(mesh),
            None => ElementSelection::full(mesh),
        };
        let quantity = TrialQuantity::from(derivative);
        let weak_form = match method {
            TransferMethod::Direct => false,
            TransferMethod::WeakForm => true,
            TransferMethod::Auto => derivative.is_some(),
        };

        let mut blocks = BTreeMap::new();
        for (ty, ids) in selection.iter() {
            let (Some(rule), Some(element_space), Some(dofs), Some(block)) =
                (rules.get(ty), space.get(ty), numbering.get(ty), mesh.block(ty))
            else {
                debug!("transfer operator: {ty} skipped");
                continue;
            };
            let shape = (ids.len() * rule.len(), numbering.size());

            let matrix = if weak_form {
                let type_rules = rules.restricted_to(&[ty]);
                let test_space = Space::integration_points(&type_rules);
                let mut builder = NumberingBuilder::new(mesh, &test_space, false);
                builder.number_bulk(&ElementSelection::from_ids(ty, ids.iter().copied()))?;
                let test_numbering = builder.finish();
                let (Some(test_element_space), Some(test_dofs)) = (test_space.get(ty), test_numbering.get(ty)) else {
                    continue;
                };
                assemble_evaluation(
                    EvaluationForm { trial: quantity },
                    mesh,
                    ty,
                    &ids,
                    (element_space, dofs),
                    (test_element_space, test_dofs),
                    rule.points(),
                    shape,
                )?
            } else {
                let trial = TrialAtPoints::new(ty, element_space, rule.points(), quantity);
                let mut coo = CooMatrix::new(shape.0, shape.1);
                for (position, &e) in ids.iter().enumerate() {
                    let values = trial.element_matrix(mesh, block, e, quantity)?;
                    for k in 0..rule.len() {
                        let row = k * ids.len() + position;
                        for (i, &value) in values.row(k).iter().enumerate() {
                            if let Some(col) = dofs.get(e, i) {
                                coo.push(row, col, value);
                            }
                        }
                    }
                }
                CsrMatrix::from(&coo)
            };

            debug!(
                "transfer operator: {ty}, {} elements, {} points, {} nonzeros",
                ids.len(),
                rule.len(),
                matrix.nnz()
            );
            blocks.insert(
                ty,
                OperatorBlock {
                    element_ids: ids,
                    num_points: rule.len(),
                    matrix,
                },
            );
        }

        Ok(Self {
            rules,
            derivative,
            num_dofs: numbering.size(),
            restricted: filter.is_some(),
            blocks,
        })
    }

    /// The operator for the mesh, space and numbering of a field.
    pub fn for_field<D>(
        field: &FeField<T, D>,
        rules: Arc<IntegrationRules<T>>,
        derivative: Option<usize>,
        filter: Option<&ElementSelector>,
        method: TransferMethod,
    ) -> Result<Self, Error>
    where
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        Self::build(
            field.mesh(),
            field.space(),
            field.numbering(),
            rules,
            derivative,
            filter,
            method,
        )
    }

    pub fn rules(&self) -> &Arc<IntegrationRules<T>> {
        &self.rules
    }

    pub fn derivative(&self) -> Option<usize> {
        self.derivative
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn block(&self, element_type: ElementType) -> Option<&OperatorBlock<T>> {
        self.blocks.get(&element_type)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (ElementType, &OperatorBlock<T>)> {
        self.blocks.iter().map(|(ty, block)| (*ty, block))
    }

    /// Values at the integration points, `num_elements x num_points` per element type.
    pub fn apply_to_data(&self, data: &DVector<T>) -> Result<BTreeMap<ElementType, DMatrix<T>>, Error> {
        if data.len() != self.num_dofs {
            return Err(Error::DataSizeMismatch {
                expected: self.num_dofs,
                actual: data.len(),
            });
        }
        Ok(self
            .blocks
            .iter()
            .map(|(ty, block)| {
                let values: Vec<T> = block
                    .matrix
                    .row_iter()
                    .map(|row| {
                        row.col_indices()
                            .iter()
                            .zip(row.values())
                            .fold(T::zero(), |acc, (&j, &v)| acc + v * data[j])
                    })
                    .collect();
                let reshaped = DMatrix::from_column_slice(block.element_ids.len(), block.num_points, &values);
                (*ty, reshaped)
            })
            .collect())
    }

    /// The integration-point field of a finite element field.
    pub fn apply<D>(&self, field: &FeField<T, D>) -> Result<IpField<T, D>, Error>
    where
        D: DimName,
        DefaultAllocator: Allocator<T, D>,
    {
        if field.numbering().size() != self.num_dofs {
            return Err(Error::IncompatibleFields {
                reason: format!(
                    "`{}` has {} DOFs but the operator expects {}",
                    field.name(),
                    field.numbering().size(),
                    self.num_dofs
                ),
            });
        }
        let values = self.apply_to_data(field.data())?;
        let mesh = Arc::clone(field.mesh());
        if self.restricted {
            let restriction = self
                .blocks
                .iter()
                .map(|(ty, block)| (*ty, block.element_ids.clone()))
                .collect();
            IpField::from_data(field.name(), mesh, Arc::clone(&self.rules), values, Some(restriction))
        } else {
            let mut result = IpField::allocate(field.name(), mesh, Arc::clone(&self.rules), T::zero());
            for (ty, block_values) in values {
                if let Some(target) = result.data_for_mut(ty) {
                    if target.shape() == block_values.shape() {
                        *target = block_values;
                    }
                }
            }
            Ok(result)
        }
    }
}

/// Values (or one derivative component) of a field at the points of a rule set.
pub fn transfer_fe_field_to_ip_field<T, D>(
    field: &FeField<T, D>,
    rule: impl Into<RuleSpec<T>>,
    derivative: Option<usize>,
    filter: Option<&ElementSelector>,
) -> Result<IpField<T, D>, Error>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let rules = rule.into().resolve()?;
    let op = TransferOperator::for_field(field, rules, derivative, filter, TransferMethod::Auto)?;
    op.apply(field)
}

/// One field per coordinate, named `posx`, `posy` and `posz`, holding the physical position of
/// each integration point.
pub fn transfer_positions_to_ip_fields<T, D>(
    mesh: &Arc<Mesh<T, D>>,
    rule: impl Into<RuleSpec<T>>,
    filter: Option<&ElementSelector>,
) -> Result<Vec<IpField<T, D>>, Error>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    const NAMES: [&str; 3] = ["posx", "posy", "posz"];
    let rules = rule.into().resolve()?;
    let space = Arc::new(Space::lagrange_geo());
    let numbering = Arc::new(DofNumbering::from_connectivity(mesh, &space)?);
    let op = TransferOperator::build(
        mesh,
        &space,
        &numbering,
        rules,
        None,
        filter,
        TransferMethod::Direct,
    )?;
    (0..D::dim())
        .map(|k| {
            let coordinates = DVector::from_iterator(mesh.num_nodes(), mesh.vertices().iter().map(|v| v[k]));
            let field = FeField::new(
                NAMES.get(k).copied().unwrap_or("pos"),
                Arc::clone(mesh),
                Arc::clone(&space),
                Arc::clone(&numbering),
                coordinates,
            )?;
            op.apply(&field)
        })
        .collect()
}

/// A finite element field seen at the points of a rule set, with lazily computed and cached
/// values and derivatives.
#[derive(Debug)]
pub struct IntegrationPointWrapper<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    field: FeField<T, D>,
    rules: Arc<IntegrationRules<T>>,
    filter: Option<ElementSelector>,
    values: OnceCell<Arc<IpField<T, D>>>,
    derivatives: RefCell<BTreeMap<usize, Arc<IpField<T, D>>>>,
}

impl<T, D> IntegrationPointWrapper<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn new(field: FeField<T, D>, rules: Arc<IntegrationRules<T>>, filter: Option<ElementSelector>) -> Self {
        Self {
            field,
            rules,
            filter,
            values: OnceCell::new(),
            derivatives: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.field.name()
    }

    pub fn field(&self) -> &FeField<T, D> {
        &self.field
    }

    pub fn rules(&self) -> &Arc<IntegrationRules<T>> {
        &self.rules
    }

    /// The values at the integration points.
    pub fn ip_field(&self) -> Result<Arc<IpField<T, D>>, Error> {
        if let Some(values) = self.values.get() {
            return Ok(Arc::clone(values));
        }
        let values = Arc::new(self.transfer(None)?);
        Ok(Arc::clone(self.values.get_or_init(|| values)))
    }

    /// One component of the physical gradient at the integration points.
    pub fn derivative(&self, component: usize) -> Result<Arc<IpField<T, D>>, Error> {
        if let Some(cached) = self.derivatives.borrow().get(&component) {
            return Ok(Arc::clone(cached));
        }
        let mut derivative = self.transfer(Some(component))?;
        derivative.set_name(format!("d{}/dx{}", self.field.name(), component));
        let derivative = Arc::new(derivative);
        self.derivatives
            .borrow_mut()
            .insert(component, Arc::clone(&derivative));
        Ok(derivative)
    }

    /// Drops the cached representations, for instance after the field data changed.
    pub fn reset_cache(&mut self) {
        self.values = OnceCell::new();
        self.derivatives.get_mut().clear();
    }

    pub fn field_mut(&mut self) -> &mut FeField<T, D> {
        self.reset_cache();
        &mut self.field
    }

    fn transfer(&self, derivative: Option<usize>) -> Result<IpField<T, D>, Error> {
        let op = TransferOperator::for_field(
            &self.field,
            Arc::clone(&self.rules),
            derivative,
            self.filter.as_ref(),
            TransferMethod::Auto,
        )?;
        op.apply(&self.field)
    }
}

/// Every field at the points of `rules`.
///
/// Finite element fields are transferred, integration-point fields on the same rules are kept
/// (restricted to the filter if one is given), integration-point fields on other rules are
/// skipped with a warning.
pub fn fields_at_ip<T, D>(
    fields: &[Field<T, D>],
    rules: &Arc<IntegrationRules<T>>,
    filter: Option<&ElementSelector>,
) -> Result<Vec<IpField<T, D>>, Error>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let mut result = Vec::with_capacity(fields.len());
    for field in fields {
        match field {
            Field::Fe(fe) => {
                let wrapper = IntegrationPointWrapper::new(fe.clone(), Arc::clone(rules), filter.cloned());
                result.push(wrapper.ip_field()?.as_ref().clone());
            }
            Field::Ip(ip) if ip.rules() == rules => {
                result.push(match filter {
                    Some(selector) => ip.restricted(selector),
                    None => ip.clone(),
                });
            }
            Field::Ip(ip) => {
                warn!(
                    "skipping `{}`: defined on rule {} instead of {}",
                    ip.name(),
                    ip.rules().key(),
                    rules.key()
                );
            }
        }
    }
    Ok(result)
}
