//! Fields over a mesh: DOF-indexed finite element fields and integration-point fields.
use crate::element::ElementType;
use crate::error::Error;
use crate::filter::{ElementSelection, ElementSelector};
use crate::mesh::Mesh;
use crate::numbering::{numbering_correspondence, DofNumbering};
use crate::quadrature::{IntegrationRule, IntegrationRules};
use crate::space::Space;
use crate::Real;
use nalgebra::allocator::Allocator;
use nalgebra::{DMatrix, DVector, DefaultAllocator, DimName, Point3, Scalar};
use std::collections::BTreeMap;
use std::sync::Arc;

mod conversion;

pub use conversion::*;

/// A field given by its DOF values in a numbering of a space over a mesh.
#[derive(Debug, Clone)]
pub struct FeField<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    name: String,
    mesh: Arc<Mesh<T, D>>,
    space: Arc<Space<T>>,
    numbering: Arc<DofNumbering>,
    data: DVector<T>,
}

impl<T, D> FeField<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Fails if the data length differs from the numbering size.
    pub fn new(
        name: impl Into<String>,
        mesh: Arc<Mesh<T, D>>,
        space: Arc<Space<T>>,
        numbering: Arc<DofNumbering>,
        data: DVector<T>,
    ) -> Result<Self, Error> {
        if data.len() != numbering.size() {
            return Err(Error::DataSizeMismatch {
                expected: numbering.size(),
                actual: data.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            mesh,
            space,
            numbering,
            data,
        })
    }

    /// A field with every DOF set to `value`.
    pub fn allocate(
        name: impl Into<String>,
        mesh: Arc<Mesh<T, D>>,
        space: Arc<Space<T>>,
        numbering: Arc<DofNumbering>,
        value: T,
    ) -> Self {
        let data = DVector::from_element(numbering.size(), value);
        Self {
            name: name.into(),
            mesh,
            space,
            numbering,
            data,
        }
    }

    /// A field on the same mesh, space and numbering with other data.
    pub fn with_data(&self, name: impl Into<String>, data: DVector<T>) -> Result<Self, Error> {
        Self::new(
            name,
            Arc::clone(&self.mesh),
            Arc::clone(&self.space),
            Arc::clone(&self.numbering),
            data,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn mesh(&self) -> &Arc<Mesh<T, D>> {
        &self.mesh
    }

    pub fn space(&self) -> &Arc<Space<T>> {
        &self.space
    }

    pub fn numbering(&self) -> &Arc<DofNumbering> {
        &self.numbering
    }

    pub fn data(&self) -> &DVector<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    pub fn set_data(&mut self, data: DVector<T>) -> Result<(), Error> {
        if data.len() != self.numbering.size() {
            return Err(Error::DataSizeMismatch {
                expected: self.numbering.size(),
                actual: data.len(),
            });
        }
        self.data = data;
        Ok(())
    }

    pub fn into_data(self) -> DVector<T> {
        self.data
    }

    /// Whether both fields live on the same mesh, space and numbering.
    pub fn shares_numbering_with(&self, other: &Self) -> bool {
        self.mesh.revision() == other.mesh.revision()
            && self.space == other.space
            && (Arc::ptr_eq(&self.numbering, &other.numbering) || self.numbering == other.numbering)
    }

    /// Interpolated value at reference point `xi` of an element, if all its DOFs are assigned.
    pub fn evaluate_at(&self, element_type: ElementType, element: usize, xi: &Point3<T>) -> Option<T> {
        let dofs = self
            .numbering
            .get(element_type)?
            .complete_row(element)?;
        let values = self.space.get(element_type)?.evaluate_basis(xi);
        Some(
            dofs.iter()
                .zip(values.iter())
                .fold(T::zero(), |acc, (&dof, &n)| acc + n * self.data[dof]),
        )
    }

    /// Values at the mesh nodes. Nodes without a point-attached DOF get `fill`.
    pub fn point_representation(&self, fill: T) -> DVector<T> {
        let mut result = DVector::from_element(self.mesh.num_nodes(), fill);
        for (node, dof) in self.numbering.dof_to_point() {
            result[node] = self.data[dof];
        }
        result
    }

    /// Values at the element centroids, by global element index. Elements with unassigned DOFs
    /// get `fill`.
    pub fn cell_representation(&self, fill: T) -> DVector<T> {
        let mut result = DVector::from_element(self.mesh.num_elements(), fill);
        for block in self.mesh.blocks() {
            let ty = block.element_type();
            let offset = self.mesh.global_offset(ty);
            let centroid = ty.shape().centroid();
            for e in 0..block.len() {
                if let Some(value) = self.evaluate_at(ty, e, &centroid) {
                    result[offset + e] = value;
                }
            }
        }
        result
    }

    /// DOF pairs `(self, other)` that occupy the same element slot.
    ///
    /// Both fields must live on the same mesh and space unless `force` is set.
    pub fn numbering_correspondence(&self, other: &Self, force: bool) -> Result<(Vec<usize>, Vec<usize>), Error> {
        if !force {
            if self.mesh.revision() != other.mesh.revision() {
                return Err(Error::IncompatibleFields {
                    reason: format!("`{}` and `{}` live on different meshes", self.name, other.name),
                });
            }
            if self.space != other.space {
                return Err(Error::IncompatibleFields {
                    reason: format!(
                        "`{}` uses space {} but `{}` uses {}",
                        self.name, self.space, other.name, other.space
                    ),
                });
            }
        }
        Ok(numbering_correspondence(&self.numbering, &other.numbering))
    }
}

/// Values at the integration points of a rule set, one `num_elements x num_points` matrix per
/// element type.
///
/// A restricted field only stores rows for a subset of the elements of each type.
#[derive(Debug, Clone)]
pub struct IpField<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    name: String,
    mesh: Arc<Mesh<T, D>>,
    rules: Arc<IntegrationRules<T>>,
    data: BTreeMap<ElementType, DMatrix<T>>,
    restriction: Option<BTreeMap<ElementType, Vec<usize>>>,
}

impl<T, D> IpField<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    /// Every element of every type with a rule gets a row filled with `value`.
    pub fn allocate(
        name: impl Into<String>,
        mesh: Arc<Mesh<T, D>>,
        rules: Arc<IntegrationRules<T>>,
        value: T,
    ) -> Self {
        let data = mesh
            .blocks()
            .filter_map(|block| {
                let rule = rules.get(block.element_type())?;
                Some((block.element_type(), DMatrix::from_element(block.len(), rule.len(), value)))
            })
            .collect();
        Self {
            name: name.into(),
            mesh,
            rules,
            data,
            restriction: None,
        }
    }

    /// Only the selected elements get a row.
    pub fn allocate_restricted(
        name: impl Into<String>,
        mesh: Arc<Mesh<T, D>>,
        rules: Arc<IntegrationRules<T>>,
        selection: &ElementSelection,
        value: T,
    ) -> Self {
        let mut data = BTreeMap::new();
        let mut restriction = BTreeMap::new();
        for (ty, ids) in selection.iter() {
            if let Some(rule) = rules.get(ty) {
                data.insert(ty, DMatrix::from_element(ids.len(), rule.len(), value));
                restriction.insert(ty, ids);
            }
        }
        Self {
            name: name.into(),
            mesh,
            rules,
            data,
            restriction: Some(restriction),
        }
    }

    /// A field from per-type data. Every matrix must have one column per rule point, and one row
    /// per element (or per restricted element).
    ///
    /// Restricted element ids are sorted, together with their rows. Repeated ids and ids past
    /// the end of a block are rejected.
    pub fn from_data(
        name: impl Into<String>,
        mesh: Arc<Mesh<T, D>>,
        rules: Arc<IntegrationRules<T>>,
        mut data: BTreeMap<ElementType, DMatrix<T>>,
        mut restriction: Option<BTreeMap<ElementType, Vec<usize>>>,
    ) -> Result<Self, Error> {
        for (ty, values) in &data {
            let rule = rules
                .get(*ty)
                .ok_or(Error::MissingRule { element_type: *ty })?;
            let rows = match &restriction {
                Some(restriction) => restriction.get(ty).map(Vec::len).unwrap_or(0),
                None => mesh.block(*ty).map(|block| block.len()).unwrap_or(0),
            };
            for (expected, actual) in [(rows, values.nrows()), (rule.len(), values.ncols())] {
                if expected != actual {
                    return Err(Error::DataSizeMismatch { expected, actual });
                }
            }
        }
        for (&ty, ids) in restriction.iter_mut().flatten() {
            let invalid = |reason: String| Error::InvalidRestriction { element_type: ty, reason };
            let num_elements = mesh.block(ty).map_or(0, |block| block.len());
            if let Some(&id) = ids.iter().find(|&&id| id >= num_elements) {
                return Err(invalid(format!("element {id} does not exist")));
            }
            if ids.windows(2).all(|pair| pair[0] < pair[1]) {
                continue;
            }
            let mut order: Vec<usize> = (0..ids.len()).collect();
            order.sort_by_key(|&i| ids[i]);
            let sorted: Vec<usize> = order.iter().map(|&i| ids[i]).collect();
            if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
                return Err(invalid(format!("element {} appears more than once", pair[0])));
            }
            if let Some(values) = data.get_mut(&ty) {
                let permuted = values.select_rows(&order);
                *values = permuted;
            }
            *ids = sorted;
        }
        Ok(Self {
            name: name.into(),
            mesh,
            rules,
            data,
            restriction,
        })
    }

    /// A field with the same layout and other data.
    pub fn with_data(&self, name: impl Into<String>, data: BTreeMap<ElementType, DMatrix<T>>) -> Result<Self, Error> {
        Self::from_data(
            name,
            Arc::clone(&self.mesh),
            Arc::clone(&self.rules),
            data,
            self.restriction.clone(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn mesh(&self) -> &Arc<Mesh<T, D>> {
        &self.mesh
    }

    pub fn rules(&self) -> &Arc<IntegrationRules<T>> {
        &self.rules
    }

    pub fn rule(&self, element_type: ElementType) -> Option<&IntegrationRule<T>> {
        self.rules.get(element_type)
    }

    pub fn data(&self) -> &BTreeMap<ElementType, DMatrix<T>> {
        &self.data
    }

    pub fn data_for(&self, element_type: ElementType) -> Option<&DMatrix<T>> {
        self.data.get(&element_type)
    }

    pub fn data_for_mut(&mut self, element_type: ElementType) -> Option<&mut DMatrix<T>> {
        self.data.get_mut(&element_type)
    }

    pub fn is_restricted(&self) -> bool {
        self.restriction.is_some()
    }

    pub fn restriction(&self) -> Option<&BTreeMap<ElementType, Vec<usize>>> {
        self.restriction.as_ref()
    }

    /// Local ids of the elements with a row, in row order.
    pub fn element_ids(&self, element_type: ElementType) -> Vec<usize> {
        match &self.restriction {
            Some(restriction) => restriction
                .get(&element_type)
                .cloned()
                .unwrap_or_default(),
            None => match self.data.get(&element_type) {
                Some(values) => (0..values.nrows()).collect(),
                None => Vec::new(),
            },
        }
    }

    /// The row holding local element `element`.
    pub fn row_of(&self, element_type: ElementType, element: usize) -> Option<usize> {
        let values = self.data.get(&element_type)?;
        match &self.restriction {
            Some(restriction) => restriction
                .get(&element_type)?
                .binary_search(&element)
                .ok(),
            None => (element < values.nrows()).then_some(element),
        }
    }

    pub fn value(&self, element_type: ElementType, element: usize, point: usize) -> Option<T> {
        let row = self.row_of(element_type, element)?;
        self.data
            .get(&element_type)?
            .get((row, point))
            .copied()
    }

    /// The field restricted to the selected elements. Selected elements without a row are left
    /// out.
    pub fn restricted(&self, selector: &ElementSelector) -> Self {
        let selection = selector.select(&self.mesh);
        let mut data = BTreeMap::new();
        let mut restriction = BTreeMap::new();
        for (ty, ids) in selection.iter() {
            let Some(values) = self.data.get(&ty) else {
                continue;
            };
            let (rows, kept): (Vec<usize>, Vec<usize>) = ids
                .iter()
                .filter_map(|&e| self.row_of(ty, e).map(|row| (row, e)))
                .unzip();
            data.insert(ty, values.select_rows(rows.iter()));
            restriction.insert(ty, kept);
        }
        Self {
            name: self.name.clone(),
            mesh: Arc::clone(&self.mesh),
            rules: Arc::clone(&self.rules),
            data,
            restriction: Some(restriction),
        }
    }

    /// Mean over the integration points of each element, by global element index. Elements
    /// without a row get `fill`.
    pub fn cell_representation(&self, fill: T) -> DVector<T> {
        let mut result = DVector::from_element(self.mesh.num_elements(), fill);
        for (&ty, values) in &self.data {
            if values.ncols() == 0 {
                continue;
            }
            let offset = self.mesh.global_offset(ty);
            for (row, e) in self.element_ids(ty).into_iter().enumerate() {
                result[offset + e] = values.row(row).mean();
            }
        }
        result
    }

    /// All values, per element type in order, each matrix in column-major order.
    pub fn flattened(&self) -> DVector<T> {
        let values: Vec<T> = self
            .data
            .values()
            .flat_map(|m| m.as_slice().iter().copied())
            .collect();
        DVector::from_vec(values)
    }

    /// The inverse of [`flattened`](Self::flattened): a field of the same layout.
    pub fn with_flattened(&self, name: impl Into<String>, values: &DVector<T>) -> Result<Self, Error> {
        let expected: usize = self.data.values().map(|m| m.len()).sum();
        if values.len() != expected {
            return Err(Error::DataSizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        let mut start = 0;
        let mut data = BTreeMap::new();
        for (&ty, m) in &self.data {
            let slice = &values.as_slice()[start..start + m.len()];
            data.insert(ty, DMatrix::from_column_slice(m.nrows(), m.ncols(), slice));
            start += m.len();
        }
        self.with_data(name, data)
    }

    /// Whether both fields store the same elements under the same rule.
    pub fn has_layout_of(&self, other: &Self) -> bool {
        self.mesh.revision() == other.mesh.revision()
            && self.rules == other.rules
            && self.restriction == other.restriction
            && self
                .data
                .iter()
                .map(|(ty, m)| (*ty, m.shape()))
                .eq(other.data.iter().map(|(ty, m)| (*ty, m.shape())))
    }
}

/// Either kind of field.
#[derive(Debug, Clone)]
pub enum Field<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    Fe(FeField<T, D>),
    Ip(IpField<T, D>),
}

impl<T, D> Field<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn name(&self) -> &str {
        match self {
            Self::Fe(field) => field.name(),
            Self::Ip(field) => field.name(),
        }
    }

    pub fn mesh(&self) -> &Arc<Mesh<T, D>> {
        match self {
            Self::Fe(field) => field.mesh(),
            Self::Ip(field) => field.mesh(),
        }
    }

    pub fn as_fe(&self) -> Option<&FeField<T, D>> {
        match self {
            Self::Fe(field) => Some(field),
            Self::Ip(_) => None,
        }
    }

    pub fn as_ip(&self) -> Option<&IpField<T, D>> {
        match self {
            Self::Ip(field) => Some(field),
            Self::Fe(_) => None,
        }
    }

    pub fn into_fe(self) -> Option<FeField<T, D>> {
        match self {
            Self::Fe(field) => Some(field),
            Self::Ip(_) => None,
        }
    }

    pub fn into_ip(self) -> Option<IpField<T, D>> {
        match self {
            Self::Ip(field) => Some(field),
            Self::Fe(_) => None,
        }
    }

    pub fn cell_representation(&self, fill: T) -> DVector<T> {
        match self {
            Self::Fe(field) => field.cell_representation(fill),
            Self::Ip(field) => field.cell_representation(fill),
        }
    }
}

impl<T, D> From<FeField<T, D>> for Field<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn from(field: FeField<T, D>) -> Self {
        Self::Fe(field)
    }
}

impl<T, D> From<IpField<T, D>> for Field<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn from(field: IpField<T, D>) -> Self {
        Self::Ip(field)
    }
}
