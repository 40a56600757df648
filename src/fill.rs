//! Building fields from descriptions: ordered lists of `(selector, value)` pairs.
//!
//! Entries are applied in order, so later entries overwrite earlier ones where they overlap.
use crate::element::ElementType;
use crate::error::Error;
use crate::field::{FeField, Field, IpField};
use crate::filter::Selector;
use crate::mesh::{ElementBlock, Mesh};
use crate::numbering::DofNumbering;
use crate::quadrature::IntegrationRules;
use crate::space::{ElementSpace, Space};
use crate::Real;
use eyre::WrapErr;
use nalgebra::allocator::Allocator;
use nalgebra::{DMatrix, DefaultAllocator, DimName, OPoint, OVector, Point3, Scalar};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A constant or a function of the physical position.
pub enum DescriptionValue<T: Scalar, D>
where
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    Constant(T),
    Function(Box<dyn Fn(&OPoint<T, D>) -> T>),
}

impl<T, D> DescriptionValue<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    pub fn function(f: impl Fn(&OPoint<T, D>) -> T + 'static) -> Self {
        Self::Function(Box::new(f))
    }
}

impl<T, D> Debug for DescriptionValue<T, D>
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

pub type FieldDescription<T, D> = Vec<(Selector, DescriptionValue<T, D>)>;

/// The kind of field [`create_field_from_description`] builds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Interpolation in the geometric space, one DOF per node.
    Isoparametric,
    /// One value per element.
    ElementConstant,
    /// Values at the points of the `LagrangeIsoParam` rules.
    IntegrationPoint,
}

/// Physical positions of reference points of an element, as rows.
fn physical_points<T, D>(
    mesh: &Mesh<T, D>,
    block: &ElementBlock,
    element: usize,
    geometric_values: &DMatrix<T>,
) -> Vec<OPoint<T, D>>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let positions = geometric_values * mesh.element_node_matrix(block, element);
    (0..positions.nrows())
        .map(|i| OPoint::from(OVector::<T, D>::from_fn(|k, _| positions[(i, k)])))
        .collect()
}

fn geometric_values_at<T: Real>(element_type: ElementType, points: &[Point3<T>]) -> DMatrix<T> {
    ElementSpace::isoparametric(element_type)
        .at_points(points)
        .values
}

/// Writes the description into the DOFs of a finite element field.
///
/// Element entries set every assigned DOF of the selected elements, evaluating functions at the
/// physical position of the DOF's nodal point. Node entries set the DOF attached to each node.
pub fn fill_fe_field<T, D>(field: &mut FeField<T, D>, description: &[(Selector, DescriptionValue<T, D>)]) -> eyre::Result<()>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let mesh = Arc::clone(field.mesh());
    let space = Arc::clone(field.space());
    let numbering = Arc::clone(field.numbering());
    let name = field.name().to_string();

    for (entry, (selector, value)) in description.iter().enumerate() {
        let context = || format!("failed to apply entry {entry} of the description of `{name}`");
        match selector {
            Selector::Elements(elements) => {
                for (ty, ids) in elements.select(&mesh).iter() {
                    let element_space = space
                        .get(ty)
                        .ok_or_else(|| Error::MissingElementSpace {
                            element_type: ty,
                            space: space.descriptor().to_string(),
                        })
                        .wrap_err_with(context)?;
                    let (Some(dofs), Some(block)) = (numbering.get(ty), mesh.block(ty)) else {
                        continue;
                    };
                    let geometric = match value {
                        DescriptionValue::Function(_) => Some(geometric_values_at(ty, element_space.nodal_points())),
                        DescriptionValue::Constant(_) => None,
                    };
                    for &e in &ids {
                        let positions = geometric
                            .as_ref()
                            .map(|g| physical_points(&mesh, block, e, g));
                        for (slot, dof) in dofs.row(e).iter().enumerate() {
                            let Some(dof) = *dof else {
                                continue;
                            };
                            field.data_mut()[dof] = match (value, &positions) {
                                (DescriptionValue::Constant(c), _) => *c,
                                (DescriptionValue::Function(f), Some(positions)) => f(&positions[slot]),
                                (DescriptionValue::Function(_), None) => continue,
                            };
                        }
                    }
                }
            }
            Selector::Nodes(nodes) => {
                for node in nodes.select(&mesh) {
                    let dof = numbering
                        .dof_of_point(node)
                        .ok_or(Error::MissingPointDof { node })
                        .wrap_err_with(context)?;
                    field.data_mut()[dof] = match value {
                        DescriptionValue::Constant(c) => *c,
                        DescriptionValue::Function(f) => f(&mesh.vertices()[node]),
                    };
                }
            }
        }
    }
    Ok(())
}

/// Writes the description into an integration-point field.
///
/// Element entries set every point of the selected elements that have a row, evaluating
/// functions at the physical position of the point. Node entries are rejected.
pub fn fill_ip_field<T, D>(field: &mut IpField<T, D>, description: &[(Selector, DescriptionValue<T, D>)]) -> eyre::Result<()>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    let mesh = Arc::clone(field.mesh());
    let rules = Arc::clone(field.rules());
    let name = field.name().to_string();

    for (entry, (selector, value)) in description.iter().enumerate() {
        let context = || format!("failed to apply entry {entry} of the description of `{name}`");
        let Selector::Elements(elements) = selector else {
            return Err(Error::UnsupportedSelector {
                context: "fill an integration-point field",
            })
            .wrap_err_with(context);
        };
        for (ty, ids) in elements.select(&mesh).iter() {
            let rule = rules
                .get(ty)
                .ok_or(Error::MissingRule { element_type: ty })
                .wrap_err_with(context)?;
            let Some(block) = mesh.block(ty) else {
                continue;
            };
            let geometric = match value {
                DescriptionValue::Function(_) => Some(geometric_values_at(ty, rule.points())),
                DescriptionValue::Constant(_) => None,
            };
            for &e in &ids {
                let Some(row) = field.row_of(ty, e) else {
                    continue;
                };
                let row_values: Vec<T> = match (value, &geometric) {
                    (DescriptionValue::Function(f), Some(g)) => physical_points(&mesh, block, e, g)
                        .iter()
                        .map(|p| f(p))
                        .collect(),
                    (DescriptionValue::Constant(c), _) => vec![*c; rule.len()],
                    (DescriptionValue::Function(_), None) => continue,
                };
                if let Some(data) = field.data_for_mut(ty) {
                    for (k, v) in row_values.into_iter().enumerate() {
                        data[(row, k)] = v;
                    }
                }
            }
        }
    }
    Ok(())
}

/// A new field of the given kind, zero outside the described regions.
pub fn create_field_from_description<T, D>(
    name: &str,
    mesh: Arc<Mesh<T, D>>,
    description: &[(Selector, DescriptionValue<T, D>)],
    kind: FieldKind,
) -> eyre::Result<Field<T, D>>
where
    T: Real,
    D: DimName,
    DefaultAllocator: Allocator<T, D>,
{
    match kind {
        FieldKind::Isoparametric | FieldKind::ElementConstant => {
            let (space, numbering) = if kind == FieldKind::Isoparametric {
                let space = Space::lagrange_geo();
                let numbering = DofNumbering::from_connectivity(&mesh, &space)?;
                (space, numbering)
            } else {
                let space = Space::lagrange_p0();
                let numbering = DofNumbering::general(&mesh, &space, None, false)?;
                (space, numbering)
            };
            let mut field = FeField::allocate(name, mesh, Arc::new(space), Arc::new(numbering), T::zero());
            fill_fe_field(&mut field, description)?;
            Ok(Field::Fe(field))
        }
        FieldKind::IntegrationPoint => {
            let rules = Arc::new(IntegrationRules::named("LagrangeIsoParam")?);
            let mut field = IpField::allocate(name, mesh, rules, T::zero());
            fill_ip_field(&mut field, description)?;
            Ok(Field::Ip(field))
        }
    }
}
