//! Discretization spaces: shape functions, nodal points and DOF attachments per element type.
use crate::element::{point_from_f64, ElementType, ReferenceShape};
use crate::error::Error;
use crate::quadrature::IntegrationRules;
use crate::Real;
use nalgebra::{DMatrix, DVector, Point3, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod basis;

pub use basis::{Basis, Knot, SimplexNode};

/// Which mesh entity a shape function's DOF is attached to.
///
/// Entity indices are local to the element: `node` indexes the element connectivity, `edge`
/// indexes [`ElementType::edges`] and `face` indexes [`ElementType::faces`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DofAttachment {
    Point { node: usize, component: Option<usize> },
    Cell { index: usize },
    Edge { edge: usize },
    Face { face: usize },
    Global { component: usize },
    IntegrationPoint { index: usize },
}

impl DofAttachment {
    pub fn point(node: usize) -> Self {
        Self::Point { node, component: None }
    }

    /// The textual tag of the attachment kind.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Point { .. } => "P",
            Self::Cell { .. } => "C",
            Self::Edge { .. } => "F2",
            Self::Face { .. } => "F",
            Self::Global { .. } => "G",
            Self::IntegrationPoint { .. } => "IP",
        }
    }

    /// Parses a `(tag, first, second)` attachment triple.
    ///
    /// `first` is the local entity (node, face or edge) and `second` the index within it.
    pub fn from_tag(tag: &str, first: usize, second: Option<usize>) -> Result<Self, Error> {
        let index = second.unwrap_or(0);
        match tag {
            "P" => Ok(Self::Point {
                node: first,
                component: second,
            }),
            "C" => Ok(Self::Cell { index }),
            "F" => Ok(Self::Face { face: first }),
            "F2" => Ok(Self::Edge { edge: first }),
            "G" => Ok(Self::Global { component: index }),
            "IP" => Ok(Self::IntegrationPoint { index }),
            _ => Err(Error::UnsupportedAttachment { tag: tag.to_string() }),
        }
    }
}

/// Basis values and reference gradients at a set of reference points.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisAtPoints<T: Scalar> {
    /// `num_points x num_functions`.
    pub values: DMatrix<T>,
    /// One `reference_dim x num_functions` matrix per point.
    pub gradients: Vec<DMatrix<T>>,
}

/// The shape functions of a space on one reference shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpace<T: Scalar> {
    name: String,
    shape: ReferenceShape,
    basis: Basis<T>,
    nodal_points: Vec<Point3<T>>,
    attachments: Vec<DofAttachment>,
}

impl<T: Real> ElementSpace<T> {
    /// Assembles an element space from its parts.
    ///
    /// There must be one nodal point and one attachment per basis function.
    pub fn new(
        name: impl Into<String>,
        shape: ReferenceShape,
        basis: Basis<T>,
        nodal_points: Vec<Point3<T>>,
        attachments: Vec<DofAttachment>,
    ) -> Result<Self, Error> {
        let expected = basis.num_functions();
        for actual in [nodal_points.len(), attachments.len()] {
            if actual != expected {
                return Err(Error::DataSizeMismatch { expected, actual });
            }
        }
        Ok(Self::from_parts(name, shape, basis, nodal_points, attachments))
    }

    fn from_parts(
        name: impl Into<String>,
        shape: ReferenceShape,
        basis: Basis<T>,
        nodal_points: Vec<Point3<T>>,
        attachments: Vec<DofAttachment>,
    ) -> Self {
        Self {
            name: name.into(),
            shape,
            basis,
            nodal_points,
            attachments,
        }
    }

    /// The space whose shape functions are the geometric interpolation of the element type.
    pub fn isoparametric(element_type: ElementType) -> Self {
        let nodes = element_type.reference_nodes_f64();
        let basis = match element_type {
            ElementType::Quad8 => Basis::serendipity(&nodes),
            _ => Basis::lagrange(
                element_type.shape(),
                if element_type.is_quadratic() { 2 } else { 1 },
                &nodes,
            ),
        };
        Self::from_parts(
            format!("{element_type}_Geo"),
            element_type.shape(),
            basis,
            nodes.iter().map(point_from_f64).collect(),
            (0..nodes.len()).map(DofAttachment::point).collect(),
        )
    }

    /// One function per element, evaluated at the centroid.
    pub fn cell_constant(shape: ReferenceShape) -> Self {
        let attachment = match shape {
            ReferenceShape::Point => DofAttachment::point(0),
            _ => DofAttachment::Cell { index: 0 },
        };
        Self::from_parts(
            format!("{shape:?}_P0_Lagrange"),
            shape,
            Basis::Constant,
            vec![shape.centroid()],
            vec![attachment],
        )
    }

    /// One function shared by all elements of the mesh.
    pub fn global_constant(shape: ReferenceShape) -> Self {
        Self::from_parts(
            format!("{shape:?}_Constant_Global"),
            shape,
            Basis::Constant,
            vec![shape.centroid()],
            vec![DofAttachment::Global { component: 0 }],
        )
    }

    pub fn lagrange_p1(shape: ReferenceShape) -> Self {
        if shape == ReferenceShape::Point {
            return Self::cell_constant(shape);
        }
        let nodes = shape.linear_element().reference_nodes_f64();
        Self::from_parts(
            format!("{shape:?}_P1_Lagrange"),
            shape,
            Basis::lagrange(shape, 1, &nodes),
            nodes.iter().map(point_from_f64).collect(),
            (0..nodes.len()).map(DofAttachment::point).collect(),
        )
    }

    /// Quadratic Lagrange functions with the extra DOFs attached to edges, faces and cells so
    /// that the space is usable on linear elements.
    pub fn lagrange_p2(shape: ReferenceShape) -> Self {
        if shape == ReferenceShape::Point {
            return Self::cell_constant(shape);
        }
        let linear = shape.linear_element();
        let vertices = linear.reference_nodes_f64();
        let mut nodes = vertices.clone();
        let mut attachments: Vec<_> = (0..vertices.len()).map(DofAttachment::point).collect();
        let center = |ids: &[usize]| {
            let mut c = [0.0; 3];
            for &i in ids {
                for k in 0..3 {
                    c[k] += vertices[i][k] / ids.len() as f64;
                }
            }
            c
        };

        match shape.dimension() {
            1 => {
                nodes.push(center(&[0, 1]));
                attachments.push(DofAttachment::Cell { index: 0 });
            }
            2 => {
                for (face, entity) in linear.faces().iter().enumerate() {
                    nodes.push(center(entity.nodes));
                    attachments.push(DofAttachment::Face { face });
                }
                if shape == ReferenceShape::Quadrilateral {
                    nodes.push(center(&[0, 1, 2, 3]));
                    attachments.push(DofAttachment::Cell { index: 0 });
                }
            }
            _ => {
                for (edge, entity) in linear.edges().iter().enumerate() {
                    nodes.push(center(entity.nodes));
                    attachments.push(DofAttachment::Edge { edge });
                }
                if shape == ReferenceShape::Hexahedron {
                    for (face, entity) in linear.faces().iter().enumerate() {
                        nodes.push(center(entity.nodes));
                        attachments.push(DofAttachment::Face { face });
                    }
                    nodes.push(center(&[0, 1, 2, 3, 4, 5, 6, 7]));
                    attachments.push(DofAttachment::Cell { index: 0 });
                }
            }
        }

        Self::from_parts(
            format!("{shape:?}_P2_Lagrange"),
            shape,
            Basis::lagrange(shape, 2, &nodes),
            nodes.iter().map(point_from_f64).collect(),
            attachments,
        )
    }

    /// One Kronecker function per integration point, attached to the point index.
    pub fn integration_points(shape: ReferenceShape, points: Vec<Point3<T>>) -> Self {
        let attachments = (0..points.len())
            .map(|index| DofAttachment::IntegrationPoint { index })
            .collect();
        Self::from_parts(
            format!("{shape:?}_IntegrationPoints"),
            shape,
            Basis::IntegrationPoints { points: points.clone() },
            points,
            attachments,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> ReferenceShape {
        self.shape
    }

    pub fn reference_dim(&self) -> usize {
        self.shape.dimension()
    }

    pub fn basis(&self) -> &Basis<T> {
        &self.basis
    }

    pub fn num_shape_functions(&self) -> usize {
        self.basis.num_functions()
    }

    pub fn nodal_points(&self) -> &[Point3<T>] {
        &self.nodal_points
    }

    pub fn attachments(&self) -> &[DofAttachment] {
        &self.attachments
    }

    pub fn evaluate_basis(&self, xi: &Point3<T>) -> DVector<T> {
        self.basis.values(xi)
    }

    /// Reference gradients as a `reference_dim x num_shape_functions` matrix.
    pub fn evaluate_gradients(&self, xi: &Point3<T>) -> DMatrix<T> {
        self.basis.gradients(self.reference_dim(), xi)
    }

    pub fn at_points(&self, points: &[Point3<T>]) -> BasisAtPoints<T> {
        let n = self.num_shape_functions();
        let mut values = DMatrix::zeros(points.len(), n);
        let mut gradients = Vec::with_capacity(points.len());
        for (k, xi) in points.iter().enumerate() {
            values
                .row_mut(k)
                .copy_from(&self.evaluate_basis(xi).transpose());
            gradients.push(self.evaluate_gradients(xi));
        }
        BasisAtPoints { values, gradients }
    }
}

/// A discretization space over all element types it is defined for.
///
/// Two spaces are equal when their descriptors are equal. The descriptor also serves as the
/// cache key of the space.
#[derive(Debug, Clone)]
pub struct Space<T: Scalar> {
    descriptor: String,
    elements: BTreeMap<ElementType, Arc<ElementSpace<T>>>,
}

impl<T: Scalar> PartialEq for Space<T> {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
    }
}

impl<T: Scalar> Display for Space<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

impl<T: Real> Space<T> {
    pub fn new(descriptor: impl Into<String>, elements: BTreeMap<ElementType, Arc<ElementSpace<T>>>) -> Self {
        Self {
            descriptor: descriptor.into(),
            elements,
        }
    }

    fn per_shape(descriptor: &str, make: impl Fn(ReferenceShape) -> ElementSpace<T>) -> Self {
        let mut by_shape: BTreeMap<ReferenceShape, Arc<ElementSpace<T>>> = BTreeMap::new();
        let elements = ElementType::ALL
            .iter()
            .map(|&ty| {
                let space = by_shape
                    .entry(ty.shape())
                    .or_insert_with(|| Arc::new(make(ty.shape())))
                    .clone();
                (ty, space)
            })
            .collect();
        Self::new(descriptor, elements)
    }

    /// The isoparametric space of every element type.
    pub fn lagrange_geo() -> Self {
        let elements = ElementType::ALL
            .iter()
            .map(|&ty| (ty, Arc::new(ElementSpace::isoparametric(ty))))
            .collect();
        Self::new("LagrangeSpaceGeo", elements)
    }

    pub fn lagrange_p0() -> Self {
        Self::per_shape("LagrangeSpaceP0", ElementSpace::cell_constant)
    }

    pub fn lagrange_p1() -> Self {
        Self::per_shape("LagrangeSpaceP1", ElementSpace::lagrange_p1)
    }

    pub fn lagrange_p2() -> Self {
        Self::per_shape("LagrangeSpaceP2", ElementSpace::lagrange_p2)
    }

    /// A single DOF for the whole mesh.
    pub fn constant_global() -> Self {
        Self::per_shape("ConstantSpaceGlobal", ElementSpace::global_constant)
    }

    /// One DOF per integration point of the rule set, for the element types it covers.
    pub fn integration_points(rules: &IntegrationRules<T>) -> Self {
        let elements = rules
            .iter()
            .map(|(ty, rule)| {
                let space = ElementSpace::integration_points(ty.shape(), rule.points().to_vec());
                (ty, Arc::new(space))
            })
            .collect();
        Self::new(format!("IntegrationPointSpace[{}]", rules.key()), elements)
    }
}

impl<T: Scalar> Space<T> {
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn get(&self, element_type: ElementType) -> Option<&ElementSpace<T>> {
        self.elements.get(&element_type).map(Arc::as_ref)
    }

    pub fn contains(&self, element_type: ElementType) -> bool {
        self.elements.contains_key(&element_type)
    }

    pub fn element_types(&self) -> impl Iterator<Item = ElementType> + '_ {
        self.elements.keys().copied()
    }
}
