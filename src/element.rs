//! Reference element types and their local topology.
//!
//! Reference domains are `[0, 1]` for segments, `[0, 1]^d` for quadrilaterals and hexahedra and
//! the unit simplex for triangles and tetrahedra. Reference points are always stored as
//! three-dimensional points padded with zeros.
use nalgebra::{convert, Point3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::Real;

/// The shape of a reference element, independent of its node count.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReferenceShape {
    Point,
    Segment,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

impl ReferenceShape {
    pub fn dimension(&self) -> usize {
        match self {
            Self::Point => 0,
            Self::Segment => 1,
            Self::Triangle | Self::Quadrilateral => 2,
            Self::Tetrahedron | Self::Hexahedron => 3,
        }
    }

    pub fn is_simplex(&self) -> bool {
        matches!(self, Self::Segment | Self::Triangle | Self::Tetrahedron)
    }

    /// Segments, quadrilaterals and hexahedra are tensor products of the unit interval.
    pub fn is_tensor_product(&self) -> bool {
        matches!(self, Self::Segment | Self::Quadrilateral | Self::Hexahedron)
    }

    /// The linear element type with this shape.
    pub fn linear_element(&self) -> ElementType {
        match self {
            Self::Point => ElementType::Point1,
            Self::Segment => ElementType::Bar2,
            Self::Triangle => ElementType::Tri3,
            Self::Quadrilateral => ElementType::Quad4,
            Self::Tetrahedron => ElementType::Tet4,
            Self::Hexahedron => ElementType::Hex8,
        }
    }

    /// Length, area or volume of the reference domain.
    pub fn measure(&self) -> f64 {
        match self {
            Self::Point | Self::Segment | Self::Quadrilateral | Self::Hexahedron => 1.0,
            Self::Triangle => 0.5,
            Self::Tetrahedron => 1.0 / 6.0,
        }
    }

    pub fn centroid<T: Real>(&self) -> Point3<T> {
        let c = match self {
            Self::Point => [0.0, 0.0, 0.0],
            Self::Segment => [0.5, 0.0, 0.0],
            Self::Quadrilateral => [0.5, 0.5, 0.0],
            Self::Hexahedron => [0.5, 0.5, 0.5],
            Self::Triangle => [1.0 / 3.0, 1.0 / 3.0, 0.0],
            Self::Tetrahedron => [0.25, 0.25, 0.25],
        };
        point_from_f64(&c)
    }
}

/// All supported element types.
///
/// The variant order defines the order of element blocks in a mesh, and therefore the global
/// element offsets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Point1,
    Bar2,
    Bar3,
    Tri3,
    Tri6,
    Quad4,
    Quad8,
    Quad9,
    Tet4,
    Tet10,
    Hex8,
}

/// A local sub-entity (face or edge) of an element: its type and local node indices.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LocalEntity {
    pub element_type: ElementType,
    pub nodes: &'static [usize],
}

const fn entity(element_type: ElementType, nodes: &'static [usize]) -> LocalEntity {
    LocalEntity { element_type, nodes }
}

use ElementType::*;

const BAR2_FACES: [LocalEntity; 2] = [entity(Point1, &[0]), entity(Point1, &[1])];
const TRI3_EDGES: [LocalEntity; 3] = [entity(Bar2, &[0, 1]), entity(Bar2, &[1, 2]), entity(Bar2, &[2, 0])];
const TRI6_EDGES: [LocalEntity; 3] = [
    entity(Bar3, &[0, 1, 3]),
    entity(Bar3, &[1, 2, 4]),
    entity(Bar3, &[2, 0, 5]),
];
const QUAD4_EDGES: [LocalEntity; 4] = [
    entity(Bar2, &[0, 1]),
    entity(Bar2, &[1, 2]),
    entity(Bar2, &[2, 3]),
    entity(Bar2, &[3, 0]),
];
const QUAD8_EDGES: [LocalEntity; 4] = [
    entity(Bar3, &[0, 1, 4]),
    entity(Bar3, &[1, 2, 5]),
    entity(Bar3, &[2, 3, 6]),
    entity(Bar3, &[3, 0, 7]),
];
const TET4_FACES: [LocalEntity; 4] = [
    entity(Tri3, &[0, 2, 1]),
    entity(Tri3, &[0, 1, 3]),
    entity(Tri3, &[0, 3, 2]),
    entity(Tri3, &[1, 2, 3]),
];
const TET10_FACES: [LocalEntity; 4] = [
    entity(Tri6, &[0, 2, 1, 6, 5, 4]),
    entity(Tri6, &[0, 1, 3, 4, 8, 7]),
    entity(Tri6, &[0, 3, 2, 7, 9, 6]),
    entity(Tri6, &[1, 2, 3, 5, 9, 8]),
];
const TET4_EDGES: [LocalEntity; 6] = [
    entity(Bar2, &[0, 1]),
    entity(Bar2, &[1, 2]),
    entity(Bar2, &[2, 0]),
    entity(Bar2, &[0, 3]),
    entity(Bar2, &[1, 3]),
    entity(Bar2, &[2, 3]),
];
const TET10_EDGES: [LocalEntity; 6] = [
    entity(Bar3, &[0, 1, 4]),
    entity(Bar3, &[1, 2, 5]),
    entity(Bar3, &[2, 0, 6]),
    entity(Bar3, &[0, 3, 7]),
    entity(Bar3, &[1, 3, 8]),
    entity(Bar3, &[2, 3, 9]),
];
const HEX8_FACES: [LocalEntity; 6] = [
    entity(Quad4, &[0, 3, 2, 1]),
    entity(Quad4, &[0, 1, 5, 4]),
    entity(Quad4, &[1, 2, 6, 5]),
    entity(Quad4, &[2, 3, 7, 6]),
    entity(Quad4, &[3, 0, 4, 7]),
    entity(Quad4, &[4, 5, 6, 7]),
];
const HEX8_EDGES: [LocalEntity; 12] = [
    entity(Bar2, &[0, 1]),
    entity(Bar2, &[1, 2]),
    entity(Bar2, &[2, 3]),
    entity(Bar2, &[3, 0]),
    entity(Bar2, &[4, 5]),
    entity(Bar2, &[5, 6]),
    entity(Bar2, &[6, 7]),
    entity(Bar2, &[7, 4]),
    entity(Bar2, &[0, 4]),
    entity(Bar2, &[1, 5]),
    entity(Bar2, &[2, 6]),
    entity(Bar2, &[3, 7]),
];

impl ElementType {
    pub const ALL: [ElementType; 11] = [Point1, Bar2, Bar3, Tri3, Tri6, Quad4, Quad8, Quad9, Tet4, Tet10, Hex8];

    pub fn name(&self) -> &'static str {
        match self {
            Point1 => "Point1",
            Bar2 => "Bar2",
            Bar3 => "Bar3",
            Tri3 => "Tri3",
            Tri6 => "Tri6",
            Quad4 => "Quad4",
            Quad8 => "Quad8",
            Quad9 => "Quad9",
            Tet4 => "Tet4",
            Tet10 => "Tet10",
            Hex8 => "Hex8",
        }
    }

    pub fn shape(&self) -> ReferenceShape {
        match self {
            Point1 => ReferenceShape::Point,
            Bar2 | Bar3 => ReferenceShape::Segment,
            Tri3 | Tri6 => ReferenceShape::Triangle,
            Quad4 | Quad8 | Quad9 => ReferenceShape::Quadrilateral,
            Tet4 | Tet10 => ReferenceShape::Tetrahedron,
            Hex8 => ReferenceShape::Hexahedron,
        }
    }

    pub fn dimension(&self) -> usize {
        self.shape().dimension()
    }

    pub fn num_nodes(&self) -> usize {
        match self {
            Point1 => 1,
            Bar2 => 2,
            Bar3 => 3,
            Tri3 => 3,
            Tri6 => 6,
            Quad4 => 4,
            Quad8 => 8,
            Quad9 => 9,
            Tet4 => 4,
            Tet10 => 10,
            Hex8 => 8,
        }
    }

    /// Number of leading nodes that are vertices of the reference shape.
    pub fn num_vertices(&self) -> usize {
        self.shape().linear_element().num_nodes()
    }

    /// Whether the element carries nodes beyond its vertices.
    pub fn is_quadratic(&self) -> bool {
        self.num_nodes() > self.num_vertices()
    }

    /// Reference coordinates of the element nodes, in local node order.
    pub fn reference_nodes<T: Real>(&self) -> Vec<Point3<T>> {
        self.reference_nodes_f64()
            .iter()
            .map(point_from_f64)
            .collect()
    }

    pub(crate) fn reference_nodes_f64(&self) -> Vec<[f64; 3]> {
        let vertices: &[[f64; 3]] = match self.shape() {
            ReferenceShape::Point => &[[0.0, 0.0, 0.0]],
            ReferenceShape::Segment => &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            ReferenceShape::Triangle => &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            ReferenceShape::Quadrilateral => &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            ReferenceShape::Tetrahedron => &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            ReferenceShape::Hexahedron => &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 1.0],
                [1.0, 1.0, 1.0],
                [0.0, 1.0, 1.0],
            ],
        };
        let mut nodes = vertices.to_vec();
        let midpoint = |a: usize, b: usize| {
            let (p, q) = (vertices[a], vertices[b]);
            [0.5 * (p[0] + q[0]), 0.5 * (p[1] + q[1]), 0.5 * (p[2] + q[2])]
        };
        match self {
            Bar3 => nodes.push(midpoint(0, 1)),
            Tri6 | Quad8 | Quad9 | Tet10 => {
                // Mid-edge nodes follow the edge table of the linear element
                for edge in self.shape().linear_element().edges() {
                    nodes.push(midpoint(edge.nodes[0], edge.nodes[1]));
                }
                if *self == Quad9 {
                    nodes.push([0.5, 0.5, 0.0]);
                }
            }
            _ => {}
        }
        nodes
    }

    /// Local entities of dimension `dimension() - 1`.
    ///
    /// Points for segments, edges for two-dimensional elements and faces for three-dimensional
    /// elements. Points have no faces.
    pub fn faces(&self) -> &'static [LocalEntity] {
        match self {
            Point1 => &[],
            Bar2 | Bar3 => &BAR2_FACES,
            Tri3 => &TRI3_EDGES,
            Tri6 => &TRI6_EDGES,
            Quad4 => &QUAD4_EDGES,
            Quad8 | Quad9 => &QUAD8_EDGES,
            Tet4 => &TET4_FACES,
            Tet10 => &TET10_FACES,
            Hex8 => &HEX8_FACES,
        }
    }

    /// One-dimensional local entities.
    ///
    /// For two-dimensional elements these coincide with [`faces`](Self::faces). Segments and
    /// points have no edges.
    pub fn edges(&self) -> &'static [LocalEntity] {
        match self {
            Point1 | Bar2 | Bar3 => &[],
            Tri3 | Tri6 | Quad4 | Quad8 | Quad9 => self.faces(),
            Tet4 => &TET4_EDGES,
            Tet10 => &TET10_EDGES,
            Hex8 => &HEX8_EDGES,
        }
    }
}

impl Display for ElementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownElementType(pub String);

impl Display for UnknownElementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown element type `{}`", self.0)
    }
}

impl std::error::Error for UnknownElementType {}

impl FromStr for ElementType {
    type Err = UnknownElementType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementType::ALL
            .iter()
            .copied()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| UnknownElementType(s.to_string()))
    }
}

pub(crate) fn point_from_f64<T: Real>(p: &[f64; 3]) -> Point3<T> {
    Point3::new(convert(p[0]), convert(p[1]), convert(p[2]))
}
