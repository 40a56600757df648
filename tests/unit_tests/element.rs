use femfields::element::{ElementType, ReferenceShape};
use std::str::FromStr;

#[test]
fn element_type_names_round_trip() {
    for ty in ElementType::ALL {
        assert_eq!(ElementType::from_str(ty.name()), Ok(ty));
        assert_eq!(ty.to_string(), ty.name());
    }
    assert!(ElementType::from_str("Pyramid5").is_err());
}

#[test]
fn local_entities_reference_element_nodes() {
    for ty in ElementType::ALL {
        for entity in ty.faces().iter().chain(ty.edges()) {
            assert_eq!(entity.nodes.len(), entity.element_type.num_nodes(), "{ty}");
            assert!(entity.nodes.iter().all(|&i| i < ty.num_nodes()), "{ty}");
        }
    }
}

#[test]
fn faces_have_one_dimension_less() {
    for ty in ElementType::ALL {
        for face in ty.faces() {
            assert_eq!(face.element_type.dimension() + 1, ty.dimension(), "{ty}");
        }
    }
}

#[test]
fn entity_counts() {
    assert_eq!(ElementType::Tri3.faces().len(), 3);
    assert_eq!(ElementType::Quad9.faces().len(), 4);
    assert_eq!(ElementType::Tet4.faces().len(), 4);
    assert_eq!(ElementType::Tet10.edges().len(), 6);
    assert_eq!(ElementType::Hex8.faces().len(), 6);
    assert_eq!(ElementType::Hex8.edges().len(), 12);
    assert!(ElementType::Point1.faces().is_empty());
}

#[test]
fn quadratic_elements_extend_linear_ones() {
    for ty in ElementType::ALL {
        let linear = ty.shape().linear_element();
        assert_eq!(ty.num_vertices(), linear.num_nodes(), "{ty}");
        assert_eq!(ty.is_quadratic(), ty != linear, "{ty}");
        let nodes = ty.reference_nodes::<f64>();
        assert_eq!(&nodes[..ty.num_vertices()], &linear.reference_nodes::<f64>()[..], "{ty}");
    }
}

#[test]
fn reference_shape_dimensions() {
    assert_eq!(ReferenceShape::Point.dimension(), 0);
    assert_eq!(ReferenceShape::Segment.dimension(), 1);
    assert_eq!(ReferenceShape::Triangle.dimension(), 2);
    assert_eq!(ReferenceShape::Quadrilateral.dimension(), 2);
    assert_eq!(ReferenceShape::Tetrahedron.dimension(), 3);
    assert_eq!(ReferenceShape::Hexahedron.dimension(), 3);
}
