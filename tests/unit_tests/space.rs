use femfields::element::{ElementType, ReferenceShape};
use femfields::quadrature::IntegrationRules;
use femfields::space::{DofAttachment, ElementSpace, Space};
use femfields::Error;
use nalgebra::{DMatrix, Point3};
use util::assert_approx_matrix_eq;

fn interior_point(shape: ReferenceShape) -> Point3<f64> {
    match shape {
        ReferenceShape::Point => Point3::origin(),
        ReferenceShape::Segment => Point3::new(0.3, 0.0, 0.0),
        ReferenceShape::Triangle => Point3::new(0.2, 0.3, 0.0),
        ReferenceShape::Quadrilateral => Point3::new(0.3, 0.7, 0.0),
        ReferenceShape::Tetrahedron => Point3::new(0.1, 0.2, 0.3),
        ReferenceShape::Hexahedron => Point3::new(0.3, 0.7, 0.4),
    }
}

fn lagrange_spaces() -> Vec<Space<f64>> {
    vec![Space::lagrange_geo(), Space::lagrange_p1(), Space::lagrange_p2()]
}

#[test]
fn lagrange_functions_are_kronecker_at_their_nodes() {
    for space in lagrange_spaces() {
        for ty in ElementType::ALL {
            let element_space = space.get(ty).unwrap();
            let n = element_space.num_shape_functions();
            let values = element_space.at_points(element_space.nodal_points()).values;
            assert_approx_matrix_eq!(&values, &DMatrix::<f64>::identity(n, n), abstol = 1e-12);
        }
    }
}

#[test]
fn lagrange_functions_form_a_partition_of_unity() {
    for space in lagrange_spaces() {
        for ty in ElementType::ALL {
            let element_space = space.get(ty).unwrap();
            let xi = interior_point(ty.shape());
            let sum: f64 = element_space.evaluate_basis(&xi).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "{space}: {ty}");

            if ty.dimension() > 0 {
                let gradients = element_space.evaluate_gradients(&xi);
                assert_eq!(gradients.shape(), (ty.dimension(), element_space.num_shape_functions()));
                for row in gradients.row_iter() {
                    assert!(row.sum().abs() < 1e-12, "{space}: {ty}");
                }
            }
        }
    }
}

#[test]
fn isoparametric_space_matches_element_nodes() {
    let space = Space::<f64>::lagrange_geo();
    for ty in ElementType::ALL {
        let element_space = space.get(ty).unwrap();
        assert_eq!(element_space.num_shape_functions(), ty.num_nodes());
        assert_eq!(element_space.nodal_points(), &ty.reference_nodes::<f64>()[..]);
        for (i, attachment) in element_space.attachments().iter().enumerate() {
            assert_eq!(*attachment, DofAttachment::point(i));
        }
    }
}

#[test]
fn quadratic_space_attachments() {
    let space = Space::<f64>::lagrange_p2();
    let tags = |ty| -> Vec<&str> {
        space
            .get(ty)
            .unwrap()
            .attachments()
            .iter()
            .map(DofAttachment::tag)
            .collect()
    };
    assert_eq!(tags(ElementType::Bar2), ["P", "P", "C"]);
    assert_eq!(tags(ElementType::Tri3), ["P", "P", "P", "F", "F", "F"]);
    assert_eq!(tags(ElementType::Quad4), ["P", "P", "P", "P", "F", "F", "F", "F", "C"]);
    assert_eq!(tags(ElementType::Tet4), ["P", "P", "P", "P", "F2", "F2", "F2", "F2", "F2", "F2"]);
}

#[test]
fn constant_spaces_have_one_function() {
    for space in [Space::<f64>::lagrange_p0(), Space::constant_global()] {
        for ty in ElementType::ALL {
            let element_space = space.get(ty).unwrap();
            assert_eq!(element_space.num_shape_functions(), 1);
            let value = element_space.evaluate_basis(&interior_point(ty.shape()));
            assert_eq!(value[0], 1.0);
        }
    }
}

#[test]
fn integration_point_space_follows_rules() {
    let rules = IntegrationRules::<f64>::named("LagrangeIsoParam").unwrap();
    let space = Space::integration_points(&rules);
    assert_eq!(space.descriptor(), "IntegrationPointSpace[LagrangeIsoParam]");
    let element_space = space.get(ElementType::Quad4).unwrap();
    assert_eq!(element_space.num_shape_functions(), 4);
    assert_eq!(element_space.attachments()[2], DofAttachment::IntegrationPoint { index: 2 });
}

#[test]
fn attachment_tags_round_trip() {
    for attachment in [
        DofAttachment::point(3),
        DofAttachment::Cell { index: 0 },
        DofAttachment::Edge { edge: 2 },
        DofAttachment::Face { face: 1 },
        DofAttachment::Global { component: 0 },
        DofAttachment::IntegrationPoint { index: 4 },
    ] {
        let (first, second) = match attachment {
            DofAttachment::Point { node, component } => (node, component),
            DofAttachment::Edge { edge } => (edge, None),
            DofAttachment::Face { face } => (face, None),
            DofAttachment::Cell { index } | DofAttachment::Global { component: index } | DofAttachment::IntegrationPoint { index } => {
                (0, Some(index))
            }
        };
        assert_eq!(DofAttachment::from_tag(attachment.tag(), first, second), Ok(attachment));
    }
    assert!(matches!(
        DofAttachment::from_tag("Q", 0, None),
        Err(Error::UnsupportedAttachment { .. })
    ));
}

#[test]
fn spaces_compare_by_descriptor() {
    assert_eq!(Space::<f64>::lagrange_p1(), Space::lagrange_p1());
    assert_ne!(Space::<f64>::lagrange_p1(), Space::lagrange_p2());
    assert_eq!(Space::<f64>::lagrange_geo().to_string(), "LagrangeSpaceGeo");
}

#[test]
fn element_space_parts_must_agree_in_size() {
    let p1 = ElementSpace::<f64>::lagrange_p1(ReferenceShape::Triangle);
    let parts = |num_points: usize, num_attachments: usize| {
        ElementSpace::new(
            "Custom",
            p1.shape(),
            p1.basis().clone(),
            p1.nodal_points()[..num_points].to_vec(),
            p1.attachments()[..num_attachments].to_vec(),
        )
    };
    let space = parts(3, 3).unwrap();
    assert_eq!(space.num_shape_functions(), 3);
    assert_eq!(space.name(), "Custom");
    assert_eq!(parts(2, 3).unwrap_err(), Error::DataSizeMismatch { expected: 3, actual: 2 });
    assert_eq!(parts(3, 1).unwrap_err(), Error::DataSizeMismatch { expected: 3, actual: 1 });
}
